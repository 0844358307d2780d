use std::collections::BTreeMap;

use crate::error::EvalError;
use crate::Expression;

#[cfg(feature = "rayon")]
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

/// Value of any variable that has not been bound.
pub const DEFAULT_BINDING: f64 = 1.0;

/// Stand-in for an infinite limit target.
pub const LIMIT_FAR: f64 = 1e10;

/// Stand-in for a limit target at zero; also the "near zero" radius.
pub const LIMIT_NEAR: f64 = 1e-10;

/// Variable values supplied to an evaluation.
///
/// Only single lowercase ASCII letters are read. `e` is reserved for Euler's
/// number and `pi` for π, so binding `'e'` has no effect on evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<char, f64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: char, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: char, value: f64) {
        self.values.insert(name, value);
    }

    /// Bound value of `name`, or [`DEFAULT_BINDING`].
    pub fn get(&self, name: char) -> f64 {
        self.values.get(&name).copied().unwrap_or(DEFAULT_BINDING)
    }

    pub fn contains(&self, name: char) -> bool {
        self.values.contains_key(&name)
    }

    pub fn remove(&mut self, name: char) -> Option<f64> {
        self.values.remove(&name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = char> + '_ {
        self.values.keys().copied()
    }

    /// Reserved named constants.
    pub fn constant(name: &str) -> Option<f64> {
        match name {
            "pi" => Some(std::f64::consts::PI),
            "e" => Some(std::f64::consts::E),
            _ => None,
        }
    }
}

/// Whether `name` is looked up in [`Bindings`] rather than being a constant.
pub(crate) fn is_bindable(name: &str) -> bool {
    bindable_letter(name).is_some()
}

fn bindable_letter(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() && Bindings::constant(name).is_none() => Some(c),
        _ => None,
    }
}

impl Expression {
    /// Calculates the value of the tree under `bindings`.
    ///
    /// Evaluation never mutates the tree or the bindings, so the same tree can
    /// be evaluated again with different values.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<f64, EvalError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Variable(name) => {
                if let Some(value) = Bindings::constant(name) {
                    return Ok(value);
                }
                bindable_letter(name)
                    .map(|c| bindings.get(c))
                    .ok_or_else(|| EvalError::UnknownSymbol(name.clone()))
            }
            Self::Sum(children) => children
                .iter()
                .try_fold(0.0, |acc, child| Ok(acc + child.evaluate(bindings)?)),
            Self::Product(children) => children
                .iter()
                .try_fold(1.0, |acc, child| Ok(acc * child.evaluate(bindings)?)),
            Self::Quotient(lhs, rhs) => {
                let numerator = lhs.evaluate(bindings)?;
                let denominator = rhs.evaluate(bindings)?;
                if denominator == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(numerator / denominator)
            }
            Self::Power(base, exponent) => {
                Ok(base.evaluate(bindings)?.powf(exponent.evaluate(bindings)?))
            }
            Self::Call(name, args) => evaluate_call(name, args, bindings),
        }
    }

    /// Evaluates the tree once per entry of `values`, with `variable` bound to
    /// that entry on top of `bindings`.
    pub fn evaluate_over(
        &self,
        variable: char,
        values: &[f64],
        bindings: &Bindings,
    ) -> Vec<Result<f64, EvalError>> {
        let evaluate_at = |value: &f64| {
            let mut scoped = bindings.clone();
            scoped.set(variable, *value);
            self.evaluate(&scoped)
        };

        #[cfg(feature = "rayon")]
        let results = values.par_iter().map(evaluate_at).collect();
        #[cfg(not(feature = "rayon"))]
        let results = values.iter().map(evaluate_at).collect();
        results
    }
}

fn evaluate_call(name: &str, args: &[Expression], bindings: &Bindings) -> Result<f64, EvalError> {
    if let Some(op) = unary_function(name) {
        let [only] = args else {
            return Err(arity(name, args.len()));
        };
        return Ok(op(only.evaluate(bindings)?));
    }
    match name {
        "sub" => {
            let [lhs, rhs] = args else {
                return Err(arity(name, args.len()));
            };
            Ok(lhs.evaluate(bindings)? - rhs.evaluate(bindings)?)
        }
        // Symbolic differentiation is not supported; `diff` is a placeholder
        // that always yields zero.
        "diff" => match args {
            [_] => Ok(0.0),
            _ => Err(arity(name, args.len())),
        },
        "limit" => evaluate_limit(args, bindings),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn unary_function(name: &str) -> Option<fn(f64) -> f64> {
    let op: fn(f64) -> f64 = match name {
        "sqrt" => f64::sqrt,
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "sec" => |v| 1.0 / v.cos(),
        "csc" => |v| 1.0 / v.sin(),
        "cot" => |v| 1.0 / v.tan(),
        "ln" | "log" => f64::ln,
        "exp" => f64::exp,
        "abs" => f64::abs,
        "neg" => |v| -v,
        _ => return None,
    };
    Some(op)
}

/// Numerical stand-in for a limit: `limit(target, body)` binds `x`,
/// `limit(var, target, body)` binds `var`, and the body is evaluated once at
/// [`limit_surrogate`] of the target. This is not symbolic limit evaluation.
fn evaluate_limit(args: &[Expression], bindings: &Bindings) -> Result<f64, EvalError> {
    let (variable, target, body) = match args {
        [target, body] => ('x', target, body),
        [Expression::Variable(name), target, body] => (
            bindable_letter(name).ok_or(EvalError::LimitVariable)?,
            target,
            body,
        ),
        [_, _, _] => return Err(EvalError::LimitVariable),
        _ => return Err(arity("limit", args.len())),
    };
    let at = limit_surrogate(target.evaluate(bindings)?);
    let mut scoped = bindings.clone();
    scoped.set(variable, at);
    body.evaluate(&scoped)
}

/// Point at which a limit body is evaluated for the given target: a large
/// finite value for infinite targets, a tiny signed value for targets within
/// [`LIMIT_NEAR`] of zero, otherwise the target itself.
pub fn limit_surrogate(target: f64) -> f64 {
    if target.is_infinite() {
        LIMIT_FAR.copysign(target)
    } else if target.abs() < LIMIT_NEAR {
        LIMIT_NEAR.copysign(target)
    } else {
        target
    }
}

fn arity(name: &str, found: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str, x: f64) -> Result<f64, EvalError> {
        Expression::parse(input)
            .unwrap()
            .evaluate(&Bindings::new().with('x', x))
    }

    #[test]
    fn arithmetic() {
        for x in [-3.0, 0.0, 1.0, 42.0] {
            assert_eq!(eval("sqrt(4)", x), Ok(2.0));
            assert_eq!(eval("2^10", x), Ok(1024.0));
            assert_eq!(eval("1+2*3", x), Ok(7.0));
            assert_eq!(eval("-3+4", x), Ok(1.0));
        }
        assert_eq!(eval("8/4*3", 0.0), Ok(6.0));
        assert_eq!(eval("4^3^2", 0.0), Ok(262144.0));
        assert_eq!(eval("10-4-3", 0.0), Ok(3.0));
        assert_eq!(eval("2*x+1", 5.0), Ok(11.0));
    }

    #[test]
    fn division_by_exact_zero_fails() {
        assert_eq!(eval("1/0", 0.0), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1/(x-2)", 2.0), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1/(x-2)", 3.0), Ok(1.0));
    }

    #[test]
    fn power_may_be_nan() {
        assert!(eval("(0-8)^0.5", 0.0).unwrap().is_nan());
    }

    #[test]
    fn variables_and_constants() {
        let tree = Expression::parse("a*b+y").unwrap();
        assert_eq!(tree.evaluate(&Bindings::new()), Ok(2.0));
        let bindings = Bindings::new().with('a', 3.0).with('b', 4.0).with('y', 0.5);
        assert_eq!(tree.evaluate(&bindings), Ok(12.5));

        assert_eq!(eval("π", 0.0), Ok(std::f64::consts::PI));
        assert_eq!(eval("pi", 0.0), Ok(std::f64::consts::PI));
        assert_eq!(
            Expression::parse("e")
                .unwrap()
                .evaluate(&Bindings::new().with('e', 5.0)),
            Ok(std::f64::consts::E)
        );
        assert_eq!(
            eval("foo", 0.0),
            Err(EvalError::UnknownSymbol("foo".into()))
        );
        assert_eq!(eval("X", 0.0), Err(EvalError::UnknownSymbol("X".into())));
    }

    #[test]
    fn tree_is_reusable_across_bindings() {
        let tree = Expression::parse("x^2").unwrap();
        let mut bindings = Bindings::new();
        for x in [1.0, 2.0, 3.0] {
            bindings.set('x', x);
            assert_eq!(tree.evaluate(&bindings), Ok(x * x));
        }
        let failing = Expression::parse("1/x").unwrap();
        assert!(failing.evaluate(&Bindings::new().with('x', 0.0)).is_err());
        assert_eq!(failing.evaluate(&Bindings::new().with('x', 4.0)), Ok(0.25));
    }

    #[test]
    fn unary_functions() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-12;
        assert!(close(eval("sec(x)", 0.5).unwrap(), 1.0 / 0.5f64.cos()));
        assert!(close(eval("csc(x)", 0.5).unwrap(), 1.0 / 0.5f64.sin()));
        assert!(close(eval("cot(x)", 0.5).unwrap(), 1.0 / 0.5f64.tan()));
        assert!(close(eval("log(x)", 1.0).unwrap(), 0.0));
        assert!(close(eval("ln(exp(x))", 2.0).unwrap(), 2.0));
        assert_eq!(eval("abs(x)", -2.5), Ok(2.5));
        assert_eq!(eval("neg(x)", 2.5), Ok(-2.5));
    }

    #[test]
    fn call_errors() {
        let tree = Expression::call("sin", vec![Expression::Number(1.0), Expression::Number(2.0)]);
        assert_eq!(
            tree.evaluate(&Bindings::new()),
            Err(EvalError::Arity {
                name: "sin".into(),
                found: 2
            })
        );
        let tree = Expression::call("sub", vec![Expression::Number(1.0)]);
        assert!(matches!(
            tree.evaluate(&Bindings::new()),
            Err(EvalError::Arity { .. })
        ));
        let tree = Expression::call("gamma", vec![Expression::Number(1.0)]);
        assert_eq!(
            tree.evaluate(&Bindings::new()),
            Err(EvalError::UnknownFunction("gamma".into()))
        );
    }

    #[test]
    fn diff_is_a_zero_placeholder() {
        assert_eq!(eval("diff(x)", 7.0), Ok(0.0));
    }

    #[test]
    fn limit_surrogates() {
        assert_eq!(limit_surrogate(f64::INFINITY), 1e10);
        assert_eq!(limit_surrogate(f64::NEG_INFINITY), -1e10);
        assert_eq!(limit_surrogate(0.0), 1e-10);
        assert_eq!(limit_surrogate(-0.0), -1e-10);
        assert_eq!(limit_surrogate(-1e-12), -1e-10);
        assert_eq!(limit_surrogate(2.0), 2.0);
    }

    #[test]
    fn limit_evaluates_at_surrogate() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(eval("limit(0,sin(x)/x)", 5.0).unwrap(), 1.0));
        assert!(close(eval("limit(x,0,sin(x)/x)", 5.0).unwrap(), 1.0));
        assert_eq!(eval("limit(2,x^2)", 0.0), Ok(4.0));
        assert_eq!(eval("limit(exp(1000),1/x)", 0.0), Ok(1e-10));
        assert_eq!(eval("limit(-exp(1000),x)", 0.0), Ok(-1e10));

        let tree = Expression::parse("limit(y,3,y*x)").unwrap();
        assert_eq!(tree.evaluate(&Bindings::new().with('x', 2.0)), Ok(6.0));
    }

    #[test]
    fn limit_variable_must_be_bindable() {
        assert_eq!(eval("limit(2,3,x)", 0.0), Err(EvalError::LimitVariable));
        assert_eq!(eval("limit(pi,3,x)", 0.0), Err(EvalError::LimitVariable));
    }

    #[test]
    fn evaluate_over_samples() {
        let tree = Expression::parse("1/x").unwrap();
        let results = tree.evaluate_over('x', &[1.0, 0.0, 4.0], &Bindings::new());
        assert_eq!(
            results,
            vec![Ok(1.0), Err(EvalError::DivisionByZero), Ok(0.25)]
        );
    }
}
