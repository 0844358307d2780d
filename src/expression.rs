use std::collections::BTreeSet;
use std::fmt;

/// A real-valued syntax tree.
///
/// Built bottom-up by the parser (or decoded from JSON) and never mutated
/// afterwards, so one tree can be evaluated any number of times.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    // Constant.
    Number(f64),

    // Input variable or named constant, resolved at evaluation time.
    Variable(String),

    // N-ary real ops. Never empty.
    Sum(Vec<Expression>),
    Product(Vec<Expression>),

    // Binary real ops.
    Quotient(Box<Expression>, Box<Expression>),
    Power(Box<Expression>, Box<Expression>),

    // Named function or operator, e.g. `sin`, `neg`, `sub`, `limit`.
    Call(String, Vec<Expression>),
}

impl Expression {
    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::Call(name.into(), args)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Names of the single-letter variables this tree reads from its
    /// bindings, in alphabetical order. Reserved constants are excluded.
    pub fn variable_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variable_names(&mut names);
        names
    }

    fn collect_variable_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => {
                if crate::evaluate::is_bindable(name) {
                    names.insert(name.clone());
                }
            }
            Self::Sum(children) | Self::Product(children) | Self::Call(_, children) => {
                for child in children {
                    child.collect_variable_names(names);
                }
            }
            Self::Quotient(lhs, rhs) | Self::Power(lhs, rhs) => {
                lhs.collect_variable_names(names);
                rhs.collect_variable_names(names);
            }
        }
    }
}

/// Fully parenthesized infix rendering that parses back to an equivalent tree.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Variable(name) => f.write_str(name),
            Self::Sum(children) => write_joined(f, children, '+'),
            Self::Product(children) => write_joined(f, children, '*'),
            Self::Quotient(lhs, rhs) => write!(f, "({lhs}/{rhs})"),
            Self::Power(lhs, rhs) => write!(f, "({lhs}^{rhs})"),
            Self::Call(name, args) if name == "neg" && args.len() == 1 => {
                write!(f, "(-{})", args[0])
            }
            Self::Call(name, args) if name == "sub" && args.len() == 2 => {
                write!(f, "({}-{})", args[0], args[1])
            }
            Self::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Expression], op: char) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{op}")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
