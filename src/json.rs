//! Versioned JSON form of an [`Expression`].
//!
//! ```text
//! {"version": 1, "expr": {"type": "Add", "args": [
//!     {"type": "Num", "value": 2.0},
//!     {"type": "Func", "name": "sin", "args": [{"type": "Sym", "name": "x"}]}
//! ]}}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::JsonError;
use crate::parse::MAX_DEPTH;
use crate::Expression;

/// The only schema version this crate reads or writes.
pub const JSON_VERSION: i64 = 1;

/// Each tree level is a node object plus its `args` array, inside the
/// envelope object.
const MAX_JSON_DEPTH: usize = 2 * MAX_DEPTH + 2;

#[derive(Deserialize)]
struct Header {
    version: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: i64,
    expr: Node,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum Node {
    Num { value: f64 },
    Sym { name: String },
    Add { args: Vec<Node> },
    Mul { args: Vec<Node> },
    Div { args: Vec<Node> },
    Pow { args: Vec<Node> },
    Func { name: String, args: Vec<Node> },
}

impl From<&Expression> for Node {
    fn from(expr: &Expression) -> Self {
        match expr {
            Expression::Number(value) => Node::Num { value: *value },
            Expression::Variable(name) => Node::Sym { name: name.clone() },
            Expression::Sum(children) => Node::Add {
                args: nodes(children),
            },
            Expression::Product(children) => Node::Mul {
                args: nodes(children),
            },
            Expression::Quotient(lhs, rhs) => Node::Div {
                args: vec![Node::from(lhs.as_ref()), Node::from(rhs.as_ref())],
            },
            Expression::Power(base, exponent) => Node::Pow {
                args: vec![Node::from(base.as_ref()), Node::from(exponent.as_ref())],
            },
            Expression::Call(name, args) => Node::Func {
                name: name.clone(),
                args: nodes(args),
            },
        }
    }
}

fn convert(node: Node) -> Result<Expression, JsonError> {
    Ok(match node {
        Node::Num { value } => Expression::Number(value),
        Node::Sym { name } => Expression::Variable(name),
        Node::Add { args } => Expression::Sum(nary("Add", args)?),
        Node::Mul { args } => Expression::Product(nary("Mul", args)?),
        Node::Div { args } => {
            let (lhs, rhs) = binary("Div", args)?;
            Expression::Quotient(Box::new(lhs), Box::new(rhs))
        }
        Node::Pow { args } => {
            let (base, exponent) = binary("Pow", args)?;
            Expression::Power(Box::new(base), Box::new(exponent))
        }
        Node::Func { name, args } => Expression::Call(name, convert_all(args)?),
    })
}

fn nodes(children: &[Expression]) -> Vec<Node> {
    children.iter().map(Node::from).collect()
}

fn convert_all(args: Vec<Node>) -> Result<Vec<Expression>, JsonError> {
    args.into_iter().map(convert).collect()
}

fn nary(node: &'static str, args: Vec<Node>) -> Result<Vec<Expression>, JsonError> {
    if args.is_empty() {
        return Err(JsonError::Arity {
            node,
            expected: "at least 1",
            found: 0,
        });
    }
    convert_all(args)
}

fn binary(node: &'static str, args: Vec<Node>) -> Result<(Expression, Expression), JsonError> {
    let found = args.len();
    let mut converted = convert_all(args)?.into_iter();
    match (converted.next(), converted.next(), converted.next()) {
        (Some(lhs), Some(rhs), None) => Ok((lhs, rhs)),
        _ => Err(JsonError::Arity {
            node,
            expected: "2",
            found,
        }),
    }
}

impl Expression {
    /// Serializes the tree inside a `{version, expr}` envelope.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.envelope()).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.envelope()).unwrap_or_default()
    }

    fn envelope(&self) -> Envelope {
        Envelope {
            version: JSON_VERSION,
            expr: Node::from(self),
        }
    }

    /// Decodes a tree written by [`Expression::to_json`] or by any producer of
    /// the same schema. Any version other than 1 is rejected, and so is
    /// anything nested deeper than the parser would build.
    pub fn from_json(json: &str) -> Result<Self, JsonError> {
        if nesting_depth(json) > MAX_JSON_DEPTH {
            return Err(JsonError::TooDeep { limit: MAX_DEPTH });
        }
        let header: Header = decode(json)?;
        let version = match header.version {
            Some(version) => version
                .as_i64()
                .ok_or_else(|| JsonError::InvalidVersion(version.to_string()))?,
            None => return Err(JsonError::MissingVersion),
        };
        if version != JSON_VERSION {
            return Err(JsonError::UnsupportedVersion(version));
        }
        let envelope: Envelope = decode(json)?;
        convert(envelope.expr)
    }
}

/// serde_json's own recursion limit (128) is below what a legal tree needs;
/// callers bound the depth with [`nesting_depth`] first.
fn decode<T: DeserializeOwned>(json: &str) -> Result<T, JsonError> {
    let mut de = serde_json::Deserializer::from_str(json);
    de.disable_recursion_limit();
    let value = T::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Deepest `[`/`{` nesting, not counting brackets inside strings.
fn nesting_depth(json: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for byte in json.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bindings;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_documented_schema() {
        let tree = Expression::parse("2*x^3").unwrap();
        let value: serde_json::Value = serde_json::from_str(&tree.to_json()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "version": 1,
                "expr": {"type": "Mul", "args": [
                    {"type": "Num", "value": 2.0},
                    {"type": "Pow", "args": [
                        {"type": "Sym", "name": "x"},
                        {"type": "Num", "value": 3.0}
                    ]}
                ]}
            })
        );
    }

    #[test]
    fn reads_hand_written_tree() {
        let json = r#"{"version": 1, "expr": {"type": "Div", "args": [
            {"type": "Func", "name": "sin", "args": [{"type": "Sym", "name": "x"}]},
            {"type": "Sym", "name": "x"}
        ]}}"#;
        let tree = Expression::from_json(json).unwrap();
        let value = tree.evaluate(&Bindings::new().with('x', 0.5)).unwrap();
        assert!((value - 0.5f64.sin() / 0.5).abs() < 1e-15);
    }

    #[test]
    fn round_trip_preserves_structure() {
        let tree = Expression::parse("limit(x,0,sin(x)/x)-abs(-y)+z*2").unwrap();
        assert_eq!(Expression::from_json(&tree.to_json()).unwrap(), tree);
    }

    #[test]
    fn rejects_other_versions() {
        let json = r#"{"version": 2, "expr": {"type": "Num", "value": 1}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn version_must_be_a_present_integer() {
        let json = r#"{"expr": {"type": "Num", "value": 1}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::MissingVersion)
        ));
        let json = r#"{"version": 1.0, "expr": {"type": "Num", "value": 1}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::InvalidVersion(v)) if v == "1.0"
        ));
        let json = r#"{"version": "1", "expr": {"type": "Num", "value": 1}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::InvalidVersion(_))
        ));
    }

    #[test]
    fn long_subtraction_chain_round_trips() {
        let text = format!("x{}", "-1".repeat(199));
        let tree = Expression::parse(&text).unwrap();
        let decoded = Expression::from_json(&tree.to_json()).unwrap();
        assert_eq!(decoded, tree);

        let bindings = Bindings::new().with('x', 250.0);
        assert_eq!(decoded.evaluate(&bindings).unwrap(), 51.0);
    }

    #[test]
    fn rejects_json_nested_past_parser_depth() {
        let json = format!(
            r#"{{"version": 1, "expr": {}"#,
            "[".repeat(MAX_JSON_DEPTH)
        );
        assert!(matches!(
            Expression::from_json(&json),
            Err(JsonError::TooDeep { limit: MAX_DEPTH })
        ));
        // Brackets inside strings do not count.
        let name = "[".repeat(1000);
        let json = format!(r#"{{"version": 1, "expr": {{"type": "Sym", "name": "{name}"}}}}"#);
        assert_eq!(
            Expression::from_json(&json).unwrap(),
            Expression::Variable(name)
        );
    }

    #[test]
    fn rejects_bad_arity() {
        let json = r#"{"version": 1, "expr": {"type": "Pow", "args": [{"type": "Num", "value": 1}]}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::Arity {
                node: "Pow",
                found: 1,
                ..
            })
        ));
        let json = r#"{"version": 1, "expr": {"type": "Add", "args": []}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::Arity { node: "Add", .. })
        ));
    }

    #[test]
    fn rejects_unknown_node_type() {
        let json = r#"{"version": 1, "expr": {"type": "Mod", "args": []}}"#;
        assert!(matches!(
            Expression::from_json(json),
            Err(JsonError::Syntax(_))
        ));
    }
}
