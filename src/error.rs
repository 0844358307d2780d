//! Error taxonomy for every fatal stage of the pipeline.
//!
//! Reconstruction problems are not errors: the linearizer reports them as
//! plain warning strings next to its best-effort output.

/// Bounding box construction failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BoxError {
    #[error("invalid bounding box [{x1}, {y1}, {x2}, {y2}]: expected x2 >= x1 and y2 >= y1")]
    Inverted { x1: f64, y1: f64, x2: f64, y2: f64 },
}

/// The tokenizer met a character it cannot classify.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("number '{literal}' at {offset} is out of range")]
    NumberOutOfRange { literal: String, offset: usize },
}

/// Fatal parse failure. No partial tree is ever returned alongside one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("mismatched ')' at {offset}")]
    UnmatchedClose { offset: usize },

    #[error("mismatched '(' at {offset}")]
    UnmatchedOpen { offset: usize },

    #[error("operator '{operator}' at {offset} is missing an operand")]
    MissingOperand { operator: char, offset: usize },

    #[error("bad expression, {count} values remain after parsing")]
    LeftoverOperands { count: usize },

    #[error("empty expression")]
    Empty,

    #[error("empty parentheses at {offset}")]
    EmptyGroup { offset: usize },

    #[error("unexpected ',' at {offset}")]
    UnexpectedComma { offset: usize },

    #[error("function '{name}' at {offset} must be followed by '('")]
    MisplacedFunction { name: String, offset: usize },

    #[error("wrong argument count for {name}: expected {expected}, found {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("expression at {offset} nests deeper than {limit} levels")]
    TooDeep { offset: usize, limit: usize },
}

/// Fatal to a single evaluation call; the tree stays reusable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("wrong argument count for {name}: found {found}")]
    Arity { name: String, found: usize },

    #[error("limit variable must be a single lowercase letter")]
    LimitVariable,
}

/// Failure to decode the JSON tree envelope.
#[derive(thiserror::Error, Debug)]
pub enum JsonError {
    #[error("malformed expression JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(i64),

    #[error("missing version")]
    MissingVersion,

    #[error("version must be an integer, found {0}")]
    InvalidVersion(String),

    #[error("expression JSON nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("{node} needs {expected} args, found {found}")]
    Arity {
        node: &'static str,
        expected: &'static str,
        found: usize,
    },
}

/// Failure to load a detector output file.
#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("malformed detections JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("detection {index}: {source}")]
    BoundingBox {
        index: usize,
        #[source]
        source: BoxError,
    },
}

/// Failure to read a batch test table.
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("cannot read table: {0}")]
    Csv(#[from] csv::Error),

    #[error("bad row at line {line}: {message}")]
    Row { line: u64, message: String },
}
