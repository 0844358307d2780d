//! Math expressions from detected glyphs.
//!
//! A symbol detector reports glyphs as labelled bounding boxes in no
//! particular order. This crate turns those boxes into one line of expression
//! text, parses that text into an [`Expression`] tree, and evaluates the tree
//! against variable [`Bindings`]. Trees are also exchanged as versioned JSON.
//!
//! ```text
//! SymbolSet ── linearize ──▶ text ── parse ──▶ Expression ── evaluate ──▶ f64
//!                                                  ▲   │
//!                                     from_json ───┘   └─── to_json
//! ```
//!
//! Reconstruction never fails: dubious geometry produces warnings next to a
//! best-effort string. Parsing and evaluation fail with typed errors.
//!
//! # Example
//!
//! ```rust
//! use symbol_expr::*;
//!
//! let glyph = |token: &str, x: f64| {
//!     let bbox = BoundingBox::new(x, 0.0, x + 20.0, 40.0).unwrap();
//!     DetectedSymbol::new(token, token, 0.9, bbox)
//! };
//! let symbols = SymbolSet::new(200, 40, vec![glyph("2", 0.0), glyph("x", 25.0), glyph("+", 50.0), glyph("1", 75.0)]);
//!
//! let Linearization { expr, warnings } = linearize(&symbols);
//! assert_eq!(expr, "2*x+1");
//! assert!(warnings.is_empty());
//!
//! let tree = Expression::parse(&expr).unwrap();
//! assert_eq!(tree.evaluate(&Bindings::new().with('x', 3.0)).unwrap(), 7.0);
//! assert_eq!(Expression::from_json(&tree.to_json()).unwrap(), tree);
//! ```

pub mod batch;
mod detections;
mod error;
mod evaluate;
mod expression;
mod geometry;
mod json;
mod labels;
mod linearize;
mod parse;
mod token;

/// Uses the [`pest`] parsing expression grammar language for tokenizing.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use detections::load_detections;
pub use error::*;
pub use evaluate::*;
pub use expression::*;
pub use geometry::*;
pub use json::JSON_VERSION;
pub use labels::LabelMap;
pub use linearize::*;
pub use parse::{parse_tokens, MAX_DEPTH};
pub use token::{tokenize, Lexeme, Operator, Token, FUNCTION_NAMES};
