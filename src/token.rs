use std::fmt;

use pest::error::InputLocation;
use pest::Parser;
use pest_derive::Parser;

use crate::error::LexError;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct TokenGrammar;

/// Names lexed as [`Token::FunctionName`] rather than identifiers.
pub const FUNCTION_NAMES: &[&str] = &[
    "sqrt", "sin", "cos", "tan", "sec", "csc", "cot", "ln", "log", "exp", "abs", "neg", "diff",
    "limit",
];

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            '^' => Some(Self::Pow),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Pow => '^',
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            Self::Pow => 4,
            Self::Mul | Self::Div => 3,
            Self::Add | Self::Sub => 2,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        self == Self::Pow
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Identifier(String),
    FunctionName(String),
    Operator(Operator),
    LeftParen,
    RightParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Identifier(name) | Self::FunctionName(name) => f.write_str(name),
            Self::Operator(op) => write!(f, "{}", op.symbol()),
            Self::LeftParen => f.write_str("("),
            Self::RightParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
        }
    }
}

/// A token and the character offset where it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub offset: usize,
}

/// Splits expression text into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Lexeme>, LexError> {
    let pairs = TokenGrammar::parse(Rule::tokens, input).map_err(|e| {
        let byte_pos = match e.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        unexpected_char_at(input, byte_pos)
    })?;

    let mut lexemes = Vec::new();
    for pair in pairs {
        let byte_pos = pair.as_span().start();
        let text = pair.as_str();
        let token = match pair.as_rule() {
            Rule::number => match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Token::Number(value),
                Ok(_) => {
                    return Err(LexError::NumberOutOfRange {
                        literal: text.to_string(),
                        offset: input[..byte_pos].chars().count(),
                    })
                }
                Err(_) => return Err(unexpected_char_at(input, byte_pos)),
            },
            Rule::word => {
                if FUNCTION_NAMES.contains(&text) {
                    Token::FunctionName(text.to_string())
                } else {
                    Token::Identifier(text.to_string())
                }
            }
            Rule::constant => Token::Identifier(constant_name(text).to_string()),
            Rule::operator => match text.chars().next().and_then(Operator::from_char) {
                Some(op) => Token::Operator(op),
                None => return Err(unexpected_char_at(input, byte_pos)),
            },
            Rule::lparen => Token::LeftParen,
            Rule::rparen | Rule::bar => Token::RightParen,
            Rule::comma => Token::Comma,
            _ => continue,
        };
        lexemes.push(Lexeme {
            token,
            offset: input[..byte_pos].chars().count(),
        });
    }
    Ok(lexemes)
}

fn constant_name(glyph: &str) -> &'static str {
    match glyph {
        "π" => "pi",
        _ => "e",
    }
}

fn unexpected_char_at(input: &str, byte_pos: usize) -> LexError {
    let byte_pos = byte_pos.min(input.len());
    match input[byte_pos..].chars().next() {
        Some(ch) => LexError::UnexpectedChar {
            ch,
            offset: input[..byte_pos].chars().count(),
        },
        None => {
            let count = input.chars().count();
            LexError::UnexpectedChar {
                ch: input.chars().last().unwrap_or(' '),
                offset: count.saturating_sub(1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|l| l.token)
            .collect()
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            tokens("12.5 + .5*3"),
            vec![
                Token::Number(12.5),
                Token::Operator(Operator::Add),
                Token::Number(0.5),
                Token::Operator(Operator::Mul),
                Token::Number(3.0),
            ]
        );
    }

    #[test]
    fn function_names_before_identifiers() {
        assert_eq!(
            tokens("sin(x)+foo"),
            vec![
                Token::FunctionName("sin".into()),
                Token::LeftParen,
                Token::Identifier("x".into()),
                Token::RightParen,
                Token::Operator(Operator::Add),
                Token::Identifier("foo".into()),
            ]
        );
    }

    #[test]
    fn constant_glyphs_and_bars() {
        assert_eq!(
            tokens("π,ℯ|"),
            vec![
                Token::Identifier("pi".into()),
                Token::Comma,
                Token::Identifier("e".into()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn offsets_count_characters() {
        let lexemes = tokenize("π + x").unwrap();
        let offsets: Vec<_> = lexemes.iter().map(|l| l.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[test]
    fn unknown_character_is_reported() {
        assert_eq!(
            tokenize("2 $ 3"),
            Err(LexError::UnexpectedChar { ch: '$', offset: 2 })
        );
        assert_eq!(
            tokenize("1+#"),
            Err(LexError::UnexpectedChar { ch: '#', offset: 2 })
        );
    }

    #[test]
    fn overflowing_literal_is_rejected() {
        let huge = format!("1{}", "0".repeat(400));
        assert_eq!(
            tokenize(&format!("x + {huge}")),
            Err(LexError::NumberOutOfRange {
                literal: huge,
                offset: 4
            })
        );
        assert!(tokenize(&format!("1{}", "0".repeat(300))).is_ok());
    }

    #[test]
    fn lone_decimal_point_is_rejected() {
        assert!(tokenize(".").is_err());
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
