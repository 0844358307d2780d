use crate::error::ParseError;
use crate::expression::Expression;
use crate::token::{tokenize, Lexeme, Operator, Token};

/// Deepest tree the parser builds. Every walk over a tree recurses once per
/// level, so this bounds the stack those walks need.
pub const MAX_DEPTH: usize = 256;

/// Entries of the operator stack. Each remembers how many operands were on
/// the value stack when it was pushed, so that it can tell its own operands
/// apart from those of an enclosing expression.
#[derive(Clone, Copy, Debug)]
enum StackOp {
    Binary {
        op: Operator,
        offset: usize,
        base: usize,
    },
    /// Unary minus. Binds tighter than every binary operator.
    Negate {
        offset: usize,
        base: usize,
    },
    Open {
        offset: usize,
        base: usize,
        call: bool,
    },
}

/// A finished subtree and its height.
#[derive(Debug)]
struct Operand {
    expr: Expression,
    depth: usize,
}

impl Operand {
    fn leaf(expr: Expression) -> Self {
        Self { expr, depth: 1 }
    }

    /// Wraps `expr`, whose deepest child is `depth` levels tall.
    fn node(expr: Expression, depth: usize, offset: usize) -> Result<Self, ParseError> {
        let depth = depth + 1;
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep {
                offset,
                limit: MAX_DEPTH,
            });
        }
        Ok(Self { expr, depth })
    }
}

/// A function name whose argument list is open.
#[derive(Debug)]
struct CallFrame {
    name: String,
    offset: usize,
    base: usize,
}

impl Expression {
    /// Parse the expression from `input`.
    ///
    /// Variables are kept by name in the syntax tree and resolved against a
    /// [`Bindings`](crate::Bindings) each time the tree is evaluated.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let lexemes = tokenize(input)?;
        parse_tokens(&lexemes)
    }
}

/// Builds a tree from an already tokenized input with a two-stack
/// operator-precedence (shunting-yard) algorithm.
pub fn parse_tokens(lexemes: &[Lexeme]) -> Result<Expression, ParseError> {
    let mut ops: Vec<StackOp> = Vec::new();
    let mut calls: Vec<CallFrame> = Vec::new();
    let mut values: Vec<Operand> = Vec::new();
    let mut pending_function: Option<(String, usize)> = None;
    let mut prev: Option<&Token> = None;

    for lexeme in lexemes {
        log::trace!("token {} at {}", lexeme.token, lexeme.offset);
        let offset = lexeme.offset;
        let prev_was_value = matches!(
            prev,
            Some(Token::Number(_) | Token::Identifier(_) | Token::RightParen)
        );

        if let Some((name, name_offset)) = pending_function.take() {
            if lexeme.token != Token::LeftParen {
                return Err(ParseError::MisplacedFunction {
                    name,
                    offset: name_offset,
                });
            }
            ops.push(StackOp::Open {
                offset,
                base: values.len(),
                call: true,
            });
            calls.push(CallFrame {
                name,
                offset: name_offset,
                base: values.len(),
            });
            prev = Some(&lexeme.token);
            continue;
        }

        match &lexeme.token {
            Token::Number(value) => values.push(Operand::leaf(Expression::Number(*value))),
            Token::Identifier(name) => {
                values.push(Operand::leaf(Expression::Variable(name.clone())))
            }
            Token::FunctionName(name) => pending_function = Some((name.clone(), offset)),
            Token::LeftParen => ops.push(StackOp::Open {
                offset,
                base: values.len(),
                call: false,
            }),
            Token::Comma => {
                if !prev_was_value {
                    return Err(ParseError::UnexpectedComma { offset });
                }
                reduce_group(&mut ops, &mut values)?;
            }
            Token::RightParen => {
                if matches!(prev, Some(Token::Comma)) {
                    return Err(ParseError::UnexpectedComma {
                        offset: offset.saturating_sub(1),
                    });
                }
                reduce_group(&mut ops, &mut values)?;
                match ops.pop() {
                    Some(StackOp::Open {
                        call: true, ..
                    }) => {
                        let frame = calls.pop().ok_or(ParseError::UnmatchedClose { offset })?;
                        apply_call(frame, &mut values)?;
                    }
                    Some(StackOp::Open {
                        offset: open_offset,
                        base,
                        call: false,
                    }) => match values.len().saturating_sub(base) {
                        1 => {}
                        0 => return Err(ParseError::EmptyGroup { offset: open_offset }),
                        count => return Err(ParseError::LeftoverOperands { count }),
                    },
                    _ => return Err(ParseError::UnmatchedClose { offset }),
                }
            }
            Token::Operator(Operator::Sub) if !prev_was_value => {
                // Prefix operator: nothing to its left can be reduced yet.
                ops.push(StackOp::Negate {
                    offset,
                    base: values.len(),
                });
            }
            Token::Operator(op) => {
                if !prev_was_value {
                    return Err(ParseError::MissingOperand {
                        operator: op.symbol(),
                        offset,
                    });
                }
                while let Some(&top) = ops.last() {
                    match top {
                        StackOp::Open { .. } => break,
                        StackOp::Negate { .. } => {
                            ops.pop();
                            apply(top, &mut values)?;
                        }
                        StackOp::Binary { op: top_op, .. } => {
                            let p_top = top_op.precedence();
                            let p_cur = op.precedence();
                            if p_top > p_cur || (p_top == p_cur && !op.is_right_assoc()) {
                                ops.pop();
                                apply(top, &mut values)?;
                            } else {
                                break;
                            }
                        }
                    }
                }
                ops.push(StackOp::Binary {
                    op: *op,
                    offset,
                    base: values.len(),
                });
            }
        }
        prev = Some(&lexeme.token);
    }

    if let Some((name, offset)) = pending_function {
        return Err(ParseError::MisplacedFunction { name, offset });
    }

    while let Some(top) = ops.pop() {
        if let StackOp::Open { offset, .. } = top {
            return Err(ParseError::UnmatchedOpen { offset });
        }
        apply(top, &mut values)?;
    }

    match values.len() {
        0 => Err(ParseError::Empty),
        1 => values.pop().map(|operand| operand.expr).ok_or(ParseError::Empty),
        count => Err(ParseError::LeftoverOperands { count }),
    }
}

/// Applies pending operators down to (not including) the innermost `(`.
fn reduce_group(ops: &mut Vec<StackOp>, values: &mut Vec<Operand>) -> Result<(), ParseError> {
    while let Some(&top) = ops.last() {
        if matches!(top, StackOp::Open { .. }) {
            break;
        }
        ops.pop();
        apply(top, values)?;
    }
    Ok(())
}

fn apply(op: StackOp, values: &mut Vec<Operand>) -> Result<(), ParseError> {
    match op {
        StackOp::Negate { offset, base } => {
            if values.len() <= base {
                return Err(ParseError::MissingOperand {
                    operator: '-',
                    offset,
                });
            }
            let only = values.pop().ok_or(ParseError::MissingOperand {
                operator: '-',
                offset,
            })?;
            let depth = only.depth;
            values.push(Operand::node(
                Expression::call("neg", vec![only.expr]),
                depth,
                offset,
            )?);
        }
        StackOp::Binary { op, offset, base } => {
            let missing = ParseError::MissingOperand {
                operator: op.symbol(),
                offset,
            };
            if values.len() <= base {
                return Err(missing);
            }
            let rhs = values.pop().ok_or(missing.clone())?;
            let lhs = values.pop().ok_or(missing)?;
            values.push(combine(op, lhs, rhs, offset)?);
        }
        StackOp::Open { offset, .. } => return Err(ParseError::UnmatchedOpen { offset }),
    }
    Ok(())
}

fn combine(
    op: Operator,
    lhs: Operand,
    rhs: Operand,
    offset: usize,
) -> Result<Operand, ParseError> {
    // Extending an n-ary node adds a child without adding a level.
    let extended = match (op, &lhs.expr) {
        (Operator::Add, Expression::Sum(_)) | (Operator::Mul, Expression::Product(_)) => {
            Some(lhs.depth - 1)
        }
        _ => None,
    };
    let depth = extended.unwrap_or(lhs.depth).max(rhs.depth);
    let rhs = rhs.expr;
    let expr = match (op, lhs.expr) {
        (Operator::Add, Expression::Sum(mut children)) => {
            children.push(rhs);
            Expression::Sum(children)
        }
        (Operator::Add, lhs) => Expression::Sum(vec![lhs, rhs]),
        (Operator::Mul, Expression::Product(mut children)) => {
            children.push(rhs);
            Expression::Product(children)
        }
        (Operator::Mul, lhs) => Expression::Product(vec![lhs, rhs]),
        (Operator::Sub, lhs) => Expression::call("sub", vec![lhs, rhs]),
        (Operator::Div, lhs) => Expression::Quotient(Box::new(lhs), Box::new(rhs)),
        (Operator::Pow, lhs) => Expression::Power(Box::new(lhs), Box::new(rhs)),
    };
    Operand::node(expr, depth, offset)
}

fn apply_call(frame: CallFrame, values: &mut Vec<Operand>) -> Result<(), ParseError> {
    let found = values.len().saturating_sub(frame.base);
    let (expected, ok) = match frame.name.as_str() {
        "limit" => ("2 or 3", (2..=3).contains(&found)),
        _ => ("1", found == 1),
    };
    if !ok {
        log::debug!(
            "call to {} at {} has {found} arguments",
            frame.name,
            frame.offset
        );
        return Err(ParseError::Arity {
            name: frame.name,
            expected,
            found,
        });
    }
    let args = values.split_off(frame.base);
    let depth = args.iter().map(|arg| arg.depth).max().unwrap_or(0);
    let args = args.into_iter().map(|arg| arg.expr).collect();
    values.push(Operand::node(
        Expression::Call(frame.name, args),
        depth,
        frame.offset,
    )?);
    Ok(())
}
