//! # parser.rs
//!
//! Shunting-yard parser: converts a token sequence into an [`Expr`] tree.
//!
//! The operator table fixes precedence and associativity for the whole engine;
//! the display layer reuses it to decide where parentheses are required when
//! serializing a tree back to source text. Function calls are recognized from
//! `name(` sequences, square brackets build list literals or index into the
//! preceding value, and every structural failure maps to a distinct error:
//! mismatched round/square brackets, an operator starved of operands, or two
//! complete expressions with no operator between them.

use phf::Map;
use phf_macros::phf_map;

use crate::error::Error;
use crate::lexer::Token;
use crate::value::Value;

/// Precedence and fixity of an operator.
///
/// Lower `precedence` binds tighter. `right_assoc` operators do not pop
/// equal-precedence operators before pushing; `prefix` operators never pop at
/// all, since they arrive where a value is expected.
#[derive(Debug, Clone)]
pub struct OpInfo {
    pub precedence: u8,
    pub right_assoc: bool,
    pub prefix: bool,
    pub postfix: bool,
}

impl OpInfo {
    pub fn arity(&self) -> usize {
        if self.prefix || self.postfix {
            1
        } else {
            2
        }
    }
}

/// The operator table. `listval` is the indexing operator produced for
/// `value[index]` syntax; it never appears in source as a word.
pub static OPS: Map<&'static str, OpInfo> = phf_map! {
    "fact" => OpInfo { precedence: 1, right_assoc: false, prefix: false, postfix: true },
    "not" => OpInfo { precedence: 1, right_assoc: false, prefix: true, postfix: false },
    "^" => OpInfo { precedence: 2, right_assoc: true, prefix: false, postfix: false },
    "+u" => OpInfo { precedence: 3, right_assoc: true, prefix: true, postfix: false },
    "-u" => OpInfo { precedence: 3, right_assoc: true, prefix: true, postfix: false },
    "listval" => OpInfo { precedence: 3, right_assoc: false, prefix: false, postfix: false },
    "*" => OpInfo { precedence: 4, right_assoc: false, prefix: false, postfix: false },
    "/" => OpInfo { precedence: 4, right_assoc: false, prefix: false, postfix: false },
    "+" => OpInfo { precedence: 5, right_assoc: false, prefix: false, postfix: false },
    "-" => OpInfo { precedence: 5, right_assoc: false, prefix: false, postfix: false },
    "|" => OpInfo { precedence: 6, right_assoc: false, prefix: false, postfix: false },
    ".." => OpInfo { precedence: 7, right_assoc: false, prefix: false, postfix: false },
    "#" => OpInfo { precedence: 8, right_assoc: false, prefix: false, postfix: false },
    "except" => OpInfo { precedence: 9, right_assoc: false, prefix: false, postfix: false },
    "in" => OpInfo { precedence: 9, right_assoc: false, prefix: false, postfix: false },
    "<" => OpInfo { precedence: 10, right_assoc: false, prefix: false, postfix: false },
    ">" => OpInfo { precedence: 10, right_assoc: false, prefix: false, postfix: false },
    "<=" => OpInfo { precedence: 10, right_assoc: false, prefix: false, postfix: false },
    ">=" => OpInfo { precedence: 10, right_assoc: false, prefix: false, postfix: false },
    "=" => OpInfo { precedence: 11, right_assoc: false, prefix: false, postfix: false },
    "<>" => OpInfo { precedence: 11, right_assoc: false, prefix: false, postfix: false },
    "isa" => OpInfo { precedence: 12, right_assoc: false, prefix: false, postfix: false },
    "and" => OpInfo { precedence: 13, right_assoc: false, prefix: false, postfix: false },
    "or" => OpInfo { precedence: 14, right_assoc: false, prefix: false, postfix: false },
    "xor" => OpInfo { precedence: 15, right_assoc: false, prefix: false, postfix: false },
    // pattern capture binds tightest so `?;x+0` captures just the wildcard
    ";" => OpInfo { precedence: 0, right_assoc: false, prefix: false, postfix: false },
};

/// Table lookup for an operator known to exist.
///
/// Only called with names the lexer or parser produced from the table, so a
/// miss is a bug in the operator tables themselves.
pub fn op_info(name: &str) -> &'static OpInfo {
    OPS.get(name)
        .unwrap_or_else(|| unreachable!("operator {} missing from table", name))
}

/// An expression tree.
///
/// Immutable once built. Operator nodes carry the canonical operator name and
/// a child list whose length matches the operator's arity; call and list nodes
/// have per-node arity.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal or pre-evaluated value.
    Constant(Value),

    /// A free or bound name, with display annotations (`vector:v`).
    Name {
        name: String,
        annotations: Vec<String>,
    },

    /// Operator application.
    Op(&'static str, Vec<Expr>),

    /// Function call by name.
    Call { name: String, args: Vec<Expr> },

    /// List literal.
    List(Vec<Expr>),
}

impl Expr {
    pub fn number(x: f64) -> Self {
        Expr::Constant(Value::real(x))
    }

    pub fn name(n: &str) -> Self {
        Expr::Name {
            name: n.to_string(),
            annotations: vec![],
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }
}

/// What an open bracket on the stack is doing.
enum Bracket {
    /// A grouping `(`.
    Paren { start: usize },
    /// The `(` of a function call.
    CallParen {
        name: String,
        start: usize,
        commas: usize,
    },
    /// A `[` opening a list literal.
    ListOpen { start: usize, commas: usize },
    /// A `[` indexing the preceding value.
    IndexOpen { start: usize },
}

enum StackItem {
    Op(&'static str),
    Bracket(Bracket),
}

/// Converts a token sequence into an expression tree.
///
/// # Arguments
///
/// * `tokens` - Token sequence from [`crate::lexer::tokenise`].
///
/// # Returns
///
/// * `Ok(Expr)` with the single root of the parsed tree.
/// * `Err` with the specific syntax error: mismatched brackets, an operator
///   with too few operands, or juxtaposed expressions with no operator.
pub fn shunt(tokens: &[Token]) -> Result<Expr, Error> {
    let mut output: Vec<Expr> = Vec::new();
    let mut stack: Vec<StackItem> = Vec::new();
    let mut prev_is_value = false;

    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            Token::Number(z) => {
                output.push(Expr::Constant(Value::Number(*z)));
                prev_is_value = true;
            }
            Token::Str(s) => {
                output.push(Expr::Constant(Value::Str(s.clone())));
                prev_is_value = true;
            }
            Token::Bool(b) => {
                output.push(Expr::Constant(Value::Bool(*b)));
                prev_is_value = true;
            }
            Token::Name { name, annotations } => {
                if matches!(iter.peek(), Some(Token::LParen)) {
                    iter.next();
                    stack.push(StackItem::Bracket(Bracket::CallParen {
                        name: name.clone(),
                        start: output.len(),
                        commas: 0,
                    }));
                    prev_is_value = false;
                } else {
                    output.push(Expr::Name {
                        name: name.clone(),
                        annotations: annotations.clone(),
                    });
                    prev_is_value = true;
                }
            }
            Token::Op(name) => {
                let name: &'static str = *name;
                let info = OPS
                    .get(name)
                    .ok_or_else(|| Error::InvalidExpression(name.to_string()))?;
                if info.postfix {
                    // a postfix operator binds tightest, directly to the value
                    reduce_op(&mut output, name)?;
                } else {
                    if !info.prefix {
                        pop_tighter(&mut output, &mut stack, info)?;
                    }
                    stack.push(StackItem::Op(name));
                }
                prev_is_value = false;
            }
            Token::LParen => {
                stack.push(StackItem::Bracket(Bracket::Paren {
                    start: output.len(),
                }));
                prev_is_value = false;
            }
            Token::RParen => {
                let bracket = pop_to_bracket(&mut output, &mut stack, ')')?;
                match bracket {
                    Bracket::Paren { start } => {
                        if output.len() == start {
                            return Err(Error::EmptyExpression);
                        }
                        if output.len() > start + 1 {
                            return Err(Error::MissingOperator);
                        }
                    }
                    Bracket::CallParen {
                        name,
                        start,
                        commas,
                    } => {
                        let args = output.split_off(start);
                        if commas > 0 && args.len() != commas + 1 {
                            return Err(Error::NotEnoughArguments(name));
                        }
                        output.push(Expr::Call { name, args });
                    }
                    _ => return Err(Error::NoLeftBracket(')')),
                }
                prev_is_value = true;
            }
            Token::LBracket => {
                let bracket = if prev_is_value {
                    Bracket::IndexOpen {
                        start: output.len(),
                    }
                } else {
                    Bracket::ListOpen {
                        start: output.len(),
                        commas: 0,
                    }
                };
                stack.push(StackItem::Bracket(bracket));
                prev_is_value = false;
            }
            Token::RBracket => {
                let bracket = pop_to_bracket(&mut output, &mut stack, ']')?;
                match bracket {
                    Bracket::ListOpen { start, commas } => {
                        let items = output.split_off(start);
                        if commas > 0 && items.len() != commas + 1 {
                            return Err(Error::MissingOperator);
                        }
                        output.push(Expr::List(items));
                    }
                    Bracket::IndexOpen { start } => {
                        if output.len() != start + 1 {
                            return Err(Error::NotEnoughArguments("listval".into()));
                        }
                        let index = output.pop().unwrap();
                        let target = output
                            .pop()
                            .ok_or_else(|| Error::NotEnoughArguments("listval".into()))?;
                        output.push(Expr::Op("listval", vec![target, index]));
                    }
                    _ => return Err(Error::NoLeftBracket(']')),
                }
                prev_is_value = true;
            }
            Token::Comma => {
                pop_to_comma(&mut output, &mut stack)?;
                prev_is_value = false;
            }
        }
    }

    while let Some(item) = stack.pop() {
        match item {
            StackItem::Op(name) => reduce_op(&mut output, name)?,
            StackItem::Bracket(Bracket::Paren { .. })
            | StackItem::Bracket(Bracket::CallParen { .. }) => {
                return Err(Error::NoRightBracket('('))
            }
            StackItem::Bracket(_) => return Err(Error::NoRightBracket('[')),
        }
    }

    match output.len() {
        0 => Err(Error::EmptyExpression),
        1 => Ok(output.pop().unwrap()),
        _ => Err(Error::MissingOperator),
    }
}

/// Pops operators that bind at least as tightly as the incoming one.
fn pop_tighter(
    output: &mut Vec<Expr>,
    stack: &mut Vec<StackItem>,
    incoming: &OpInfo,
) -> Result<(), Error> {
    while let Some(StackItem::Op(top)) = stack.last() {
        let top_info = op_info(top);
        let pops = if incoming.right_assoc {
            top_info.precedence < incoming.precedence
        } else {
            top_info.precedence <= incoming.precedence
        };
        if !pops {
            break;
        }
        let name = *top;
        stack.pop();
        reduce_op(output, name)?;
    }
    Ok(())
}

/// Pops operators down to the nearest open bracket and returns it.
fn pop_to_bracket(
    output: &mut Vec<Expr>,
    stack: &mut Vec<StackItem>,
    closing: char,
) -> Result<Bracket, Error> {
    while let Some(item) = stack.pop() {
        match item {
            StackItem::Op(name) => reduce_op(output, name)?,
            StackItem::Bracket(b) => return Ok(b),
        }
    }
    Err(Error::NoLeftBracket(closing))
}

/// Pops operators down to the nearest open bracket, counting the comma on it.
fn pop_to_comma(output: &mut Vec<Expr>, stack: &mut Vec<StackItem>) -> Result<(), Error> {
    let mut i = stack.len();
    while i > 0 {
        i -= 1;
        match &stack[i] {
            StackItem::Op(_) => continue,
            StackItem::Bracket(_) => {
                // reduce everything above the bracket
                while stack.len() > i + 1 {
                    if let Some(StackItem::Op(name)) = stack.pop() {
                        reduce_op(output, name)?;
                    }
                }
                match stack.last_mut() {
                    Some(StackItem::Bracket(Bracket::CallParen { commas, .. }))
                    | Some(StackItem::Bracket(Bracket::ListOpen { commas, .. })) => {
                        *commas += 1;
                        return Ok(());
                    }
                    _ => return Err(Error::NoLeftBracket('(')),
                }
            }
        }
    }
    Err(Error::NoLeftBracket('('))
}

/// Pops an operator's operands from the output and pushes the built node.
fn reduce_op(output: &mut Vec<Expr>, name: &'static str) -> Result<(), Error> {
    let arity = op_info(name).arity();
    if output.len() < arity {
        return Err(Error::NotEnoughArguments(name.to_string()));
    }
    let args = output.split_off(output.len() - arity);
    output.push(Expr::Op(name, args));
    Ok(())
}
