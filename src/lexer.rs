//! # lexer.rs
//!
//! Tokenizer for expression source text.
//!
//! Splits an input string into a sequence of [`Token`]s: numeric literals,
//! quoted strings, booleans, annotated names, operators and punctuation.
//! Whitespace and `//` line comments are skipped. Built-in constants (`pi`,
//! `e`, `i`, `infinity`) are resolved to number tokens here, so the parser
//! only ever sees values, names and operators.
//!
//! Two context-sensitive rewrites happen during the scan, driven by whether
//! the previous token finished a value:
//! - implicit multiplication is inserted between a value and a following
//!   number, name or `(` (so `2x`, `(1+2)(3+4)` and `2(x+1)` parse), except
//!   that a name directly before `(` stays a function call;
//! - an ambiguous operator is coerced to its prefix form where a value is
//!   expected (`-x` becomes `-u x`) and to its postfix form directly after a
//!   value (`5!` becomes `5 fact`).

use num_complex::Complex;
use phf::Map;
use phf_macros::phf_map;

use crate::error::Error;

/// Map of built-in named constants, matched case-insensitively.
static CONSTANTS: Map<&'static str, Complex<f64>> = phf_map! {
    "pi" => Complex::new(std::f64::consts::PI, 0.0),
    "e" => Complex::new(std::f64::consts::E, 0.0),
    "i" => Complex::new(0.0, 1.0),
    "infinity" => Complex::new(f64::INFINITY, 0.0),
    "infty" => Complex::new(f64::INFINITY, 0.0),
};

/// Word operators; they must be followed by a non-identifier character, which
/// the maximal-munch identifier scan guarantees.
const WORD_OPERATORS: &[&str] = &["and", "or", "not", "xor", "isa", "in", "except"];

/// Two-character symbolic operators, tried before single characters.
const DOUBLE_OPERATORS: &[(&str, &str)] = &[
    ("<=", "<="),
    (">=", ">="),
    ("<>", "<>"),
    ("&&", "and"),
    ("||", "or"),
    ("..", ".."),
];

/// Single-character symbolic operators.
const SINGLE_OPERATORS: &[(char, &str)] = &[
    ('+', "+"),
    ('-', "-"),
    ('*', "*"),
    ('/', "/"),
    ('^', "^"),
    ('<', "<"),
    ('>', ">"),
    ('=', "="),
    ('|', "|"),
    ('#', "#"),
    ('!', "!"),
    (';', ";"),
];

/// A single token produced by [`tokenise`].
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal number or resolved constant.
    Number(Complex<f64>),

    /// Quoted string; `\{`/`\}` escapes are kept for the interpolation pass.
    Str(String),

    /// Boolean literal.
    Bool(bool),

    /// Identifier, with any `annotation:` prefixes split off.
    Name {
        name: String,
        annotations: Vec<String>,
    },

    /// Operator by canonical name (`"+"`, `"-u"`, `"fact"`, `"and"`, …).
    Op(&'static str),

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    /// Whether this token completes a value, which controls unary/binary
    /// disambiguation and implicit multiplication.
    fn is_value_end(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::Str(_)
                | Token::Bool(_)
                | Token::Name { .. }
                | Token::RParen
                | Token::RBracket
        )
    }
}

/// The prefix form of an operator, if it has one.
fn prefix_form(op: &str) -> Option<&'static str> {
    match op {
        "+" => Some("+u"),
        "-" => Some("-u"),
        "!" | "not" => Some("not"),
        _ => None,
    }
}

/// The postfix form of an operator, if it has one.
fn postfix_form(op: &str) -> Option<&'static str> {
    match op {
        "!" => Some("fact"),
        _ => None,
    }
}

/// Splits expression source into tokens.
///
/// # Arguments
///
/// * `source` - The expression text to tokenize.
///
/// # Returns
///
/// * `Ok(Vec<Token>)` on success.
/// * `Err(Error::InvalidExpression)` naming the offending input on an
///   unrecognized character, or `Err(Error::UnterminatedString)`.
pub fn tokenise(source: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        // line comment
        if ch == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && matches!(chars.get(i + 1), Some(c) if c.is_ascii_digit()))
        {
            let (token, next) = scan_number(&chars, i);
            push(&mut tokens, token);
            i = next;
            continue;
        }

        if ch == '"' {
            let (token, next) = scan_string(&chars, i)?;
            push(&mut tokens, token);
            i = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let (token, next) = scan_word(&chars, i);
            push_word(&mut tokens, token);
            i = next;
            continue;
        }

        // pattern wildcards are names made of question marks
        if ch == '?' {
            let mut j = i;
            while j < chars.len() && chars[j] == '?' {
                j += 1;
            }
            let name: String = chars[i..j].iter().collect();
            push(
                &mut tokens,
                Token::Name {
                    name,
                    annotations: vec![],
                },
            );
            i = j;
            continue;
        }

        match ch {
            '(' => {
                push(&mut tokens, Token::LParen);
                i += 1;
                continue;
            }
            ')' => {
                push(&mut tokens, Token::RParen);
                i += 1;
                continue;
            }
            '[' => {
                push(&mut tokens, Token::LBracket);
                i += 1;
                continue;
            }
            ']' => {
                push(&mut tokens, Token::RBracket);
                i += 1;
                continue;
            }
            ',' => {
                push(&mut tokens, Token::Comma);
                i += 1;
                continue;
            }
            _ => {}
        }

        if i + 1 < chars.len() {
            let pair: String = chars[i..i + 2].iter().collect();
            if let Some((_, name)) = DOUBLE_OPERATORS.iter().find(|(sym, _)| *sym == pair) {
                push_operator(&mut tokens, name);
                i += 2;
                continue;
            }
        }

        if let Some((_, name)) = SINGLE_OPERATORS.iter().find(|(sym, _)| *sym == ch) {
            push_operator(&mut tokens, name);
            i += 1;
            continue;
        }

        let rest: String = chars[i..].iter().take(8).collect();
        return Err(Error::InvalidExpression(rest));
    }

    Ok(tokens)
}

/// Pushes a value token, inserting an implicit `*` where the grammar allows
/// two values to sit side by side.
fn push(tokens: &mut Vec<Token>, token: Token) {
    let prev_multiplies = match tokens.last() {
        Some(Token::Number(_)) | Some(Token::RParen) | Some(Token::RBracket) => true,
        // a name followed by `(` is a function call, not multiplication
        Some(Token::Name { .. }) => !matches!(token, Token::LParen),
        _ => false,
    };
    let current_multiplies = matches!(
        token,
        Token::Number(_) | Token::Name { .. } | Token::LParen
    );
    if prev_multiplies && current_multiplies {
        tokens.push(Token::Op("*"));
    }
    tokens.push(token);
}

/// Pushes a scanned word, classifying it as operator, constant, boolean or
/// name.
fn push_word(tokens: &mut Vec<Token>, token: Token) {
    if let Token::Name { name, annotations } = &token {
        if annotations.is_empty() {
            let lower = name.to_lowercase();
            if let Some(op) = WORD_OPERATORS.iter().find(|w| **w == lower) {
                push_operator(tokens, op);
                return;
            }
            if let Some(value) = CONSTANTS.get(lower.as_str()) {
                push(tokens, Token::Number(*value));
                return;
            }
            match lower.as_str() {
                "true" => {
                    push(tokens, Token::Bool(true));
                    return;
                }
                "false" => {
                    push(tokens, Token::Bool(false));
                    return;
                }
                _ => {}
            }
        }
    }
    push(tokens, token);
}

/// Pushes an operator, coercing to prefix form where a value is expected and
/// to postfix form directly after a value.
fn push_operator(tokens: &mut Vec<Token>, op: &'static str) {
    let prev_is_value = tokens.last().map(Token::is_value_end).unwrap_or(false);
    let name = if !prev_is_value {
        prefix_form(op).unwrap_or(op)
    } else {
        postfix_form(op).unwrap_or(op)
    };
    tokens.push(Token::Op(name));
}

/// Scans a numeric literal: integer, decimal, or scientific notation.
fn scan_number(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' && matches!(chars.get(i + 1), Some(c) if c.is_ascii_digit())
    {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    // exponent part only consumed when a digit actually follows
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    let text: String = chars[start..i].iter().collect();
    let value = text.parse::<f64>().unwrap_or(f64::NAN);
    (Token::Number(Complex::from(value)), i)
}

/// Scans a quoted string, resolving `\"`, `\\` and `\n` escapes and keeping
/// `\{` / `\}` escaped for the interpolation pass.
fn scan_string(chars: &[char], start: usize) -> Result<(Token, usize), Error> {
    let mut i = start + 1;
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((Token::Str(text), i + 1)),
            '\\' => {
                match chars.get(i + 1) {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some(c @ ('{' | '}')) => {
                        text.push('\\');
                        text.push(*c);
                    }
                    Some(c) => {
                        text.push('\\');
                        text.push(*c);
                    }
                    None => return Err(Error::UnterminatedString),
                }
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(Error::UnterminatedString)
}

/// Scans an identifier with optional `annotation:annotation:name` prefixes.
fn scan_word(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    let mut parts: Vec<String> = Vec::new();
    loop {
        let word_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
        {
            i += 1;
        }
        parts.push(chars[word_start..i].iter().collect());
        // an annotation prefix only counts when another identifier follows
        if i < chars.len()
            && chars[i] == ':'
            && matches!(chars.get(i + 1), Some(c) if c.is_alphabetic() || *c == '_')
        {
            i += 1;
        } else {
            break;
        }
    }
    let name = parts.pop().unwrap_or_default();
    (
        Token::Name {
            name,
            annotations: parts,
        },
        i,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(source: &str) -> Vec<Token> {
        tokenise(source).unwrap()
    }

    fn name(n: &str) -> Token {
        Token::Name {
            name: n.into(),
            annotations: vec![],
        }
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert!(tokenise("").unwrap().is_empty());
        assert!(tokenise("  \t\n ").unwrap().is_empty());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(ops("42"), vec![Token::Number(Complex::from(42.0))]);
        assert_eq!(ops("3.14"), vec![Token::Number(Complex::from(3.14))]);
        assert_eq!(ops("2e3"), vec![Token::Number(Complex::from(2000.0))]);
        assert_eq!(ops("1.5e-2"), vec![Token::Number(Complex::from(0.015))]);
    }

    #[test]
    fn test_exponent_needs_digit() {
        // "2e" is the number 2 times the constant e, not a malformed literal
        let tokens = ops("2e");
        assert_eq!(
            tokens,
            vec![
                Token::Number(Complex::from(2.0)),
                Token::Op("*"),
                Token::Number(Complex::from(std::f64::consts::E)),
            ]
        );
    }

    #[test]
    fn test_constants_case_insensitive() {
        assert_eq!(ops("PI"), vec![Token::Number(Complex::from(std::f64::consts::PI))]);
        assert_eq!(ops("i"), vec![Token::Number(Complex::new(0.0, 1.0))]);
        assert_eq!(ops("Infinity"), vec![Token::Number(Complex::from(f64::INFINITY))]);
    }

    #[test]
    fn test_implicit_multiplication_number_name() {
        assert_eq!(
            ops("2x"),
            vec![Token::Number(Complex::from(2.0)), Token::Op("*"), name("x")]
        );
        // identical to the explicit form
        let explicit = ops("2*x");
        assert_eq!(ops("2x"), explicit);
    }

    #[test]
    fn test_implicit_multiplication_brackets() {
        let tokens = ops("(1+2)(3+4)");
        let star_count = tokens.iter().filter(|t| **t == Token::Op("*")).count();
        assert_eq!(star_count, 1);
        assert_eq!(
            &tokens[4..7],
            &[Token::RParen, Token::Op("*"), Token::LParen]
        );
    }

    #[test]
    fn test_name_before_paren_is_a_call() {
        let tokens = ops("sin(x)");
        assert_eq!(tokens, vec![name("sin"), Token::LParen, name("x"), Token::RParen]);
    }

    #[test]
    fn test_number_before_paren_multiplies() {
        let tokens = ops("2(x)");
        assert_eq!(
            tokens,
            vec![
                Token::Number(Complex::from(2.0)),
                Token::Op("*"),
                Token::LParen,
                name("x"),
                Token::RParen
            ]
        );
    }

    #[test]
    fn test_unary_coercion() {
        assert_eq!(ops("-x"), vec![Token::Op("-u"), name("x")]);
        assert_eq!(
            ops("3*-x"),
            vec![
                Token::Number(Complex::from(3.0)),
                Token::Op("*"),
                Token::Op("-u"),
                name("x")
            ]
        );
        assert_eq!(ops("(-x)")[1..2], [Token::Op("-u")]);
    }

    #[test]
    fn test_binary_minus_stays_binary() {
        assert_eq!(
            ops("x-1"),
            vec![name("x"), Token::Op("-"), Token::Number(Complex::from(1.0))]
        );
    }

    #[test]
    fn test_factorial_postfix() {
        assert_eq!(
            ops("5!"),
            vec![Token::Number(Complex::from(5.0)), Token::Op("fact")]
        );
        assert_eq!(ops("!true"), vec![Token::Op("not"), Token::Bool(true)]);
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            ops("true and false"),
            vec![Token::Bool(true), Token::Op("and"), Token::Bool(false)]
        );
        // a word operator embedded in a longer identifier is just a name
        assert_eq!(ops("android"), vec![name("android")]);
    }

    #[test]
    fn test_symbol_synonyms() {
        assert_eq!(ops("x&&y"), vec![name("x"), Token::Op("and"), name("y")]);
        assert_eq!(ops("x||y"), vec![name("x"), Token::Op("or"), name("y")]);
    }

    #[test]
    fn test_multi_char_operators() {
        assert_eq!(ops("x<=1")[1], Token::Op("<="));
        assert_eq!(ops("x<>1")[1], Token::Op("<>"));
        assert_eq!(ops("1..5")[1], Token::Op(".."));
    }

    #[test]
    fn test_annotated_names() {
        assert_eq!(
            ops("vector:v"),
            vec![Token::Name {
                name: "v".into(),
                annotations: vec!["vector".into()],
            }]
        );
        assert_eq!(
            ops("dot:bold:x"),
            vec![Token::Name {
                name: "x".into(),
                annotations: vec!["dot".into(), "bold".into()],
            }]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(ops(r#""hello""#), vec![Token::Str("hello".into())]);
        assert_eq!(ops(r#""a\"b""#), vec![Token::Str("a\"b".into())]);
        // escaped braces stay escaped for the interpolation pass
        assert_eq!(ops(r#""\{x\}""#), vec![Token::Str(r"\{x\}".into())]);
        assert_eq!(tokenise(r#""oops"#).unwrap_err(), Error::UnterminatedString);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            ops("1 + 2 // the rest is ignored"),
            vec![
                Token::Number(Complex::from(1.0)),
                Token::Op("+"),
                Token::Number(Complex::from(2.0))
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenise("1 + @twiddle").unwrap_err();
        match err {
            Error::InvalidExpression(text) => assert!(text.starts_with('@')),
            other => unreachable!("unexpected error {:?}", other),
        }
    }
}
