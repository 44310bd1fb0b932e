//! # error.rs
//!
//! Error types for expression compilation, evaluation and marking.
//!
//! Every failure the engine can report carries a machine-readable kind plus the
//! formatted arguments a caller needs to surface the message next to the
//! offending input. Lexical, syntax, binding and dispatch errors are fatal to
//! the `compile`/`evaluate` call that raised them; the answer comparator and
//! rule side-conditions catch them internally and treat them as "not equal" /
//! "did not match".

use thiserror::Error;

/// Errors raised while tokenizing, parsing, evaluating or marking expressions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A character sequence the tokenizer cannot make sense of.
    #[error("invalid expression: unrecognized input starting at \"{0}\"")]
    InvalidExpression(String),

    /// A string literal without a closing quote.
    #[error("invalid expression: unterminated string literal")]
    UnterminatedString,

    /// A closing bracket with no matching opener.
    #[error("no left bracket to match right {}", bracket_name(.0))]
    NoLeftBracket(char),

    /// An opening bracket left unclosed at the end of the expression.
    #[error("no right bracket to match left {}", bracket_name(.0))]
    NoRightBracket(char),

    /// An operator or function without enough operands at reduction time.
    #[error("not enough arguments for \"{0}\"")]
    NotEnoughArguments(String),

    /// Two complete sub-expressions juxtaposed without a connecting operator.
    #[error("missing operator between two expressions")]
    MissingOperator,

    /// Nothing to parse.
    #[error("empty expression")]
    EmptyExpression,

    /// A name with no binding in the evaluation scope.
    #[error("undefined variable \"{0}\"")]
    UndefinedVariable(String),

    /// A variable definition that transitively depends on itself.
    #[error("circular reference in variable definitions: {0}")]
    CircularReference(String),

    /// A variable definition with no content.
    #[error("empty definition for variable \"{0}\"")]
    EmptyDefinition(String),

    /// A call to a name with no registered function at all.
    #[error("unknown function \"{name}\"{}", suggestion_text(.suggestion))]
    NoSuchFunction {
        name: String,
        /// Set when dropping the first character yields a known function,
        /// suggesting a missing multiplication sign.
        suggestion: Option<String>,
    },

    /// The name is a function, but no signature accepts these argument types.
    #[error("the operation \"{name}\" is not defined for arguments of type {kinds}")]
    NoMatchingSignature { name: String, kinds: String },

    /// Ordering comparisons are defined on real numbers only.
    #[error("cannot order complex numbers")]
    OrderComplex,

    /// Cross products require both operands to have exactly three components.
    #[error("vector is not 3-dimensional, so the cross product is undefined")]
    NotThreeDimensional,

    /// Matrix multiplication with disagreeing inner dimensions.
    #[error("matrices have different sizes: {left_columns} columns against {right_rows} rows")]
    MatrixSize {
        left_columns: usize,
        right_rows: usize,
    },

    /// Determinants are only implemented up to 3x3.
    #[error("determinant of a {0}x{0} matrix is not supported")]
    DeterminantSize(usize),

    /// Indexing outside the bounds of a list, vector, matrix or range.
    #[error("index {index} out of range for a collection of size {size}")]
    IndexOutOfRange { index: i64, size: usize },

    /// A `switch` with every condition false and no default value.
    #[error("no default case for switch statement")]
    NoDefaultCase,

    /// `satisfy` exhausted its iteration budget without an accepting draw.
    #[error("took too many runs ({0}) to satisfy the conditions")]
    TooManyRuns(usize),

    /// Selecting from an empty list or range.
    #[error("can't choose from a selection of size zero")]
    EmptySelection,

    /// A builtin needed an integer and got something else.
    #[error("\"{context}\" expects an integer, got {found}")]
    NotAnInteger { context: String, found: String },

    /// A value of one type where another was required mid-operation.
    #[error("expected a value of type {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

fn bracket_name(c: &char) -> &'static str {
    match c {
        '(' | ')' => "parenthesis",
        _ => "square bracket",
    }
}

fn suggestion_text(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("; did you mean \"{}\"?", s),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_messages_distinguish_kinds() {
        let round = Error::NoLeftBracket(')');
        let square = Error::NoRightBracket('[');
        assert!(round.to_string().contains("parenthesis"));
        assert!(square.to_string().contains("square bracket"));
    }

    #[test]
    fn test_suggestion_formatting() {
        let err = Error::NoSuchFunction {
            name: "xtan".into(),
            suggestion: Some("x*tan".into()),
        };
        assert!(err.to_string().contains("did you mean \"x*tan\"?"));

        let err = Error::NoSuchFunction {
            name: "frobnicate".into(),
            suggestion: None,
        };
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_cycle_message_names_path() {
        let err = Error::CircularReference("a -> b -> a".into());
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
