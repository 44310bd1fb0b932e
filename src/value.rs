//! # value.rs
//!
//! The runtime value model: a tagged union over every type an expression can
//! evaluate to, plus the closed set of type tags used for signature dispatch.
//!
//! Values are immutable once constructed. Equality follows the marking
//! semantics: a real number and a complex number with zero imaginary part are
//! equal, compound values compare element-wise, and sets compare as unordered
//! collections.

use num_complex::Complex;

use crate::error::Error;
use crate::linalg::Matrix;
use crate::num;

/// A half-open arithmetic range `start..end` with a step.
///
/// A nonzero step makes the range discrete: its members are
/// `start, start+step, …` up to and including `end`. A zero step denotes the
/// continuous interval, which has no member list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Range {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    /// The discrete members of the range, or `None` for a continuous range.
    pub fn values(&self) -> Option<Vec<f64>> {
        if self.step == 0.0 {
            return None;
        }
        let mut out = Vec::new();
        let mut x = self.start;
        let ascending = self.step > 0.0;
        // A half-step tolerance keeps float drift from dropping the endpoint.
        let limit = self.end + self.step * 0.5;
        while (ascending && x < limit) || (!ascending && x > limit) {
            out.push(x);
            x += self.step;
        }
        Some(out)
    }

    /// Whether `x` belongs to the range: a member when discrete, inside the
    /// interval when continuous.
    pub fn contains(&self, x: f64) -> bool {
        match self.values() {
            Some(values) => values.iter().any(|&v| (v - x).abs() < 1e-12),
            None => {
                let (lo, hi) = if self.start <= self.end {
                    (self.start, self.end)
                } else {
                    (self.end, self.start)
                };
                lo <= x && x <= hi
            }
        }
    }
}

/// The closed set of runtime type tags, used by dispatch signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Str,
    Bool,
    Range,
    List,
    Vector,
    Matrix,
    Set,
}

impl ValueKind {
    /// The name used in error messages and by the `isa` operator.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Str => "string",
            Self::Bool => "boolean",
            Self::Range => "range",
            Self::List => "list",
            Self::Vector => "vector",
            Self::Matrix => "matrix",
            Self::Set => "set",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(Self::Number),
            "string" => Some(Self::Str),
            "boolean" => Some(Self::Bool),
            "range" => Some(Self::Range),
            "list" => Some(Self::List),
            "vector" => Some(Self::Vector),
            "matrix" => Some(Self::Matrix),
            "set" => Some(Self::Set),
            _ => None,
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Complex<f64>),
    Str(String),
    Bool(bool),
    Range(Range),
    List(Vec<Value>),
    Vector(Vec<f64>),
    Matrix(Matrix),
    Set(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Str(_) => ValueKind::Str,
            Self::Bool(_) => ValueKind::Bool,
            Self::Range(_) => ValueKind::Range,
            Self::List(_) => ValueKind::List,
            Self::Vector(_) => ValueKind::Vector,
            Self::Matrix(_) => ValueKind::Matrix,
            Self::Set(_) => ValueKind::Set,
        }
    }

    /// Wraps a real in the numeric union.
    pub fn real(x: f64) -> Self {
        Self::Number(Complex::from(x))
    }

    /// Builds a set, keeping only the first occurrence of each member.
    pub fn set_from(items: Vec<Value>) -> Self {
        let mut members: Vec<Value> = Vec::new();
        for item in items {
            if !members.iter().any(|m| m.strict_eq(&item)) {
                members.push(item);
            }
        }
        Self::Set(members)
    }

    pub fn as_number(&self) -> Result<Complex<f64>, Error> {
        match self {
            Self::Number(z) => Ok(*z),
            other => Err(Error::WrongType {
                expected: "number",
                found: other.kind().name(),
            }),
        }
    }

    pub fn as_real(&self) -> Result<f64, Error> {
        let z = self.as_number()?;
        if num::is_real(z) {
            Ok(z.re)
        } else {
            Err(Error::WrongType {
                expected: "real number",
                found: "complex number",
            })
        }
    }

    pub fn as_int(&self, context: &str) -> Result<i64, Error> {
        num::as_integer(self.as_number()?, context)
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(Error::WrongType {
                expected: "boolean",
                found: other.kind().name(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(Error::WrongType {
                expected: "string",
                found: other.kind().name(),
            }),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Error> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(Error::WrongType {
                expected: "list",
                found: other.kind().name(),
            }),
        }
    }

    /// A vector, accepting genuine vectors and 1xN / Nx1 matrices.
    pub fn as_vector(&self) -> Result<Vec<f64>, Error> {
        match self {
            Self::Vector(v) => Ok(v.clone()),
            Self::Matrix(m) => m.as_vector().ok_or(Error::WrongType {
                expected: "vector",
                found: "matrix",
            }),
            other => Err(Error::WrongType {
                expected: "vector",
                found: other.kind().name(),
            }),
        }
    }

    /// The marking equality relation.
    ///
    /// Numbers compare component-wise (a real has implicit zero imaginary
    /// part), lists/vectors/matrices element-wise with matching dimensions,
    /// sets as unordered collections.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => num::eq(*a, *b),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Self::Vector(a), Self::Vector(b)) => a == b,
            (Self::Matrix(a), Self::Matrix(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len()
                    && a.iter().all(|x| b.iter().any(|y| x.strict_eq(y)))
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(z) => write!(f, "{}", num::nice_complex(*z)),
            Self::Str(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Range(r) => {
                if r.step == 1.0 {
                    write!(f, "{}..{}", num::nice_real(r.start), num::nice_real(r.end))
                } else {
                    write!(
                        f,
                        "{}..{}#{}",
                        num::nice_real(r.start),
                        num::nice_real(r.end),
                        num::nice_real(r.step)
                    )
                }
            }
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[ {} ]", parts.join(", "))
            }
            Self::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| num::nice_real(*x)).collect();
                write!(f, "vector({})", parts.join(", "))
            }
            Self::Matrix(m) => {
                let rows: Vec<String> = m
                    .data()
                    .iter()
                    .map(|r| {
                        let parts: Vec<String> = r.iter().map(|x| num::nice_real(*x)).collect();
                        format!("[{}]", parts.join(", "))
                    })
                    .collect();
                write!(f, "matrix({})", rows.join(", "))
            }
            Self::Set(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "set({})", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_discrete_values() {
        let r = Range::new(1.0, 5.0, 1.0);
        assert_eq!(r.values(), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_range_continuous_has_no_values() {
        let r = Range::new(1.0, 5.0, 0.0);
        assert_eq!(r.values(), None);
        assert!(r.contains(2.5));
        assert!(!r.contains(5.5));
    }

    #[test]
    fn test_range_fractional_step_keeps_endpoint() {
        let r = Range::new(0.0, 1.0, 0.25);
        assert_eq!(r.values().unwrap().len(), 5);
    }

    #[test]
    fn test_real_complex_equality() {
        let real = Value::real(2.0);
        let complex = Value::Number(Complex::new(2.0, 0.0));
        assert!(real.strict_eq(&complex));
        assert!(!real.strict_eq(&Value::Number(Complex::new(2.0, 1.0))));
    }

    #[test]
    fn test_set_from_dedups() {
        let set = Value::set_from(vec![Value::real(1.0), Value::real(2.0), Value::real(1.0)]);
        match &set {
            Value::Set(members) => assert_eq!(members.len(), 2),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::set_from(vec![Value::real(1.0), Value::real(2.0)]);
        let b = Value::set_from(vec![Value::real(2.0), Value::real(1.0)]);
        assert!(a.strict_eq(&b));
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            ValueKind::Number,
            ValueKind::Str,
            ValueKind::Bool,
            ValueKind::Range,
            ValueKind::List,
            ValueKind::Vector,
            ValueKind::Matrix,
            ValueKind::Set,
        ] {
            assert_eq!(ValueKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::real(3.0).to_string(), "3");
        assert_eq!(Value::Number(Complex::new(1.0, 1.0)).to_string(), "1 + i");
        assert_eq!(
            Value::List(vec![Value::real(1.0), Value::Bool(true)]).to_string(),
            "[ 1, true ]"
        );
        assert_eq!(Value::Range(Range::new(1.0, 5.0, 1.0)).to_string(), "1..5");
    }

    #[test]
    fn test_as_vector_accepts_thin_matrices() {
        let m = Value::Matrix(Matrix::row_vector(vec![1.0, 2.0]));
        assert_eq!(m.as_vector().unwrap(), vec![1.0, 2.0]);
        let square = Value::Matrix(Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));
        assert!(square.as_vector().is_err());
    }
}
