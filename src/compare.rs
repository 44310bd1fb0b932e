//! # compare.rs
//!
//! The answer comparator: decides whether a candidate expression is
//! mathematically the same as a reference expression.
//!
//! Both expressions are compiled, their free-variable sets checked against
//! each other, and the trees evaluated at randomly sampled assignments of the
//! free variables; results must agree under the configured checking function
//! at the configured accuracy. Student input is untrusted, so nothing in here
//! throws: any compilation or evaluation failure simply makes the comparison
//! false.

use rand::Rng;
use std::collections::BTreeSet;

use crate::error::Error;
use crate::eval;
use crate::lexer;
use crate::linalg::Matrix;
use crate::num;
use crate::parser::{self, Expr};
use crate::scope::Scope;
use crate::value::Value;

/// How two numeric results are compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckingFn {
    /// `|a-b| <= accuracy`.
    AbsDiff,
    /// `|a-b| <= accuracy * |b|`, absolute when `b` is zero.
    RelDiff,
    /// Round both to `accuracy` decimal places, require exact equality.
    Dp,
    /// Round both to `accuracy` significant figures, require exact equality.
    SigFig,
}

/// Comparator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareSettings {
    pub checking: CheckingFn,
    /// Tolerance, or digit count for the rounding checkers.
    pub accuracy: f64,
    /// Sampling interval for free variables.
    pub vset_range: (f64, f64),
    /// Number of sampled assignments.
    pub vset_points: usize,
    /// Comparison fails once this many sample points disagree.
    pub failure_rate: usize,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            checking: CheckingFn::RelDiff,
            accuracy: 1e-5,
            vset_range: (0.0, 1.0),
            vset_points: 5,
            failure_rate: 1,
        }
    }
}

/// Decides whether two expressions agree as functions of their free
/// variables.
///
/// Never returns an error: anything that fails to compile or evaluate makes
/// the answer "not equal".
pub fn compare(expr_a: &str, expr_b: &str, settings: &CompareSettings, scope: &Scope) -> bool {
    let (tree_a, tree_b) = match (compile(expr_a), compile(expr_b)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return false,
    };

    let unbound_a = unbound_vars(&tree_a, scope);
    let unbound_b = unbound_vars(&tree_b, scope);

    // internal $-names are ignored when the variable sets are compared, but
    // still get sampled values below
    let named_a: BTreeSet<&String> = unbound_a.iter().filter(|n| !n.starts_with('$')).collect();
    let named_b: BTreeSet<&String> = unbound_b.iter().filter(|n| !n.starts_with('$')).collect();
    if named_a != named_b {
        return false;
    }

    let names: BTreeSet<&String> = unbound_a.union(&unbound_b).collect();
    if names.is_empty() {
        return match (eval::evaluate(&tree_a, scope), eval::evaluate(&tree_b, scope)) {
            (Ok(a), Ok(b)) => values_agree(&a, &b, settings),
            _ => false,
        };
    }
    let mut rng = rand::rng();
    let (lo, hi) = if settings.vset_range.0 <= settings.vset_range.1 {
        settings.vset_range
    } else {
        (settings.vset_range.1, settings.vset_range.0)
    };

    let mut failures = 0;
    for _ in 0..settings.vset_points {
        let mut sample = scope.clone();
        for name in &names {
            sample.set_var(name, Value::real(rng.random_range(lo..=hi)));
        }
        let agree = match (
            eval::evaluate(&tree_a, &sample),
            eval::evaluate(&tree_b, &sample),
        ) {
            (Ok(a), Ok(b)) => values_agree(&a, &b, settings),
            _ => false,
        };
        if !agree {
            failures += 1;
        }
    }
    failures < settings.failure_rate
}

fn compile(source: &str) -> Result<Expr, Error> {
    parser::shunt(&lexer::tokenise(source)?)
}

/// Free variables of a tree, minus names bound in the scope.
fn unbound_vars(tree: &Expr, scope: &Scope) -> BTreeSet<String> {
    eval::find_vars(tree)
        .into_iter()
        .filter(|name| scope.get_var(name).is_none())
        .collect()
}

/// Structural comparison: numbers through the checking function, compound
/// values element-wise, dimension mismatches failing outright.
fn values_agree(a: &Value, b: &Value, settings: &CompareSettings) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_agree(*x, *y, settings),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(ea, eb)| values_agree(ea, eb, settings))
        }
        (Value::Vector(x), Value::Vector(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(ea, eb)| reals_agree(*ea, *eb, settings))
        }
        (Value::Matrix(x), Value::Matrix(y)) => matrices_agree(x, y, settings),
        _ => false,
    }
}

fn matrices_agree(a: &Matrix, b: &Matrix, settings: &CompareSettings) -> bool {
    if a.rows() != b.rows() || a.columns() != b.columns() {
        return false;
    }
    a.data()
        .iter()
        .zip(b.data())
        .all(|(ra, rb)| ra.iter().zip(rb).all(|(x, y)| reals_agree(*x, *y, settings)))
}

fn reals_agree(a: f64, b: f64, settings: &CompareSettings) -> bool {
    numbers_agree(
        num_complex::Complex::from(a),
        num_complex::Complex::from(b),
        settings,
    )
}

/// Numeric agreement under the checking function.
///
/// Infinite results are special: they only agree with the very same
/// infinity, never "within tolerance" of anything.
fn numbers_agree(
    a: num_complex::Complex<f64>,
    b: num_complex::Complex<f64>,
    settings: &CompareSettings,
) -> bool {
    if a.re.is_nan() || a.im.is_nan() || b.re.is_nan() || b.im.is_nan() {
        return false;
    }
    if a.re.is_infinite() || a.im.is_infinite() || b.re.is_infinite() || b.im.is_infinite() {
        return a.re == b.re && a.im == b.im;
    }
    match settings.checking {
        CheckingFn::AbsDiff => (a - b).norm() <= settings.accuracy,
        CheckingFn::RelDiff => {
            if b == num_complex::Complex::ZERO {
                (a - b).norm() <= settings.accuracy
            } else {
                (a - b).norm() <= settings.accuracy * b.norm()
            }
        }
        CheckingFn::Dp => {
            let digits = settings.accuracy as i32;
            num::eq(num::precround(a, digits), num::precround(b, digits))
        }
        CheckingFn::SigFig => {
            let figures = settings.accuracy as i32;
            num::eq(num::siground(a, figures), num::siground(b, figures))
        }
    }
}
