//! # builtins.rs
//!
//! The standard library: every operator and function registered into the
//! builtin [`Scope`].
//!
//! The scope is built once by [`make_builtins`] behind a `LazyLock` and never
//! mutated afterwards; evaluation layers child scopes on top of it. Overloads
//! are registered in the order dispatch should try them, so the more specific
//! signature of a name always comes first.
//!
//! The lazy constructs (`if`, `switch`, `repeat`, `map`, `satisfy`, `isa`)
//! are not in this table: the evaluator intercepts them before argument
//! evaluation.

use num_complex::Complex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::LazyLock;

use crate::error::Error;
use crate::linalg::{self, Matrix};
use crate::num;
use crate::rules;
use crate::scope::{FnDef, Param, Scope};
use crate::value::{Range, Value, ValueKind};

const NUM: Param = Param::Of(ValueKind::Number);
const STR: Param = Param::Of(ValueKind::Str);
const BOOL: Param = Param::Of(ValueKind::Bool);
const RANGE: Param = Param::Of(ValueKind::Range);
const LIST: Param = Param::Of(ValueKind::List);
const VEC: Param = Param::Of(ValueKind::Vector);
const MAT: Param = Param::Of(ValueKind::Matrix);
const SET: Param = Param::Of(ValueKind::Set);
const ANY: Param = Param::Any;

/// The process-wide builtin scope.
pub fn builtin_scope() -> &'static Scope {
    static SCOPE: LazyLock<Scope> = LazyLock::new(make_builtins);
    &SCOPE
}

macro_rules! register {
    ($scope:ident, $name:expr, [$($param:expr),*], |$args:ident, $sc:ident| $body:expr) => {
        $scope.register(FnDef::new($name, vec![$($param),*],
            |$args: &[Value], $sc: &Scope| $body));
    };
    ($scope:ident, $name:expr, [$($param:expr),*], |$args:ident| $body:expr) => {
        $scope.register(FnDef::new($name, vec![$($param),*],
            |$args: &[Value], _: &Scope| $body));
    };
}

/// Registers every unary function that is a plain `Complex<f64>` method.
macro_rules! register_complex_methods {
    ($scope:ident, $($name:literal => $method:ident),* $(,)?) => {
        $(
            register!($scope, $name, [NUM], |args|
                Ok(Value::Number(args[0].as_number()?.$method())));
        )*
    };
}

/// Builds the builtin scope. Called exactly once at first use.
pub fn make_builtins() -> Scope {
    let mut scope = Scope::new();
    register_arithmetic(&mut scope);
    register_comparisons(&mut scope);
    register_logic(&mut scope);
    register_ranges(&mut scope);
    register_indexing(&mut scope);
    register_scalar_functions(&mut scope);
    register_randomness(&mut scope);
    register_collections(&mut scope);
    register_linear_algebra(&mut scope);
    register_strings(&mut scope);
    rules::register_builtin_rulesets(&mut scope);
    scope
}

fn register_arithmetic(scope: &mut Scope) {
    register!(scope, "+", [NUM, NUM], |args| Ok(Value::Number(
        args[0].as_number()? + args[1].as_number()?
    )));
    register!(scope, "+", [VEC, VEC], |args| Ok(Value::Vector(
        linalg::vector_add(&args[0].as_vector()?, &args[1].as_vector()?)
    )));
    register!(scope, "+", [MAT, MAT], |args| {
        let (a, b) = (matrix_arg(&args[0])?, matrix_arg(&args[1])?);
        Ok(Value::Matrix(linalg::matrix_add(a, b)))
    });
    register!(scope, "+", [LIST, LIST], |args| {
        let mut items = args[0].as_list()?.to_vec();
        items.extend(args[1].as_list()?.iter().cloned());
        Ok(Value::List(items))
    });
    register!(scope, "+", [LIST, ANY], |args| {
        let mut items = args[0].as_list()?.to_vec();
        items.push(args[1].clone());
        Ok(Value::List(items))
    });
    register!(scope, "+", [STR, ANY], |args| Ok(Value::Str(format!(
        "{}{}",
        args[0], args[1]
    ))));
    register!(scope, "+", [ANY, STR], |args| Ok(Value::Str(format!(
        "{}{}",
        args[0], args[1]
    ))));

    register!(scope, "-", [NUM, NUM], |args| Ok(Value::Number(
        args[0].as_number()? - args[1].as_number()?
    )));
    register!(scope, "-", [VEC, VEC], |args| Ok(Value::Vector(
        linalg::vector_sub(&args[0].as_vector()?, &args[1].as_vector()?)
    )));
    register!(scope, "-", [MAT, MAT], |args| {
        let (a, b) = (matrix_arg(&args[0])?, matrix_arg(&args[1])?);
        Ok(Value::Matrix(linalg::matrix_sub(a, b)))
    });

    register!(scope, "-u", [NUM], |args| Ok(Value::Number(
        -args[0].as_number()?
    )));
    register!(scope, "-u", [VEC], |args| Ok(Value::Vector(
        linalg::vector_scale(&args[0].as_vector()?, -1.0)
    )));
    register!(scope, "-u", [MAT], |args| Ok(Value::Matrix(
        linalg::matrix_scale(matrix_arg(&args[0])?, -1.0)
    )));
    register!(scope, "+u", [ANY], |args| Ok(args[0].clone()));

    register!(scope, "*", [NUM, NUM], |args| Ok(Value::Number(
        args[0].as_number()? * args[1].as_number()?
    )));
    register!(scope, "*", [NUM, VEC], |args| Ok(Value::Vector(
        linalg::vector_scale(&args[1].as_vector()?, args[0].as_real()?)
    )));
    register!(scope, "*", [VEC, NUM], |args| Ok(Value::Vector(
        linalg::vector_scale(&args[0].as_vector()?, args[1].as_real()?)
    )));
    register!(scope, "*", [NUM, MAT], |args| Ok(Value::Matrix(
        linalg::matrix_scale(matrix_arg(&args[1])?, args[0].as_real()?)
    )));
    register!(scope, "*", [MAT, NUM], |args| Ok(Value::Matrix(
        linalg::matrix_scale(matrix_arg(&args[0])?, args[1].as_real()?)
    )));
    register!(scope, "*", [MAT, VEC], |args| Ok(Value::Vector(
        linalg::matrix_vector_mul(matrix_arg(&args[0])?, &args[1].as_vector()?)?
    )));
    register!(scope, "*", [MAT, MAT], |args| Ok(Value::Matrix(
        linalg::matrix_mul(matrix_arg(&args[0])?, matrix_arg(&args[1])?)?
    )));

    register!(scope, "/", [NUM, NUM], |args| {
        Ok(Value::Number(divide(args[0].as_number()?, args[1].as_number()?)))
    });

    register!(scope, "^", [NUM, NUM], |args| {
        Ok(Value::Number(power(args[0].as_number()?, args[1].as_number()?)))
    });

    register!(scope, "fact", [NUM], |args| {
        let n = args[0].as_int("fact")?;
        Ok(Value::real(num::factorial(n, "fact")?))
    });

    // a | b is true when a divides b
    register!(scope, "|", [NUM, NUM], |args| {
        let a = args[0].as_int("|")?;
        let b = args[1].as_int("|")?;
        if a == 0 {
            return Ok(Value::Bool(b == 0));
        }
        Ok(Value::Bool(b % a == 0))
    });
}

/// Division, mapping a zero divisor to a signed infinity the comparator can
/// recognize instead of complex NaN soup.
fn divide(a: Complex<f64>, b: Complex<f64>) -> Complex<f64> {
    if b == Complex::ZERO {
        if num::is_real(a) && a.re != 0.0 {
            return Complex::new(a.re.signum() * f64::INFINITY, 0.0);
        }
        return Complex::new(f64::NAN, f64::NAN);
    }
    a / b
}

/// Exponentiation, staying on the real line whenever the result is real.
fn power(a: Complex<f64>, b: Complex<f64>) -> Complex<f64> {
    if num::is_real(a) && num::is_real(b) && (a.re >= 0.0 || b.re.fract() == 0.0) {
        Complex::from(a.re.powf(b.re))
    } else {
        a.powc(b)
    }
}

fn register_comparisons(scope: &mut Scope) {
    register!(scope, "<", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(Value::Bool(ord == std::cmp::Ordering::Less))
    });
    register!(scope, ">", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(Value::Bool(ord == std::cmp::Ordering::Greater))
    });
    register!(scope, "<=", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(Value::Bool(ord != std::cmp::Ordering::Greater))
    });
    register!(scope, ">=", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(Value::Bool(ord != std::cmp::Ordering::Less))
    });
    register!(scope, "=", [ANY, ANY], |args| Ok(Value::Bool(
        args[0].strict_eq(&args[1])
    )));
    register!(scope, "<>", [ANY, ANY], |args| Ok(Value::Bool(
        !args[0].strict_eq(&args[1])
    )));
    register!(scope, "max", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(if ord == std::cmp::Ordering::Less {
            args[1].clone()
        } else {
            args[0].clone()
        })
    });
    register!(scope, "min", [NUM, NUM], |args| {
        let ord = num::compare_real(args[0].as_number()?, args[1].as_number()?)?;
        Ok(if ord == std::cmp::Ordering::Greater {
            args[1].clone()
        } else {
            args[0].clone()
        })
    });
}

fn register_logic(scope: &mut Scope) {
    register!(scope, "and", [BOOL, BOOL], |args| Ok(Value::Bool(
        args[0].as_bool()? && args[1].as_bool()?
    )));
    register!(scope, "or", [BOOL, BOOL], |args| Ok(Value::Bool(
        args[0].as_bool()? || args[1].as_bool()?
    )));
    register!(scope, "xor", [BOOL, BOOL], |args| Ok(Value::Bool(
        args[0].as_bool()? != args[1].as_bool()?
    )));
    register!(scope, "not", [BOOL], |args| Ok(Value::Bool(
        !args[0].as_bool()?
    )));
}

fn register_ranges(scope: &mut Scope) {
    register!(scope, "..", [NUM, NUM], |args| Ok(Value::Range(Range::new(
        args[0].as_real()?,
        args[1].as_real()?,
        1.0
    ))));
    register!(scope, "#", [RANGE, NUM], |args| {
        let r = range_arg(&args[0])?;
        Ok(Value::Range(Range::new(r.start, r.end, args[1].as_real()?)))
    });
    register!(scope, "except", [RANGE, RANGE], |args| {
        except_values(&args[0], &args[1])
    });
    register!(scope, "except", [RANGE, LIST], |args| {
        except_values(&args[0], &args[1])
    });
    register!(scope, "except", [RANGE, NUM], |args| {
        except_values(&args[0], &args[1])
    });
    register!(scope, "except", [LIST, ANY], |args| {
        except_values(&args[0], &args[1])
    });
    register!(scope, "except", [SET, SET], |args| {
        let b = set_members(&args[1])?;
        let members = set_members(&args[0])?
            .iter()
            .filter(|x| !b.iter().any(|y| x.strict_eq(y)))
            .cloned()
            .collect();
        Ok(Value::Set(members))
    });
    register!(scope, "in", [NUM, RANGE], |args| {
        Ok(Value::Bool(range_arg(&args[1])?.contains(args[0].as_real()?)))
    });
    register!(scope, "in", [ANY, LIST], |args| Ok(Value::Bool(
        args[1].as_list()?.iter().any(|x| x.strict_eq(&args[0]))
    )));
    register!(scope, "in", [ANY, SET], |args| Ok(Value::Bool(
        set_members(&args[1])?.iter().any(|x| x.strict_eq(&args[0]))
    )));
    register!(scope, "list", [RANGE], |args| {
        let values = discrete_values(range_arg(&args[0])?)?;
        Ok(Value::List(values.into_iter().map(Value::real).collect()))
    });
    register!(scope, "list", [SET], |args| Ok(Value::List(
        set_members(&args[0])?.to_vec()
    )));
    register!(scope, "list", [VEC], |args| Ok(Value::List(
        args[0].as_vector()?.into_iter().map(Value::real).collect()
    )));
}

/// The left operand's elements with every member of the right operand
/// removed. Both sides accept ranges, lists and single numbers.
fn except_values(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let keep = elements_of(lhs)?;
    let drop = elements_of(rhs)?;
    Ok(Value::List(
        keep.into_iter()
            .filter(|x| !drop.iter().any(|y| x.strict_eq(y)))
            .collect(),
    ))
}

fn elements_of(value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Set(items) => Ok(items.clone()),
        Value::Range(r) => Ok(discrete_values(r)?.into_iter().map(Value::real).collect()),
        other => Ok(vec![other.clone()]),
    }
}

fn discrete_values(r: &Range) -> Result<Vec<f64>, Error> {
    r.values().ok_or(Error::WrongType {
        expected: "discrete range",
        found: "continuous range",
    })
}

fn range_arg(value: &Value) -> Result<&Range, Error> {
    match value {
        Value::Range(r) => Ok(r),
        other => Err(Error::WrongType {
            expected: "range",
            found: other.kind().name(),
        }),
    }
}

fn matrix_arg(value: &Value) -> Result<&Matrix, Error> {
    match value {
        Value::Matrix(m) => Ok(m),
        other => Err(Error::WrongType {
            expected: "matrix",
            found: other.kind().name(),
        }),
    }
}

fn set_members(value: &Value) -> Result<&[Value], Error> {
    match value {
        Value::Set(items) => Ok(items),
        other => Err(Error::WrongType {
            expected: "set",
            found: other.kind().name(),
        }),
    }
}

fn register_indexing(scope: &mut Scope) {
    register!(scope, "listval", [LIST, NUM], |args| {
        let items = args[0].as_list()?;
        Ok(index_into(items, args[1].as_int("listval")?)?.clone())
    });
    register!(scope, "listval", [VEC, NUM], |args| {
        let v = args[0].as_vector()?;
        let items: Vec<Value> = v.into_iter().map(Value::real).collect();
        Ok(index_into(&items, args[1].as_int("listval")?)?.clone())
    });
    register!(scope, "listval", [MAT, NUM], |args| {
        let m = matrix_arg(&args[0])?;
        let i = args[1].as_int("listval")?;
        let row = normalize_index(i, m.rows())?;
        m.row(row)
            .map(|r| Value::Vector(r.clone()))
            .ok_or(Error::IndexOutOfRange {
                index: i,
                size: m.rows(),
            })
    });
    register!(scope, "listval", [RANGE, NUM], |args| {
        let values = discrete_values(range_arg(&args[0])?)?;
        let items: Vec<Value> = values.into_iter().map(Value::real).collect();
        Ok(index_into(&items, args[1].as_int("listval")?)?.clone())
    });
}

/// Indexing with negative indices counting back from the end.
fn index_into(items: &[Value], index: i64) -> Result<&Value, Error> {
    let i = normalize_index(index, items.len())?;
    Ok(&items[i])
}

fn normalize_index(index: i64, len: usize) -> Result<usize, Error> {
    let adjusted = if index < 0 { index + len as i64 } else { index };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(Error::IndexOutOfRange { index, size: len });
    }
    Ok(adjusted as usize)
}

fn register_scalar_functions(scope: &mut Scope) {
    register_complex_methods!(scope,
        "sin" => sin, "cos" => cos, "tan" => tan,
        "asin" => asin, "acos" => acos, "atan" => atan,
        "sinh" => sinh, "cosh" => cosh, "tanh" => tanh,
        "asinh" => asinh, "acosh" => acosh, "atanh" => atanh,
        "exp" => exp, "sqrt" => sqrt, "conj" => conj,
    );
    register!(scope, "ln", [NUM], |args| Ok(Value::Number(
        args[0].as_number()?.ln()
    )));
    register!(scope, "log", [NUM], |args| Ok(Value::Number(
        args[0].as_number()?.ln() / std::f64::consts::LN_10
    )));
    register!(scope, "log", [NUM, NUM], |args| Ok(Value::Number(
        args[0].as_number()?.ln() / args[1].as_number()?.ln()
    )));
    register!(scope, "root", [NUM, NUM], |args| {
        Ok(Value::Number(root(args[0].as_number()?, args[1].as_number()?)))
    });
    register!(scope, "abs", [NUM], |args| Ok(Value::real(
        args[0].as_number()?.norm()
    )));
    register!(scope, "abs", [STR], |args| Ok(Value::real(
        args[0].as_str()?.chars().count() as f64
    )));
    register!(scope, "abs", [LIST], |args| Ok(Value::real(
        args[0].as_list()?.len() as f64
    )));
    register!(scope, "abs", [SET], |args| Ok(Value::real(
        set_members(&args[0])?.len() as f64
    )));
    register!(scope, "abs", [VEC], |args| Ok(Value::real(linalg::norm(
        &args[0].as_vector()?
    ))));
    register!(scope, "abs", [RANGE], |args| {
        Ok(Value::real(discrete_values(range_arg(&args[0])?)?.len() as f64))
    });
    register!(scope, "arg", [NUM], |args| Ok(Value::real(
        args[0].as_number()?.arg()
    )));
    register!(scope, "re", [NUM], |args| Ok(Value::real(
        args[0].as_number()?.re
    )));
    register!(scope, "im", [NUM], |args| Ok(Value::real(
        args[0].as_number()?.im
    )));
    register!(scope, "sign", [NUM], |args| {
        let x = args[0].as_real()?;
        Ok(Value::real(if x == 0.0 { 0.0 } else { x.signum() }))
    });
    register!(scope, "ceil", [NUM], |args| {
        let z = args[0].as_number()?;
        Ok(Value::Number(Complex::new(z.re.ceil(), z.im.ceil())))
    });
    register!(scope, "floor", [NUM], |args| {
        let z = args[0].as_number()?;
        Ok(Value::Number(Complex::new(z.re.floor(), z.im.floor())))
    });
    register!(scope, "trunc", [NUM], |args| {
        let z = args[0].as_number()?;
        Ok(Value::Number(Complex::new(z.re.trunc(), z.im.trunc())))
    });
    register!(scope, "fract", [NUM], |args| {
        let z = args[0].as_number()?;
        Ok(Value::Number(Complex::new(z.re.fract(), z.im.fract())))
    });
    register!(scope, "degrees", [NUM], |args| Ok(Value::real(
        args[0].as_real()?.to_degrees()
    )));
    register!(scope, "radians", [NUM], |args| Ok(Value::real(
        args[0].as_real()?.to_radians()
    )));
    register!(scope, "mod", [NUM, NUM], |args| Ok(Value::real(num::modulo(
        args[0].as_real()?,
        args[1].as_real()?
    ))));
    register!(scope, "div", [NUM, NUM], |args| Ok(Value::real(
        (args[0].as_real()? / args[1].as_real()?).floor()
    )));
    register!(scope, "gcd", [NUM, NUM], |args| Ok(Value::real(num::gcd(
        args[0].as_int("gcd")?,
        args[1].as_int("gcd")?
    ) as f64)));
    register!(scope, "lcm", [NUM, NUM], |args| Ok(Value::real(num::lcm(
        args[0].as_int("lcm")?,
        args[1].as_int("lcm")?
    ) as f64)));
    register!(scope, "precround", [NUM, NUM], |args| Ok(Value::Number(
        num::precround(args[0].as_number()?, args[1].as_int("precround")? as i32)
    )));
    register!(scope, "siground", [NUM, NUM], |args| Ok(Value::Number(
        num::siground(args[0].as_number()?, args[1].as_int("siground")? as i32)
    )));
    register!(scope, "factorise", [NUM], |args| {
        let n = args[0].as_int("factorise")?;
        if n < 1 {
            return Err(Error::NotAnInteger {
                context: "factorise".into(),
                found: n.to_string(),
            });
        }
        let (exponents, _cofactor) = num::factorise(n as u64);
        Ok(Value::List(
            exponents.into_iter().map(|e| Value::real(e as f64)).collect(),
        ))
    });
}

/// `root(x, n)`: the real n-th root of a negative real when n is odd,
/// otherwise the principal complex root.
fn root(x: Complex<f64>, n: Complex<f64>) -> Complex<f64> {
    if num::is_real(x) && num::is_int(n) {
        let k = n.re as i64;
        if x.re < 0.0 && k % 2 != 0 {
            return Complex::from(-(-x.re).powf(1.0 / n.re));
        }
        if x.re >= 0.0 {
            return Complex::from(x.re.powf(1.0 / n.re));
        }
    }
    x.powc(Complex::<f64>::ONE / n)
}

fn register_randomness(scope: &mut Scope) {
    register!(scope, "random", [RANGE], |args| {
        let r = range_arg(&args[0])?;
        let mut rng = rand::rng();
        match r.values() {
            Some(values) => {
                if values.is_empty() {
                    return Err(Error::EmptySelection);
                }
                let i = rng.random_range(0..values.len());
                Ok(Value::real(values[i]))
            }
            None => {
                let (lo, hi) = if r.start <= r.end {
                    (r.start, r.end)
                } else {
                    (r.end, r.start)
                };
                Ok(Value::real(rng.random_range(lo..=hi)))
            }
        }
    });
    register!(scope, "random", [LIST], |args| {
        let items = args[0].as_list()?;
        if items.is_empty() {
            return Err(Error::EmptySelection);
        }
        let i = rand::rng().random_range(0..items.len());
        Ok(items[i].clone())
    });
    register!(scope, "deal", [NUM], |args| {
        let n = args[0].as_int("deal")?;
        if n < 0 {
            return Err(Error::EmptySelection);
        }
        let mut indices: Vec<usize> = (0..n as usize).collect();
        indices.shuffle(&mut rand::rng());
        Ok(Value::List(
            indices.into_iter().map(|i| Value::real(i as f64)).collect(),
        ))
    });
    register!(scope, "shuffle", [LIST], |args| {
        let mut items = args[0].as_list()?.to_vec();
        items.shuffle(&mut rand::rng());
        Ok(Value::List(items))
    });
}

fn register_collections(scope: &mut Scope) {
    register!(scope, "sum", [LIST], |args| {
        let mut total = Complex::ZERO;
        for item in args[0].as_list()? {
            total += item.as_number()?;
        }
        Ok(Value::Number(total))
    });
    register!(scope, "sum", [VEC], |args| Ok(Value::real(
        args[0].as_vector()?.iter().sum()
    )));
    register!(scope, "sort", [LIST], |args| {
        let mut reals = args[0]
            .as_list()?
            .iter()
            .map(|v| v.as_real())
            .collect::<Result<Vec<_>, _>>()?;
        reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Value::List(reals.into_iter().map(Value::real).collect()))
    });
    register!(scope, "reverse", [LIST], |args| {
        let mut items = args[0].as_list()?.to_vec();
        items.reverse();
        Ok(Value::List(items))
    });
    register!(scope, "distinct", [LIST], |args| {
        let mut out: Vec<Value> = Vec::new();
        for item in args[0].as_list()? {
            if !out.iter().any(|x| x.strict_eq(item)) {
                out.push(item.clone());
            }
        }
        Ok(Value::List(out))
    });
    register!(scope, "set", [LIST], |args| Ok(Value::set_from(
        args[0].as_list()?.to_vec()
    )));
    register!(scope, "set", [Param::Rest(None)], |args| Ok(Value::set_from(
        args.to_vec()
    )));
    register!(scope, "union", [SET, SET], |args| {
        let mut members = set_members(&args[0])?.to_vec();
        members.extend(set_members(&args[1])?.iter().cloned());
        Ok(Value::set_from(members))
    });
    register!(scope, "intersection", [SET, SET], |args| {
        let b = set_members(&args[1])?;
        let members = set_members(&args[0])?
            .iter()
            .filter(|x| b.iter().any(|y| x.strict_eq(y)))
            .cloned()
            .collect();
        Ok(Value::Set(members))
    });
}

fn register_linear_algebra(scope: &mut Scope) {
    register!(scope, "vector", [Param::Rest(Some(ValueKind::Number))], |args| {
        let components = args
            .iter()
            .map(|v| v.as_real())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Vector(components))
    });
    register!(scope, "vector", [LIST], |args| {
        let components = args[0]
            .as_list()?
            .iter()
            .map(|v| v.as_real())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Vector(components))
    });
    register!(scope, "matrix", [Param::Rest(Some(ValueKind::List))], |args| {
        let rows = args
            .iter()
            .map(|row| {
                row.as_list()?
                    .iter()
                    .map(|v| v.as_real())
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Matrix(Matrix::from_rows(rows)))
    });
    register!(scope, "rowvector", [Param::Rest(Some(ValueKind::Number))], |args| {
        let components = args
            .iter()
            .map(|v| v.as_real())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Matrix(Matrix::row_vector(components)))
    });

    // dot and cross accept vectors and thin matrices interchangeably
    fn dot_impl(args: &[Value], _: &Scope) -> Result<Value, Error> {
        Ok(Value::real(linalg::dot(
            &args[0].as_vector()?,
            &args[1].as_vector()?,
        )))
    }
    fn cross_impl(args: &[Value], _: &Scope) -> Result<Value, Error> {
        Ok(Value::Vector(linalg::cross(
            &args[0].as_vector()?,
            &args[1].as_vector()?,
        )?))
    }
    for params in [[VEC, VEC], [VEC, MAT], [MAT, VEC], [MAT, MAT]] {
        scope.register(FnDef::new("dot", params.to_vec(), dot_impl));
        scope.register(FnDef::new("cross", params.to_vec(), cross_impl));
    }

    register!(scope, "det", [MAT], |args| Ok(Value::real(
        linalg::determinant(matrix_arg(&args[0])?)?
    )));
    register!(scope, "transpose", [MAT], |args| Ok(Value::Matrix(
        linalg::transpose(matrix_arg(&args[0])?)
    )));
    register!(scope, "transpose", [VEC], |args| Ok(Value::Matrix(
        Matrix::row_vector(args[0].as_vector()?)
    )));
}

fn register_strings(scope: &mut Scope) {
    register!(scope, "string", [ANY], |args| Ok(Value::Str(
        args[0].to_string()
    )));
    register!(scope, "upper", [STR], |args| Ok(Value::Str(
        args[0].as_str()?.to_uppercase()
    )));
    register!(scope, "lower", [STR], |args| Ok(Value::Str(
        args[0].as_str()?.to_lowercase()
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::lexer::tokenise;
    use crate::parser::shunt;
    use approx::assert_abs_diff_eq;

    fn eval_str(source: &str) -> Result<Value, Error> {
        evaluate(&shunt(&tokenise(source)?)?, builtin_scope())
    }

    fn real_of(source: &str) -> f64 {
        eval_str(source).unwrap().as_real().unwrap()
    }

    #[test]
    fn test_precedence_end_to_end() {
        assert_abs_diff_eq!(real_of("2+3*4"), 14.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("2^3^2"), 512.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("(2+3)*4"), 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_complex_arithmetic() {
        let z = eval_str("(1+2i)*(3-i)").unwrap().as_number().unwrap();
        assert_abs_diff_eq!(z.re, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sqrt_promotes_to_complex() {
        let z = eval_str("sqrt(-4)").unwrap().as_number().unwrap();
        assert_abs_diff_eq!(z.re, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ln_of_negative_real() {
        let z = eval_str("ln(-1)").unwrap().as_number().unwrap();
        assert_abs_diff_eq!(z.re, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn test_power_stays_real() {
        assert_abs_diff_eq!(real_of("(-8)^2"), 64.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("2^0.5"), std::f64::consts::SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_ordering_complex_fails() {
        assert_eq!(eval_str("(2+3i) < 1").unwrap_err(), Error::OrderComplex);
        assert_eq!(eval_str("max(i, 1)").unwrap_err(), Error::OrderComplex);
        assert_eq!(eval_str("2 < 3").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_equality_real_vs_complex() {
        assert_eq!(eval_str("2 = 2+0i").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("2 <> 2+i").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_vector_addition_pads() {
        let v = eval_str("vector(1,2) + vector(1,2,3)").unwrap();
        assert_eq!(v, Value::Vector(vec![2.0, 4.0, 3.0]));
    }

    #[test]
    fn test_cross_and_dot() {
        let v = eval_str("cross(vector(1,0,0), vector(0,1,0))").unwrap();
        assert_eq!(v, Value::Vector(vec![0.0, 0.0, 1.0]));
        assert_abs_diff_eq!(real_of("dot(vector(1,2,3), vector(4,5,6))"), 32.0, epsilon = 1e-12);
        assert_eq!(
            eval_str("cross(vector(1,0), vector(0,1,0))").unwrap_err(),
            Error::NotThreeDimensional
        );
    }

    #[test]
    fn test_matrix_operations() {
        let det = real_of("det(matrix([1,2],[3,4]))");
        assert_abs_diff_eq!(det, -2.0, epsilon = 1e-12);
        let err = eval_str("det(matrix([1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]))").unwrap_err();
        assert_eq!(err, Error::DeterminantSize(4));
        let product = eval_str("matrix([1,2],[3,4]) * vector(1,1)").unwrap();
        assert_eq!(product, Value::Vector(vec![3.0, 7.0]));
    }

    #[test]
    fn test_range_construction() {
        let r = eval_str("1..5").unwrap();
        assert_eq!(r, Value::Range(Range::new(1.0, 5.0, 1.0)));
        match eval_str("1..5#1").unwrap() {
            Value::Range(r) => {
                assert_eq!(r.values(), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
            }
            other => unreachable!("unexpected value {:?}", other),
        }
        match eval_str("1..5#0").unwrap() {
            Value::Range(r) => assert_eq!(r.values(), None),
            other => unreachable!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_except_and_in() {
        let kept = eval_str("(1..5) except 3").unwrap();
        assert_eq!(
            kept,
            Value::List(vec![
                Value::real(1.0),
                Value::real(2.0),
                Value::real(4.0),
                Value::real(5.0)
            ])
        );
        assert_eq!(eval_str("3 in 1..5").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("7 in 1..5").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("2 in [1,2,3]").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_divides() {
        assert_eq!(eval_str("3 | 12").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("5 | 12").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_indexing() {
        assert_abs_diff_eq!(real_of("[10, 20, 30][1]"), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("[10, 20, 30][-1]"), 30.0, epsilon = 1e-12);
        assert_eq!(
            eval_str("[1][5]").unwrap_err(),
            Error::IndexOutOfRange { index: 5, size: 1 }
        );
        assert_abs_diff_eq!(real_of("vector(9, 8)[0]"), 9.0, epsilon = 1e-12);
        assert_eq!(
            eval_str("matrix([1,2],[3,4])[1]").unwrap(),
            Value::Vector(vec![3.0, 4.0])
        );
    }

    #[test]
    fn test_rounding_functions() {
        assert_abs_diff_eq!(real_of("precround(3.14159, 2)"), 3.14, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("siground(123.456, 2)"), 120.0, epsilon = 1e-9);
    }

    #[test]
    fn test_factorise() {
        assert_eq!(
            eval_str("factorise(12)").unwrap(),
            Value::List(vec![Value::real(2.0), Value::real(1.0)])
        );
    }

    #[test]
    fn test_factorial_operator() {
        assert_abs_diff_eq!(real_of("5!"), 120.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("0!"), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_number_theory() {
        assert_abs_diff_eq!(real_of("gcd(12, 18)"), 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("mod(-1, 3)"), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(real_of("div(7, 2)"), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_stays_in_range() {
        for _ in 0..20 {
            let x = real_of("random(1..6)");
            assert!((1.0..=6.0).contains(&x));
            assert_eq!(x.fract(), 0.0);
        }
        let x = real_of("random(0..1#0)");
        assert!((0.0..=1.0).contains(&x));
    }

    #[test]
    fn test_deal_is_permutation() {
        match eval_str("sort(deal(5))").unwrap() {
            Value::List(items) => {
                let reals: Vec<f64> = items.iter().map(|v| v.as_real().unwrap()).collect();
                assert_eq!(reals, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
            }
            other => unreachable!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_shuffle_preserves_members() {
        match eval_str("sort(shuffle([3,1,2]))").unwrap() {
            Value::List(items) => assert_eq!(items.len(), 3),
            other => unreachable!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_sets() {
        assert_abs_diff_eq!(real_of("abs(set([1,2,2,3]))"), 3.0, epsilon = 1e-12);
        assert_eq!(
            eval_str("2 in intersection(set([1,2]), set([2,3]))").unwrap(),
            Value::Bool(true)
        );
        assert_abs_diff_eq!(real_of("abs(union(set([1,2]), set([2,3])))"), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            eval_str("upper(\"abc\")").unwrap(),
            Value::Str("ABC".into())
        );
        assert_eq!(
            eval_str("\"n = \" + 3").unwrap(),
            Value::Str("n = 3".into())
        );
        assert_abs_diff_eq!(real_of("abs(\"hello\")"), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        let x = real_of("1/0");
        assert!(x.is_infinite() && x > 0.0);
        let x = real_of("-1/0");
        assert!(x.is_infinite() && x < 0.0);
    }
}
