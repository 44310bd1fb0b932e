//! # num.rs
//!
//! Scalar numeric kernel over [`num_complex::Complex<f64>`].
//!
//! A value is treated as real exactly when its imaginary part is `0.0`; the
//! complex plane is entered automatically whenever an operation demands it
//! (`sqrt(-2)`, `ln(-1)`), which falls straight out of the `Complex` methods.
//! This module adds the operations `Complex` does not provide: ordering with a
//! complex-operand guard, rounding to decimal places / significant figures with
//! an epsilon-tolerant tie-break, prime factorization over a fixed table, and
//! the continued-fraction "nice number" rendering used by the display layer.

use num_complex::Complex;
use std::sync::LazyLock;

use crate::error::Error;

/// How close a scaled value must be to a `…5` boundary before the rounding
/// tie-break fires. Chosen to absorb binary representation error; changing it
/// changes marking outcomes on boundary answers.
const ROUND_TIE_EPSILON: f64 = 1e-9;

/// Tolerance for recognizing a ratio as an integer multiple of a power of pi.
const PI_MULTIPLE_EPSILON: f64 = 1e-8;

/// Number of primes in the factorization table.
const PRIME_TABLE_SIZE: usize = 1000;

/// Returns whether the value has a zero imaginary part.
pub fn is_real(z: Complex<f64>) -> bool {
    z.im == 0.0
}

/// Returns whether the value is a real integer.
pub fn is_int(z: Complex<f64>) -> bool {
    is_real(z) && z.re.fract() == 0.0
}

/// Extracts a real from a complex value, failing on a nonzero imaginary part.
pub fn as_real(z: Complex<f64>, context: &str) -> Result<f64, Error> {
    if is_real(z) {
        Ok(z.re)
    } else {
        Err(Error::NotAnInteger {
            context: context.to_string(),
            found: format!("{}+{}i", z.re, z.im),
        })
    }
}

/// Extracts a real integer from a complex value.
pub fn as_integer(z: Complex<f64>, context: &str) -> Result<i64, Error> {
    if is_int(z) {
        Ok(z.re as i64)
    } else {
        Err(Error::NotAnInteger {
            context: context.to_string(),
            found: format!("{}", z),
        })
    }
}

/// Compares two reals, failing if either operand is complex.
///
/// Ordering is only defined on the real line; `max`, `min` and the comparison
/// operators all funnel through here.
pub fn compare_real(a: Complex<f64>, b: Complex<f64>) -> Result<std::cmp::Ordering, Error> {
    if !is_real(a) || !is_real(b) {
        return Err(Error::OrderComplex);
    }
    Ok(a.re.partial_cmp(&b.re).unwrap_or(std::cmp::Ordering::Equal))
}

/// Equality on the numeric union: real and imaginary parts compare separately,
/// a plain real carrying an implicit zero imaginary part.
pub fn eq(a: Complex<f64>, b: Complex<f64>) -> bool {
    a.re == b.re && a.im == b.im
}

/// Rounds a real to `digits` decimal places, half away from zero, with the
/// tie-break: a value within [`ROUND_TIE_EPSILON`] (scaled) of a `…5` boundary
/// is treated as sitting exactly on it and rounds up.
fn round_to_scale(x: f64, scale: f64) -> f64 {
    let scaled = x * scale;
    let frac = scaled - scaled.floor();
    let eps = ROUND_TIE_EPSILON * scaled.abs().max(1.0);
    let rounded = if (frac - 0.5).abs() <= eps {
        scaled.floor() + 1.0
    } else {
        scaled.round()
    };
    rounded / scale
}

/// Rounds each component to `digits` decimal places.
pub fn precround(z: Complex<f64>, digits: i32) -> Complex<f64> {
    let scale = 10f64.powi(digits);
    Complex::new(round_to_scale(z.re, scale), round_to_scale(z.im, scale))
}

/// Rounds each component to `figures` significant figures.
pub fn siground(z: Complex<f64>, figures: i32) -> Complex<f64> {
    let round_part = |x: f64| {
        if x == 0.0 || !x.is_finite() {
            return x;
        }
        let magnitude = x.abs().log10().floor() as i32;
        let scale = 10f64.powi(figures - 1 - magnitude);
        round_to_scale(x, scale)
    };
    Complex::new(round_part(z.re), round_part(z.im))
}

/// The first [`PRIME_TABLE_SIZE`] primes, sieved once at first use.
pub static PRIMES: LazyLock<Vec<u64>> = LazyLock::new(|| {
    let mut primes = Vec::with_capacity(PRIME_TABLE_SIZE);
    let mut candidate: u64 = 2;
    while primes.len() < PRIME_TABLE_SIZE {
        if primes.iter().all(|p| candidate % p != 0) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
});

/// Prime factorization of `n` over the fixed prime table.
///
/// Returns the exponent of each table prime up to the largest prime factor
/// reached, plus any cofactor the table could not reduce. A cofactor greater
/// than one means `n` had a prime factor beyond the 1000th prime and the
/// exponent list alone is a partial factorization.
pub fn factorise(n: u64) -> (Vec<u32>, u64) {
    let mut exponents: Vec<u32> = Vec::new();
    let mut remaining = n;
    for &p in PRIMES.iter() {
        if remaining <= 1 {
            break;
        }
        let mut exp = 0u32;
        while remaining % p == 0 {
            remaining /= p;
            exp += 1;
        }
        exponents.push(exp);
    }
    while exponents.last() == Some(&0) {
        exponents.pop();
    }
    (exponents, remaining.max(1))
}

/// Greatest common divisor of two integers.
pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Least common multiple of two integers.
pub fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}

/// Factorial of a non-negative integer, as a float to match the numeric model.
pub fn factorial(n: i64, context: &str) -> Result<f64, Error> {
    if n < 0 {
        return Err(Error::NotAnInteger {
            context: context.to_string(),
            found: n.to_string(),
        });
    }
    Ok((1..=n).fold(1.0, |acc, k| acc * k as f64))
}

/// Mathematical modulo: the result always takes the sign of the divisor.
pub fn modulo(a: f64, b: f64) -> f64 {
    ((a % b) + b) % b
}

/// Best rational approximation of `x` by bounded continued fractions.
///
/// `accuracy` is a power-of-ten exponent: expansion stops once the
/// approximation is within `10^-accuracy` of `x`, or after a fixed depth.
/// Returns `None` when `x` is not finite or the expansion fails to converge.
pub fn rational_approximation(x: f64, accuracy: i32) -> Option<(i64, i64)> {
    if !x.is_finite() {
        return None;
    }
    let eps = 10f64.powi(-accuracy);
    let mut terms: Vec<i64> = Vec::new();
    let mut rest = x;
    for _ in 0..30 {
        let whole = rest.floor();
        if whole.abs() > i64::MAX as f64 / 2.0 {
            return None;
        }
        terms.push(whole as i64);
        let (num, den) = fold_continued_fraction(&terms);
        if den != 0 && (x - num as f64 / den as f64).abs() < eps {
            return Some((num, den));
        }
        let frac = rest - whole;
        if frac.abs() < eps {
            let (num, den) = fold_continued_fraction(&terms);
            return Some((num, den));
        }
        rest = 1.0 / frac;
    }
    None
}

/// Collapses a continued-fraction term list into a single fraction.
fn fold_continued_fraction(terms: &[i64]) -> (i64, i64) {
    let mut num: i64 = 1;
    let mut den: i64 = 0;
    for &t in terms.iter().rev() {
        let next_num = t.checked_mul(num).and_then(|v| v.checked_add(den)).unwrap_or(i64::MAX);
        den = num;
        num = next_num;
    }
    if den < 0 {
        (-num, -den)
    } else {
        (num, den)
    }
}

/// Detects whether `x` is an integer multiple of a small power of pi.
///
/// Returns `(multiple, power)` when `x / pi^power` is within
/// [`PI_MULTIPLE_EPSILON`] of a nonzero integer, preferring higher powers.
pub fn pi_multiple(x: f64) -> Option<(i64, u32)> {
    if !x.is_finite() || x == 0.0 {
        return None;
    }
    for power in (1..=2u32).rev() {
        let ratio = x / std::f64::consts::PI.powi(power as i32);
        let nearest = ratio.round();
        if nearest != 0.0 && (ratio - nearest).abs() < PI_MULTIPLE_EPSILON {
            return Some((nearest as i64, power));
        }
    }
    None
}

/// Renders a real as the shortest faithful decimal, factoring out powers of pi.
///
/// `3.0` prints as `3`, `6.283185…` as `2 pi`, and anything else as the usual
/// shortest round-trip decimal.
pub fn nice_real(x: f64) -> String {
    if x.is_infinite() {
        return if x > 0.0 { "infinity".into() } else { "-infinity".into() };
    }
    if let Some((multiple, power)) = pi_multiple(x) {
        let pi_part = if power == 1 { "pi".to_string() } else { format!("pi^{}", power) };
        return match multiple {
            1 => pi_part,
            -1 => format!("-{}", pi_part),
            m => format!("{} {}", m, pi_part),
        };
    }
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

/// Renders a complex number in `a + b i` source form.
pub fn nice_complex(z: Complex<f64>) -> String {
    if is_real(z) {
        return nice_real(z.re);
    }
    let im_part = match z.im {
        1.0 => "i".to_string(),
        -1.0 => "-i".to_string(),
        im => format!("{}i", nice_real(im)),
    };
    if z.re == 0.0 {
        im_part
    } else if z.im < 0.0 {
        format!("{} - {}", nice_real(z.re), &im_part[1..])
    } else {
        format!("{} + {}", nice_real(z.re), im_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_precround_basic() {
        assert_abs_diff_eq!(precround(Complex::from(3.14159), 2).re, 3.14, epsilon = 1e-12);
        assert_abs_diff_eq!(precround(Complex::from(2.5), 0).re, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_precround_tie_break() {
        // 0.045 is stored as 0.04499999..., the tie-break must still round up.
        assert_abs_diff_eq!(precround(Complex::from(0.045), 2).re, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(precround(Complex::from(1.005), 2).re, 1.01, epsilon = 1e-12);
    }

    #[test]
    fn test_precround_complex_components() {
        let z = precround(Complex::new(1.2345, 6.7891), 2);
        assert_abs_diff_eq!(z.re, 1.23, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 6.79, epsilon = 1e-12);
    }

    #[test]
    fn test_siground() {
        assert_abs_diff_eq!(siground(Complex::from(123.456), 2).re, 120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(siground(Complex::from(0.0012345), 3).re, 0.00123, epsilon = 1e-12);
        assert_eq!(siground(Complex::from(0.0), 3).re, 0.0);
    }

    #[test]
    fn test_compare_real_rejects_complex() {
        let err = compare_real(Complex::new(2.0, 3.0), Complex::from(1.0)).unwrap_err();
        assert_eq!(err, Error::OrderComplex);
        assert!(compare_real(Complex::from(1.0), Complex::from(2.0)).is_ok());
    }

    #[test]
    fn test_factorise_small() {
        // 12 = 2^2 * 3
        assert_eq!(factorise(12), (vec![2, 1], 1));
        // 360 = 2^3 * 3^2 * 5
        assert_eq!(factorise(360), (vec![3, 2, 1], 1));
        assert_eq!(factorise(1), (vec![], 1));
    }

    #[test]
    fn test_factorise_beyond_table() {
        // 7927 is the 1001st prime, outside the table; it survives as cofactor.
        let (exps, cofactor) = factorise(2 * 7927);
        assert_eq!(exps, vec![1]);
        assert_eq!(cofactor, 7927);
    }

    #[test]
    fn test_prime_table_ends_correctly() {
        assert_eq!(PRIMES.len(), 1000);
        assert_eq!(PRIMES[0], 2);
        assert_eq!(*PRIMES.last().unwrap(), 7919);
    }

    #[test]
    fn test_gcd_lcm() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(-4, 6), 2);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(0, 3), 0);
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0, "fact").unwrap(), 1.0);
        assert_eq!(factorial(5, "fact").unwrap(), 120.0);
        assert!(factorial(-1, "fact").is_err());
    }

    #[test]
    fn test_modulo_sign() {
        assert_abs_diff_eq!(modulo(-1.0, 3.0), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(modulo(7.0, 3.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rational_approximation() {
        assert_eq!(rational_approximation(0.5, 8), Some((1, 2)));
        assert_eq!(rational_approximation(1.0 / 3.0, 8), Some((1, 3)));
        let (num, den) = rational_approximation(0.142857142857, 8).unwrap();
        assert_eq!((num, den), (1, 7));
    }

    #[test]
    fn test_pi_multiple() {
        assert_eq!(pi_multiple(2.0 * std::f64::consts::PI), Some((2, 1)));
        let pi_squared = std::f64::consts::PI * std::f64::consts::PI;
        assert_eq!(pi_multiple(pi_squared), Some((1, 2)));
        assert_eq!(pi_multiple(1.0), None);
    }

    #[test]
    fn test_nice_rendering() {
        assert_eq!(nice_real(3.0), "3");
        assert_eq!(nice_real(std::f64::consts::PI), "pi");
        assert_eq!(nice_complex(Complex::new(0.0, 1.0)), "i");
        assert_eq!(nice_complex(Complex::new(1.0, -2.0)), "1 - 2i");
        assert_eq!(nice_complex(Complex::new(2.0, 0.0)), "2");
    }
}
