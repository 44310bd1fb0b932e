//! # display.rs
//!
//! Serialization of expression trees back to source text and to LaTeX.
//!
//! Parenthesization reuses the parser's operator table: a child is wrapped
//! exactly when printing it bare would rebind it to a different parent, so a
//! serialized tree always re-parses to the same shape. Multiplication signs
//! are elided between a numeric or bracketed left operand and a name or
//! bracketed right operand (`2x`, `2(x+1)`), never before a unary minus and
//! never when the `always_times` display flag is set.

use num_complex::Complex;

use crate::linalg::Matrix;
use crate::num;
use crate::parser::{op_info, Expr, OPS};
use crate::rules::DisplayFlags;
use crate::value::{Range, Value};

/// Operators rendered without surrounding spaces.
const TIGHT_OPS: &[&str] = &["^", "*", "/", "..", "#", ";"];

/// Serializes a tree to source text with default display flags.
pub fn to_source(expr: &Expr) -> String {
    to_source_with(expr, &DisplayFlags::default())
}

/// Serializes a tree to source text.
pub fn to_source_with(expr: &Expr, flags: &DisplayFlags) -> String {
    source_node(expr, flags)
}

/// The effective precedence of a node, for parenthesization decisions.
fn precedence_of(expr: &Expr) -> Option<u8> {
    match expr {
        Expr::Op(name, _) => OPS.get(name).map(|info| info.precedence),
        _ => None,
    }
}

/// Renders a child, wrapping it in parentheses when its precedence would
/// change its meaning under the parent.
fn source_child(
    child: &Expr,
    parent_precedence: u8,
    needs_parens_at_equal: bool,
    flags: &DisplayFlags,
) -> String {
    let text = source_node(child, flags);
    match precedence_of(child) {
        Some(p) if p > parent_precedence || (p == parent_precedence && needs_parens_at_equal) => {
            format!("({})", text)
        }
        _ => text,
    }
}

fn source_node(expr: &Expr, flags: &DisplayFlags) -> String {
    match expr {
        Expr::Constant(value) => render_value(value, flags),
        Expr::Name { name, annotations } => {
            if annotations.is_empty() {
                name.clone()
            } else {
                format!("{}:{}", annotations.join(":"), name)
            }
        }
        Expr::List(items) => {
            let parts: Vec<String> = items.iter().map(|i| source_node(i, flags)).collect();
            format!("[ {} ]", parts.join(", "))
        }
        Expr::Call { name, args } => {
            let parts: Vec<String> = args.iter().map(|a| source_node(a, flags)).collect();
            format!("{}({})", name, parts.join(", "))
        }
        Expr::Op(name, args) => source_op(name, args, flags),
    }
}

fn source_op(name: &str, args: &[Expr], flags: &DisplayFlags) -> String {
    let info = op_info(name);
    match name {
        "+u" => format!("+{}", source_child(&args[0], info.precedence, false, flags)),
        "-u" => format!("-{}", source_child(&args[0], info.precedence, false, flags)),
        "not" => format!("not {}", source_child(&args[0], info.precedence, false, flags)),
        "fact" => format!("{}!", source_child(&args[0], info.precedence, true, flags)),
        "listval" => format!(
            "{}[{}]",
            source_child(&args[0], info.precedence, false, flags),
            source_node(&args[1], flags)
        ),
        _ => {
            // left child needs parens at equal precedence under a
            // right-associative operator; right child under a left-associative
            let left = source_child(&args[0], info.precedence, info.right_assoc, flags);
            let right = source_child(&args[1], info.precedence, !info.right_assoc, flags);
            if name == "*" && !flags.always_times && elides(&left, &right, &args[1]) {
                return format!("{}{}", left, right);
            }
            if TIGHT_OPS.contains(&name) {
                format!("{}{}{}", left, name, right)
            } else {
                format!("{} {} {}", left, name, right)
            }
        }
    }
}

/// Whether a multiplication sign between these rendered operands can go.
fn elides(left: &str, right: &str, right_expr: &Expr) -> bool {
    if matches!(right_expr, Expr::Op("-u", _) | Expr::Op("+u", _)) {
        return false;
    }
    let left_ok = left
        .chars()
        .last()
        .map(|c| c.is_ascii_digit() || c == ')')
        .unwrap_or(false);
    let right_ok = right
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '(')
        .unwrap_or(false);
    left_ok && right_ok
}

/// Renders a value as source text.
fn render_value(value: &Value, flags: &DisplayFlags) -> String {
    match value {
        Value::Number(z) => render_number(*z, flags),
        Value::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Bool(b) => b.to_string(),
        Value::Range(r) => render_range(r),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(|v| render_value(v, flags)).collect();
            format!("[ {} ]", parts.join(", "))
        }
        Value::Vector(v) => {
            let parts: Vec<String> = v.iter().map(|x| num::nice_real(*x)).collect();
            format!("vector({})", parts.join(", "))
        }
        Value::Matrix(m) => render_matrix(m),
        Value::Set(items) => {
            let parts: Vec<String> = items.iter().map(|v| render_value(v, flags)).collect();
            format!("set({})", parts.join(", "))
        }
    }
}

fn render_number(z: Complex<f64>, flags: &DisplayFlags) -> String {
    if flags.fractions && num::is_real(z) && z.re.fract() != 0.0 {
        if let Some((p, q)) = num::rational_approximation(z.re, 8) {
            if q != 1 {
                return format!("{}/{}", p, q);
            }
        }
    }
    num::nice_complex(z)
}

fn render_range(r: &Range) -> String {
    if r.step == 1.0 {
        format!("{}..{}", num::nice_real(r.start), num::nice_real(r.end))
    } else {
        format!(
            "{}..{}#{}",
            num::nice_real(r.start),
            num::nice_real(r.end),
            num::nice_real(r.step)
        )
    }
}

fn render_matrix(m: &Matrix) -> String {
    let rows: Vec<String> = m
        .data()
        .iter()
        .map(|row| {
            let parts: Vec<String> = row.iter().map(|x| num::nice_real(*x)).collect();
            format!("[{}]", parts.join(", "))
        })
        .collect();
    format!("matrix({})", rows.join(", "))
}

/// Function names with a native LaTeX command.
const LATEX_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "sinh", "cosh", "tanh", "ln", "log", "exp", "max", "min", "gcd",
];

/// Serializes a tree to LaTeX.
pub fn to_latex(expr: &Expr, flags: &DisplayFlags) -> String {
    latex_node(expr, flags)
}

fn latex_child(
    child: &Expr,
    parent_precedence: u8,
    needs_parens_at_equal: bool,
    flags: &DisplayFlags,
) -> String {
    let text = latex_node(child, flags);
    match precedence_of(child) {
        Some(p) if p > parent_precedence || (p == parent_precedence && needs_parens_at_equal) => {
            format!("\\left( {} \\right)", text)
        }
        _ => text,
    }
}

fn latex_node(expr: &Expr, flags: &DisplayFlags) -> String {
    match expr {
        Expr::Constant(value) => latex_value(value, flags),
        Expr::Name { name, annotations } => latex_name(name, annotations),
        Expr::List(items) => {
            let parts: Vec<String> = items.iter().map(|i| latex_node(i, flags)).collect();
            format!("\\left[ {} \\right]", parts.join(", "))
        }
        Expr::Call { name, args } => latex_call(name, args, flags),
        Expr::Op(name, args) => latex_op(name, args, flags),
    }
}

fn latex_name(name: &str, annotations: &[String]) -> String {
    let base = if name.chars().count() == 1 {
        name.to_string()
    } else {
        format!("\\mathrm{{{}}}", name)
    };
    let mut out = base;
    for annotation in annotations {
        out = match annotation.as_str() {
            "vector" | "bold" => format!("\\boldsymbol{{{}}}", out),
            "hat" => format!("\\hat{{{}}}", out),
            "dot" => format!("\\dot{{{}}}", out),
            "bar" => format!("\\bar{{{}}}", out),
            _ => out,
        };
    }
    out
}

fn latex_call(name: &str, args: &[Expr], flags: &DisplayFlags) -> String {
    let lower = name.to_lowercase();
    let parts: Vec<String> = args.iter().map(|a| latex_node(a, flags)).collect();
    match lower.as_str() {
        "sqrt" if args.len() == 1 => format!("\\sqrt{{{}}}", parts[0]),
        "root" if args.len() == 2 => format!("\\sqrt[{}]{{{}}}", parts[1], parts[0]),
        "abs" if args.len() == 1 => format!("\\left| {} \\right|", parts[0]),
        "vector" => format!(
            "\\begin{{pmatrix}} {} \\end{{pmatrix}}",
            parts.join(" \\\\ ")
        ),
        _ if LATEX_FUNCTIONS.contains(&lower.as_str()) => {
            format!("\\{}\\left( {} \\right)", lower, parts.join(", "))
        }
        _ => format!(
            "\\operatorname{{{}}}\\left( {} \\right)",
            name,
            parts.join(", ")
        ),
    }
}

fn latex_op(name: &str, args: &[Expr], flags: &DisplayFlags) -> String {
    let info = op_info(name);
    match name {
        "+u" => format!("+{}", latex_child(&args[0], info.precedence, false, flags)),
        "-u" => format!("-{}", latex_child(&args[0], info.precedence, false, flags)),
        "not" => format!(
            "\\neg {}",
            latex_child(&args[0], info.precedence, false, flags)
        ),
        "fact" => format!("{}!", latex_child(&args[0], info.precedence, true, flags)),
        "listval" => format!(
            "{}\\left[ {} \\right]",
            latex_child(&args[0], info.precedence, false, flags),
            latex_node(&args[1], flags)
        ),
        "/" => format!(
            "\\frac{{{}}}{{{}}}",
            latex_node(&args[0], flags),
            latex_node(&args[1], flags)
        ),
        "^" => format!(
            "{}^{{{}}}",
            latex_child(&args[0], info.precedence, true, flags),
            latex_node(&args[1], flags)
        ),
        "*" => {
            let left = latex_child(&args[0], info.precedence, info.right_assoc, flags);
            let right = latex_child(&args[1], info.precedence, !info.right_assoc, flags);
            let juxtaposes = right
                .chars()
                .next()
                .map(|c| c.is_alphabetic() || c == '\\')
                .unwrap_or(false)
                && !matches!(&args[1], Expr::Op("-u", _) | Expr::Op("+u", _));
            if juxtaposes {
                format!("{} {}", left, right)
            } else {
                format!("{} \\times {}", left, right)
            }
        }
        _ => {
            let symbol = match name {
                "<=" => "\\leq",
                ">=" => "\\geq",
                "<>" => "\\neq",
                "and" => "\\wedge",
                "or" => "\\vee",
                "xor" => "\\oplus",
                "in" => "\\in",
                "except" => "\\setminus",
                ".." => "\\ldots",
                other => other,
            };
            let left = latex_child(&args[0], info.precedence, info.right_assoc, flags);
            let right = latex_child(&args[1], info.precedence, !info.right_assoc, flags);
            format!("{} {} {}", left, symbol, right)
        }
    }
}

fn latex_value(value: &Value, flags: &DisplayFlags) -> String {
    match value {
        Value::Number(z) => latex_number(*z, flags),
        Value::Str(s) => format!("\\text{{{}}}", s),
        Value::Bool(b) => format!("\\mathrm{{{}}}", b),
        Value::Range(r) => format!(
            "{} \\ldots {}",
            num::nice_real(r.start),
            num::nice_real(r.end)
        ),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(|v| latex_value(v, flags)).collect();
            format!("\\left[ {} \\right]", parts.join(", "))
        }
        Value::Vector(v) => {
            let parts: Vec<String> = v.iter().map(|x| num::nice_real(*x)).collect();
            format!("\\begin{{pmatrix}} {} \\end{{pmatrix}}", parts.join(" \\\\ "))
        }
        Value::Matrix(m) => {
            let rows: Vec<String> = m
                .data()
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|x| num::nice_real(*x))
                        .collect::<Vec<_>>()
                        .join(" & ")
                })
                .collect();
            format!(
                "\\begin{{pmatrix}} {} \\end{{pmatrix}}",
                rows.join(" \\\\ ")
            )
        }
        Value::Set(items) => {
            let parts: Vec<String> = items.iter().map(|v| latex_value(v, flags)).collect();
            format!("\\left\\{{ {} \\right\\}}", parts.join(", "))
        }
    }
}

fn latex_number(z: Complex<f64>, flags: &DisplayFlags) -> String {
    if !num::is_real(z) {
        let re = latex_number(Complex::from(z.re), flags);
        let im_abs = latex_number(Complex::from(z.im.abs()), flags);
        let im = match z.im {
            1.0 => "i".to_string(),
            -1.0 => "i".to_string(),
            _ => format!("{} i", im_abs),
        };
        if z.re == 0.0 {
            return if z.im < 0.0 { format!("-{}", im) } else { im };
        }
        let sign = if z.im < 0.0 { "-" } else { "+" };
        return format!("{} {} {}", re, sign, im);
    }
    let x = z.re;
    if x.is_infinite() {
        return if x > 0.0 { "\\infty".into() } else { "-\\infty".into() };
    }
    if let Some((multiple, power)) = num::pi_multiple(x) {
        let pi_part = if power == 1 {
            "\\pi".to_string()
        } else {
            format!("\\pi^{{{}}}", power)
        };
        return match multiple {
            1 => pi_part,
            -1 => format!("-{}", pi_part),
            m => format!("{} {}", m, pi_part),
        };
    }
    if flags.fractions && x.fract() != 0.0 {
        if let Some((p, q)) = num::rational_approximation(x, 8) {
            if q != 1 {
                let (sign, p_abs) = if p < 0 { ("-", -p) } else { ("", p) };
                return format!("{}\\frac{{{}}}{{{}}}", sign, p_abs, q);
            }
        }
    }
    num::nice_real(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenise;
    use crate::parser::shunt;

    fn parse(source: &str) -> Expr {
        shunt(&tokenise(source).unwrap()).unwrap()
    }

    fn round_trip(source: &str) -> Expr {
        parse(&to_source(&parse(source)))
    }

    #[test]
    fn test_parens_follow_precedence() {
        assert_eq!(to_source(&parse("(2+3)*4")), "(2 + 3)*4");
        assert_eq!(to_source(&parse("2+3*4")), "2 + 3*4");
    }

    #[test]
    fn test_associativity_parens() {
        // right-nested subtraction keeps its parens, left-nested loses them
        assert_eq!(to_source(&parse("1-(2-3)")), "1 - (2 - 3)");
        assert_eq!(to_source(&parse("(1-2)-3")), "1 - 2 - 3");
        // power is right-associative
        assert_eq!(to_source(&parse("(2^3)^2")), "(2^3)^2");
        assert_eq!(to_source(&parse("2^3^2")), "2^3^2");
    }

    #[test]
    fn test_multiplication_elision() {
        assert_eq!(to_source(&parse("2*x")), "2x");
        assert_eq!(to_source(&parse("(1+2)*(3+4)")), "(1 + 2)(3 + 4)");
        // a name on the left keeps its sign
        assert_eq!(to_source(&parse("x*y")), "x*y");
        // unary minus on the right keeps its sign
        assert_eq!(to_source(&parse("2*(-x)")), "2*-x");
    }

    #[test]
    fn test_always_times_flag() {
        let flags = DisplayFlags {
            always_times: true,
            ..Default::default()
        };
        assert_eq!(to_source_with(&parse("2*x"), &flags), "2*x");
    }

    #[test]
    fn test_round_trip_preserves_shape() {
        for source in [
            "2+3*4",
            "2^3^2",
            "-x^2",
            "1 - (2 - 3)",
            "sin(x) + cos(y)",
            "[1, 2, 3][0]",
            "x and y or not z",
            "(1..5)#2",
            "a except [1]",
            "2x + 1",
        ] {
            let original = parse(source);
            assert_eq!(round_trip(source), original, "round trip of {:?}", source);
        }
    }

    #[test]
    fn test_unary_rendering() {
        assert_eq!(to_source(&parse("-(x+1)")), "-(x + 1)");
        assert_eq!(to_source(&parse("-x^2")), "-x^2");
        assert_eq!(to_source(&parse("5!")), "5!");
        assert_eq!(to_source(&parse("(n+1)!")), "(n + 1)!");
        assert_eq!(to_source(&parse("not (x and y)")), "not (x and y)");
    }

    #[test]
    fn test_string_rendering() {
        assert_eq!(to_source(&parse(r#""he said \"hi\"""#)), r#""he said \"hi\"""#);
    }

    #[test]
    fn test_annotated_name_rendering() {
        assert_eq!(to_source(&parse("vector:v + w")), "vector:v + w");
    }

    #[test]
    fn test_fraction_flag() {
        let flags = DisplayFlags {
            fractions: true,
            ..Default::default()
        };
        assert_eq!(to_source_with(&Expr::number(0.5), &flags), "1/2");
        assert_eq!(to_source_with(&Expr::number(3.0), &flags), "3");
    }

    #[test]
    fn test_latex_basics() {
        let flags = DisplayFlags::default();
        assert_eq!(to_latex(&parse("x/2"), &flags), "\\frac{x}{2}");
        assert_eq!(to_latex(&parse("x^2"), &flags), "x^{2}");
        assert_eq!(to_latex(&parse("sqrt(x)"), &flags), "\\sqrt{x}");
        assert_eq!(
            to_latex(&parse("sin(x)"), &flags),
            "\\sin\\left( x \\right)"
        );
        assert_eq!(to_latex(&parse("x <= 2"), &flags), "x \\leq 2");
    }

    #[test]
    fn test_latex_elision_and_times() {
        let flags = DisplayFlags::default();
        assert_eq!(to_latex(&parse("2*x"), &flags), "2 x");
        assert_eq!(to_latex(&parse("2*3"), &flags), "2 \\times 3");
    }

    #[test]
    fn test_latex_annotations() {
        let flags = DisplayFlags::default();
        assert_eq!(to_latex(&parse("vector:v"), &flags), "\\boldsymbol{v}");
    }

    #[test]
    fn test_latex_pi_and_infinity() {
        let flags = DisplayFlags::default();
        assert_eq!(to_latex(&parse("pi"), &flags), "\\pi");
        assert_eq!(to_latex(&parse("infinity"), &flags), "\\infty");
    }
}
