//! # algebrac
//!
//! `algebrac` is a Rust library implementing a small mathematical expression
//! language for randomized assessment: compile expression source to a tree,
//! evaluate it over complex numbers, vectors, matrices, lists, ranges and
//! sets, simplify it with rewrite rules, render it back to source or LaTeX,
//! and decide whether two expressions are mathematically the same answer.
//!
//! ## Overview
//! - Tokenize and parse expressions with implicit multiplication and the
//!   usual precedence rules (`2x`, `(1+2)(3+4)`, `2^3^2`).
//! - Evaluate against a [`Scope`] of variables and overloaded functions;
//!   extend it with your own signatures at runtime.
//! - Generate question variables from interdependent definitions, with
//!   circular references detected and reported.
//! - Mark free-form answers by sampling: [`compare::compare`] evaluates the
//!   student's and the reference expression at random points and checks
//!   agreement within a configurable tolerance.
//! - Rewrite trees with named rulesets (`basic`, `collectnumbers`, …) and
//!   serialize with [`display::to_source`] / [`display::to_latex`].
//!
//! ## Example
//! ```rust
//! use algebrac::{builtin_scope, compile, evaluate_str, Value};
//!
//! let mut scope = builtin_scope().clone();
//! scope.set_var("a", Value::real(3.0));
//!
//! let value = evaluate_str("a * 2 + sqrt(9)", &scope).unwrap();
//! assert_eq!(value, Value::real(9.0));
//!
//! let tree = compile("2x + 1").unwrap();
//! assert_eq!(algebrac::display::to_source(&tree), "2x + 1");
//! ```
//!
//! ## Marking
//! ```rust
//! use algebrac::{builtin_scope, compare::{compare, CompareSettings}};
//!
//! let settings = CompareSettings::default();
//! assert!(compare("x^2", "x*x", &settings, builtin_scope()));
//! assert!(!compare("x^2", "x^2 + 0.5", &settings, builtin_scope()));
//! ```
//!
//! Evaluation is single-threaded and synchronous; the builtin scope is built
//! once at first use and never mutated, so compiled trees and scopes can be
//! shared freely.

pub mod builtins;
pub mod compare;
pub mod display;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod linalg;
pub mod num;
pub mod parser;
pub mod rules;
pub mod scope;
pub mod value;
pub mod variables;

pub use builtins::builtin_scope;
pub use error::Error;
pub use eval::{evaluate, find_vars, substitute};
pub use parser::Expr;
pub use scope::{FnDef, Param, Scope};
pub use value::{Value, ValueKind};

/// Compiles expression source into a tree: tokenize, then shunt.
pub fn compile(source: &str) -> Result<Expr, Error> {
    parser::shunt(&lexer::tokenise(source)?)
}

/// Compiles and evaluates expression source in one step.
pub fn evaluate_str(source: &str, scope: &Scope) -> Result<Value, Error> {
    eval::evaluate(&compile(source)?, scope)
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use crate::compare::{CompareSettings, compare};
    use crate::rules::collect_ruleset;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_round_trip_evaluation_agrees() {
        let mut scope = builtin_scope().clone();
        scope.set_var("x", Value::real(1.7));
        scope.set_var("y", Value::real(-0.3));

        for source in [
            "2+3*4",
            "x^2 - 3x + 1",
            "-x^2",
            "sin(x) * cos(y)",
            "(x+y)/(x-y)",
            "2^3^2",
            "[1, x, x^2][2]",
            "if(x > y, x, y)",
        ] {
            let tree = compile(source).unwrap();
            let reprinted = compile(&display::to_source(&tree)).unwrap();
            let original = eval::evaluate(&tree, &scope).unwrap();
            let again = eval::evaluate(&reprinted, &scope).unwrap();
            assert!(
                original.strict_eq(&again),
                "round trip of {:?} changed value: {:?} vs {:?}",
                source,
                original,
                again
            );
        }
    }

    #[test]
    fn test_tokenizer_implicit_multiplication_property() {
        let mut scope = builtin_scope().clone();
        scope.set_var("x", Value::real(5.0));
        let a = evaluate_str("2x", &scope).unwrap();
        let b = evaluate_str("2*x", &scope).unwrap();
        assert!(a.strict_eq(&b));

        let grouped = evaluate_str("(1+2)(3+4)", &scope).unwrap();
        assert_eq!(grouped, Value::real(21.0));
    }

    #[test]
    fn test_precedence_properties() {
        let scope = builtin_scope();
        assert_eq!(evaluate_str("2+3*4", scope).unwrap(), Value::real(14.0));
        assert_eq!(evaluate_str("2^3^2", scope).unwrap(), Value::real(512.0));
    }

    #[test]
    fn test_complex_ordering_property() {
        let scope = builtin_scope();
        assert_eq!(
            evaluate_str("(2+3i) < 1", scope).unwrap_err(),
            Error::OrderComplex
        );
    }

    #[test]
    fn test_dimension_padding_property() {
        let scope = builtin_scope();
        assert_eq!(
            evaluate_str("vector(1,2) + vector(1,2,3)", scope).unwrap(),
            Value::Vector(vec![2.0, 4.0, 3.0])
        );
    }

    #[test]
    fn test_comparator_properties() {
        let scope = builtin_scope();
        assert!(compare("x^2", "x*x", &CompareSettings::default(), scope));
        let strict = CompareSettings {
            checking: compare::CheckingFn::AbsDiff,
            accuracy: 0.001,
            ..Default::default()
        };
        assert!(!compare("x^2", "x^2+0.5", &strict, scope));
    }

    #[test]
    fn test_circular_dependency_property() {
        let definitions =
            variables::compile_definitions(&[("a", "b+1"), ("b", "a+1")]).unwrap();
        let err = variables::make_variables(&definitions, builtin_scope()).unwrap_err();
        assert!(matches!(err, Error::CircularReference(_)));
    }

    #[test]
    fn test_simplifier_idempotence_property() {
        let scope = builtin_scope();
        let ruleset = collect_ruleset("all", scope);
        let tree = compile("0 + 1*x + 2*3 + sqrt(y^2)").unwrap();
        let once = rules::simplify(&tree, &ruleset, scope);
        let twice = rules::simplify(&once, &ruleset, scope);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_if_short_circuit_property() {
        assert_eq!(
            evaluate_str("if(true, 1, 1/0)", builtin_scope()).unwrap(),
            Value::real(1.0)
        );
    }

    #[test]
    fn test_range_scenario() {
        let scope = builtin_scope();
        match evaluate_str("1..5#1", scope).unwrap() {
            Value::Range(r) => assert_eq!(r.values(), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0])),
            other => unreachable!("unexpected value {:?}", other),
        }
        match evaluate_str("1..5#0", scope).unwrap() {
            Value::Range(r) => {
                assert_eq!(r.values(), None);
                assert_abs_diff_eq!(r.start, 1.0, epsilon = 1e-12);
                assert_abs_diff_eq!(r.end, 5.0, epsilon = 1e-12);
            }
            other => unreachable!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_custom_function_registration() {
        let mut scope = builtin_scope().clone();
        scope.register(FnDef::new(
            "double",
            vec![Param::Of(ValueKind::Number)],
            |args, _| Ok(Value::Number(args[0].as_number()? * 2.0)),
        ));
        assert_eq!(
            evaluate_str("double(7) + 1", &scope).unwrap(),
            Value::real(15.0)
        );
    }

    #[test]
    fn test_expression_defined_custom_function() {
        // a custom function whose body is itself expression source
        let body = compile("x^2 + 1").unwrap();
        let mut scope = builtin_scope().clone();
        scope.register(FnDef::new(
            "q",
            vec![Param::Of(ValueKind::Number)],
            move |args, caller_scope| {
                let child = caller_scope.child_with(&[("x", args[0].clone())]);
                eval::evaluate(&body, &child)
            },
        ));
        assert_eq!(evaluate_str("q(3)", &scope).unwrap(), Value::real(10.0));
    }

    #[test]
    fn test_variable_generation_end_to_end() {
        // the shape of a randomized question: draw until constraints hold,
        // derive dependent values, interpolate a statement
        let definitions = variables::compile_definitions(&[
            ("a", "satisfy([n], [random(2..9)], [n <> 5], 100)[0]"),
            ("b", "a^2"),
            ("statement", "\"differentiate {a}x^{b}\""),
        ])
        .unwrap();
        let values = variables::make_variables(&definitions, builtin_scope()).unwrap();
        let a = values["a"].as_real().unwrap();
        assert!((2.0..=9.0).contains(&a) && a != 5.0);
        assert_eq!(values["b"].as_real().unwrap(), a * a);
        let statement = values["statement"].as_str().unwrap().to_string();
        assert!(statement.contains(&format!("{}x", a as i64)));
    }
}
