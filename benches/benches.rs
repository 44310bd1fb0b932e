//! benches.rs
use criterion::{criterion_group, criterion_main, Criterion};

use algebrac::compare::{compare, CompareSettings};
use algebrac::rules::collect_ruleset;
use algebrac::{builtin_scope, compile, display, eval, rules, Value};

fn bench_compile_operands(c: &mut Criterion) {
    let make_many_operands = |n: usize| (0..=n).map(|_| "x").collect::<Vec<_>>().join("+");
    for n in [1, 10, 100, 1000] {
        let source = make_many_operands(n);
        c.bench_function(&format!("compile {} operands", n), |b| {
            b.iter(|| {
                let _ = compile(&source);
            })
        });

        let tree = compile(&source).unwrap();
        let mut scope = builtin_scope().clone();
        scope.set_var("x", Value::real(1.0));
        c.bench_function(&format!("evaluate {} operands", n), |b| {
            b.iter(|| eval::evaluate(&tree, &scope))
        });
    }
}

fn bench_compile_nested(c: &mut Criterion) {
    let make_nested = |n: usize| {
        let mut source = "x".to_string();
        for _ in 0..n {
            source = format!("sin({})", source);
        }
        source
    };
    for n in [1, 10, 100] {
        let source = make_nested(n);
        c.bench_function(&format!("compile {} nested", n), |b| {
            b.iter(|| {
                let _ = compile(&source);
            })
        });

        let tree = compile(&source).unwrap();
        let mut scope = builtin_scope().clone();
        scope.set_var("x", Value::real(1.0));
        c.bench_function(&format!("evaluate {} nested", n), |b| {
            b.iter(|| eval::evaluate(&tree, &scope))
        });
    }
}

fn bench_simplify(c: &mut Criterion) {
    let scope = builtin_scope();
    let ruleset = collect_ruleset("all", scope);
    let tree = compile("0 + 1*x + 2*3 + sqrt(y^2) + 0*z + x^1").unwrap();
    c.bench_function("simplify identities", |b| {
        b.iter(|| rules::simplify(&tree, &ruleset, scope))
    });
}

fn bench_display(c: &mut Criterion) {
    let tree = compile("(x+1)^2 / (2x - sin(y)) + [1, 2, 3][0]").unwrap();
    c.bench_function("serialize to source", |b| {
        b.iter(|| display::to_source(&tree))
    });
}

fn bench_compare(c: &mut Criterion) {
    let scope = builtin_scope();
    let settings = CompareSettings::default();
    c.bench_function("compare equivalent", |b| {
        b.iter(|| compare("(x+1)^2", "x^2+2x+1", &settings, scope))
    });
    c.bench_function("compare different", |b| {
        b.iter(|| compare("(x+1)^2", "x^2+2x+2", &settings, scope))
    });
}

criterion_group!(
    benches,
    bench_compile_operands,
    bench_compile_nested,
    bench_simplify,
    bench_display,
    bench_compare
);
criterion_main!(benches);
