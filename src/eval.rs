//! # eval.rs
//!
//! The tree-walking evaluator.
//!
//! Most operator and function nodes evaluate their children eagerly and then
//! dispatch to the first matching signature in scope. A small fixed set of
//! constructs is lazy: `if` and `switch` must not touch untaken branches,
//! `repeat` re-evaluates its body, `map` and `satisfy` introduce new bindings
//! for sub-evaluations, and `isa` reads its right-hand side as a type name
//! rather than a value. These are intercepted by name before any argument is
//! evaluated and drive their own sub-evaluations in child scopes.
//!
//! The module also provides tree substitution (used for partial evaluation of
//! templates), free-variable extraction, and `{…}` string interpolation.

use std::collections::BTreeSet;

use crate::error::Error;
use crate::lexer;
use crate::parser::{self, Expr};
use crate::scope::Scope;
use crate::value::Value;

/// Default iteration budget for `satisfy` when none is given.
const DEFAULT_SATISFY_RUNS: i64 = 100;

/// Evaluates an expression tree in a scope.
///
/// # Arguments
///
/// * `expr` - The tree to evaluate.
/// * `scope` - Variable, function and ruleset bindings.
///
/// # Returns
///
/// * `Ok(Value)` on success.
/// * `Err` with a binding or dispatch error otherwise; errors propagate to
///   the caller except where a lazy construct's contract says a sub-tree is
///   never evaluated at all.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, Error> {
    match expr {
        Expr::Constant(Value::Str(s)) => Ok(Value::Str(interpolate(s, scope)?)),
        Expr::Constant(v) => Ok(v.clone()),
        Expr::Name { name, .. } => scope
            .get_var(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedVariable(name.clone())),
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Expr::Op("isa", args) => eval_isa(args, scope),
        Expr::Op(name, args) => eval_eager(name, args, scope, false),
        Expr::Call { name, args } => match name.to_lowercase().as_str() {
            "if" => eval_if(args, scope),
            "switch" => eval_switch(args, scope),
            "repeat" => eval_repeat(args, scope),
            "map" => eval_map(args, scope),
            "satisfy" => eval_satisfy(args, scope),
            _ => eval_eager(name, args, scope, true),
        },
    }
}

/// Evaluates every child then dispatches to the best signature in scope.
fn eval_eager(name: &str, args: &[Expr], scope: &Scope, is_call: bool) -> Result<Value, Error> {
    let values = args
        .iter()
        .map(|arg| evaluate(arg, scope))
        .collect::<Result<Vec<_>, _>>()?;
    dispatch(name, &values, scope, is_call)
}

/// Looks up and applies the first registered signature matching the argument
/// types.
pub fn dispatch(name: &str, args: &[Value], scope: &Scope, is_call: bool) -> Result<Value, Error> {
    if let Some(def) = scope.find_signature(name, args) {
        return def.call(args, scope);
    }
    if scope.has_function(name) {
        let kinds = args
            .iter()
            .map(|a| a.kind().name())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::NoMatchingSignature {
            name: name.to_string(),
            kinds,
        });
    }
    // `xtan(y)` is usually a missing multiplication sign in `x*tan(y)`
    let suggestion = if is_call && name.chars().count() > 1 {
        let mut chars = name.chars();
        let first = chars.next().unwrap();
        let rest: String = chars.collect();
        if scope.has_function(&rest) {
            Some(format!("{}*{}", first, rest))
        } else {
            None
        }
    } else {
        None
    };
    Err(Error::NoSuchFunction {
        name: name.to_string(),
        suggestion,
    })
}

/// `if(cond, a, b)` — exactly one branch is ever evaluated.
fn eval_if(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    if args.len() != 3 {
        return Err(Error::NotEnoughArguments("if".into()));
    }
    let cond = evaluate(&args[0], scope)?.as_bool()?;
    if cond {
        evaluate(&args[1], scope)
    } else {
        evaluate(&args[2], scope)
    }
}

/// `switch(c1, v1, c2, v2, …, default)` — short-circuits on the first true
/// condition; the trailing odd argument is the default.
fn eval_switch(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    let mut i = 0;
    while i + 1 < args.len() {
        if evaluate(&args[i], scope)?.as_bool()? {
            return evaluate(&args[i + 1], scope);
        }
        i += 2;
    }
    if args.len() % 2 == 1 {
        evaluate(&args[args.len() - 1], scope)
    } else {
        Err(Error::NoDefaultCase)
    }
}

/// `repeat(expr, n)` — evaluates the body n times, collecting a list.
fn eval_repeat(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    if args.len() != 2 {
        return Err(Error::NotEnoughArguments("repeat".into()));
    }
    let n = evaluate(&args[1], scope)?.as_int("repeat")?;
    let mut out = Vec::new();
    for _ in 0..n.max(0) {
        out.push(evaluate(&args[0], scope)?);
    }
    Ok(Value::List(out))
}

/// `map(expr, name(s), collection)` — evaluates the body once per element in
/// a child scope binding the name(s).
fn eval_map(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    if args.len() != 3 {
        return Err(Error::NotEnoughArguments("map".into()));
    }
    let binders = binding_names(&args[1])?;
    let elements = collection_elements(evaluate(&args[2], scope)?)?;

    let mut out = Vec::new();
    for element in elements {
        let child = bind_element(scope, &binders, element)?;
        out.push(evaluate(&args[0], &child)?);
    }
    Ok(Value::List(out))
}

/// `satisfy(names, definitions, conditions, maxRuns)` — rejection sampling:
/// redraw the definitions until every condition holds.
fn eval_satisfy(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    if args.len() < 3 {
        return Err(Error::NotEnoughArguments("satisfy".into()));
    }
    let names = binding_names(&args[0])?;
    let defs = expr_list(&args[1], "satisfy")?;
    let conditions = expr_list(&args[2], "satisfy")?;
    if names.len() != defs.len() {
        return Err(Error::NotEnoughArguments("satisfy".into()));
    }
    let max_runs = match args.get(3) {
        Some(expr) => evaluate(expr, scope)?.as_int("satisfy")?,
        None => DEFAULT_SATISFY_RUNS,
    };

    for _ in 0..max_runs.max(0) {
        let mut child = scope.clone();
        for (name, def) in names.iter().zip(defs) {
            let value = evaluate(def, &child)?;
            child.set_var(name, value);
        }
        let mut ok = true;
        for condition in conditions {
            if !evaluate(condition, &child)?.as_bool()? {
                ok = false;
                break;
            }
        }
        if ok {
            let values = names
                .iter()
                .map(|n| child.get_var(n).cloned().unwrap())
                .collect();
            return Ok(Value::List(values));
        }
    }
    Err(Error::TooManyRuns(max_runs.max(0) as usize))
}

/// `x isa typename` — the right-hand side is a type name, never evaluated.
fn eval_isa(args: &[Expr], scope: &Scope) -> Result<Value, Error> {
    if args.len() != 2 {
        return Err(Error::NotEnoughArguments("isa".into()));
    }
    let type_name = match &args[1] {
        Expr::Name { name, .. } => name.to_lowercase(),
        Expr::Constant(Value::Str(s)) => s.to_lowercase(),
        _ => {
            return Err(Error::WrongType {
                expected: "type name",
                found: "expression",
            })
        }
    };
    // an unbound name on the left is itself a value of type "name"
    if let Expr::Name { name, .. } = &args[0] {
        if scope.get_var(name).is_none() {
            return Ok(Value::Bool(type_name == "name"));
        }
    }
    // a subtree that cannot be evaluated is not of any value type
    let value = match evaluate(&args[0], scope) {
        Ok(value) => value,
        Err(Error::UndefinedVariable(_)) => return Ok(Value::Bool(false)),
        Err(err) => return Err(err),
    };
    let matches = match type_name.as_str() {
        "complex" => matches!(&value, Value::Number(z) if z.im != 0.0),
        name => value.kind().name() == name,
    };
    Ok(Value::Bool(matches))
}

/// The names bound by a `map`/`satisfy` binder argument: a single name or a
/// list of names.
fn binding_names(expr: &Expr) -> Result<Vec<String>, Error> {
    match expr {
        Expr::Name { name, .. } => Ok(vec![name.to_lowercase()]),
        Expr::List(items) => items
            .iter()
            .map(|item| match item {
                Expr::Name { name, .. } => Ok(name.to_lowercase()),
                _ => Err(Error::WrongType {
                    expected: "name",
                    found: "expression",
                }),
            })
            .collect(),
        _ => Err(Error::WrongType {
            expected: "name",
            found: "expression",
        }),
    }
}

/// The elements a `map` iterates over: a list, a set, or a discrete range.
fn collection_elements(value: Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::List(items) | Value::Set(items) => Ok(items),
        Value::Range(r) => match r.values() {
            Some(values) => Ok(values.into_iter().map(Value::real).collect()),
            None => Err(Error::WrongType {
                expected: "discrete range",
                found: "continuous range",
            }),
        },
        other => Err(Error::WrongType {
            expected: "list",
            found: other.kind().name(),
        }),
    }
}

/// Binds a collection element to the binder names in a fresh child scope.
fn bind_element(scope: &Scope, binders: &[String], element: Value) -> Result<Scope, Error> {
    if binders.len() == 1 {
        return Ok(scope.child_with(&[(binders[0].as_str(), element)]));
    }
    // several names unpack the components of a list element
    let parts = match element {
        Value::List(items) if items.len() >= binders.len() => items,
        other => {
            return Err(Error::WrongType {
                expected: "list",
                found: other.kind().name(),
            })
        }
    };
    let mut child = scope.clone();
    for (name, part) in binders.iter().zip(parts) {
        child.set_var(name, part);
    }
    Ok(child)
}

/// A lazy construct's raw argument list.
fn expr_list<'a>(expr: &'a Expr, context: &str) -> Result<&'a [Expr], Error> {
    match expr {
        Expr::List(items) => Ok(items),
        _ => Err(Error::NotEnoughArguments(context.to_string())),
    }
}

/// Replaces bound names in a tree with their values from `scope`.
///
/// With `partial` set, unbound names stay in place (used when instantiating
/// templates in stages); otherwise an unbound name is an error. Names
/// shadowed by `map`/`satisfy` binders are never substituted inside their
/// bodies, and `isa`'s type name is left alone.
pub fn substitute(expr: &Expr, scope: &Scope, partial: bool) -> Result<Expr, Error> {
    match expr {
        Expr::Constant(_) => Ok(expr.clone()),
        Expr::Name { name, .. } => match scope.get_var(name) {
            Some(value) => Ok(Expr::Constant(value.clone())),
            None if partial => Ok(expr.clone()),
            None => Err(Error::UndefinedVariable(name.clone())),
        },
        Expr::List(items) => {
            let subbed = items
                .iter()
                .map(|item| substitute(item, scope, partial))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::List(subbed))
        }
        Expr::Op("isa", args) if args.len() == 2 => {
            let left = substitute(&args[0], scope, partial)?;
            Ok(Expr::Op("isa", vec![left, args[1].clone()]))
        }
        Expr::Op(name, args) => {
            let subbed = args
                .iter()
                .map(|arg| substitute(arg, scope, partial))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Op(*name, subbed))
        }
        Expr::Call { name, args } => {
            let lower = name.to_lowercase();
            if (lower == "map" && args.len() == 3) || (lower == "satisfy" && args.len() >= 3) {
                return substitute_binding_call(name, args, scope, partial);
            }
            let subbed = args
                .iter()
                .map(|arg| substitute(arg, scope, partial))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call {
                name: name.clone(),
                args: subbed,
            })
        }
    }
}

/// Substitution under `map`/`satisfy`: binder names shadow the scope inside
/// the body, and the binder argument itself is untouched.
fn substitute_binding_call(
    name: &str,
    args: &[Expr],
    scope: &Scope,
    partial: bool,
) -> Result<Expr, Error> {
    let lower = name.to_lowercase();
    let mut subbed = args.to_vec();
    if lower == "map" {
        let binders = binding_names(&args[1])?;
        let inner = scope.without_vars(&binders);
        subbed[0] = substitute(&args[0], &inner, true)?;
        subbed[2] = substitute(&args[2], scope, partial)?;
    } else {
        let binders = binding_names(&args[0])?;
        let inner = scope.without_vars(&binders);
        subbed[1] = substitute(&args[1], &inner, true)?;
        subbed[2] = substitute(&args[2], &inner, true)?;
        if let Some(max_runs) = args.get(3) {
            subbed[3] = substitute(max_runs, scope, partial)?;
        }
    }
    Ok(Expr::Call {
        name: name.to_string(),
        args: subbed,
    })
}

/// The free variable names of a tree, lowercased, sorted and deduplicated.
///
/// Binder names of `map` and `satisfy` are excluded inside the trees they
/// bind, and `isa`'s right-hand side is a type name, not a variable. Names
/// referenced inside string interpolations count.
pub fn find_vars(expr: &Expr) -> Vec<String> {
    let mut vars = BTreeSet::new();
    collect_vars(expr, &mut vars);
    vars.into_iter().collect()
}

fn collect_vars(expr: &Expr, vars: &mut BTreeSet<String>) {
    match expr {
        Expr::Constant(Value::Str(s)) => {
            for inner in interpolation_segments(s) {
                if let Ok(tokens) = lexer::tokenise(&inner) {
                    if let Ok(tree) = parser::shunt(&tokens) {
                        collect_vars(&tree, vars);
                    }
                }
            }
        }
        Expr::Constant(_) => {}
        Expr::Name { name, .. } => {
            vars.insert(name.to_lowercase());
        }
        Expr::List(items) => {
            for item in items {
                collect_vars(item, vars);
            }
        }
        Expr::Op("isa", args) if args.len() == 2 => collect_vars(&args[0], vars),
        Expr::Op(_, args) => {
            for arg in args {
                collect_vars(arg, vars);
            }
        }
        Expr::Call { name, args } => match (name.to_lowercase().as_str(), args.len()) {
            ("map", 3) => {
                let binders = binding_names(&args[1]).unwrap_or_default();
                let mut body = BTreeSet::new();
                collect_vars(&args[0], &mut body);
                for binder in &binders {
                    body.remove(binder);
                }
                vars.extend(body);
                collect_vars(&args[2], vars);
            }
            ("satisfy", n) if n >= 3 => {
                let binders = binding_names(&args[0]).unwrap_or_default();
                let mut body = BTreeSet::new();
                collect_vars(&args[1], &mut body);
                collect_vars(&args[2], &mut body);
                for binder in &binders {
                    body.remove(binder);
                }
                vars.extend(body);
                if let Some(max_runs) = args.get(3) {
                    collect_vars(max_runs, vars);
                }
            }
            _ => {
                for arg in args {
                    collect_vars(arg, vars);
                }
            }
        },
    }
}

/// Substitutes `{…}` segments of a string by evaluating them in `scope`.
///
/// `\{` and `\}` denote literal braces.
pub fn interpolate(text: &str, scope: &Scope) -> Result<String, Error> {
    if !text.contains('{') {
        return Ok(unescape_braces(text));
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some('{') | Some('}')) => {
                out.push(chars[i + 1]);
                i += 2;
            }
            '{' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != '}' {
                    j += 1;
                }
                if j == chars.len() {
                    let rest: String = chars[i..].iter().take(8).collect();
                    return Err(Error::InvalidExpression(rest));
                }
                let inner: String = chars[i + 1..j].iter().collect();
                let tree = parser::shunt(&lexer::tokenise(&inner)?)?;
                let value = evaluate(&tree, scope)?;
                out.push_str(&value.to_string());
                i = j + 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// The `{…}` sub-expression sources of a string, for free-variable scans.
fn interpolation_segments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some('{') | Some('}')) => i += 2,
            '{' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != '}' {
                    j += 1;
                }
                if j == chars.len() {
                    break;
                }
                segments.push(chars[i + 1..j].iter().collect());
                i = j + 1;
            }
            _ => i += 1,
        }
    }
    segments
}

fn unescape_braces(text: &str) -> String {
    text.replace("\\{", "{").replace("\\}", "}")
}
