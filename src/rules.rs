//! # rules.rs
//!
//! Pattern-matching term rewriting: the simplification engine.
//!
//! Patterns are their own tree type, converted from ordinary parsed
//! expressions: `?` matches any node, `pattern;name` captures the matched
//! subtree, and the `m_*` pseudo-functions (`m_any`, `m_and`, `m_not`,
//! `m_number`, `m_type`, `m_commute`) build the remaining pattern kinds. A
//! [`Rule`] pairs a pattern with side-condition expressions and a replacement
//! tree; a [`Ruleset`] is an ordered, deduplicated rule list plus display
//! flags.
//!
//! Simplification is a bottom-up fixpoint loop: children first, then each
//! rule in order at every node, restarting on the first rewrite and stopping
//! when no rule fires anywhere (with a hard rewrite budget as the termination
//! backstop). A rule whose side-condition fails to evaluate did not match; an
//! `eval(…)` call in a replacement is evaluated numerically at rewrite time
//! and spliced in as a literal.

use std::collections::HashMap;

use crate::error::Error;
use crate::eval;
use crate::lexer;
use crate::parser::{self, Expr};
use crate::scope::Scope;
use crate::value::{Value, ValueKind};

/// Hard ceiling on rewrites per `simplify` call.
const MAX_REWRITES: usize = 1000;

/// Operators whose operand order is irrelevant for commutative matching.
const COMMUTATIVE_OPS: &[&str] = &["+", "*", "and", "or", "="];

/// A match pattern over expression trees.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `?` — matches any single node, capturing nothing.
    Any,
    /// `pattern;name` — matches the inner pattern and captures the subtree.
    Capture(Box<Pattern>, String),
    /// `m_any(p1, p2, …)` — first matching alternative wins.
    AnyOf(Vec<Pattern>),
    /// `m_and(p1, p2, …)` — every pattern must match the same node.
    AllOf(Vec<Pattern>),
    /// `m_not(p)` — matches when the inner pattern does not.
    Not(Box<Pattern>),
    /// `m_number` — matches a literal number.
    NumberLit,
    /// `m_type(name)` — matches a node of the named type class.
    OfKind(String),
    /// `m_commute(p)` — inner operator patterns match operands in any order.
    Commute(Box<Pattern>),
    /// A literal value that must compare equal.
    Literal(Value),
    /// An operator or call node with positional child patterns.
    Node {
        name: String,
        is_call: bool,
        args: Vec<Pattern>,
    },
    /// A list literal with positional element patterns.
    ListPat(Vec<Pattern>),
}

/// Subtrees captured by a successful match, by capture name.
pub type Bindings = HashMap<String, Expr>;

impl Pattern {
    /// Converts a parsed expression into a pattern.
    ///
    /// Bare names become captures (`x` is shorthand for `?;x`), `?` is the
    /// anonymous wildcard, and the `m_*` pseudo-calls select the other
    /// pattern kinds.
    pub fn from_expr(expr: &Expr) -> Result<Self, Error> {
        match expr {
            Expr::Constant(v) => Ok(Pattern::Literal(v.clone())),
            Expr::Name { name, .. } => {
                if name.chars().all(|c| c == '?') {
                    Ok(Pattern::Any)
                } else {
                    Ok(Pattern::Capture(
                        Box::new(Pattern::Any),
                        name.to_lowercase(),
                    ))
                }
            }
            Expr::Op(";", args) => {
                let name = match &args[1] {
                    Expr::Name { name, .. } => name.to_lowercase(),
                    _ => {
                        return Err(Error::WrongType {
                            expected: "capture name",
                            found: "expression",
                        })
                    }
                };
                Ok(Pattern::Capture(
                    Box::new(Pattern::from_expr(&args[0])?),
                    name,
                ))
            }
            Expr::Op(name, args) => Ok(Pattern::Node {
                name: (*name).to_string(),
                is_call: false,
                args: args
                    .iter()
                    .map(Pattern::from_expr)
                    .collect::<Result<_, _>>()?,
            }),
            Expr::Call { name, args } => match name.to_lowercase().as_str() {
                "m_any" => Ok(Pattern::AnyOf(
                    args.iter()
                        .map(Pattern::from_expr)
                        .collect::<Result<_, _>>()?,
                )),
                "m_and" => Ok(Pattern::AllOf(
                    args.iter()
                        .map(Pattern::from_expr)
                        .collect::<Result<_, _>>()?,
                )),
                "m_not" if args.len() == 1 => {
                    Ok(Pattern::Not(Box::new(Pattern::from_expr(&args[0])?)))
                }
                "m_number" if args.is_empty() => Ok(Pattern::NumberLit),
                "m_type" if args.len() == 1 => {
                    let type_name = match &args[0] {
                        Expr::Name { name, .. } => name.to_lowercase(),
                        Expr::Constant(Value::Str(s)) => s.to_lowercase(),
                        _ => {
                            return Err(Error::WrongType {
                                expected: "type name",
                                found: "expression",
                            })
                        }
                    };
                    Ok(Pattern::OfKind(type_name))
                }
                "m_commute" if args.len() == 1 => {
                    Ok(Pattern::Commute(Box::new(Pattern::from_expr(&args[0])?)))
                }
                _ => Ok(Pattern::Node {
                    name: name.to_lowercase(),
                    is_call: true,
                    args: args
                        .iter()
                        .map(Pattern::from_expr)
                        .collect::<Result<_, _>>()?,
                }),
            },
            Expr::List(items) => Ok(Pattern::ListPat(
                items
                    .iter()
                    .map(Pattern::from_expr)
                    .collect::<Result<_, _>>()?,
            )),
        }
    }

    /// Parses pattern source text.
    pub fn parse(source: &str) -> Result<Self, Error> {
        Pattern::from_expr(&parser::shunt(&lexer::tokenise(source)?)?)
    }
}

/// Matches a pattern against an expression tree.
///
/// Returns the captured subtrees on success. Commutative operand matching is
/// only attempted under an `m_commute` wrapper, since it is combinatorially
/// more expensive than positional matching.
pub fn match_tree(pattern: &Pattern, expr: &Expr) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    if match_inner(pattern, expr, false, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_inner(pattern: &Pattern, expr: &Expr, commute: bool, bindings: &mut Bindings) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Capture(inner, name) => {
            if !match_inner(inner, expr, commute, bindings) {
                return false;
            }
            bind(bindings, name, expr)
        }
        Pattern::AnyOf(options) => {
            for option in options {
                let mut trial = bindings.clone();
                if match_inner(option, expr, commute, &mut trial) {
                    *bindings = trial;
                    return true;
                }
            }
            false
        }
        Pattern::AllOf(parts) => parts
            .iter()
            .all(|part| match_inner(part, expr, commute, bindings)),
        Pattern::Not(inner) => {
            let mut trial = bindings.clone();
            !match_inner(inner, expr, commute, &mut trial)
        }
        Pattern::NumberLit => matches!(expr, Expr::Constant(Value::Number(_))),
        Pattern::OfKind(type_name) => kind_matches(type_name, expr),
        Pattern::Commute(inner) => match_inner(inner, expr, true, bindings),
        Pattern::Literal(value) => match expr {
            Expr::Constant(v) => v.strict_eq(value),
            _ => false,
        },
        Pattern::Node {
            name,
            is_call,
            args,
        } => match_node(name, *is_call, args, expr, commute, bindings),
        Pattern::ListPat(items) => match expr {
            Expr::List(elements) => {
                items.len() == elements.len()
                    && items
                        .iter()
                        .zip(elements)
                        .all(|(p, e)| match_inner(p, e, commute, bindings))
            }
            _ => false,
        },
    }
}

/// Binds a capture, rejecting a second occurrence that captured a different
/// subtree.
fn bind(bindings: &mut Bindings, name: &str, expr: &Expr) -> bool {
    match bindings.get(name) {
        Some(existing) => existing == expr,
        None => {
            bindings.insert(name.to_string(), expr.clone());
            true
        }
    }
}

fn kind_matches(type_name: &str, expr: &Expr) -> bool {
    match type_name {
        "name" => matches!(expr, Expr::Name { .. }),
        "complex" => matches!(expr, Expr::Constant(Value::Number(z)) if z.im != 0.0),
        other => match (ValueKind::from_name(other), expr) {
            (Some(kind), Expr::Constant(v)) => v.kind() == kind,
            (Some(ValueKind::List), Expr::List(_)) => true,
            _ => false,
        },
    }
}

fn match_node(
    name: &str,
    is_call: bool,
    args: &[Pattern],
    expr: &Expr,
    commute: bool,
    bindings: &mut Bindings,
) -> bool {
    let (expr_name, expr_is_call, expr_args) = match expr {
        Expr::Op(op, children) => (*op, false, children.as_slice()),
        Expr::Call {
            name: call_name,
            args: children,
        } => (call_name.as_str(), true, children.as_slice()),
        _ => return false,
    };
    if is_call != expr_is_call {
        return false;
    }
    if !name.eq_ignore_ascii_case(expr_name) {
        return false;
    }

    if commute && COMMUTATIVE_OPS.contains(&name) && !is_call {
        let flat_patterns = flatten_pattern(name, args);
        let flat_exprs = flatten_expr(name, expr_args);
        return match_commuted(name, &flat_patterns, &flat_exprs, bindings);
    }

    args.len() == expr_args.len()
        && args
            .iter()
            .zip(expr_args)
            .all(|(p, e)| match_inner(p, e, commute, bindings))
}

/// Flattens nested applications of one operator into an operand list.
fn flatten_expr<'a>(name: &str, args: &'a [Expr]) -> Vec<&'a Expr> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Expr::Op(op, children) if *op == name => out.extend(flatten_expr(name, children)),
            other => out.push(other),
        }
    }
    out
}

fn flatten_pattern<'a>(name: &str, args: &'a [Pattern]) -> Vec<&'a Pattern> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Pattern::Node {
                name: n,
                is_call: false,
                args: children,
            } if n == name => out.extend(flatten_pattern(name, children)),
            other => out.push(other),
        }
    }
    out
}

/// Matches flattened operand lists in any order.
///
/// The last unconstrained capture term acts as a catch-all, absorbing every
/// operand no other pattern term claimed (rebuilt as a left-associated chain
/// of the operator).
fn match_commuted(
    name: &str,
    patterns: &[&Pattern],
    exprs: &[&Expr],
    bindings: &mut Bindings,
) -> bool {
    let catch_all = patterns
        .iter()
        .rposition(|p| matches!(p, Pattern::Capture(inner, _) if **inner == Pattern::Any));
    let positional: Vec<usize> = (0..patterns.len())
        .filter(|i| Some(*i) != catch_all)
        .collect();

    if catch_all.is_none() && positional.len() != exprs.len() {
        return false;
    }
    if positional.len() > exprs.len() {
        return false;
    }

    let mut used = vec![false; exprs.len()];
    if !assign_terms(&positional, 0, patterns, exprs, &mut used, bindings) {
        return false;
    }

    if let Some(catch_idx) = catch_all {
        let leftover: Vec<&Expr> = exprs
            .iter()
            .zip(&used)
            .filter(|(_, u)| !**u)
            .map(|(e, _)| *e)
            .collect();
        if leftover.is_empty() {
            return false;
        }
        let folded = fold_operands(name, &leftover);
        if let Pattern::Capture(_, cap_name) = patterns[catch_idx] {
            return bind(bindings, cap_name, &folded);
        }
    } else if used.iter().any(|u| !u) {
        return false;
    }
    true
}

/// Backtracking assignment of positional pattern terms to distinct operands.
fn assign_terms(
    positional: &[usize],
    i: usize,
    patterns: &[&Pattern],
    exprs: &[&Expr],
    used: &mut Vec<bool>,
    bindings: &mut Bindings,
) -> bool {
    if i == positional.len() {
        return true;
    }
    let pattern = patterns[positional[i]];
    for (j, expr) in exprs.iter().enumerate() {
        if used[j] {
            continue;
        }
        let mut trial = bindings.clone();
        if match_inner(pattern, expr, true, &mut trial) {
            used[j] = true;
            let saved = std::mem::replace(bindings, trial);
            if assign_terms(positional, i + 1, patterns, exprs, used, bindings) {
                return true;
            }
            *bindings = saved;
            used[j] = false;
        }
    }
    false
}

/// Rebuilds a left-associated operator chain from flattened operands.
fn fold_operands(name: &str, operands: &[&Expr]) -> Expr {
    let static_name = COMMUTATIVE_OPS
        .iter()
        .find(|n| **n == name)
        .copied()
        .unwrap_or("+");
    let mut iter = operands.iter();
    let first = (*iter.next().unwrap()).clone();
    iter.fold(first, |acc, e| {
        Expr::Op(static_name, vec![acc, (*e).clone()])
    })
}

/// A rewrite rule: pattern, side conditions, replacement.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Pattern,
    conditions: Vec<Expr>,
    replacement: Expr,
    key: String,
}

impl Rule {
    /// Compiles a rule from source strings.
    pub fn new(pattern: &str, conditions: &[&str], replacement: &str) -> Result<Self, Error> {
        let condition_trees = conditions
            .iter()
            .map(|c| parser::shunt(&lexer::tokenise(c)?))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            pattern: Pattern::parse(pattern)?,
            conditions: condition_trees,
            replacement: parser::shunt(&lexer::tokenise(replacement)?)?,
            key: format!("{} -> {}", pattern, replacement),
        })
    }

    /// Applies the rule at the root of `expr`, if it matches and its
    /// conditions hold.
    ///
    /// A condition that fails to evaluate means "did not match". The
    /// conditions see the captures as variables in a scope whose ambient
    /// variables have been cleared.
    pub fn apply(&self, expr: &Expr, scope: &Scope) -> Option<Expr> {
        let bindings = match_tree(&self.pattern, expr)?;
        let condition_scope = scope.without_variables();
        for condition in &self.conditions {
            let substituted = substitute_captures(condition, &bindings);
            match eval::evaluate(&substituted, &condition_scope) {
                Ok(Value::Bool(true)) => {}
                _ => return None,
            }
        }
        let replaced = substitute_captures(&self.replacement, &bindings);
        let result = splice_evals(&replaced, &condition_scope)?;
        if &result == expr {
            return None;
        }
        Some(result)
    }
}

/// Replaces capture names in a tree with their captured subtrees.
fn substitute_captures(expr: &Expr, bindings: &Bindings) -> Expr {
    match expr {
        Expr::Name { name, .. } => match bindings.get(&name.to_lowercase()) {
            Some(subtree) => subtree.clone(),
            None => expr.clone(),
        },
        Expr::Constant(_) => expr.clone(),
        Expr::Op(name, args) => Expr::Op(
            *name,
            args.iter()
                .map(|a| substitute_captures(a, bindings))
                .collect(),
        ),
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| substitute_captures(a, bindings))
                .collect(),
        },
        Expr::List(items) => Expr::List(
            items
                .iter()
                .map(|a| substitute_captures(a, bindings))
                .collect(),
        ),
    }
}

/// Evaluates `eval(…)` calls in a replacement tree, splicing in the literal
/// results. Returns `None` when an evaluation fails, which fails the rule.
fn splice_evals(expr: &Expr, scope: &Scope) -> Option<Expr> {
    match expr {
        Expr::Call { name, args } if name.eq_ignore_ascii_case("eval") && args.len() == 1 => {
            let value = eval::evaluate(&args[0], scope).ok()?;
            Some(Expr::Constant(value))
        }
        Expr::Op(name, args) => {
            let spliced = args
                .iter()
                .map(|a| splice_evals(a, scope))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::Op(*name, spliced))
        }
        Expr::Call { name, args } => {
            let spliced = args
                .iter()
                .map(|a| splice_evals(a, scope))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::Call {
                name: name.clone(),
                args: spliced,
            })
        }
        Expr::List(items) => {
            let spliced = items
                .iter()
                .map(|a| splice_evals(a, scope))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::List(spliced))
        }
        _ => Some(expr.clone()),
    }
}

/// Display flags carried by a ruleset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplayFlags {
    /// Render non-integer rationals as fractions.
    pub fractions: bool,
    /// Lay matrices out as row vectors where possible.
    pub rowvector: bool,
    /// Always print an explicit multiplication sign.
    pub always_times: bool,
}

/// An ordered, deduplicated collection of rewrite rules plus display flags.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    rules: Vec<Rule>,
    pub flags: DisplayFlags,
}

impl Ruleset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a ruleset from `(pattern, conditions, replacement)` triples.
    pub fn from_sources(sources: &[(&str, &[&str], &str)]) -> Result<Self, Error> {
        let mut ruleset = Self::new();
        for (pattern, conditions, replacement) in sources {
            ruleset.add(Rule::new(pattern, conditions, replacement)?);
        }
        Ok(ruleset)
    }

    /// Appends a rule unless an identical one is already present.
    pub fn add(&mut self, rule: Rule) {
        if !self.rules.iter().any(|r| r.key == rule.key) {
            self.rules.push(rule);
        }
    }

    /// Appends every rule of another ruleset, keeping order and dropping
    /// duplicates; display flags are OR-combined.
    pub fn extend(&mut self, other: &Ruleset) {
        for rule in &other.rules {
            self.add(rule.clone());
        }
        self.flags.fractions |= other.flags.fractions;
        self.flags.rowvector |= other.flags.rowvector;
        self.flags.always_times |= other.flags.always_times;
    }

    /// Removes every rule that appears in another ruleset.
    pub fn remove_all(&mut self, other: &Ruleset) {
        self.rules.retain(|r| !other.rules.iter().any(|o| o.key == r.key));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Builds a combined ruleset from a comma-separated reference list.
///
/// Each entry names a ruleset to include, a `!`-prefixed ruleset to exclude,
/// or a display flag to switch on. Unknown names are ignored so content can
/// carry flags this engine does not implement.
pub fn collect_ruleset(spec: &str, scope: &Scope) -> Ruleset {
    let mut combined = Ruleset::new();
    let mut excluded: Vec<String> = Vec::new();
    for raw in spec.split(',') {
        let entry = raw.trim().to_lowercase();
        if entry.is_empty() {
            continue;
        }
        if let Some(name) = entry.strip_prefix('!') {
            excluded.push(name.trim().to_string());
            continue;
        }
        if let Some(ruleset) = scope.get_ruleset(&entry) {
            combined.extend(ruleset);
            continue;
        }
        match entry.as_str() {
            "fractions" => combined.flags.fractions = true,
            "rowvector" => combined.flags.rowvector = true,
            "alwaystimes" => combined.flags.always_times = true,
            _ => {}
        }
    }
    for name in excluded {
        if let Some(ruleset) = scope.get_ruleset(&name) {
            combined.remove_all(ruleset);
        }
    }
    combined
}

/// Rewrites a tree to a fixpoint under a ruleset.
///
/// Children are simplified before their parents; at each node the rules are
/// tried in order and the scan restarts on the first rewrite. Terminates when
/// no rule fires anywhere or the rewrite budget runs out.
pub fn simplify(expr: &Expr, ruleset: &Ruleset, scope: &Scope) -> Expr {
    let mut budget = MAX_REWRITES;
    simplify_node(expr, ruleset, scope, &mut budget)
}

fn simplify_node(expr: &Expr, ruleset: &Ruleset, scope: &Scope, budget: &mut usize) -> Expr {
    let mut current = map_children(expr, |child| simplify_node(child, ruleset, scope, budget));
    loop {
        if *budget == 0 {
            return current;
        }
        let mut fired = false;
        for rule in ruleset.rules() {
            if let Some(next) = rule.apply(&current, scope) {
                *budget -= 1;
                // a rewrite can expose new redexes in the children
                current = map_children(&next, |child| {
                    simplify_node(child, ruleset, scope, budget)
                });
                fired = true;
                break;
            }
        }
        if !fired {
            return current;
        }
    }
}

fn map_children(expr: &Expr, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
    match expr {
        Expr::Op(name, args) => Expr::Op(*name, args.iter().map(&mut f).collect()),
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args.iter().map(&mut f).collect(),
        },
        Expr::List(items) => Expr::List(items.iter().map(&mut f).collect()),
        other => other.clone(),
    }
}

/// Registers the standard simplification rulesets on a scope.
///
/// `all` is the union of every named set.
pub fn register_builtin_rulesets(scope: &mut Scope) {
    let sets: &[(&str, &[(&str, &[&str], &str)])] = &[
        ("basic", &[
            ("+(?;x)", &[], "x"),
            ("-(-(?;x))", &[], "x"),
            ("(?;x) + (-(?;y))", &[], "x - y"),
            ("(?;x) - (-(?;y))", &[], "x + y"),
        ]),
        ("unitfactor", &[
            ("1*(?;x)", &[], "x"),
            ("(?;x)*1", &[], "x"),
        ]),
        ("unitpower", &[
            ("(?;x)^1", &[], "x"),
        ]),
        ("unitdenominator", &[
            ("(?;x)/1", &[], "x"),
        ]),
        ("zerofactor", &[
            ("(?;x)*0", &[], "0"),
            ("0*(?;x)", &[], "0"),
            ("0/(?;x)", &[], "0"),
        ]),
        ("zeroterm", &[
            ("0+(?;x)", &[], "x"),
            ("(?;x)+0", &[], "x"),
            ("(?;x)-0", &[], "x"),
            ("0-(?;x)", &[], "-x"),
        ]),
        ("zeropower", &[
            ("(?;x)^0", &[], "1"),
        ]),
        ("zerobase", &[
            ("0^(?;x)", &[], "0"),
        ]),
        ("collectnumbers", &[
            ("(?;n)+(?;m)", &["n isa number", "m isa number"], "eval(n+m)"),
            ("(?;n)-(?;m)", &["n isa number", "m isa number"], "eval(n-m)"),
            ("(?;n)*(?;m)", &["n isa number", "m isa number"], "eval(n*m)"),
            // the type constraints sit inside the pattern so commutative
            // matching backtracks to a valid operand assignment
            (
                "m_commute(m_and(m_number(), ?;n) + (m_and(m_number(), ?;m) + (?;x)))",
                &[],
                "eval(n+m)+x",
            ),
        ]),
        ("constantsfirst", &[
            (
                "(?;x)*(?;n)",
                &["n isa number", "not (x isa number)"],
                "n*x",
            ),
        ]),
        ("sqrtproduct", &[
            ("sqrt(?;x)*sqrt(?;y)", &[], "sqrt(x*y)"),
        ]),
        ("sqrtdivision", &[
            ("sqrt(?;x)/sqrt(?;y)", &[], "sqrt(x/y)"),
        ]),
        ("sqrtsquare", &[
            ("sqrt((?;x)^2)", &[], "x"),
            ("sqrt(?;x)^2", &[], "x"),
        ]),
        ("othernumbers", &[
            ("(?;n)^(?;m)", &["n isa number", "m isa number"], "eval(n^m)"),
        ]),
    ];

    let mut all = Ruleset::new();
    for (name, sources) in sets {
        let ruleset = Ruleset::from_sources(sources)
            .expect("builtin simplification rules must compile");
        all.extend(&ruleset);
        scope.set_ruleset(name, ruleset);
    }
    scope.set_ruleset("all", all);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    fn parse(source: &str) -> Expr {
        parser::shunt(&lexer::tokenise(source).unwrap()).unwrap()
    }

    fn simplified(source: &str, sets: &str) -> Expr {
        let scope = builtins::builtin_scope();
        let ruleset = collect_ruleset(sets, scope);
        simplify(&parse(source), &ruleset, scope)
    }

    #[test]
    fn test_wildcard_matches_anything() {
        let pattern = Pattern::parse("?").unwrap();
        assert!(match_tree(&pattern, &parse("x+1")).is_some());
        assert!(match_tree(&pattern, &parse("sin(2)")).is_some());
    }

    #[test]
    fn test_capture_names_subtree() {
        let pattern = Pattern::parse("(?;x) + 0").unwrap();
        let bindings = match_tree(&pattern, &parse("(a*2) + 0")).unwrap();
        assert_eq!(bindings["x"], parse("a*2"));
        assert!(match_tree(&pattern, &parse("a + 1")).is_none());
    }

    #[test]
    fn test_bare_name_is_a_capture() {
        let pattern = Pattern::parse("x + x").unwrap();
        // both occurrences must capture the same subtree
        assert!(match_tree(&pattern, &parse("a + a")).is_some());
        assert!(match_tree(&pattern, &parse("a + b")).is_none());
    }

    #[test]
    fn test_m_any_first_match_wins() {
        let pattern = Pattern::parse("m_any(sin(?;x), cos(?;x))").unwrap();
        assert!(match_tree(&pattern, &parse("sin(1)")).is_some());
        assert!(match_tree(&pattern, &parse("cos(1)")).is_some());
        assert!(match_tree(&pattern, &parse("tan(1)")).is_none());
    }

    #[test]
    fn test_m_and_and_m_not() {
        let pattern = Pattern::parse("m_and(?;x, m_not(m_number()))").unwrap();
        assert!(match_tree(&pattern, &parse("a")).is_some());
        assert!(match_tree(&pattern, &parse("3")).is_none());
    }

    #[test]
    fn test_m_type() {
        let pattern = Pattern::parse("m_type(name)").unwrap();
        assert!(match_tree(&pattern, &parse("somevar")).is_some());
        assert!(match_tree(&pattern, &parse("3")).is_none());
    }

    #[test]
    fn test_commutative_matching() {
        // positionally 0 is on the right only
        let plain = Pattern::parse("(?;x) + 0").unwrap();
        assert!(match_tree(&plain, &parse("0 + a")).is_none());

        let commuted = Pattern::parse("m_commute((?;x) + 0)").unwrap();
        let bindings = match_tree(&commuted, &parse("0 + a")).unwrap();
        assert_eq!(bindings["x"], parse("a"));
    }

    #[test]
    fn test_commutative_catch_all_absorbs() {
        let pattern = Pattern::parse(
            "m_commute(m_and(m_number(), ?;n) + (m_and(m_number(), ?;m) + (?;x)))",
        )
        .unwrap();
        let tree = parse("1 + y + 2");
        let bindings = match_tree(&pattern, &tree).unwrap();
        // the constrained terms take the two numbers; y is left for the
        // catch-all
        assert_eq!(bindings["x"], parse("y"));
        assert!(matches!(bindings["n"], Expr::Constant(_)));
        assert!(matches!(bindings["m"], Expr::Constant(_)));
    }

    #[test]
    fn test_rule_with_condition() {
        let rule = Rule::new("(?;n)+(?;m)", &["n isa number", "m isa number"], "eval(n+m)")
            .unwrap();
        let scope = builtins::builtin_scope();
        let result = rule.apply(&parse("2+3"), scope).unwrap();
        assert_eq!(result, Expr::number(5.0));
        // condition fails when a side is not a literal number
        assert!(rule.apply(&parse("x+3"), scope).is_none());
    }

    #[test]
    fn test_throwing_condition_is_no_match() {
        // dividing a boolean errors out; the rule must not fire
        let rule = Rule::new("(?;x)+0", &["x/0 > 1"], "x").unwrap();
        let scope = builtins::builtin_scope();
        assert!(rule.apply(&parse("true+0"), scope).is_none());
    }

    #[test]
    fn test_simplify_strips_identities() {
        let result = simplified("x + 0", "zeroterm");
        assert_eq!(result, parse("x"));
        let result = simplified("1*x + 0", "zeroterm, unitfactor");
        assert_eq!(result, parse("x"));
    }

    #[test]
    fn test_simplify_folds_constants() {
        let result = simplified("2+3*4", "collectnumbers");
        assert_eq!(result, Expr::number(14.0));
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let scope = builtins::builtin_scope();
        let ruleset = collect_ruleset("all", scope);
        let once = simplify(&parse("1*x + 0 + 2*3"), &ruleset, scope);
        let twice = simplify(&once, &ruleset, scope);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ruleset_composition_with_exclusion() {
        let scope = builtins::builtin_scope();
        let with = collect_ruleset("zeroterm, unitfactor", scope);
        let without = collect_ruleset("zeroterm, unitfactor, !unitfactor", scope);
        assert!(with.len() > without.len());
        assert_eq!(without.len(), collect_ruleset("zeroterm", scope).len());
    }

    #[test]
    fn test_flag_entries_toggle_flags() {
        let scope = builtins::builtin_scope();
        let ruleset = collect_ruleset("basic, fractions", scope);
        assert!(ruleset.flags.fractions);
        assert!(!ruleset.flags.rowvector);
    }

    #[test]
    fn test_sqrt_rules() {
        let result = simplified("sqrt(x)*sqrt(y)", "sqrtproduct");
        assert_eq!(result, parse("sqrt(x*y)"));
        let result = simplified("sqrt(x^2)", "sqrtsquare");
        assert_eq!(result, parse("x"));
    }

    #[test]
    fn test_constants_first() {
        let result = simplified("x*3", "constantsfirst");
        assert_eq!(result, parse("3*x"));
    }
}
