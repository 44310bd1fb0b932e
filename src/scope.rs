//! # scope.rs
//!
//! Evaluation environments: variable bindings, overloaded function
//! signatures, and named rulesets.
//!
//! A scope owns its three maps outright. Child scopes are built by copying a
//! list of parents at construction time, so there are no parent pointers and
//! no cycles; a scope discarded after an evaluation pass takes nothing with
//! it. Variable and ruleset entries from later parents override earlier ones,
//! while function signature lists concatenate so every overload stays
//! reachable in registration order.
//!
//! The builtin scope is a process-wide singleton built once by
//! [`crate::builtins`] and never mutated afterwards; every evaluation layers
//! on top of it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::rules::Ruleset;
use crate::value::{Value, ValueKind};

/// One parameter slot in a function signature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    /// An argument of exactly this type.
    Of(ValueKind),
    /// One argument of any type.
    Any,
    /// Zero or more trailing arguments, optionally all of one type.
    Rest(Option<ValueKind>),
}

/// The native implementation of a function signature.
pub type FnImpl = Arc<dyn Fn(&[Value], &Scope) -> Result<Value, Error> + Send + Sync>;

/// A single overload of a named function or operator.
#[derive(Clone)]
pub struct FnDef {
    name: String,
    params: Vec<Param>,
    body: FnImpl,
}

impl FnDef {
    pub fn new<F>(name: &str, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&[Value], &Scope) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.to_lowercase(),
            params,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this overload accepts the given argument kinds.
    ///
    /// Parameters match positionally; `Rest` consumes the remainder of the
    /// argument list (possibly nothing).
    pub fn accepts(&self, args: &[Value]) -> bool {
        let mut i = 0;
        for param in &self.params {
            match param {
                Param::Of(kind) => {
                    if args.get(i).map(Value::kind) != Some(*kind) {
                        return false;
                    }
                    i += 1;
                }
                Param::Any => {
                    if i >= args.len() {
                        return false;
                    }
                    i += 1;
                }
                Param::Rest(kind) => {
                    if let Some(kind) = kind {
                        if !args[i..].iter().all(|a| a.kind() == *kind) {
                            return false;
                        }
                    }
                    i = args.len();
                }
            }
        }
        i == args.len()
    }

    pub fn call(&self, args: &[Value], scope: &Scope) -> Result<Value, Error> {
        (self.body)(args, scope)
    }
}

impl std::fmt::Debug for FnDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A layered evaluation environment.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, Value>,
    functions: HashMap<String, Vec<FnDef>>,
    rulesets: HashMap<String, Ruleset>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a scope by copying a list of parents in order.
    ///
    /// Later parents override earlier ones for variables and rulesets;
    /// function overload lists are concatenated in parent order.
    pub fn from_layers(parents: &[&Scope]) -> Self {
        let mut scope = Self::new();
        for parent in parents {
            for (k, v) in &parent.variables {
                scope.variables.insert(k.clone(), v.clone());
            }
            for (k, defs) in &parent.functions {
                scope
                    .functions
                    .entry(k.clone())
                    .or_default()
                    .extend(defs.iter().cloned());
            }
            for (k, r) in &parent.rulesets {
                scope.rulesets.insert(k.clone(), r.clone());
            }
        }
        scope
    }

    /// A child of this scope with extra variable bindings.
    pub fn child_with(&self, bindings: &[(&str, Value)]) -> Self {
        let mut scope = self.clone();
        for (name, value) in bindings {
            scope.set_var(name, value.clone());
        }
        scope
    }

    /// A copy of this scope with every variable binding removed.
    ///
    /// Rule side-conditions run in such a scope so ambient variable values
    /// cannot leak into a simplification.
    pub fn without_variables(&self) -> Self {
        let mut scope = self.clone();
        scope.variables.clear();
        scope
    }

    /// A copy of this scope with the named variables unbound.
    ///
    /// Used when descending under a binding construct, whose bound names
    /// shadow any ambient values.
    pub fn without_vars(&self, names: &[String]) -> Self {
        let mut scope = self.clone();
        for name in names {
            scope.variables.remove(&name.to_lowercase());
        }
        scope
    }

    /// Looks up a variable, case-insensitively.
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.variables.get(&name.to_lowercase())
    }

    /// Binds a variable, case-insensitively.
    pub fn set_var(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_lowercase(), value);
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &String> {
        self.variables.keys()
    }

    /// Registers a function overload at the end of its name's list.
    pub fn register(&mut self, def: FnDef) {
        self.functions.entry(def.name().to_string()).or_default().push(def);
    }

    /// Whether any overload exists under this name.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// The first overload, in registration order, accepting these arguments.
    pub fn find_signature(&self, name: &str, args: &[Value]) -> Option<&FnDef> {
        self.functions
            .get(&name.to_lowercase())
            .and_then(|defs| defs.iter().find(|d| d.accepts(args)))
    }

    /// Registers a named ruleset.
    pub fn set_ruleset(&mut self, name: &str, ruleset: Ruleset) {
        self.rulesets.insert(name.to_lowercase(), ruleset);
    }

    pub fn get_ruleset(&self, name: &str) -> Option<&Ruleset> {
        self.rulesets.get(&name.to_lowercase())
    }
}
