//! # variables.rs
//!
//! Topological evaluation of interdependent variable definitions.
//!
//! Question content defines variables as expression source; a definition may
//! reference other defined variables freely. Resolution is depth-first along
//! the free-variable edges with an explicit path stack: a name already on the
//! path is a circular reference (reported with the whole cycle), a referenced
//! name with neither a definition nor a binding in the base scope is
//! undefined. Evaluated values are memoized into the working scope so shared
//! dependencies are computed once.

use std::collections::HashMap;

use crate::error::Error;
use crate::eval;
use crate::lexer;
use crate::parser::{self, Expr};
use crate::scope::Scope;
use crate::value::Value;

/// Compiles a dictionary of `name -> source` definitions.
///
/// An empty source is reported as an empty definition rather than a generic
/// parse error, since it almost always means a blank field in authored
/// content.
pub fn compile_definitions(
    sources: &[(&str, &str)],
) -> Result<HashMap<String, Expr>, Error> {
    let mut definitions = HashMap::new();
    for (name, source) in sources {
        if source.trim().is_empty() {
            return Err(Error::EmptyDefinition((*name).to_string()));
        }
        let tree = parser::shunt(&lexer::tokenise(source)?)?;
        definitions.insert(name.to_lowercase(), tree);
    }
    Ok(definitions)
}

/// Evaluates every definition in dependency order.
///
/// # Arguments
///
/// * `definitions` - Compiled definition trees by (lowercased) name.
/// * `scope` - The base scope; its bindings satisfy references that have no
///   definition of their own.
///
/// # Returns
///
/// * `Ok` with the evaluated value of every defined name.
/// * `Err(Error::CircularReference)` naming the cycle, or
///   `Err(Error::UndefinedVariable)` for a reference with no definition and
///   no base binding; evaluation errors propagate as-is.
pub fn make_variables(
    definitions: &HashMap<String, Expr>,
    scope: &Scope,
) -> Result<HashMap<String, Value>, Error> {
    let mut working = scope.clone();
    let mut resolved: HashMap<String, Value> = HashMap::new();
    let mut path: Vec<String> = Vec::new();

    let mut names: Vec<&String> = definitions.keys().collect();
    names.sort();
    for name in names {
        resolve(name, definitions, scope, &mut working, &mut resolved, &mut path)?;
    }
    Ok(resolved)
}

fn resolve(
    name: &str,
    definitions: &HashMap<String, Expr>,
    base: &Scope,
    working: &mut Scope,
    resolved: &mut HashMap<String, Value>,
    path: &mut Vec<String>,
) -> Result<(), Error> {
    if resolved.contains_key(name) {
        return Ok(());
    }
    if path.iter().any(|p| p == name) {
        let mut cycle = path.clone();
        cycle.push(name.to_string());
        return Err(Error::CircularReference(cycle.join(" -> ")));
    }
    let tree = match definitions.get(name) {
        Some(tree) => tree,
        None => {
            // satisfied by the base scope, or not at all
            if base.get_var(name).is_some() {
                return Ok(());
            }
            return Err(Error::UndefinedVariable(name.to_string()));
        }
    };

    path.push(name.to_string());
    for dep in eval::find_vars(tree) {
        resolve(&dep, definitions, base, working, resolved, path)?;
    }
    let value = eval::evaluate(tree, working)?;
    path.pop();

    working.set_var(name, value.clone());
    resolved.insert(name.to_string(), value);
    Ok(())
}
