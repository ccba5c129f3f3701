//! Context harvesting
//!
//! Collects the sibling callables of a unit's declaring scope so the oracle
//! knows what it may call and the sandbox can load them as helpers.

use generative_artifact::{Scope, Unit};
use generative_sandbox::clean::dedent;
use std::collections::HashSet;

/// `(name, dedented source)` for every sibling of `unit`
///
/// Declaration order is kept; the first declaration of a name wins. The
/// unit itself is left out unless it is re-entrant.
#[must_use]
pub fn harvest(unit: &Unit) -> Vec<(String, String)> {
    unit.scope().map_or_else(Vec::new, |scope| {
        harvest_scope(scope, (!unit.is_reentrant()).then(|| unit.name()))
    })
}

/// Every member of `scope` with source, except `exclude`
#[must_use]
pub fn harvest_scope(scope: &Scope, exclude: Option<&str>) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut context = Vec::new();
    for member in scope.members() {
        if !seen.insert(member.name.as_str()) {
            continue;
        }
        if exclude == Some(member.name.as_str()) {
            continue;
        }
        if let Some(source) = &member.source {
            context.push((member.name.clone(), dedent(source)));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use generative_artifact::Value;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn scope() -> Arc<Scope> {
        Arc::new(
            Scope::new("Calculator")
                .member("add", "    def add(self, a, b):\n        return a + b\n")
                .member("sub", "    def sub(self, a, b):\n        return a - b\n")
                .native("log")
                .member("sub", "def sub(a, b):\n    return 0\n"),
        )
    }

    fn add() -> Unit {
        Unit::new("add", |_| Ok(Value::None))
            .with_source("def add(a, b):\n    return a + b\n")
            .in_scope(scope())
    }

    #[test]
    fn excludes_self_and_native_members() {
        let context = harvest(&add());
        assert_eq!(
            context,
            vec![(
                "sub".to_string(),
                "def sub(self, a, b):\n    return a - b".to_string()
            )]
        );
    }

    #[test]
    fn reentrant_units_see_themselves() {
        let names: Vec<String> = harvest(&add().reentrant())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["add", "sub"]);
    }

    #[test]
    fn free_units_have_no_context() {
        let unit = Unit::new("free", |_| Ok(Value::None));
        assert!(harvest(&unit).is_empty());
    }
}
