//! Chained variable-binding scopes.
//!
//! Scopes live in an arena owned by one running interpreter instance and
//! are referenced by [`ScopeId`]. Lookup walks the parent chain; mutation
//! targets the nearest scope that already defines the name, else the
//! local scope. Child scopes shadow parent bindings of the same name.

use serde_json::Value;
use std::collections::HashMap;

/// Index of a scope in a [`ContextArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Default)]
struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeId>,
}

/// An arena of chained variable scopes.
///
/// One root scope exists per arena; ephemeral child scopes are created
/// for script/function evaluation and simply abandoned afterwards.
#[derive(Debug, Clone)]
pub struct ContextArena {
    scopes: Vec<Scope>,
}

impl ContextArena {
    /// Creates an arena containing a single root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// The root scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Creates a child scope falling back to `parent` on lookup.
    pub fn new_child(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            vars: HashMap::new(),
            parent: Some(parent),
        });
        id
    }

    /// Looks up `name`, walking the parent chain.
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(v) = self.scopes[s.0].vars.get(name) {
                return Some(v);
            }
            cur = self.scopes[s.0].parent;
        }
        None
    }

    /// Returns true if `name` is bound in `scope` or any ancestor.
    pub fn has(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    /// Binds `name` in the nearest scope of the chain that already
    /// defines it, else in `scope` itself.
    pub fn set(&mut self, scope: ScopeId, name: &str, value: Value) {
        let target = self.defining_scope(scope, name).unwrap_or(scope);
        self.scopes[target.0].vars.insert(name.to_string(), value);
    }

    /// Binds `name` in `scope` itself, shadowing any ancestor binding.
    pub fn set_local(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.scopes[scope.0].vars.insert(name.to_string(), value);
    }

    /// Looks up `name` in `scope` only, without walking the chain.
    pub fn get_local(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.scopes[scope.0].vars.get(name)
    }

    /// The scope of the chain that defines `name`, if any.
    pub fn defining_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if self.scopes[s.0].vars.contains_key(name) {
                return Some(s);
            }
            cur = self.scopes[s.0].parent;
        }
        None
    }

    /// The parent of a scope, or None for the root.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Bindings local to `scope` (no chain walk), in no particular order.
    pub fn locals(&self, scope: ScopeId) -> impl Iterator<Item = (&str, &Value)> {
        self.scopes[scope.0]
            .vars
            .iter()
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Number of scopes in the arena.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the root scope always exists
    }

    pub(crate) fn insert_all(&mut self, scope: ScopeId, vars: HashMap<String, Value>) {
        self.scopes[scope.0].vars.extend(vars);
    }
}

impl Default for ContextArena {
    fn default() -> Self {
        Self::new()
    }
}
