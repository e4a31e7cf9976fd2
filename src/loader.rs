// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Code-loading primitive.
//!
//! A code unit is a registered function that populates a namespace. `load`
//! locates the unit by name and executes it against the namespace bound to
//! that name, creating the namespace first if needed; `reload` re-executes
//! the unit against the *same* namespace, mutating it in place. A unit that
//! fails partway through does not roll anything back: names bound before
//! the failure stay bound, and the namespace stays reachable by name.

use crate::error::SchedError;
use crate::symbol::Symbol;
use crate::value::Value;
use ahash::AHasher;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use papaya::HashMap;
use std::hash::BuildHasherDefault;

/// A namespace: name -> value bindings with copy-on-write snapshots.
pub type Namespace = im::HashMap<Symbol, Value>;

/// A unit of code: populates (or re-populates) its namespace, or fails
/// with a description.
pub type UnitFn = fn(&mut Namespace) -> Result<(), String>;

static REGISTRY: Lazy<HashMap<Symbol, UnitFn, BuildHasherDefault<AHasher>>> =
    Lazy::new(HashMap::default);

/// Register (or replace) a code unit under `name`.
pub fn register_unit(name: Symbol, func: UnitFn) {
    REGISTRY.pin().insert(name, func);
}

/// Loaded namespaces, keyed by unit name.
#[derive(Debug, Default)]
pub struct Loader {
    namespaces: AHashMap<Symbol, Namespace>,
}

impl Loader {
    pub fn new() -> Self {
        Loader::default()
    }

    /// Execute the unit named `name` against its namespace, creating the
    /// namespace if this is the first load. The namespace is registered
    /// *before* the unit runs, so it stays reachable even when the unit
    /// fails partway through.
    pub fn load(&mut self, name: Symbol) -> Result<(), SchedError> {
        let func = {
            let guard = REGISTRY.pin();
            match guard.get(&name) {
                Some(func) => *func,
                None => return Err(SchedError::UnknownUnit(name)),
            }
        };
        let ns = self.namespaces.entry(name).or_default();
        func(ns).map_err(|message| SchedError::LoadFailure { name, message })
    }

    /// Re-execute a unit, mutating its existing namespace in place. Only
    /// valid for units that have been loaded at least once; a unit never
    /// loaded has no namespace to re-populate.
    pub fn reload(&mut self, name: Symbol) -> Result<(), SchedError> {
        if !self.namespaces.contains_key(&name) {
            return Err(SchedError::UnitNotLoaded(name));
        }
        self.load(name)
    }

    /// Look up a binding in a loaded namespace.
    pub fn get(&self, unit: Symbol, name: Symbol) -> Option<Value> {
        self.namespaces.get(&unit)?.get(&name).cloned()
    }

    /// O(1) snapshot of a loaded namespace.
    pub fn namespace(&self, unit: Symbol) -> Option<Namespace> {
        self.namespaces.get(&unit).cloned()
    }

    pub fn is_loaded(&self, unit: Symbol) -> bool {
        self.namespaces.contains_key(&unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds `a`, then fails on first load; completes with `b` on reload
    /// (when it finds its own earlier binding already present).
    fn flaky_unit(ns: &mut Namespace) -> Result<(), String> {
        let a = Symbol::mk("a");
        let first_load = !ns.contains_key(&a);
        *ns = ns.update(a, Value::Int(1));
        if first_load {
            return Err("dependency missing".into());
        }
        *ns = ns.update(Symbol::mk("b"), Value::Int(2));
        Ok(())
    }

    /// Bumps a load counter each time it runs.
    fn counting_unit(ns: &mut Namespace) -> Result<(), String> {
        let key = Symbol::mk("load_count");
        let n = ns.get(&key).and_then(|v| v.as_int()).unwrap_or(0);
        *ns = ns.update(key, Value::Int(n + 1));
        Ok(())
    }

    #[test]
    fn test_unknown_unit() {
        let mut loader = Loader::new();
        let err = loader.load(Symbol::mk("unit_never_registered")).unwrap_err();
        assert!(matches!(err, SchedError::UnknownUnit(_)));
    }

    #[test]
    fn test_reload_before_load_is_refused() {
        let unit = Symbol::mk("unit_reload_first");
        register_unit(unit, counting_unit);
        let mut loader = Loader::new();

        // Registered but never loaded: reload has no namespace to work on.
        let err = loader.reload(unit).unwrap_err();
        assert!(matches!(err, SchedError::UnitNotLoaded(_)));
        assert!(!loader.is_loaded(unit));

        loader.load(unit).unwrap();
        loader.reload(unit).unwrap();
        assert_eq!(
            loader.get(unit, Symbol::mk("load_count")),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn test_failed_load_leaves_partial_namespace_reachable() {
        let unit = Symbol::mk("unit_flaky");
        register_unit(unit, flaky_unit);
        let mut loader = Loader::new();

        let err = loader.load(unit).unwrap_err();
        assert!(matches!(err, SchedError::LoadFailure { .. }));

        // Not rolled back: the namespace and its partial binding survive.
        assert!(loader.is_loaded(unit));
        assert_eq!(loader.get(unit, Symbol::mk("a")), Some(Value::Int(1)));
        assert_eq!(loader.get(unit, Symbol::mk("b")), None);

        // Reload completes against the same namespace.
        loader.reload(unit).unwrap();
        assert_eq!(loader.get(unit, Symbol::mk("a")), Some(Value::Int(1)));
        assert_eq!(loader.get(unit, Symbol::mk("b")), Some(Value::Int(2)));
    }

    #[test]
    fn test_reload_mutates_in_place() {
        let unit = Symbol::mk("unit_counting");
        register_unit(unit, counting_unit);
        let mut loader = Loader::new();

        loader.load(unit).unwrap();
        let before = loader.namespace(unit).unwrap();
        loader.reload(unit).unwrap();

        let key = Symbol::mk("load_count");
        assert_eq!(loader.get(unit, key), Some(Value::Int(2)));
        // The earlier snapshot is unaffected (copy-on-write).
        assert_eq!(before.get(&key), Some(&Value::Int(1)));
    }
}
