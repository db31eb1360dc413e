use cellflow_common::{ScopeId, SymbolId};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Seeded with host builtin names; parent of the global scope.
    Builtins,
    Function,
    Class,
    Comprehension,
    /// Namespace-of-object: holds a value's attributes and items.
    Object,
}

/// A name-resolution frame. Scopes form a parent chain; lookups walk it
/// the way the host language resolves names, honouring explicit
/// global/nonlocal declarations recorded here.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    bindings: FxHashMap<String, SymbolId>,
    globals: FxHashSet<String>,
    nonlocals: FxHashSet<String>,
}

impl Scope {
    pub fn new(name: String, kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            name,
            kind,
            parent,
            bindings: FxHashMap::default(),
            globals: FxHashSet::default(),
            nonlocals: FxHashSet::default(),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.bindings.get(name).copied()
    }

    pub fn bind(&mut self, name: String, symbol: SymbolId) -> Option<SymbolId> {
        self.bindings.insert(name, symbol)
    }

    pub fn unbind(&mut self, name: &str) -> Option<SymbolId> {
        self.bindings.remove(name)
    }

    pub fn declare_global(&mut self, name: String) {
        self.globals.insert(name);
    }

    pub fn declare_nonlocal(&mut self, name: String) {
        self.nonlocals.insert(name);
    }

    #[inline]
    pub fn is_declared_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    #[inline]
    pub fn is_declared_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.contains(name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, SymbolId)> {
        self.bindings.iter().map(|(k, &v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
