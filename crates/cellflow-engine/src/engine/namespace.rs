use cellflow_common::{NsKey, ScopeId, SymbolId};
use rustc_hash::FxHashMap;

/// A scope attached to a value: the attributes and subscript entries
/// observed on it. Owned by exactly one primary symbol; aliases reach it
/// through the owner's equivalence class.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub owner: SymbolId,
    /// The object scope child symbols are created in.
    pub scope: ScopeId,
    entries: FxHashMap<NsKey, SymbolId>,
}

impl Namespace {
    pub fn new(owner: SymbolId, scope: ScopeId) -> Self {
        Self {
            owner,
            scope,
            entries: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn get(&self, key: &NsKey) -> Option<SymbolId> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: NsKey, symbol: SymbolId) -> Option<SymbolId> {
        self.entries.insert(key, symbol)
    }

    pub fn remove(&mut self, key: &NsKey) -> Option<SymbolId> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&NsKey, SymbolId)> {
        self.entries.iter().map(|(k, &v)| (k, v))
    }

    /// Move every entry out, leaving this namespace empty. Teardown path:
    /// the store drains a namespace when its owner is deleted or re-bound
    /// to a class-incompatible value, marking the children orphaned.
    pub fn drain_entries(&mut self) -> Vec<(NsKey, SymbolId)> {
        self.entries.drain().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
