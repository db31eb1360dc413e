use cellflow_common::{
    AliasGroupId, CellSlot, NamespaceId, NsKey, RefPath, ScopeId, SymbolId, Timestamp, ValueHandle,
};
use rustc_hash::FxHashMap;

use super::namespace::Namespace;
use super::scope::{Scope, ScopeKind};
use super::symbol::{Symbol, SymbolFlags, SymbolKind};

/// The entity repository: symbols, scopes, namespaces, and alias classes,
/// all arena-backed. Owned exclusively by the engine; only the tracer
/// adapter and the submit path mutate it.
pub struct SymbolStore {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    namespaces: Vec<Namespace>,
    alias_groups: Vec<Vec<SymbolId>>,

    /// Primary symbol per live object identity, for resolving attr/subscript
    /// events that arrive with a raw value handle.
    by_handle: FxHashMap<u64, SymbolId>,

    /// Object scope → owning namespace, for walking owner chains.
    ns_by_scope: FxHashMap<ScopeId, NamespaceId>,

    builtins_scope: ScopeId,
    global_scope: ScopeId,
}

impl SymbolStore {
    pub fn new(builtin_names: &[&str]) -> Self {
        let mut store = Self {
            symbols: Vec::new(),
            scopes: Vec::new(),
            namespaces: Vec::new(),
            alias_groups: Vec::new(),
            by_handle: FxHashMap::default(),
            ns_by_scope: FxHashMap::default(),
            builtins_scope: ScopeId::new(0),
            global_scope: ScopeId::new(1),
        };
        let builtins = store.push_scope(Scope::new(
            "<builtins>".to_string(),
            ScopeKind::Builtins,
            None,
        ));
        let global = store.push_scope(Scope::new(
            "<module>".to_string(),
            ScopeKind::Global,
            Some(builtins),
        ));
        store.builtins_scope = builtins;
        store.global_scope = global;
        for &name in builtin_names {
            let id = store.push_symbol(Symbol::new(name.to_string(), builtins));
            store.symbols[id.as_index()].flags |= SymbolFlags::BUILTIN;
            store.scopes[builtins.as_index()].bind(name.to_string(), id);
        }
        store
    }

    #[inline]
    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    #[inline]
    pub fn builtins_scope(&self) -> ScopeId {
        self.builtins_scope
    }

    #[inline]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.as_index()]
    }

    #[inline]
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.as_index()]
    }

    #[inline]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.as_index()]
    }

    #[inline]
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.as_index()]
    }

    #[inline]
    pub fn namespace(&self, id: NamespaceId) -> &Namespace {
        &self.namespaces[id.as_index()]
    }

    #[inline]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len() as u32).map(SymbolId::new)
    }

    pub fn new_scope(&mut self, name: String, kind: ScopeKind, parent: ScopeId) -> ScopeId {
        self.push_scope(Scope::new(name, kind, Some(parent)))
    }

    /// Qualified display name of a symbol, for logs and link payloads.
    pub fn qualified_name(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        let scope = self.scope(sym.containing_scope);
        match scope.kind {
            ScopeKind::Global | ScopeKind::Builtins => sym.name.clone(),
            _ => format!("{}.{}", scope.name, sym.name),
        }
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    /// Walk the scope chain exactly like the host's name resolution,
    /// honouring explicit global/nonlocal declarations recorded on the
    /// starting scope.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let start = self.scope(scope);
        if start.is_declared_global(name) {
            return self
                .scope(self.global_scope)
                .get(name)
                .or_else(|| self.scope(self.builtins_scope).get(name));
        }
        let mut cursor = if start.is_declared_nonlocal(name) {
            start.parent
        } else {
            Some(scope)
        };
        while let Some(id) = cursor {
            let frame = self.scope(id);
            if let Some(sym) = frame.get(name) {
                if !self.symbol(sym).is_unbound() {
                    return Some(sym);
                }
            }
            cursor = frame.parent;
        }
        None
    }

    #[inline]
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scope(scope).get(name)
    }

    /// Resolve a reference descriptor without creating anything. Each step
    /// checks the symbol's own namespace, then its class prototype.
    pub fn resolve_path(&self, scope: ScopeId, path: &RefPath) -> Option<SymbolId> {
        let mut cursor = self.lookup(scope, &path.root)?;
        for key in &path.path {
            cursor = self
                .own_entry(cursor, key)
                .or_else(|| self.prototype_entry(cursor, key))?;
        }
        Some(cursor)
    }

    /// The namespace visible through a symbol: its own, or the one owned by
    /// any member of its alias class.
    pub fn reachable_namespace(&self, id: SymbolId) -> Option<NamespaceId> {
        if let Some(ns) = self.symbol(id).namespace {
            return Some(ns);
        }
        let group = self.symbol(id).alias_group?;
        self.alias_groups[group.as_index()]
            .iter()
            .find_map(|&member| self.symbol(member).namespace)
    }

    // ------------------------------------------------------------------
    // Definition and mutation
    // ------------------------------------------------------------------

    /// Return the existing symbol for `name` in `scope`, or create one.
    /// Re-binding to a different object bumps `defined_at`, keeps the
    /// namespace children when the class is compatible, and re-seats the
    /// alias class.
    pub fn upsert(
        &mut self,
        scope: ScopeId,
        name: &str,
        handle: Option<ValueHandle>,
        ts: Timestamp,
        cell: Option<CellSlot>,
    ) -> SymbolId {
        if let Some(existing) = self.lookup_local(scope, name) {
            let prev_handle = self.symbol(existing).handle;
            let same_object = match (prev_handle, handle) {
                (Some(a), Some(b)) => a.same_object(b),
                _ => false,
            };
            if same_object && !self.symbol(existing).is_unbound() {
                return existing;
            }
            self.rebind(existing, handle, ts, cell);
            return existing;
        }

        let id = self.push_symbol(Symbol::new(name.to_string(), scope));
        {
            let sym = &mut self.symbols[id.as_index()];
            sym.handle = handle;
            sym.defined_at = ts;
            sym.defined_in_cell = cell;
        }
        self.scopes[scope.as_index()].bind(name.to_string(), id);
        if let Some(h) = handle {
            self.seat_alias(id, h);
        }
        id
    }

    fn rebind(
        &mut self,
        id: SymbolId,
        handle: Option<ValueHandle>,
        ts: Timestamp,
        cell: Option<CellSlot>,
    ) {
        let prev_handle = self.symbol(id).handle;

        // Namespace children survive only a class-compatible re-binding.
        let compatible = match (prev_handle, handle) {
            (Some(a), Some(b)) => a.compatible_class(b),
            _ => false,
        };
        if !compatible {
            if let Some(ns) = self.symbols[id.as_index()].namespace.take() {
                self.orphan_children(ns);
            }
        }

        self.leave_alias_group(id);
        if let Some(prev) = prev_handle {
            if self.by_handle.get(&prev.obj) == Some(&id) {
                self.by_handle.remove(&prev.obj);
            }
        }

        let sym = &mut self.symbols[id.as_index()];
        sym.handle = handle;
        sym.defined_at = ts;
        sym.defined_in_cell = cell;
        sym.updated_deps.clear();
        sym.flags
            .remove(SymbolFlags::UNBOUND | SymbolFlags::PARENT_DELETED);

        if let Some(h) = handle {
            self.seat_alias(id, h);
        }
    }

    /// In-place mutation: bump `defined_at` on the symbol and on every
    /// member of its alias class. The bump propagates to graph children
    /// lazily, at classification time.
    pub fn mutate(&mut self, id: SymbolId, ts: Timestamp, cell: Option<CellSlot>) {
        let members = match self.symbol(id).alias_group {
            Some(group) => self.alias_groups[group.as_index()].clone(),
            None => vec![id],
        };
        for member in members {
            let sym = &mut self.symbols[member.as_index()];
            if sym.is_builtin() {
                continue;
            }
            sym.defined_at = ts;
            sym.updated_deps.clear();
            if cell.is_some() {
                sym.defined_in_cell = cell;
            }
        }
    }

    /// Record that `id` observed a dependency update from `parent`.
    pub fn note_updated_dep(&mut self, id: SymbolId, parent: SymbolId) {
        self.symbols[id.as_index()].updated_deps.insert(parent);
    }

    /// Record a use of the symbol at `ts`.
    pub fn touch(&mut self, id: SymbolId, ts: Timestamp) {
        let sym = &mut self.symbols[id.as_index()];
        if sym.required_at < ts {
            sym.required_at = ts;
        }
    }

    /// Mark the name unbound in its scope without destroying the symbol.
    pub fn kill(&mut self, id: SymbolId) {
        let scope = self.symbol(id).containing_scope;
        let name = self.symbol(id).name.clone();
        self.scopes[scope.as_index()].unbind(&name);
        self.symbols[id.as_index()].flags |= SymbolFlags::UNBOUND;
    }

    /// Explicit deletion: unbind and mark children as orphaned. History is
    /// kept; dangling children carry the parent-deleted marker.
    pub fn delete(&mut self, id: SymbolId) {
        self.kill(id);
        if let Some(ns) = self.symbol(id).namespace {
            self.orphan_children(ns);
        }
        self.leave_alias_group(id);
        if let Some(h) = self.symbol(id).handle {
            if self.by_handle.get(&h.obj) == Some(&id) {
                self.by_handle.remove(&h.obj);
            }
        }
    }

    pub fn set_kind(&mut self, id: SymbolId, kind: SymbolKind) {
        self.symbols[id.as_index()].kind = kind;
    }

    /// Create an unnamed intermediate (a call's return value).
    pub fn anonymous(&mut self, ts: Timestamp, cell: Option<CellSlot>) -> SymbolId {
        let id = self.push_symbol(Symbol::new(
            format!("<anon:{}>", self.symbols.len()),
            self.global_scope,
        ));
        let sym = &mut self.symbols[id.as_index()];
        sym.kind = SymbolKind::Anonymous;
        sym.defined_at = ts;
        sym.defined_in_cell = cell;
        id
    }

    // ------------------------------------------------------------------
    // Aliasing
    // ------------------------------------------------------------------

    /// Symbol currently registered as primary for an object identity.
    pub fn primary_for_handle(&self, handle: ValueHandle) -> Option<SymbolId> {
        self.by_handle.get(&handle.obj).copied()
    }

    /// Put two symbols in the same equivalence class.
    pub fn add_alias(&mut self, a: SymbolId, b: SymbolId) {
        if a == b {
            return;
        }
        match (self.symbol(a).alias_group, self.symbol(b).alias_group) {
            (None, None) => {
                let group = AliasGroupId::new(self.alias_groups.len() as u32);
                self.alias_groups.push(vec![a, b]);
                self.symbols[a.as_index()].alias_group = Some(group);
                self.symbols[b.as_index()].alias_group = Some(group);
            }
            (Some(g), None) => {
                self.alias_groups[g.as_index()].push(b);
                self.symbols[b.as_index()].alias_group = Some(g);
            }
            (None, Some(g)) => {
                self.alias_groups[g.as_index()].push(a);
                self.symbols[a.as_index()].alias_group = Some(g);
            }
            (Some(ga), Some(gb)) if ga != gb => {
                let merged = std::mem::take(&mut self.alias_groups[gb.as_index()]);
                for member in &merged {
                    self.symbols[member.as_index()].alias_group = Some(ga);
                }
                self.alias_groups[ga.as_index()].extend(merged);
            }
            _ => {}
        }
    }

    /// Members of a symbol's alias class, itself included.
    pub fn aliases(&self, id: SymbolId) -> Vec<SymbolId> {
        match self.symbol(id).alias_group {
            Some(group) => self.alias_groups[group.as_index()].clone(),
            None => vec![id],
        }
    }

    fn seat_alias(&mut self, id: SymbolId, handle: ValueHandle) {
        let existing = self.by_handle.get(&handle.obj).copied();
        match existing {
            Some(primary) if primary != id => self.add_alias(primary, id),
            Some(_) => {}
            None => {
                self.by_handle.insert(handle.obj, id);
            }
        }
    }

    fn leave_alias_group(&mut self, id: SymbolId) {
        if let Some(group) = self.symbols[id.as_index()].alias_group.take() {
            self.alias_groups[group.as_index()].retain(|&m| m != id);
        }
    }

    // ------------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------------

    /// The namespace owned by `owner`, created on first use.
    pub fn ensure_namespace(&mut self, owner: SymbolId) -> NamespaceId {
        if let Some(ns) = self.symbol(owner).namespace {
            return ns;
        }
        let owner_name = self.symbol(owner).name.clone();
        let parent = self.symbol(owner).containing_scope;
        let scope = self.new_scope(owner_name, ScopeKind::Object, parent);
        let ns = NamespaceId::new(self.namespaces.len() as u32);
        self.namespaces.push(Namespace::new(owner, scope));
        self.symbols[owner.as_index()].namespace = Some(ns);
        self.ns_by_scope.insert(scope, ns);
        ns
    }

    /// Enclosing owners of a symbol, nearest first, excluding the symbol
    /// itself: for `a.b.c` this yields the symbols for `a.b` and `a`.
    pub fn owner_chain(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut chain = Vec::new();
        let mut scope = self.symbol(id).containing_scope;
        while let Some(&ns) = self.ns_by_scope.get(&scope) {
            let owner = self.namespace(ns).owner;
            if chain.contains(&owner) {
                break;
            }
            chain.push(owner);
            scope = self.symbol(owner).containing_scope;
        }
        chain
    }

    /// Define (or redefine) a namespace entry with a concrete value. A
    /// store always lands on the owner's own namespace: prototype members
    /// are shadowed, never rebound.
    pub fn upsert_ns_child(
        &mut self,
        owner: SymbolId,
        key: &NsKey,
        handle: Option<ValueHandle>,
        ts: Timestamp,
        cell: Option<CellSlot>,
    ) -> SymbolId {
        let child = match self.own_entry(owner, key) {
            Some(child) => child,
            None => self.create_own_child(owner, key),
        };
        let prev = self.symbol(child).handle;
        let same_object = match (prev, handle) {
            (Some(a), Some(b)) => a.same_object(b),
            _ => false,
        };
        if same_object {
            let sym = &mut self.symbols[child.as_index()];
            sym.defined_at = ts;
            sym.defined_in_cell = cell;
            sym.updated_deps.clear();
        } else {
            self.rebind(child, handle, ts, cell);
        }
        child
    }

    /// Attach a value identity to an already-created symbol (an anonymous
    /// return value) and seat it in the handle index.
    pub fn bind_handle(&mut self, id: SymbolId, handle: ValueHandle) {
        self.symbols[id.as_index()].handle = Some(handle);
        self.seat_alias(id, handle);
    }

    /// Child symbol of `owner` under `key`. Resolution order: the owner's
    /// own (or alias-reachable) namespace, then the prototype namespace of
    /// the class that produced the value, then lazy creation when `create`
    /// is set.
    pub fn ns_child(&mut self, owner: SymbolId, key: &NsKey, create: bool) -> Option<SymbolId> {
        if let Some(child) = self.own_entry(owner, key) {
            return Some(child);
        }
        if let Some(child) = self.prototype_entry(owner, key) {
            return Some(child);
        }
        if !create {
            return None;
        }
        Some(self.create_own_child(owner, key))
    }

    fn own_entry(&self, owner: SymbolId, key: &NsKey) -> Option<SymbolId> {
        let ns = self.reachable_namespace(owner)?;
        self.namespace(ns).get(key)
    }

    /// Members inherited from the producing class, for values created at a
    /// call site (`class_of`).
    fn prototype_entry(&self, owner: SymbolId, key: &NsKey) -> Option<SymbolId> {
        let class_sym = self.class_of_reachable(owner)?;
        let ns = self.reachable_namespace(class_sym)?;
        self.namespace(ns).get(key)
    }

    /// The producing class visible through a symbol: its own `class_of`,
    /// or that of any member of its alias class.
    fn class_of_reachable(&self, id: SymbolId) -> Option<SymbolId> {
        if let Some(class_sym) = self.symbol(id).class_of {
            return Some(class_sym);
        }
        let group = self.symbol(id).alias_group?;
        self.alias_groups[group.as_index()]
            .iter()
            .find_map(|&member| self.symbol(member).class_of)
    }

    fn create_own_child(&mut self, owner: SymbolId, key: &NsKey) -> SymbolId {
        let ns = match self.reachable_namespace(owner) {
            Some(ns) => ns,
            None => self.ensure_namespace(owner),
        };
        let scope = self.namespace(ns).scope;
        let child = self.push_symbol(Symbol::new(key.to_string(), scope));
        self.namespaces[ns.as_index()].insert(key.clone(), child);
        self.scopes[scope.as_index()].bind(key.to_string(), child);
        child
    }

    /// Record which class produced this value; attribute lookups consult
    /// the class's namespace as a prototype.
    pub fn set_class_of(&mut self, id: SymbolId, class_sym: SymbolId) {
        self.symbols[id.as_index()].class_of = Some(class_sym);
    }

    /// Unbind every entry and mark the children as orphaned; the symbol
    /// objects survive for anything still holding an edge to them.
    fn orphan_children(&mut self, ns: NamespaceId) {
        for (_, child) in self.namespaces[ns.as_index()].drain_entries() {
            self.symbols[child.as_index()].flags |= SymbolFlags::PARENT_DELETED;
        }
    }

    // ------------------------------------------------------------------

    fn push_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId::new(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    fn push_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(exec: u32, stmt: u32) -> Timestamp {
        Timestamp::new(exec, stmt)
    }

    #[test]
    fn test_upsert_creates_then_rebinds() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let x = store.upsert(g, "x", Some(ValueHandle::new(1, 0)), ts(1, 1), None);
        assert_eq!(store.symbol(x).defined_at, ts(1, 1));

        // Same object: no bump.
        let same = store.upsert(g, "x", Some(ValueHandle::new(1, 0)), ts(2, 1), None);
        assert_eq!(same, x);
        assert_eq!(store.symbol(x).defined_at, ts(1, 1));

        // Different object: bump.
        store.upsert(g, "x", Some(ValueHandle::new(2, 0)), ts(3, 1), None);
        assert_eq!(store.symbol(x).defined_at, ts(3, 1));
    }

    #[test]
    fn test_lookup_walks_scope_chain() {
        let mut store = SymbolStore::new(&["print"]);
        let g = store.global_scope();
        let inner = store.new_scope("f".into(), ScopeKind::Function, g);
        let x = store.upsert(g, "x", None, ts(1, 1), None);
        assert_eq!(store.lookup(inner, "x"), Some(x));
        assert!(store.lookup(inner, "print").is_some());
        assert_eq!(store.lookup(inner, "zzz"), None);
    }

    #[test]
    fn test_declared_global_skips_enclosing() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let outer = store.new_scope("f".into(), ScopeKind::Function, g);
        let inner = store.new_scope("g".into(), ScopeKind::Function, outer);
        let shadow = store.upsert(outer, "x", None, ts(1, 1), None);
        let global_x = store.upsert(g, "x", None, ts(1, 2), None);
        store.scope_mut(inner).declare_global("x".into());
        assert_eq!(store.lookup(inner, "x"), Some(global_x));
        assert_ne!(store.lookup(inner, "x"), Some(shadow));
    }

    #[test]
    fn test_alias_via_shared_handle() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let h = ValueHandle::new(7, 3);
        let a = store.upsert(g, "a", Some(h), ts(1, 1), None);
        let b = store.upsert(g, "b", Some(h), ts(2, 1), None);
        assert!(store.aliases(a).contains(&b));

        // Mutation through either bumps both.
        store.mutate(b, ts(3, 1), None);
        assert_eq!(store.symbol(a).defined_at, ts(3, 1));
        assert_eq!(store.symbol(b).defined_at, ts(3, 1));
    }

    #[test]
    fn test_rebind_leaves_alias_class() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let h = ValueHandle::new(7, 3);
        let a = store.upsert(g, "a", Some(h), ts(1, 1), None);
        let b = store.upsert(g, "b", Some(h), ts(2, 1), None);
        store.upsert(g, "b", Some(ValueHandle::new(9, 3)), ts(3, 1), None);
        assert!(!store.aliases(a).contains(&b));
        store.mutate(a, ts(4, 1), None);
        assert_eq!(store.symbol(b).defined_at, ts(3, 1));
    }

    #[test]
    fn test_namespace_children_survive_compatible_rebind() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let owner = store.upsert(g, "obj", Some(ValueHandle::new(1, 5)), ts(1, 1), None);
        let child = store
            .ns_child(owner, &NsKey::attr("field"), true)
            .unwrap();

        // Same class: children kept.
        store.upsert(g, "obj", Some(ValueHandle::new(2, 5)), ts(2, 1), None);
        assert_eq!(store.ns_child(owner, &NsKey::attr("field"), false), Some(child));

        // Different class: children orphaned.
        store.upsert(g, "obj", Some(ValueHandle::new(3, 6)), ts(3, 1), None);
        assert_eq!(store.ns_child(owner, &NsKey::attr("field"), false), None);
        assert!(
            store
                .symbol(child)
                .flags
                .contains(SymbolFlags::PARENT_DELETED)
        );
    }

    #[test]
    fn test_kill_keeps_symbol_object() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let x = store.upsert(g, "x", None, ts(1, 1), None);
        store.kill(x);
        assert_eq!(store.lookup(g, "x"), None);
        assert!(store.symbol(x).is_unbound());
        assert_eq!(store.symbol(x).defined_at, ts(1, 1));
    }

    #[test]
    fn test_prototype_lookup_through_class_of() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let class_sym = store.upsert(g, "C", Some(ValueHandle::new(1, 9)), ts(1, 1), None);
        store.set_kind(class_sym, SymbolKind::Class);
        let method = store.ns_child(class_sym, &NsKey::attr("poke"), true).unwrap();

        let inst = store.upsert(g, "obj", Some(ValueHandle::new(2, 10)), ts(2, 1), None);
        store.set_class_of(inst, class_sym);

        // Unshadowed attributes fall through to the class prototype.
        assert_eq!(
            store.ns_child(inst, &NsKey::attr("poke"), false),
            Some(method)
        );
        let path = RefPath::name("obj").child(NsKey::attr("poke"));
        assert_eq!(store.resolve_path(g, &path), Some(method));

        // A store shadows on the instance; the class entry is untouched.
        let own =
            store.upsert_ns_child(inst, &NsKey::attr("poke"), None, ts(3, 1), None);
        assert_ne!(own, method);
        assert_eq!(store.ns_child(inst, &NsKey::attr("poke"), false), Some(own));
        assert_eq!(
            store.ns_child(class_sym, &NsKey::attr("poke"), false),
            Some(method)
        );
    }

    #[test]
    fn test_prototype_reaches_through_alias() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let class_sym = store.upsert(g, "C", Some(ValueHandle::new(1, 9)), ts(1, 1), None);
        store.set_kind(class_sym, SymbolKind::Class);
        let method = store.ns_child(class_sym, &NsKey::attr("poke"), true).unwrap();

        // Two names bound to the same instance; only the first carries
        // class_of directly.
        let h = ValueHandle::new(2, 10);
        let a = store.upsert(g, "a", Some(h), ts(2, 1), None);
        store.set_class_of(a, class_sym);
        let b = store.upsert(g, "b", Some(h), ts(2, 2), None);
        assert_eq!(store.ns_child(b, &NsKey::attr("poke"), false), Some(method));
    }

    #[test]
    fn test_delete_unbinds_namespace_entries() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let owner = store.upsert(g, "obj", Some(ValueHandle::new(1, 5)), ts(1, 1), None);
        let child = store.ns_child(owner, &NsKey::attr("field"), true).unwrap();
        store.delete(owner);
        assert_eq!(store.ns_child(owner, &NsKey::attr("field"), false), None);
        assert!(
            store
                .symbol(child)
                .flags
                .contains(SymbolFlags::PARENT_DELETED)
        );
    }

    #[test]
    fn test_resolve_path() {
        let mut store = SymbolStore::new(&[]);
        let g = store.global_scope();
        let owner = store.upsert(g, "df", Some(ValueHandle::new(1, 2)), ts(1, 1), None);
        let child = store.ns_child(owner, &NsKey::attr("loc"), true).unwrap();
        let path = RefPath::name("df").child(NsKey::attr("loc"));
        assert_eq!(store.resolve_path(g, &path), Some(child));
        assert_eq!(
            store.resolve_path(g, &RefPath::name("df").child(NsKey::attr("iloc"))),
            None
        );
    }
}
