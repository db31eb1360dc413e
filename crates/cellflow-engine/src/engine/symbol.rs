use bitflags::bitflags;
use cellflow_common::{
    AliasGroupId, CellSlot, NamespaceId, ScopeId, SymbolId, Timestamp, ValueHandle,
};
use rustc_hash::FxHashSet;

/// What a symbol holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// An ordinary value binding.
    Regular,

    /// A class object; its namespace doubles as the attribute prototype
    /// for values produced by calling it.
    Class,

    /// A function or lambda.
    Function,

    /// A module object bound by `import module`.
    Module,

    /// A binding created by `from module import name`.
    Import,

    /// An unnamed intermediate (e.g. a call's return value).
    Anonymous,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SymbolFlags: u8 {
        /// The name is no longer bound in its scope; the symbol object
        /// survives for its children's sake.
        const UNBOUND        = 1 << 0;
        /// Some parent was deleted; staleness through it is permanent
        /// until re-assignment.
        const PARENT_DELETED = 1 << 1;
        /// Lives in the seeded builtins scope; never stale, never fresh.
        const BUILTIN        = 1 << 2;
    }
}

/// The fundamental versioned datum: one named value, attribute, or
/// subscript entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub containing_scope: ScopeId,
    pub kind: SymbolKind,
    pub flags: SymbolFlags,

    /// Identity of the value currently bound, if the host reported one.
    pub handle: Option<ValueHandle>,

    /// Namespace owned by this symbol (attributes / items of its value).
    pub namespace: Option<NamespaceId>,

    /// Alias equivalence class, populated once two names share a handle.
    pub alias_group: Option<AliasGroupId>,

    /// The class symbol this value was produced by, set at call sites.
    /// Attribute lookups fall through to the class's namespace for
    /// members the value has not shadowed.
    pub class_of: Option<SymbolId>,

    /// Tick of the statement that most recently assigned or mutated this
    /// symbol.
    pub defined_at: Timestamp,

    /// Latest dependency update this symbol has observed.
    pub required_at: Timestamp,

    /// Parents whose `defined_at` has moved past ours since we were last
    /// defined. Cleared on re-definition.
    pub updated_deps: FxHashSet<SymbolId>,

    /// Cell whose execution last defined or mutated this symbol.
    pub defined_in_cell: Option<CellSlot>,
}

impl Symbol {
    pub fn new(name: String, containing_scope: ScopeId) -> Self {
        Self {
            name,
            containing_scope,
            kind: SymbolKind::Regular,
            flags: SymbolFlags::empty(),
            handle: None,
            namespace: None,
            alias_group: None,
            class_of: None,
            defined_at: Timestamp::NEVER,
            required_at: Timestamp::NEVER,
            updated_deps: FxHashSet::default(),
            defined_in_cell: None,
        }
    }

    #[inline]
    pub fn is_unbound(&self) -> bool {
        self.flags.contains(SymbolFlags::UNBOUND)
    }

    #[inline]
    pub fn is_builtin(&self) -> bool {
        self.flags.contains(SymbolFlags::BUILTIN)
    }
}
