//! Arena index newtypes shared across the engine.

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn new(id: u32) -> Self {
                Self(id)
            }

            #[inline]
            pub fn as_index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id! {
    /// Index of a symbol in the symbol arena.
    SymbolId
}

arena_id! {
    /// Index of a scope in the scope arena.
    ScopeId
}

arena_id! {
    /// Index of a namespace in the namespace arena.
    NamespaceId
}

arena_id! {
    /// Index of an alias equivalence class.
    AliasGroupId
}

arena_id! {
    /// Index of a cell record in the cell registry.
    CellSlot
}

/// Host-assigned identity of an AST node, used for trace-once bookkeeping.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Opaque identity of a runtime value as reported by the host: the object's
/// identity plus a type tag. Two handles with equal `obj` refer to the same
/// underlying value; namespace contents survive a re-assignment only when the
/// `class` tags match.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ValueHandle {
    pub obj: u64,
    pub class: u32,
}

impl ValueHandle {
    pub fn new(obj: u64, class: u32) -> Self {
        Self { obj, class }
    }

    #[inline]
    pub fn same_object(self, other: ValueHandle) -> bool {
        self.obj == other.obj
    }

    #[inline]
    pub fn compatible_class(self, other: ValueHandle) -> bool {
        self.class == other.class
    }
}
