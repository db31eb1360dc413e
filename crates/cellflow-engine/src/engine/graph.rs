use cellflow_common::{SymbolId, Timestamp};
use smallvec::SmallVec;

use super::store::SymbolStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Induced by the static analyzer's assignment edges.
    Static,
    /// Induced by the tracer's observed loads and call returns.
    Dynamic,
}

/// One directed edge endpoint, tagged with the tick at which the edge was
/// induced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub sym: SymbolId,
    pub at: Timestamp,
    pub kind: EdgeKind,
}

/// Symbol-level dependency edges, forward and reverse, arena-indexed.
/// Cycles are permitted; staleness is a timestamp comparison, not a
/// reachability test, so cycles never create false waits.
#[derive(Debug, Default)]
pub struct DataflowGraph {
    parents: Vec<SmallVec<[Edge; 4]>>,
    children: Vec<SmallVec<[Edge; 4]>>,
}

impl DataflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, id: SymbolId) {
        let needed = id.as_index() + 1;
        if self.parents.len() < needed {
            self.parents.resize_with(needed, SmallVec::new);
            self.children.resize_with(needed, SmallVec::new);
        }
    }

    /// Record `parent → child`, refreshing the tick if the edge already
    /// exists with the same kind.
    pub fn add_edge(&mut self, parent: SymbolId, child: SymbolId, at: Timestamp, kind: EdgeKind) {
        if parent == child {
            return;
        }
        self.ensure(parent);
        self.ensure(child);

        let fwd = &mut self.parents[child.as_index()];
        match fwd.iter_mut().find(|e| e.sym == parent && e.kind == kind) {
            Some(edge) => edge.at = at,
            None => fwd.push(Edge {
                sym: parent,
                at,
                kind,
            }),
        }
        let rev = &mut self.children[parent.as_index()];
        match rev.iter_mut().find(|e| e.sym == child && e.kind == kind) {
            Some(edge) => edge.at = at,
            None => rev.push(Edge {
                sym: child,
                at,
                kind,
            }),
        }
    }

    /// Drop every incoming edge of `child`. Used when a re-assignment
    /// replaces the symbol's parent set wholesale.
    pub fn reset_parents(&mut self, child: SymbolId) {
        self.ensure(child);
        let old: SmallVec<[Edge; 4]> = std::mem::take(&mut self.parents[child.as_index()]);
        for edge in old {
            self.children[edge.sym.as_index()].retain(|e| e.sym != child || e.kind != edge.kind);
        }
    }

    #[inline]
    pub fn parents(&self, id: SymbolId) -> &[Edge] {
        self.parents
            .get(id.as_index())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    #[inline]
    pub fn children(&self, id: SymbolId) -> &[Edge] {
        self.children
            .get(id.as_index())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.parents.iter().map(|v| v.len()).sum()
    }

    /// Push an update notification from a freshly bumped symbol into its
    /// graph children's `updated_deps`.
    pub fn notify_children(&self, store: &mut SymbolStore, parent: SymbolId) {
        let parent_ts = store.symbol(parent).defined_at;
        for edge in self.children(parent) {
            if store.symbol(edge.sym).defined_at < parent_ts {
                store.note_updated_dep(edge.sym, parent);
            }
        }
    }
}
