//! Waiting/ready classification.
//!
//! Read-only over the symbol store, the dataflow graph, and the cell
//! registry. Staleness of a symbol is a timestamp question (some ancestor
//! was defined after it), never a reachability question, so cycles in the
//! graph are harmless.

use cellflow_common::{CellSlot, FlowError, FlowErrorKind, RefPath, SymbolId, Timestamp};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use super::cells::CellRegistry;
use super::graph::DataflowGraph;
use super::store::SymbolStore;
use super::symbol::SymbolFlags;

/// Output of one classification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub waiting_cells: Vec<String>,
    pub ready_cells: Vec<String>,
    pub new_ready_cells: Vec<String>,
    pub forced_reactive_cells: Vec<String>,
    /// Waiting cell → the ready cells whose execution unblocks it.
    pub waiter_links: FxHashMap<String, Vec<String>>,
    /// Ready cell → the waiting cells it unblocks.
    pub ready_maker_links: FxHashMap<String, Vec<String>>,
    pub cell_parents: FxHashMap<String, Vec<String>>,
    pub cell_children: FxHashMap<String, Vec<String>>,
}

impl Classification {
    pub fn is_waiting(&self, id: &str) -> bool {
        self.waiting_cells.iter().any(|c| c == id)
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.ready_cells.iter().any(|c| c == id)
    }
}

/// Read-only classification pass over current engine state.
pub struct Checker<'a> {
    store: &'a SymbolStore,
    graph: &'a DataflowGraph,
    cells: &'a CellRegistry,
}

impl<'a> Checker<'a> {
    pub fn new(store: &'a SymbolStore, graph: &'a DataflowGraph, cells: &'a CellRegistry) -> Self {
        Self {
            store,
            graph,
            cells,
        }
    }

    /// Classify every cell. `prev_ready` is the ready set from the last
    /// pass, used to mark newly-ready cells.
    pub fn classify(&self, prev_ready: &FxHashSet<String>) -> Classification {
        let mut out = Classification::default();
        let mut stale_memo: FxHashMap<SymbolId, bool> = FxHashMap::default();

        // Per-cell resolved views, computed once.
        let mut views: Vec<CellView> = Vec::with_capacity(self.cells.len());
        for (slot, cell) in self.cells.iter() {
            views.push(self.view(slot, cell));
        }

        // Cell graph: parents via "who last defined what I read".
        for view in &views {
            let cell = self.cells.get(view.slot);
            let mut parents: Vec<String> = Vec::new();
            for &sym in view.reads.iter() {
                if let Some(def_cell) = self.store.symbol(sym).defined_in_cell {
                    if def_cell != view.slot {
                        let id = &self.cells.get(def_cell).id;
                        if !parents.contains(id) {
                            parents.push(id.clone());
                        }
                    }
                }
            }
            parents.sort();
            for parent in &parents {
                out.cell_children
                    .entry(parent.clone())
                    .or_default()
                    .push(cell.id.clone());
            }
            out.cell_parents.insert(cell.id.clone(), parents);
        }

        // Verdicts, in two phases. First the per-cell base status; then
        // fresh-input candidates wait on any other cell that will re-run
        // and writes into their fresh references.
        let base: Vec<Status> = views
            .iter()
            .map(|view| self.base_status(view, &mut stale_memo))
            .collect();

        let mut verdicts: FxHashMap<CellSlot, Verdict> = FxHashMap::default();
        let mut any_ready = false;
        for (i, view) in views.iter().enumerate() {
            let verdict = match &base[i] {
                Status::Fresh => Verdict::Fresh,
                Status::Waiting => Verdict::Waiting,
                Status::Candidate { fresh } => {
                    let blocked = views.iter().enumerate().any(|(j, other)| {
                        j != i
                            && matches!(base[j], Status::Candidate { .. } | Status::Waiting)
                            && fresh.iter().any(|s| other.writes.contains(s))
                    });
                    if blocked {
                        Verdict::Waiting
                    } else {
                        any_ready = true;
                        Verdict::Ready
                    }
                }
            };
            verdicts.insert(view.slot, verdict);
        }

        // Mutually-blocked candidates would stall the chain: promote the
        // earliest one.
        if !any_ready {
            let promoted = views
                .iter()
                .enumerate()
                .filter(|(i, _)| matches!(base[*i], Status::Candidate { .. }))
                .min_by_key(|(_, v)| {
                    let cell = self.cells.get(v.slot);
                    (cell.exec_count, cell.order_idx)
                })
                .map(|(_, v)| v.slot);
            if let Some(slot) = promoted {
                verdicts.insert(slot, Verdict::Ready);
            }
        }

        for view in &views {
            let cell = self.cells.get(view.slot);
            match verdicts[&view.slot] {
                Verdict::Waiting => out.waiting_cells.push(cell.id.clone()),
                Verdict::Ready => out.ready_cells.push(cell.id.clone()),
                Verdict::Fresh => {}
            }
        }
        out.waiting_cells.sort();
        out.ready_cells.sort();

        // Links: waiting cell → ready cells that unblock it.
        let ready_set: FxHashSet<&str> = out.ready_cells.iter().map(|s| s.as_str()).collect();
        for view in &views {
            if verdicts[&view.slot] != Verdict::Waiting {
                continue;
            }
            let cell = self.cells.get(view.slot);
            let mut providers: Vec<String> = Vec::new();
            let mut push = |id: String| {
                if ready_set.contains(id.as_str()) && id != cell.id && !providers.contains(&id) {
                    providers.push(id);
                }
            };
            for &sym in &view.reads {
                if self.stale(sym, &mut stale_memo) {
                    for frontier in self.stale_frontier(sym) {
                        if let Some(def_cell) = self.store.symbol(frontier).defined_in_cell {
                            push(self.cells.get(def_cell).id.clone());
                        }
                    }
                }
                if view.fresh_for_cell(self.store, sym) {
                    // A reader of a freshly updated symbol is unblocked by
                    // the ready writers that feed that symbol.
                    for other in &views {
                        if other.slot != view.slot && other.writes.contains(&sym) {
                            push(self.cells.get(other.slot).id.clone());
                        }
                    }
                }
            }
            providers.sort();
            out.waiter_links.insert(cell.id.clone(), providers);
        }

        for (waiter, providers) in &out.waiter_links {
            for provider in providers {
                out.ready_maker_links
                    .entry(provider.clone())
                    .or_default()
                    .push(waiter.clone());
            }
        }
        for links in out.ready_maker_links.values_mut() {
            links.sort();
        }

        out.new_ready_cells = out
            .ready_cells
            .iter()
            .filter(|id| !prev_ready.contains(*id))
            .cloned()
            .collect();

        for (_, cell) in self.cells.iter() {
            if cell.forced_reactive
                && cell.executed()
                && (out.is_waiting(&cell.id) || out.is_ready(&cell.id))
            {
                out.forced_reactive_cells.push(cell.id.clone());
            }
        }

        debug!(
            waiting = out.waiting_cells.len(),
            ready = out.ready_cells.len(),
            "classification complete"
        );
        out
    }

    // ------------------------------------------------------------------

    fn view(&self, slot: CellSlot, cell: &super::cells::Cell) -> CellView {
        let mut reads: Vec<SymbolId> = Vec::new();
        let mut unresolved = false;

        if let Some(analysis) = &cell.analysis {
            for live in &analysis.live_refs {
                match self.resolve_ref(live) {
                    Some(sym) => {
                        if !self.store.symbol(sym).is_builtin() && !reads.contains(&sym) {
                            reads.push(sym);
                        }
                    }
                    None => {
                        let err = FlowError::new(FlowErrorKind::UnresolvableReference)
                            .with_cell(cell.id.clone())
                            .with_symbol(live.to_string());
                        warn!(error = %err, "treating cell as pessimistically waiting");
                        unresolved = true;
                    }
                }
            }
        } else if cell.executed() || cell.analysis_failed {
            // No analysis to go on: pessimistic.
            unresolved = true;
        }

        for &sym in &cell.last_reads {
            let record = self.store.symbol(sym);
            // Anonymous intermediates are not re-resolvable references;
            // their dataflow lives on as edges of whatever stored them.
            if record.is_builtin() || record.kind == super::symbol::SymbolKind::Anonymous {
                continue;
            }
            if !reads.contains(&sym) {
                reads.push(sym);
            }
        }

        let mut writes: FxHashSet<SymbolId> = cell.last_writes.iter().copied().collect();
        if let Some(analysis) = &cell.analysis {
            for root in analysis.written_roots() {
                if let Some(sym) = self.store.lookup(self.store.global_scope(), root) {
                    if !self.store.symbol(sym).is_builtin() {
                        writes.insert(sym);
                    }
                }
            }
        }
        // A write reaches every member of the alias class.
        let mut expanded = writes.clone();
        for &sym in &writes {
            expanded.extend(self.store.aliases(sym));
        }

        CellView {
            slot,
            executed: cell.executed(),
            end: cell.last_exec.map(|r| r.end).unwrap_or(Timestamp::NEVER),
            reads,
            writes: expanded,
            unresolved,
        }
    }

    fn base_status(&self, view: &CellView, memo: &mut FxHashMap<SymbolId, bool>) -> Status {
        // Cells that never ran cannot be waiting.
        if !view.executed {
            return Status::Fresh;
        }
        if view.unresolved {
            return Status::Waiting;
        }
        if view.reads.iter().any(|&s| self.stale(s, memo)) {
            return Status::Waiting;
        }
        let fresh: Vec<SymbolId> = view
            .reads
            .iter()
            .copied()
            .filter(|&s| view.fresh_for_cell(self.store, s))
            .collect();
        if fresh.is_empty() {
            Status::Fresh
        } else {
            Status::Candidate { fresh }
        }
    }

    /// Resolve a reference descriptor, degrading to the deepest resolvable
    /// prefix. Only a missing root is unresolvable.
    fn resolve_ref(&self, path: &RefPath) -> Option<SymbolId> {
        let scope = self.store.global_scope();
        if let Some(sym) = self.store.resolve_path(scope, path) {
            return Some(sym);
        }
        let mut prefix = path.clone();
        while !prefix.path.is_empty() {
            prefix.path.pop();
            if let Some(sym) = self.store.resolve_path(scope, &prefix) {
                return Some(sym);
            }
        }
        None
    }

    /// Transitive staleness: some ancestor was defined after this symbol,
    /// or an ancestor is itself stale. Cycles resolve to "not stale" along
    /// the back edge; the timestamp test, not reachability, decides.
    fn stale(&self, id: SymbolId, memo: &mut FxHashMap<SymbolId, bool>) -> bool {
        let mut visiting = FxHashSet::default();
        self.stale_inner(id, memo, &mut visiting)
    }

    fn stale_inner(
        &self,
        id: SymbolId,
        memo: &mut FxHashMap<SymbolId, bool>,
        visiting: &mut FxHashSet<SymbolId>,
    ) -> bool {
        if let Some(&known) = memo.get(&id) {
            return known;
        }
        if !visiting.insert(id) {
            return false;
        }
        let sym = self.store.symbol(id);
        let mut result = sym.flags.contains(SymbolFlags::PARENT_DELETED)
            || !sym.updated_deps.is_empty();
        if !result {
            for edge in self.graph.parents(id) {
                let parent = self.store.symbol(edge.sym);
                if parent.is_builtin() {
                    continue;
                }
                if parent.defined_at > sym.defined_at
                    || self.stale_inner(edge.sym, memo, visiting)
                {
                    result = true;
                    break;
                }
            }
        }
        visiting.remove(&id);
        memo.insert(id, result);
        result
    }

    /// The frontier of a stale symbol: the ancestors whose staleness comes
    /// from a direct fresher parent. Re-running their defining cells starts
    /// the refresh chain.
    fn stale_frontier(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut frontier = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let sym = self.store.symbol(current);
            let mut direct = !sym.updated_deps.is_empty();
            for edge in self.graph.parents(current) {
                let parent = self.store.symbol(edge.sym);
                if parent.is_builtin() {
                    continue;
                }
                if parent.defined_at > sym.defined_at {
                    direct = true;
                } else {
                    stack.push(edge.sym);
                }
            }
            if direct {
                frontier.push(current);
            }
        }
        frontier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Fresh,
    Waiting,
    Ready,
}

/// Pre-blocking status of a cell.
enum Status {
    Fresh,
    Waiting,
    /// Executed, nothing stale, but some inputs moved since the last run.
    Candidate { fresh: Vec<SymbolId> },
}

struct CellView {
    slot: CellSlot,
    executed: bool,
    end: Timestamp,
    reads: Vec<SymbolId>,
    writes: FxHashSet<SymbolId>,
    unresolved: bool,
}

impl CellView {
    fn fresh_for_cell(&self, store: &SymbolStore, sym: SymbolId) -> bool {
        self.executed && store.symbol(sym).defined_at > self.end
    }
}
