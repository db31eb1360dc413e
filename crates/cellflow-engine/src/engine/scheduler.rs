//! Reactive scheduler.
//!
//! Picks which cell runs next (or the whole closure, in batch mode) from
//! the current classification. Three policies; the flow-order setting
//! restricts eligibility by document position. Cycles in the cell graph
//! are broken once per reactive session by emitting the member with the
//! lowest execution count.

use cellflow_common::{ExecSchedule, FlowError, FlowErrorKind, FlowOrder, Settings};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::cells::CellRegistry;
use super::checker::Classification;

/// Reactive-session-local scheduler state. Dropped by
/// `reactivity_cleanup`.
#[derive(Debug, Clone, Default)]
pub struct ReactiveSession {
    /// Cells already emitted this session; a session never emits a cell
    /// twice.
    pub emitted: FxHashSet<String>,
    /// Cycles already broken this session.
    pub handled_cycles: Vec<Vec<String>>,
}

impl ReactiveSession {
    pub fn clear(&mut self) {
        self.emitted.clear();
        self.handled_cycles.clear();
    }

    fn in_handled_cycle(&self, id: &str) -> bool {
        self.handled_cycles
            .iter()
            .any(|cycle| cycle.iter().any(|c| c == id))
    }
}

/// An ordered batch schedule: layers would be overkill here — reactive
/// execution is one cell at a time — but cycles are surfaced for the
/// front-end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub order: Vec<String>,
    pub cycles: Vec<Vec<String>>,
}

pub struct Scheduler<'a> {
    cells: &'a CellRegistry,
    classification: &'a Classification,
    settings: &'a Settings,
    dfs_depth_cap: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        cells: &'a CellRegistry,
        classification: &'a Classification,
        settings: &'a Settings,
        dfs_depth_cap: usize,
    ) -> Self {
        Self {
            cells,
            classification,
            settings,
            dfs_depth_cap,
        }
    }

    /// Next cell to run under the configured policy, or `None` when the
    /// reactive chain is exhausted.
    pub fn next_cell(
        &self,
        last_executed: Option<&str>,
        session: &mut ReactiveSession,
    ) -> Option<String> {
        let candidates = self.eligible(last_executed, session, false);
        if candidates.is_empty() {
            return None;
        }

        let pick = match self.settings.exec_schedule {
            ExecSchedule::LivenessBased => self.pick_liveness(&candidates),
            ExecSchedule::DagBased => self.pick_dag(&candidates, session),
            ExecSchedule::Hybrid => self.pick_hybrid(&candidates, session),
        };
        if let Some(id) = &pick {
            session.emitted.insert(id.clone());
            debug!(cell = %id, policy = ?self.settings.exec_schedule, "scheduled");
        }
        pick
    }

    /// The whole closure, topologically ordered, for batch reactivity.
    pub fn schedule(
        &self,
        last_executed: Option<&str>,
        session: &mut ReactiveSession,
    ) -> Schedule {
        let mut pool = self.eligible(last_executed, session, true);

        if self.settings.pull_reactive_updates {
            // Extend the closure through stale parents: a scheduled cell
            // drags its waiting parents in ahead of itself.
            let mut added = true;
            while added {
                added = false;
                for id in pool.clone() {
                    for parent in self.parents_of(&id) {
                        if self.classification.is_waiting(&parent) && !pool.contains(&parent) {
                            pool.push(parent);
                            added = true;
                        }
                    }
                }
            }
        }

        if self.settings.push_reactive_updates_to_cousins {
            // Siblings sharing a waiting parent ride along.
            let mut cousins = Vec::new();
            for id in &pool {
                for parent in self.parents_of(id) {
                    if !self.classification.is_waiting(&parent) {
                        continue;
                    }
                    if let Some(children) = self.classification.cell_children.get(&parent) {
                        for child in children {
                            if !pool.contains(child) && !cousins.contains(child) {
                                cousins.push(child.clone());
                            }
                        }
                    }
                }
            }
            pool.extend(cousins);
        }

        self.topo_order(pool, session)
    }

    // ------------------------------------------------------------------

    fn eligible(
        &self,
        last_executed: Option<&str>,
        session: &ReactiveSession,
        whole_closure: bool,
    ) -> Vec<String> {
        let base: Vec<&String> = if whole_closure {
            self.classification
                .ready_cells
                .iter()
                .chain(&self.classification.forced_reactive_cells)
                .collect()
        } else {
            self.classification
                .new_ready_cells
                .iter()
                .chain(&self.classification.forced_reactive_cells)
                .collect()
        };

        let last_order = last_executed
            .and_then(|id| self.cells.get_by_id(id))
            .map(|c| c.order_idx);

        let mut out: Vec<String> = Vec::new();
        for id in base {
            if Some(id.as_str()) == last_executed {
                continue;
            }
            if session.emitted.contains(id) || session.in_handled_cycle(id) {
                continue;
            }
            if self.settings.flow_order == FlowOrder::InOrder {
                if let (Some(last), Some(cell)) = (last_order, self.cells.get_by_id(id)) {
                    if cell.order_idx < last {
                        continue;
                    }
                }
            }
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }

    fn exec_count(&self, id: &str) -> u32 {
        self.cells.get_by_id(id).map(|c| c.exec_count).unwrap_or(0)
    }

    fn order_idx(&self, id: &str) -> u32 {
        self.cells
            .get_by_id(id)
            .map(|c| c.order_idx)
            .unwrap_or(u32::MAX)
    }

    /// Earliest by execution count, document order breaking ties.
    fn pick_liveness(&self, candidates: &[String]) -> Option<String> {
        candidates
            .iter()
            .min_by_key(|id| (self.exec_count(id), self.order_idx(id)))
            .cloned()
    }

    /// Topological order over the candidate-restricted cell graph,
    /// document order within a layer. Falls back to cycle breaking when no
    /// candidate is dependency-free.
    fn pick_dag(&self, candidates: &[String], session: &mut ReactiveSession) -> Option<String> {
        let candidate_set: FxHashSet<&str> = candidates.iter().map(|s| s.as_str()).collect();
        let free: Vec<&String> = candidates
            .iter()
            .filter(|id| {
                self.parents_of(id)
                    .iter()
                    .all(|p| !candidate_set.contains(p.as_str()) || p.as_str() == id.as_str())
            })
            .collect();
        if let Some(pick) = free.iter().min_by_key(|id| self.order_idx(id)) {
            return Some((*pick).clone());
        }
        self.break_cycle(candidates, session)
    }

    /// Dag order across strongly-connected components, liveness order
    /// inside one.
    fn pick_hybrid(&self, candidates: &[String], session: &mut ReactiveSession) -> Option<String> {
        let sccs = self.condensation(candidates);
        let Some(first) = sccs.first() else {
            return self.break_cycle(candidates, session);
        };
        if first.len() > 1 {
            // An actual cycle: break it once, then keep it out of this
            // session.
            let pick = first
                .iter()
                .min_by_key(|id| (self.exec_count(id), self.order_idx(id)))
                .cloned();
            session.handled_cycles.push(first.clone());
            debug!(members = first.len(), "cycle in cell graph broken");
            return pick;
        }
        self.pick_liveness(first)
    }

    fn parents_of(&self, id: &str) -> Vec<String> {
        self.classification
            .cell_parents
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Bounded-depth DFS for a cycle among the candidates; on success the
    /// lowest-execution-count member is emitted and the cycle recorded.
    fn break_cycle(
        &self,
        candidates: &[String],
        session: &mut ReactiveSession,
    ) -> Option<String> {
        for start in candidates {
            if let Some(cycle) = self.find_cycle(start) {
                let err = FlowError::new(FlowErrorKind::CycleInScheduler);
                debug!(error = %err, members = cycle.len(), "emitting lowest-execution-count member");
                let pick = cycle
                    .iter()
                    .min_by_key(|id| (self.exec_count(id), self.order_idx(id)))
                    .cloned();
                session.handled_cycles.push(cycle);
                return pick;
            }
        }
        // No cycle found within the depth budget: fall back to liveness
        // order rather than stalling the chain.
        self.pick_liveness(candidates)
    }

    fn find_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut path: Vec<String> = Vec::new();
        let mut visited: FxHashSet<String> = FxHashSet::default();
        self.dfs_cycle(start, start, &mut path, &mut visited, 0)
    }

    fn dfs_cycle(
        &self,
        start: &str,
        current: &str,
        path: &mut Vec<String>,
        visited: &mut FxHashSet<String>,
        depth: usize,
    ) -> Option<Vec<String>> {
        if depth >= self.dfs_depth_cap {
            return None;
        }
        path.push(current.to_string());
        visited.insert(current.to_string());
        for parent in self.parents_of(current) {
            if parent == start && depth > 0 {
                return Some(path.clone());
            }
            if !visited.contains(&parent) {
                if let Some(cycle) = self.dfs_cycle(start, &parent, path, visited, depth + 1) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }

    /// Strongly-connected components of the candidate-restricted cell
    /// graph, in topological order of the condensation.
    fn condensation(&self, candidates: &[String]) -> Vec<Vec<String>> {
        let index_of: FxHashMap<&str, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let n = candidates.len();
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, id) in candidates.iter().enumerate() {
            for parent in self.parents_of(id) {
                if let Some(&j) = index_of.get(parent.as_str()) {
                    if i != j {
                        // parent j must run before child i
                        adj[j].push(i);
                    }
                }
            }
        }

        let mut ids = vec![usize::MAX; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut counter = 0usize;
        let mut sccs: Vec<Vec<usize>> = Vec::new();

        #[allow(clippy::too_many_arguments)]
        fn strongconnect(
            v: usize,
            adj: &[Vec<usize>],
            ids: &mut [usize],
            low: &mut [usize],
            on_stack: &mut [bool],
            stack: &mut Vec<usize>,
            counter: &mut usize,
            sccs: &mut Vec<Vec<usize>>,
        ) {
            ids[v] = *counter;
            low[v] = *counter;
            *counter += 1;
            stack.push(v);
            on_stack[v] = true;
            for &w in &adj[v] {
                if ids[w] == usize::MAX {
                    strongconnect(w, adj, ids, low, on_stack, stack, counter, sccs);
                    low[v] = low[v].min(low[w]);
                } else if on_stack[w] {
                    low[v] = low[v].min(ids[w]);
                }
            }
            if low[v] == ids[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                sccs.push(component);
            }
        }

        for v in 0..n {
            if ids[v] == usize::MAX {
                strongconnect(
                    v,
                    &adj,
                    &mut ids,
                    &mut low,
                    &mut on_stack,
                    &mut stack,
                    &mut counter,
                    &mut sccs,
                );
            }
        }

        // Tarjan emits components in reverse topological order of the
        // condensation.
        sccs.reverse();
        sccs.into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|i| candidates[i].clone())
                    .collect()
            })
            .collect()
    }

    /// Kahn layering over the pool; members of unresolved cycles are
    /// surfaced separately, ordered by execution count.
    fn topo_order(&self, pool: Vec<String>, session: &mut ReactiveSession) -> Schedule {
        let mut schedule = Schedule::default();
        let sccs = self.condensation(&pool);
        for scc in sccs {
            if scc.len() > 1 {
                let mut members = scc.clone();
                members.sort_by_key(|id| (self.exec_count(id), self.order_idx(id)));
                schedule.order.extend(members);
                session.handled_cycles.push(scc.clone());
                schedule.cycles.push(scc);
            } else {
                schedule.order.extend(scc);
            }
        }
        schedule
    }
}
