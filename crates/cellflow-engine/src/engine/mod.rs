//! Cellflow dependency engine.
//!
//! Observes cell executions, maintains the versioned symbol graph, and
//! answers waiting/ready classification plus the reactive schedule.

pub mod cells;
pub mod checker;
pub mod clock;
pub mod graph;
pub mod namespace;
pub mod scope;
pub mod snapshot;
pub mod store;
pub mod symbol;
pub mod tracer;

pub mod scheduler;

#[cfg(test)]
mod tests;

pub use cells::{Cell, CellRegistry};
pub use checker::{Checker, Classification};
pub use clock::Clock;
pub use graph::{DataflowGraph, Edge, EdgeKind};
pub use namespace::Namespace;
pub use scheduler::{ReactiveSession, Schedule, Scheduler};
pub use scope::{Scope, ScopeKind};
pub use snapshot::{CellSnapshot, SnapshotDoc, SnapshotError};
pub use store::SymbolStore;
pub use symbol::{Symbol, SymbolFlags, SymbolKind};
pub use tracer::{TraceCtx, TraceEvent, Tracer};

use cellflow_analysis::{CellAnalysis, CellAst, analyze};
use cellflow_common::{
    ExecMode, ExecRange, FlowError, FlowErrorKind, NodeId, NsKey, Settings, Timestamp, ValueHandle,
};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::handlers::{CallSignature, HandlerRegistry};

/// Names pre-seeded into the builtins scope so common host builtins
/// resolve without ever contributing staleness.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "print", "len", "range", "enumerate", "zip", "map", "filter", "sorted", "reversed", "sum",
    "min", "max", "abs", "round", "repr", "str", "int", "float", "bool", "list", "dict", "set",
    "tuple", "type", "isinstance", "getattr", "setattr", "hasattr", "open", "iter", "next",
    "id", "hash", "format", "any", "all",
];

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineInstrumentation {
    pub events_seen: u64,
    pub symbols_touched: u64,
    pub edges_added: u64,
    pub mutations_marked: u64,
    pub trace_resets: u64,
    pub handler_fallbacks: u64,
    pub classify_passes: u64,
}

impl EngineInstrumentation {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many call frames below the cell's top level the tracer follows.
    pub trace_depth_cap: usize,
    /// Depth budget for the scheduler's cycle-hunting DFS.
    pub cycle_dfs_depth_cap: usize,
    /// Soft cap on arena size; tracing degrades (stops creating symbols)
    /// past it.
    pub max_symbols: Option<usize>,
    /// Names seeded into the builtins scope.
    pub builtin_names: Vec<String>,
    pub settings: Settings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_depth_cap: 2,
            cycle_dfs_depth_cap: 1024,
            max_symbols: None,
            builtin_names: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
            settings: Settings::default(),
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn with_trace_depth_cap(mut self, cap: usize) -> Self {
        self.trace_depth_cap = cap;
        self
    }

    #[inline]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn with_max_symbols(mut self, cap: usize) -> Self {
        self.max_symbols = Some(cap);
        self
    }

    #[inline]
    pub fn with_builtins<I: IntoIterator<Item = String>>(mut self, names: I) -> Self {
        self.builtin_names = names.into_iter().collect();
        self
    }
}

/// The engine: one instance owns every piece of mutable state (clock,
/// stores, tracer, session). Nothing lives in ambient statics.
pub struct FlowEngine {
    config: EngineConfig,
    settings: Settings,
    clock: Clock,
    store: SymbolStore,
    graph: DataflowGraph,
    cells: CellRegistry,
    tracer: Tracer,
    handlers: HandlerRegistry,
    instr: EngineInstrumentation,
    session: ReactiveSession,
    /// Ready set as of the start of the last execution; newly-ready cells
    /// are measured against it.
    prev_ready: FxHashSet<String>,
    last_classification: Option<Classification>,
    pending_start: Option<Timestamp>,
    last_executed_cell: Option<String>,
    last_execution_was_error: bool,
    active_cell: Option<String>,
}

impl FlowEngine {
    pub fn new(config: EngineConfig) -> Self {
        let builtin_refs: Vec<&str> = config.builtin_names.iter().map(|s| s.as_str()).collect();
        let store = SymbolStore::new(&builtin_refs);
        let settings = config.settings.clone();
        let trace_depth_cap = config.trace_depth_cap;
        Self {
            config,
            settings,
            clock: Clock::new(),
            store,
            graph: DataflowGraph::new(),
            cells: CellRegistry::new(),
            tracer: Tracer::new(trace_depth_cap),
            handlers: HandlerRegistry::with_defaults(),
            instr: EngineInstrumentation::default(),
            session: ReactiveSession::default(),
            prev_ready: FxHashSet::default(),
            last_classification: None,
            pending_start: None,
            last_executed_cell: None,
            last_execution_was_error: false,
            active_cell: None,
        }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    #[inline]
    pub fn instrumentation(&self) -> EngineInstrumentation {
        self.instr
    }

    #[inline]
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    #[inline]
    pub fn cells(&self) -> &CellRegistry {
        &self.cells
    }

    #[inline]
    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    #[inline]
    pub fn graph(&self) -> &DataflowGraph {
        &self.graph
    }

    #[inline]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[inline]
    pub fn last_executed_cell(&self) -> Option<&str> {
        self.last_executed_cell.as_deref()
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// The host announces a cell's text and parsed body. Returns the
    /// cached static analysis.
    pub fn on_cell_submit(&mut self, cell_id: &str, source: &str, ast: &CellAst) -> &CellAnalysis {
        let slot = self.cells.ensure(cell_id);
        self.cells.update_source(slot, source);
        let analysis = analyze(ast);
        let cell = self.cells.get_mut(slot);
        cell.analysis_failed = false;
        cell.analysis.insert(analysis)
    }

    /// The host's parser failed on this cell. The prior cached analysis is
    /// reused when the text is unchanged; otherwise the cell is classified
    /// pessimistically until it parses again.
    pub fn on_cell_submit_failed(&mut self, cell_id: &str, source: &str) {
        let slot = self.cells.ensure(cell_id);
        let changed = self.cells.update_source(slot, source);
        let cell = self.cells.get_mut(slot);
        if changed || cell.analysis.is_none() {
            cell.analysis_failed = true;
            let err = FlowError::new(FlowErrorKind::StaticAnalysisFailure).with_cell(cell_id);
            warn!(error = %err, "no cached analysis to fall back on; cell waits pessimistically");
        }
    }

    /// Text changed without re-submission (no re-analysis yet).
    pub fn notify_content_changed(&mut self, cell_id: &str, source: &str) {
        let slot = self.cells.ensure(cell_id);
        self.cells.update_source(slot, source);
    }

    pub fn set_cell_order(&mut self, cell_id: &str, order_idx: u32) {
        let slot = self.cells.ensure(cell_id);
        self.cells.set_order(slot, order_idx);
    }

    pub fn change_active_cell(&mut self, cell_id: &str, order_idx: u32) {
        self.set_cell_order(cell_id, order_idx);
        self.active_cell = Some(cell_id.to_string());
    }

    pub fn set_forced_reactive(&mut self, cell_id: &str, forced: bool) {
        let slot = self.cells.ensure(cell_id);
        self.cells.get_mut(slot).forced_reactive = forced;
    }

    // ------------------------------------------------------------------
    // Execution lifecycle
    // ------------------------------------------------------------------

    /// The host is about to execute a cell. Snapshots the ready set (for
    /// newly-ready accounting) and arms the tracer.
    pub fn begin_execution(&mut self, cell_id: &str) {
        let ready_now: FxHashSet<String> = match self.last_classification.take() {
            Some(c) => {
                let set = c.ready_cells.iter().cloned().collect();
                self.last_classification = Some(c);
                set
            }
            None => self.classify().ready_cells.into_iter().collect(),
        };
        self.prev_ready = ready_now;

        let slot = self.cells.ensure(cell_id);
        {
            let cell = self.cells.get_mut(slot);
            cell.exec_count += 1;
            cell.dirty = false;
            cell.last_error = false;
        }
        let FlowEngine {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
            tracer,
            ..
        } = self;
        let mut ctx = TraceCtx {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
        };
        let start = tracer.begin(slot, &mut ctx);
        self.pending_start = Some(start);
    }

    /// The host finished (or aborted) the execution.
    pub fn finish_execution(&mut self, cell_id: &str, error: bool) {
        let FlowEngine {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
            tracer,
            ..
        } = self;
        let mut ctx = TraceCtx {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
        };
        let end = tracer.finish(&mut ctx);
        let (reads, writes) = tracer.take_exec_sets();

        if let Some(slot) = self.cells.slot(cell_id) {
            let start = self.pending_start.take().unwrap_or(end);
            let cell = self.cells.get_mut(slot);
            // A run that completed no statement leaves the previous
            // history in place as the best available evidence.
            if end > start || cell.last_exec.is_none() {
                cell.last_exec = Some(ExecRange::new(start, end));
                cell.last_reads = reads;
                cell.last_writes = writes;
            }
            cell.last_error = error;
        }
        self.last_executed_cell = Some(cell_id.to_string());
        self.last_execution_was_error = error;
        self.last_classification = None;
        if error {
            // An error aborts any reactive chain; graph edges recorded so
            // far are kept.
            debug!(cell = cell_id, "execution errored; reactive chain aborted");
            self.session.clear();
        }
    }

    /// Feed one tracer event.
    pub fn handle_event(&mut self, event: TraceEvent) {
        if let Some(cap) = self.config.max_symbols {
            if self.store.symbol_count() > cap {
                warn!(cap, "symbol cap exceeded; dropping trace events");
                return;
            }
        }
        let FlowEngine {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
            tracer,
            ..
        } = self;
        let mut ctx = TraceCtx {
            clock,
            store,
            graph,
            cells,
            handlers,
            instr,
        };
        tracer.handle(&mut ctx, event);
    }

    // Tracer entry points, named after the host's instrumentation hooks.

    pub fn on_statement_enter(&mut self, node: u32) {
        self.handle_event(TraceEvent::StmtEnter {
            node: NodeId::new(node),
        });
    }

    pub fn on_statement_exit(&mut self, node: u32, abort: bool) {
        self.handle_event(TraceEvent::StmtExit {
            node: NodeId::new(node),
            abort,
        });
    }

    pub fn on_name_load(&mut self, name: &str) {
        self.handle_event(TraceEvent::LoadName {
            name: name.to_string(),
        });
    }

    pub fn on_name_store(&mut self, name: &str, handle: ValueHandle) {
        self.handle_event(TraceEvent::StoreName {
            name: name.to_string(),
            handle,
        });
    }

    pub fn on_attr_load(&mut self, obj: ValueHandle, attr: &str) {
        self.handle_event(TraceEvent::AttrLoad {
            obj,
            attr: attr.to_string(),
        });
    }

    pub fn on_attr_store(&mut self, obj: ValueHandle, attr: &str, value: ValueHandle) {
        self.handle_event(TraceEvent::AttrStore {
            obj,
            attr: attr.to_string(),
            value,
        });
    }

    pub fn on_subscript_load(&mut self, obj: ValueHandle, key: NsKey) {
        self.handle_event(TraceEvent::SubscriptLoad { obj, key });
    }

    pub fn on_subscript_store(&mut self, obj: ValueHandle, key: NsKey, value: ValueHandle) {
        self.handle_event(TraceEvent::SubscriptStore { obj, key, value });
    }

    pub fn on_call_enter(
        &mut self,
        site: u32,
        func: Option<ValueHandle>,
        func_name: Option<&str>,
        args: Vec<ValueHandle>,
    ) {
        self.handle_event(TraceEvent::CallEnter {
            site: NodeId::new(site),
            func,
            func_name: func_name.map(str::to_string),
            args,
        });
    }

    pub fn on_call_return(&mut self, value: Option<ValueHandle>) {
        self.handle_event(TraceEvent::CallReturn { value });
    }

    pub fn on_external_call(
        &mut self,
        signature: CallSignature,
        receiver: Option<ValueHandle>,
        args: Vec<ValueHandle>,
        ret: Option<ValueHandle>,
    ) {
        self.handle_event(TraceEvent::ExternalCall {
            signature,
            receiver,
            args,
            kwargs: Vec::new(),
            ret,
        });
    }

    pub fn on_mutation(&mut self, obj: ValueHandle) {
        self.handle_event(TraceEvent::Mutation { obj });
    }

    // ------------------------------------------------------------------
    // Classification and scheduling
    // ------------------------------------------------------------------

    /// Classify every cell. Pure with respect to engine state: repeated
    /// calls without intervening events return the same result.
    pub fn classify(&mut self) -> Classification {
        self.instr.classify_passes += 1;
        let checker = Checker::new(&self.store, &self.graph, &self.cells);
        let classification = checker.classify(&self.prev_ready);
        self.last_classification = Some(classification.clone());
        classification
    }

    /// Next cell of the reactive chain, or `None` when the chain is done
    /// (or the engine is in lazy mode).
    pub fn schedule_next(&mut self, last_executed: Option<&str>) -> Option<String> {
        if self.settings.exec_mode == ExecMode::Lazy {
            return None;
        }
        let classification = self.classify();
        let last = last_executed
            .map(str::to_string)
            .or_else(|| self.last_executed_cell.clone())
            .or_else(|| self.active_cell.clone());
        let scheduler = Scheduler::new(
            &self.cells,
            &classification,
            &self.settings,
            self.config.cycle_dfs_depth_cap,
        );
        scheduler.next_cell(last.as_deref(), &mut self.session)
    }

    /// Whole reactive closure in execution order (batch mode).
    pub fn compute_schedule(&mut self, last_executed: Option<&str>) -> Schedule {
        let classification = self.classify();
        let last = last_executed
            .map(str::to_string)
            .or_else(|| self.last_executed_cell.clone());
        let scheduler = Scheduler::new(
            &self.cells,
            &classification,
            &self.settings,
            self.config.cycle_dfs_depth_cap,
        );
        scheduler.schedule(last.as_deref(), &mut self.session)
    }

    /// Drop reactive-session-local state; graph state is untouched.
    pub fn reactivity_cleanup(&mut self) {
        self.session.clear();
    }

    #[inline]
    pub fn last_execution_was_error(&self) -> bool {
        self.last_execution_was_error
    }

    pub(crate) fn cells_mut(&mut self) -> &mut CellRegistry {
        &mut self.cells
    }

    pub(crate) fn cells_mut_slot(&self, id: &str) -> Option<cellflow_common::CellSlot> {
        self.cells.slot(id)
    }

    pub(crate) fn fast_forward_clock(&mut self, exec: u32) {
        self.clock.fast_forward(exec);
    }

    pub(crate) fn session_snapshot(&self) -> ReactiveSession {
        self.session.clone()
    }

    pub(crate) fn restore_session(&mut self, session: ReactiveSession) {
        self.session = session;
    }
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Construct a new engine with the given configuration.
pub fn new_engine(config: EngineConfig) -> FlowEngine {
    FlowEngine::new(config)
}
