//! Dynamic tracer adapter.
//!
//! Consumes the instrumentation collaborator's event stream and turns it
//! into symbol resolutions, edge updates, and mutation marks. The tracer
//! enforces trace-once semantics per AST node within an outer statement,
//! caps trace depth below user code, and refuses to re-enter itself.

use cellflow_common::{
    CellSlot, FlowError, FlowErrorKind, NodeId, NsKey, RefPath, ScopeId, SymbolId, Timestamp,
    ValueHandle,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::handlers::{CallSignature, Effect, HandlerRegistry, HandlerSpec, ParamRef};

use super::EngineInstrumentation;
use super::cells::CellRegistry;
use super::clock::Clock;
use super::graph::{DataflowGraph, EdgeKind};
use super::scope::ScopeKind;
use super::store::SymbolStore;
use super::symbol::SymbolKind;

/// Runtime events delivered by the instrumentation collaborator.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    StmtEnter {
        node: NodeId,
    },
    StmtExit {
        node: NodeId,
        abort: bool,
    },
    LoadName {
        name: String,
    },
    StoreName {
        name: String,
        handle: ValueHandle,
    },
    AttrLoad {
        obj: ValueHandle,
        attr: String,
    },
    AttrStore {
        obj: ValueHandle,
        attr: String,
        value: ValueHandle,
    },
    SubscriptLoad {
        obj: ValueHandle,
        key: NsKey,
    },
    SubscriptStore {
        obj: ValueHandle,
        key: NsKey,
        value: ValueHandle,
    },
    /// A call into instrumented (user) code.
    CallEnter {
        site: NodeId,
        func: Option<ValueHandle>,
        func_name: Option<String>,
        args: Vec<ValueHandle>,
    },
    CallReturn {
        value: Option<ValueHandle>,
    },
    /// A call that crossed the trace boundary into library code; the
    /// handler registry decides its effects.
    ExternalCall {
        signature: CallSignature,
        receiver: Option<ValueHandle>,
        args: Vec<ValueHandle>,
        kwargs: Vec<(String, ValueHandle)>,
        ret: Option<ValueHandle>,
    },
    /// Explicit mutation mark from the host.
    Mutation {
        obj: ValueHandle,
    },
    Delete {
        name: String,
    },
}

/// Mutable engine state the tracer operates on. Split out so the tracer's
/// own bookkeeping and the shared stores borrow independently.
pub struct TraceCtx<'a> {
    pub clock: &'a mut Clock,
    pub store: &'a mut SymbolStore,
    pub graph: &'a mut DataflowGraph,
    pub cells: &'a mut CellRegistry,
    pub handlers: &'a HandlerRegistry,
    pub instr: &'a mut EngineInstrumentation,
}

struct Frame {
    scope: ScopeId,
    callee: Option<SymbolId>,
    /// Loads observed while the frame was on top.
    loads: Vec<SymbolId>,
    arg_syms: Vec<SymbolId>,
}

pub struct Tracer {
    enabled: bool,
    depth_cap: usize,
    frames: Vec<Frame>,
    /// Calls past the depth cap: counted, not traced.
    capped_calls: usize,
    /// Nodes already processed within the current outer statement.
    traced_nodes: FxHashSet<NodeId>,
    stmt_depth: usize,
    suppressed_above: Option<usize>,
    /// Loads observed during the current statement, in order.
    stmt_live: Vec<SymbolId>,
    current_cell: Option<CellSlot>,
    /// Reaching-definitions index of the executing cell.
    static_sources: FxHashMap<String, Vec<RefPath>>,
    function_params: FxHashMap<String, Vec<String>>,
    /// Symbol kinds the analyzer could attribute to names (functions,
    /// classes, import bindings), accumulated across submissions.
    kind_hints: FxHashMap<String, SymbolKind>,
    last_completed: Timestamp,
    aborted: bool,
    /// Everything read / written over the whole execution, for the derived
    /// cell graph.
    exec_reads: FxHashSet<SymbolId>,
    exec_writes: FxHashSet<SymbolId>,
}

impl Tracer {
    pub fn new(depth_cap: usize) -> Self {
        Self {
            enabled: false,
            depth_cap,
            frames: Vec::new(),
            capped_calls: 0,
            traced_nodes: FxHashSet::default(),
            stmt_depth: 0,
            suppressed_above: None,
            stmt_live: Vec::new(),
            current_cell: None,
            static_sources: FxHashMap::default(),
            function_params: FxHashMap::default(),
            kind_hints: FxHashMap::default(),
            last_completed: Timestamp::NEVER,
            aborted: false,
            exec_reads: FxHashSet::default(),
            exec_writes: FxHashSet::default(),
        }
    }

    /// Arm the tracer for one cell execution.
    pub fn begin(&mut self, cell: CellSlot, ctx: &mut TraceCtx<'_>) -> Timestamp {
        let start = ctx.clock.new_cell();
        self.enabled = true;
        self.frames.clear();
        self.capped_calls = 0;
        self.traced_nodes.clear();
        self.stmt_depth = 0;
        self.suppressed_above = None;
        self.stmt_live.clear();
        self.current_cell = Some(cell);
        self.aborted = false;
        self.last_completed = start;
        self.exec_reads.clear();
        self.exec_writes.clear();

        let record = ctx.cells.get(cell);
        self.static_sources = record
            .analysis
            .as_ref()
            .map(|a| a.reaching.clone())
            .unwrap_or_default();
        for (name, params) in record
            .analysis
            .iter()
            .flat_map(|a| a.functions.iter())
        {
            self.function_params.insert(name.clone(), params.clone());
            self.kind_hints.insert(name.clone(), SymbolKind::Function);
        }
        for class in record.analysis.iter().flat_map(|a| a.classes.iter()) {
            self.kind_hints.insert(class.clone(), SymbolKind::Class);
        }
        for imported in record.analysis.iter().flat_map(|a| a.imports.iter()) {
            // `import module` binds a module object; `from module import
            // name` binds whatever the module exposes.
            let kind = if imported.name.is_none() {
                SymbolKind::Module
            } else {
                SymbolKind::Import
            };
            self.kind_hints
                .insert(imported.bound_name().to_string(), kind);
        }
        start
    }

    /// Symbols read / written over the whole execution, for the cell
    /// record.
    pub fn take_exec_sets(&mut self) -> (Vec<SymbolId>, Vec<SymbolId>) {
        (
            self.exec_reads.drain().collect(),
            self.exec_writes.drain().collect(),
        )
    }

    /// Disarm after a cell execution; returns the tick of the last
    /// completed statement (the execution's effective end).
    pub fn finish(&mut self, ctx: &mut TraceCtx<'_>) -> Timestamp {
        if !self.frames.is_empty() {
            let err = FlowError::new(FlowErrorKind::TraceInconsistency)
                .with_message(format!("{} frames left on stack", self.frames.len()));
            warn!(error = %err, "resetting frame stack");
            ctx.instr.trace_resets += 1;
            self.frames.clear();
        }
        self.enabled = false;
        self.current_cell = None;
        if self.aborted {
            self.last_completed
        } else {
            ctx.clock.current()
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    fn active(&self) -> bool {
        self.enabled && self.suppressed_above.is_none() && self.capped_calls == 0
    }

    fn current_scope(&self, ctx: &TraceCtx<'_>) -> ScopeId {
        self.frames
            .last()
            .map(|f| f.scope)
            .unwrap_or_else(|| ctx.store.global_scope())
    }

    /// Process one event. Re-entrant calls are ignored wholesale; the
    /// engine flips `enabled` only around host-initiated executions.
    pub fn handle(&mut self, ctx: &mut TraceCtx<'_>, event: TraceEvent) {
        if !self.enabled {
            return;
        }
        ctx.instr.events_seen += 1;
        match event {
            TraceEvent::StmtEnter { node } => self.stmt_enter(ctx, node),
            TraceEvent::StmtExit { node, abort } => self.stmt_exit(ctx, node, abort),
            TraceEvent::LoadName { name } => self.load_name(ctx, &name),
            TraceEvent::StoreName { name, handle } => self.store_name(ctx, &name, handle),
            TraceEvent::AttrLoad { obj, attr } => {
                self.member_load(ctx, obj, NsKey::attr(attr));
            }
            TraceEvent::SubscriptLoad { obj, key } => {
                self.member_load(ctx, obj, key);
            }
            TraceEvent::AttrStore { obj, attr, value } => {
                self.member_store(ctx, obj, NsKey::attr(attr), value);
            }
            TraceEvent::SubscriptStore { obj, key, value } => {
                self.member_store(ctx, obj, key, value);
            }
            TraceEvent::CallEnter {
                site,
                func,
                func_name,
                args,
            } => self.call_enter(ctx, site, func, func_name, args),
            TraceEvent::CallReturn { value } => self.call_return(ctx, value),
            TraceEvent::ExternalCall {
                signature,
                receiver,
                args,
                kwargs,
                ret,
            } => self.external_call(ctx, signature, receiver, args, kwargs, ret),
            TraceEvent::Mutation { obj } => self.mutation(ctx, obj),
            TraceEvent::Delete { name } => self.delete_name(ctx, &name),
        }
    }

    // ------------------------------------------------------------------

    fn stmt_enter(&mut self, ctx: &mut TraceCtx<'_>, node: NodeId) {
        if self.stmt_depth == 0 {
            // New outer statement: trace-once bookkeeping resets.
            self.traced_nodes.clear();
            self.stmt_live.clear();
        }
        self.stmt_depth += 1;
        if self.suppressed_above.is_some() {
            return;
        }
        if !self.traced_nodes.insert(node) {
            // Same source location again within this outer statement
            // (a loop body): process once, then stay out of the way.
            self.suppressed_above = Some(self.stmt_depth);
            return;
        }
        if self.capped_calls == 0 {
            ctx.clock.tick();
        }
    }

    fn stmt_exit(&mut self, ctx: &mut TraceCtx<'_>, _node: NodeId, abort: bool) {
        if let Some(level) = self.suppressed_above {
            if self.stmt_depth == level {
                self.suppressed_above = None;
            }
        }
        self.stmt_depth = self.stmt_depth.saturating_sub(1);
        if abort {
            self.aborted = true;
            debug!(cell = ?self.current_cell, "execution aborted mid-statement");
        } else if self.stmt_depth == 0 && self.capped_calls == 0 {
            self.last_completed = ctx.clock.current();
        }
    }

    fn load_name(&mut self, ctx: &mut TraceCtx<'_>, name: &str) {
        if !self.active() {
            return;
        }
        let scope = self.current_scope(ctx);
        if let Some(sym) = ctx.store.lookup(scope, name) {
            ctx.store.touch(sym, ctx.clock.current());
            self.record_load(sym);
        }
    }

    fn store_name(&mut self, ctx: &mut TraceCtx<'_>, name: &str, handle: ValueHandle) {
        if !self.active() {
            return;
        }
        let scope = self.current_scope(ctx);
        let ts = ctx.clock.current();
        let sym = ctx
            .store
            .upsert(scope, name, Some(handle), ts, self.current_cell);
        ctx.instr.symbols_touched += 1;
        self.record_write(sym);

        // The new definition's parent set replaces the old one.
        ctx.graph.reset_parents(sym);

        // Static evidence: the analyzer's reaching definitions for this name.
        if let Some(sources) = self.static_sources.get(name).cloned() {
            for source in sources {
                if let Some(parent) = ctx.store.resolve_path(scope, &source) {
                    if parent != sym && !ctx.store.symbol(parent).is_builtin() {
                        ctx.graph.add_edge(parent, sym, ts, EdgeKind::Static);
                        ctx.instr.edges_added += 1;
                    }
                }
            }
        }

        // Dynamic evidence: everything loaded so far in this statement.
        let live: FxHashSet<SymbolId> = self.stmt_live.iter().copied().collect();
        for parent in live {
            if parent != sym && !ctx.store.symbol(parent).is_builtin() {
                ctx.graph.add_edge(parent, sym, ts, EdgeKind::Dynamic);
                ctx.instr.edges_added += 1;
            }
        }

        if let Some(kind) = self.kind_hint(name) {
            ctx.store.set_kind(sym, kind);
        }

        ctx.graph.notify_children(ctx.store, sym);
    }

    fn kind_hint(&self, name: &str) -> Option<SymbolKind> {
        self.kind_hints.get(name).copied()
    }

    fn member_load(&mut self, ctx: &mut TraceCtx<'_>, obj: ValueHandle, key: NsKey) {
        if !self.active() {
            return;
        }
        let Some(owner) = ctx.store.primary_for_handle(obj) else {
            return;
        };
        if let Some(child) = ctx.store.ns_child(owner, &key, true) {
            ctx.store.touch(child, ctx.clock.current());
            self.record_load(child);
        }
        // Reading a member also reads the owner.
        ctx.store.touch(owner, ctx.clock.current());
        self.record_load(owner);
    }

    fn member_store(
        &mut self,
        ctx: &mut TraceCtx<'_>,
        obj: ValueHandle,
        key: NsKey,
        value: ValueHandle,
    ) {
        if !self.active() {
            return;
        }
        let Some(owner) = ctx.store.primary_for_handle(obj) else {
            return;
        };
        let ts = ctx.clock.current();
        let child = ctx
            .store
            .upsert_ns_child(owner, &key, Some(value), ts, self.current_cell);
        ctx.instr.symbols_touched += 1;
        self.record_write(child);
        self.record_write(owner);

        ctx.graph.reset_parents(child);
        let live: FxHashSet<SymbolId> = self.stmt_live.iter().copied().collect();
        for parent in live {
            if parent != child && !ctx.store.symbol(parent).is_builtin() {
                ctx.graph.add_edge(parent, child, ts, EdgeKind::Dynamic);
            }
        }

        // The chain of owners up to the namespace root is mutated.
        ctx.store.mutate(owner, ts, self.current_cell);
        ctx.graph.notify_children(ctx.store, owner);
        for ancestor in ctx.store.owner_chain(owner) {
            ctx.store.mutate(ancestor, ts, self.current_cell);
            ctx.graph.notify_children(ctx.store, ancestor);
        }
        ctx.graph.notify_children(ctx.store, child);
    }

    fn call_enter(
        &mut self,
        ctx: &mut TraceCtx<'_>,
        _site: NodeId,
        func: Option<ValueHandle>,
        func_name: Option<String>,
        args: Vec<ValueHandle>,
    ) {
        if !self.enabled || self.suppressed_above.is_some() {
            return;
        }
        if self.capped_calls > 0 || self.frames.len() >= self.depth_cap {
            self.capped_calls += 1;
            return;
        }
        let caller_scope = self.current_scope(ctx);
        let callee = func
            .and_then(|h| ctx.store.primary_for_handle(h))
            .or_else(|| {
                func_name
                    .as_deref()
                    .and_then(|n| ctx.store.lookup(caller_scope, n))
            });

        let name = func_name.unwrap_or_else(|| {
            callee
                .map(|c| ctx.store.symbol(c).name.clone())
                .unwrap_or_else(|| "<call>".to_string())
        });
        let scope = ctx
            .store
            .new_scope(name.clone(), ScopeKind::Function, caller_scope);

        // Bind actuals to formals when the callee's def is on record; the
        // shared handles make the formals aliases of the actuals.
        let ts = ctx.clock.current();
        let mut arg_syms = Vec::with_capacity(args.len());
        let params = self.function_params.get(&name).cloned();
        for (i, &handle) in args.iter().enumerate() {
            if let Some(actual) = ctx.store.primary_for_handle(handle) {
                arg_syms.push(actual);
            }
            if let Some(params) = &params {
                if let Some(param) = params.get(i) {
                    ctx.store
                        .upsert(scope, param, Some(handle), ts, self.current_cell);
                }
            }
        }

        self.frames.push(Frame {
            scope,
            callee,
            loads: Vec::new(),
            arg_syms,
        });
    }

    fn call_return(&mut self, ctx: &mut TraceCtx<'_>, value: Option<ValueHandle>) {
        if !self.enabled || self.suppressed_above.is_some() {
            return;
        }
        if self.capped_calls > 0 {
            self.capped_calls -= 1;
            return;
        }
        let Some(frame) = self.frames.pop() else {
            let err = FlowError::new(FlowErrorKind::TraceInconsistency)
                .with_message("call return without matching enter");
            warn!(error = %err, "frame stack imbalance");
            ctx.instr.trace_resets += 1;
            return;
        };

        let Some(handle) = value else {
            return;
        };
        // The return value becomes an anonymous symbol whose parents are
        // the callee plus the arguments the body demonstrably read (all of
        // them, when the body was opaque).
        let ts = ctx.clock.current();
        let anon = ctx.store.anonymous(ts, self.current_cell);
        let mut parents: Vec<SymbolId> = Vec::new();
        if let Some(callee) = frame.callee {
            parents.push(callee);
        }
        let read_args: Vec<SymbolId> = if frame.loads.is_empty() {
            frame.arg_syms.clone()
        } else {
            frame
                .arg_syms
                .iter()
                .copied()
                .filter(|a| {
                    frame.loads.contains(a)
                        || ctx
                            .store
                            .aliases(*a)
                            .iter()
                            .any(|alias| frame.loads.contains(alias))
                })
                .collect()
        };
        parents.extend(read_args);
        for parent in parents {
            if !ctx.store.symbol(parent).is_builtin() {
                ctx.graph.add_edge(parent, anon, ts, EdgeKind::Dynamic);
            }
        }
        // Calling a class produces an instance; its attribute lookups fall
        // through to the class namespace.
        if let Some(callee) = frame.callee {
            if ctx.store.symbol(callee).kind == SymbolKind::Class {
                ctx.store.set_class_of(anon, callee);
            }
        }
        ctx.store.bind_handle(anon, handle);
        self.record_load(anon);
    }

    fn external_call(
        &mut self,
        ctx: &mut TraceCtx<'_>,
        signature: CallSignature,
        receiver: Option<ValueHandle>,
        args: Vec<ValueHandle>,
        kwargs: Vec<(String, ValueHandle)>,
        ret: Option<ValueHandle>,
    ) {
        if !self.active() {
            return;
        }
        let ts = ctx.clock.current();
        let default;
        let spec: &HandlerSpec = match ctx.handlers.resolve(&signature) {
            Some(spec) => spec,
            None => {
                let err = FlowError::new(FlowErrorKind::HandlerNotMatched).with_message(format!(
                    "{}::{}",
                    signature.module.as_deref().unwrap_or("?"),
                    signature.qualname.as_deref().unwrap_or("?"),
                ));
                debug!(error = %err, "applying default mutate-all-positional rule");
                ctx.instr.handler_fallbacks += 1;
                default = HandlerSpec::mutate_all_positional(args.len());
                &default
            }
        };

        let resolve = |ctx: &SymbolStore, param: &ParamRef| -> Option<SymbolId> {
            match param {
                ParamRef::Receiver => receiver.and_then(|h| ctx.primary_for_handle(h)),
                ParamRef::Positional(i) => {
                    args.get(*i).and_then(|&h| ctx.primary_for_handle(h))
                }
                ParamRef::Keyword(name) => kwargs
                    .iter()
                    .find(|(k, _)| k == name)
                    .and_then(|&(_, h)| ctx.primary_for_handle(h)),
                ParamRef::Return => None,
            }
        };

        let mut ret_anon: Option<SymbolId> = None;
        if let Some(handle) = ret {
            let anon = ctx.store.anonymous(ts, self.current_cell);
            let mut parents: Vec<SymbolId> = Vec::new();
            if let Some(r) = receiver.and_then(|h| ctx.store.primary_for_handle(h)) {
                parents.push(r);
            }
            for &h in &args {
                if let Some(sym) = ctx.store.primary_for_handle(h) {
                    parents.push(sym);
                }
            }
            for (_, h) in &kwargs {
                if let Some(sym) = ctx.store.primary_for_handle(*h) {
                    parents.push(sym);
                }
            }
            for parent in parents {
                if !ctx.store.symbol(parent).is_builtin() {
                    ctx.graph.add_edge(parent, anon, ts, EdgeKind::Dynamic);
                }
            }
            let callee_class = signature
                .qualname
                .as_deref()
                .and_then(|n| ctx.store.lookup(ctx.store.global_scope(), n))
                .filter(|&s| ctx.store.symbol(s).kind == SymbolKind::Class);
            if let Some(class_sym) = callee_class {
                ctx.store.set_class_of(anon, class_sym);
            }
            ctx.store.bind_handle(anon, handle);
            self.record_load(anon);
            ret_anon = Some(anon);
        }

        for effect in spec.effects.clone() {
            match effect {
                Effect::NoOp => {}
                Effect::Mutate(param) => {
                    let target = match param {
                        ParamRef::Return => ret_anon,
                        ref p => resolve(ctx.store, p),
                    };
                    if let Some(sym) = target {
                        ctx.store.mutate(sym, ts, self.current_cell);
                        self.record_write(sym);
                        for ancestor in ctx.store.owner_chain(sym) {
                            ctx.store.mutate(ancestor, ts, self.current_cell);
                            self.record_write(ancestor);
                            ctx.graph.notify_children(ctx.store, ancestor);
                        }
                        ctx.graph.notify_children(ctx.store, sym);
                        ctx.instr.mutations_marked += 1;
                    }
                }
                Effect::Alias(a, b) => {
                    let sa = match a {
                        ParamRef::Return => ret_anon,
                        ref p => resolve(ctx.store, p),
                    };
                    let sb = match b {
                        ParamRef::Return => ret_anon,
                        ref p => resolve(ctx.store, p),
                    };
                    if let (Some(sa), Some(sb)) = (sa, sb) {
                        ctx.store.add_alias(sa, sb);
                    }
                }
                Effect::UpsertUnder { owner, name } => {
                    if let Some(owner_sym) = resolve(ctx.store, &owner) {
                        ctx.store.upsert_ns_child(
                            owner_sym,
                            &NsKey::attr(name),
                            None,
                            ts,
                            self.current_cell,
                        );
                    }
                }
            }
        }
    }

    fn mutation(&mut self, ctx: &mut TraceCtx<'_>, obj: ValueHandle) {
        if !self.active() {
            return;
        }
        let Some(sym) = ctx.store.primary_for_handle(obj) else {
            return;
        };
        let ts = ctx.clock.current();
        ctx.store.mutate(sym, ts, self.current_cell);
        self.record_write(sym);
        for ancestor in ctx.store.owner_chain(sym) {
            ctx.store.mutate(ancestor, ts, self.current_cell);
            self.record_write(ancestor);
            ctx.graph.notify_children(ctx.store, ancestor);
        }
        ctx.graph.notify_children(ctx.store, sym);
        ctx.instr.mutations_marked += 1;
    }

    fn delete_name(&mut self, ctx: &mut TraceCtx<'_>, name: &str) {
        if !self.active() {
            return;
        }
        let scope = self.current_scope(ctx);
        if let Some(sym) = ctx.store.lookup(scope, name) {
            ctx.store.delete(sym);
        }
    }

    fn record_load(&mut self, sym: SymbolId) {
        self.stmt_live.push(sym);
        self.exec_reads.insert(sym);
        if let Some(frame) = self.frames.last_mut() {
            frame.loads.push(sym);
        }
    }

    fn record_write(&mut self, sym: SymbolId) {
        self.exec_writes.insert(sym);
    }
}
