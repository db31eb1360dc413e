//! Static liveness + definition analysis over a cell's AST.
//!
//! One pass over the statement list, in document order, tracking which
//! names the cell has bound so far. A name read before the cell binds it
//! is a *live reference* — the cell's link to state produced elsewhere.
//! Assignments record which references feed which targets; those become
//! static parent edges when the cell executes.

use crate::ast::{
    CallExpr, CellAst, Comprehension, Expr, ImportedName, Stmt, StmtKind, SubKey, Target,
};
use cellflow_common::{NodeId, RefPath};
use rustc_hash::{FxHashMap, FxHashSet};

/// How an assignment edge binds its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssignKind {
    /// Plain rebinding of a name.
    Define,
    /// Augmented assignment: the previous value is among the sources.
    Augment,
    /// Attribute/subscript store: mutation of the root, definition of the
    /// path.
    Mutate,
    /// Import binding.
    Import,
}

/// One target with the references that reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignEdge {
    pub target: RefPath,
    pub sources: Vec<RefPath>,
    pub stmt: NodeId,
    pub kind: AssignKind,
}

/// A call site with positional/keyword argument descriptors. `None` entries
/// are arguments that are not pure access paths.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub site: NodeId,
    pub func: Option<RefPath>,
    pub args: Vec<Option<RefPath>>,
    pub kwargs: Vec<(String, Option<RefPath>)>,
}

/// Everything the engine wants to know about a cell before it runs.
#[derive(Debug, Clone, Default)]
pub struct CellAnalysis {
    /// References read before the cell binds them, in first-read order.
    pub live_refs: Vec<RefPath>,
    /// Target → contributing references, one edge per bound target.
    pub assignments: Vec<AssignEdge>,
    /// Names this cell unbinds or shadows.
    pub kills: FxHashSet<String>,
    /// Roots the cell may mutate in place: attribute/subscript stores and
    /// receivers of method calls.
    pub mutated_roots: FxHashSet<String>,
    /// Import bindings, in order.
    pub imports: Vec<ImportedName>,
    /// Call sites, in evaluation order.
    pub calls: Vec<CallSite>,
    /// Inverted reaching-definitions index: name → references feeding its
    /// latest cell-level definition.
    pub reaching: FxHashMap<String, Vec<RefPath>>,
    /// Formal parameter names of functions this cell defines, for mapping
    /// actual arguments at call time.
    pub functions: FxHashMap<String, Vec<String>>,
    /// Names this cell binds to class definitions.
    pub classes: FxHashSet<String>,
}

impl CellAnalysis {
    /// Root names of all live references, deduplicated.
    pub fn live_roots(&self) -> FxHashSet<&str> {
        self.live_refs.iter().map(|r| r.root.as_str()).collect()
    }

    /// Root names this cell (re)binds or may mutate.
    pub fn written_roots(&self) -> FxHashSet<&str> {
        let mut out: FxHashSet<&str> = self
            .assignments
            .iter()
            .map(|a| a.target.root.as_str())
            .collect();
        out.extend(self.mutated_roots.iter().map(|s| s.as_str()));
        out
    }
}

/// Analyze a cell body.
pub fn analyze(ast: &CellAst) -> CellAnalysis {
    let mut collector = Collector::default();
    collector.visit_stmts(&ast.stmts);
    collector.out
}

#[derive(Default)]
struct Collector {
    out: CellAnalysis,
    /// Names the cell has bound so far (assignment, import, def, for-target).
    bound: FxHashSet<String>,
    /// Nested local scopes (lambda params, comprehension targets, function
    /// bodies) masking reads from the cell scope.
    locals: Vec<FxHashSet<String>>,
    seen_live: FxHashSet<RefPath>,
}

impl Collector {
    fn visit_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let mut refs = Vec::new();
                self.read_expr(value, &mut refs);
                for target in targets {
                    self.bind_target(target, Some(value), &refs, stmt.id, AssignKind::Define);
                }
            }
            StmtKind::AugAssign { target, value } => {
                let mut refs = Vec::new();
                // The previous value is read before being overwritten.
                if let Some(prev) = target.ref_path() {
                    self.record_read(&prev, &mut refs);
                }
                self.read_expr(value, &mut refs);
                self.bind_target(target, None, &refs, stmt.id, AssignKind::Augment);
            }
            StmtKind::AnnAssign { target, value } => {
                // Annotation without a value declares but does not define.
                if let Some(value) = value {
                    let mut refs = Vec::new();
                    self.read_expr(value, &mut refs);
                    self.bind_target(target, Some(value), &refs, stmt.id, AssignKind::Define);
                }
            }
            StmtKind::Delete { targets } => {
                for target in targets {
                    match target {
                        Target::Name(name) => {
                            self.out.kills.insert(name.clone());
                            self.bound.insert(name.clone());
                        }
                        Target::Attribute { .. } | Target::Subscript { .. } => {
                            // Deleting an entry mutates the owner.
                            if let Some(path) = target.ref_path() {
                                let mut refs = Vec::new();
                                self.record_read(&path.root_only(), &mut refs);
                                self.out.mutated_roots.insert(path.root);
                            }
                        }
                        Target::Tuple(items) | Target::List(items) => {
                            for item in items {
                                self.visit_stmt(&Stmt::new(
                                    stmt.id.0,
                                    StmtKind::Delete {
                                        targets: vec![item.clone()],
                                    },
                                ));
                            }
                        }
                        Target::Starred(_) => {}
                    }
                }
            }
            StmtKind::Import { names } => {
                for imported in names {
                    let bound = imported.bound_name().to_string();
                    self.out.kills.insert(bound.clone());
                    self.bound.insert(bound.clone());
                    self.out.assignments.push(AssignEdge {
                        target: RefPath::name(bound.clone()),
                        sources: Vec::new(),
                        stmt: stmt.id,
                        kind: AssignKind::Import,
                    });
                    self.out.reaching.insert(bound, Vec::new());
                    self.out.imports.push(imported.clone());
                }
            }
            StmtKind::Expr { value } => {
                let mut refs = Vec::new();
                self.read_expr(value, &mut refs);
            }
            StmtKind::FuncDef { name, params, body } => {
                let mut sources = Vec::new();
                // Defaults are evaluated now, in the defining scope.
                for param in params {
                    if let Some(default) = &param.default {
                        self.read_expr(default, &mut sources);
                    }
                }
                // Free variables are captured as parents but not read yet.
                for free in self.free_refs(params, body) {
                    if !sources.contains(&free) {
                        sources.push(free);
                    }
                }
                self.out.functions.insert(
                    name.clone(),
                    params.iter().map(|p| p.name.clone()).collect(),
                );
                self.bind_name(name, sources, stmt.id, AssignKind::Define);
            }
            StmtKind::ClassDef { name, bases, body } => {
                let mut sources = Vec::new();
                for base in bases {
                    self.read_expr(base, &mut sources);
                }
                // The class body executes immediately in its own scope;
                // names it assigns accumulate as class-locals.
                self.locals.push(FxHashSet::default());
                let before = self.out.live_refs.len();
                for inner in body {
                    self.visit_class_stmt(inner);
                }
                self.locals.pop();
                for live in &self.out.live_refs[before..] {
                    if !sources.contains(live) {
                        sources.push(live.clone());
                    }
                }
                self.out.classes.insert(name.clone());
                self.bind_name(name, sources, stmt.id, AssignKind::Define);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let mut refs = Vec::new();
                self.read_expr(iter, &mut refs);
                self.bind_target(target, None, &refs, stmt.id, AssignKind::Define);
                self.visit_stmts(body);
                self.visit_stmts(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                let mut refs = Vec::new();
                self.read_expr(test, &mut refs);
                self.visit_stmts(body);
                self.visit_stmts(orelse);
            }
            StmtKind::If { test, body, orelse } => {
                let mut refs = Vec::new();
                self.read_expr(test, &mut refs);
                self.visit_stmts(body);
                self.visit_stmts(orelse);
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    let mut refs = Vec::new();
                    self.read_expr(value, &mut refs);
                }
            }
            StmtKind::Global { .. } | StmtKind::Nonlocal { .. } | StmtKind::Pass => {}
        }
    }

    /// Class bodies: assignments bind class-locals, reads fall through to
    /// the cell scope.
    fn visit_class_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let mut refs = Vec::new();
                self.read_expr(value, &mut refs);
                for target in targets {
                    if let Target::Name(name) = target {
                        if let Some(frame) = self.locals.last_mut() {
                            frame.insert(name.clone());
                        }
                    }
                }
            }
            StmtKind::FuncDef { name, params, body } => {
                for free in self.free_refs(params, body) {
                    let mut sink = Vec::new();
                    self.record_read(&free, &mut sink);
                }
                if let Some(frame) = self.locals.last_mut() {
                    frame.insert(name.clone());
                }
            }
            _ => self.visit_stmt(stmt),
        }
    }

    fn bind_name(&mut self, name: &str, sources: Vec<RefPath>, stmt: NodeId, kind: AssignKind) {
        self.out.kills.insert(name.to_string());
        self.bound.insert(name.to_string());
        self.out
            .reaching
            .insert(name.to_string(), sources.clone());
        self.out.assignments.push(AssignEdge {
            target: RefPath::name(name),
            sources,
            stmt,
            kind,
        });
    }

    fn bind_target(
        &mut self,
        target: &Target,
        value: Option<&Expr>,
        refs: &[RefPath],
        stmt: NodeId,
        kind: AssignKind,
    ) {
        match target {
            Target::Name(name) => {
                if let Some(Expr::Lambda { params, .. }) = value {
                    self.out.functions.insert(
                        name.clone(),
                        params.iter().map(|p| p.name.clone()).collect(),
                    );
                }
                self.bind_name(name, refs.to_vec(), stmt, kind);
            }
            Target::Tuple(items) | Target::List(items) => {
                // Element-wise edges when the i-th RHS element is
                // syntactically identifiable; otherwise every target
                // inherits the full source set.
                let elementwise = match value {
                    Some(Expr::Tuple(elems)) | Some(Expr::List(elems))
                        if elems.len() == items.len()
                            && !items.iter().any(|t| matches!(t, Target::Starred(_))) =>
                    {
                        Some(elems)
                    }
                    _ => None,
                };
                match elementwise {
                    Some(elems) => {
                        for (item, elem) in items.iter().zip(elems) {
                            let elem_refs = extract_refs(elem);
                            self.bind_target(item, Some(elem), &elem_refs, stmt, kind);
                        }
                    }
                    None => {
                        for item in items {
                            self.bind_target(item, None, refs, stmt, kind);
                        }
                    }
                }
            }
            Target::Starred(inner) => {
                self.bind_target(inner, None, refs, stmt, kind);
            }
            Target::Attribute { .. } | Target::Subscript { .. } => {
                // A store through a path mutates the root and defines the
                // path symbol.
                if let Some(path) = target.ref_path() {
                    let mut sink = Vec::new();
                    self.record_read(&path.root_only(), &mut sink);
                    self.out.mutated_roots.insert(path.root.clone());
                    self.out.assignments.push(AssignEdge {
                        target: path,
                        sources: refs.to_vec(),
                        stmt,
                        kind: AssignKind::Mutate,
                    });
                }
                // A dynamic key in the target path is still a read.
                if let Target::Subscript { key, .. } = target {
                    if let SubKey::Dynamic(expr) = key {
                        let mut sink = Vec::new();
                        self.read_expr(expr, &mut sink);
                    }
                }
            }
        }
    }

    /// Record a read of a resolved path: adds it to `refs` and, when the
    /// root is neither a local nor already bound by this cell, to the live
    /// set.
    fn record_read(&mut self, path: &RefPath, refs: &mut Vec<RefPath>) {
        if self.is_local(&path.root) {
            return;
        }
        refs.push(path.clone());
        if !self.bound.contains(&path.root) && self.seen_live.insert(path.clone()) {
            self.out.live_refs.push(path.clone());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|frame| frame.contains(name))
    }

    fn read_expr(&mut self, expr: &Expr, refs: &mut Vec<RefPath>) {
        match expr {
            Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => {
                if let Some(path) = expr.ref_path() {
                    self.record_read(&path, refs);
                }
                // Dynamic subscript keys and non-path bases are still reads.
                match expr {
                    Expr::Subscript { value, key } => {
                        if expr.ref_path().is_none() {
                            self.read_expr(value, refs);
                        }
                        if let SubKey::Dynamic(inner) = key {
                            self.read_expr(inner, refs);
                        }
                    }
                    Expr::Attribute { value, .. } => {
                        if expr.ref_path().is_none() {
                            self.read_expr(value, refs);
                        }
                    }
                    _ => {}
                }
            }
            Expr::Call(call) => self.read_call(call, refs),
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                for item in items {
                    self.read_expr(item, refs);
                }
            }
            Expr::Dict(items) => {
                for (k, v) in items {
                    self.read_expr(k, refs);
                    self.read_expr(v, refs);
                }
            }
            Expr::BinOp { left, right } => {
                self.read_expr(left, refs);
                self.read_expr(right, refs);
            }
            Expr::UnaryOp { operand } => self.read_expr(operand, refs),
            Expr::Compare { left, rest } => {
                self.read_expr(left, refs);
                for item in rest {
                    self.read_expr(item, refs);
                }
            }
            Expr::BoolOp { values } => {
                for value in values {
                    self.read_expr(value, refs);
                }
            }
            Expr::Lambda { params, body } => {
                for param in params {
                    if let Some(default) = &param.default {
                        self.read_expr(default, refs);
                    }
                }
                let frame: FxHashSet<String> =
                    params.iter().map(|p| p.name.clone()).collect();
                self.locals.push(frame);
                self.read_expr(body, refs);
                self.locals.pop();
            }
            Expr::Comp(comp) => self.read_comp(comp, refs),
            Expr::Starred(inner) => self.read_expr(inner, refs),
            Expr::Literal(_) => {}
        }
    }

    fn read_call(&mut self, call: &CallExpr, refs: &mut Vec<RefPath>) {
        self.read_expr(&call.func, refs);
        // A method call may mutate its receiver.
        if let Expr::Attribute { value, .. } = call.func.as_ref() {
            if let Some(receiver) = value.ref_path() {
                if !self.is_local(&receiver.root) {
                    self.out.mutated_roots.insert(receiver.root);
                }
            }
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            self.read_expr(arg, refs);
            args.push(arg.ref_path().filter(|p| !self.is_local(&p.root)));
        }
        let mut kwargs = Vec::with_capacity(call.kwargs.len());
        for (name, arg) in &call.kwargs {
            self.read_expr(arg, refs);
            kwargs.push((
                name.clone(),
                arg.ref_path().filter(|p| !self.is_local(&p.root)),
            ));
        }
        self.out.calls.push(CallSite {
            site: call.site,
            func: call.func.ref_path(),
            args,
            kwargs,
        });
    }

    /// Comprehensions: the outermost iterable is evaluated in the enclosing
    /// scope, targets live in the comprehension's own scope.
    fn read_comp(&mut self, comp: &Comprehension, refs: &mut Vec<RefPath>) {
        self.read_expr(&comp.iter, refs);
        let mut frame = FxHashSet::default();
        collect_target_names(&comp.target, &mut frame);
        self.locals.push(frame);
        for cond in &comp.ifs {
            self.read_expr(cond, refs);
        }
        self.read_expr(&comp.element, refs);
        if let Some(value) = &comp.value {
            self.read_expr(value, refs);
        }
        self.locals.pop();
    }

    /// References a function body reads from outside itself: reads minus
    /// params minus anything the body assigns anywhere (function-local
    /// binding semantics).
    fn free_refs(&mut self, params: &[crate::ast::Param], body: &[Stmt]) -> Vec<RefPath> {
        let mut frame: FxHashSet<String> = params.iter().map(|p| p.name.clone()).collect();
        collect_assigned_names(body, &mut frame);
        self.locals.push(frame);

        // Reads inside the body must not count as cell-level live refs or
        // call sites by themselves; capture them separately.
        let saved_live = std::mem::take(&mut self.out.live_refs);
        let saved_seen = std::mem::take(&mut self.seen_live);
        let saved_calls = std::mem::take(&mut self.out.calls);
        let saved_mutated = std::mem::take(&mut self.out.mutated_roots);

        let mut refs = Vec::new();
        for stmt in body {
            self.read_body_stmt(stmt, &mut refs);
        }

        self.out.live_refs = saved_live;
        self.seen_live = saved_seen;
        self.out.calls = saved_calls;
        self.out.mutated_roots = saved_mutated;
        self.locals.pop();

        let mut deduped = Vec::new();
        for r in refs {
            if !deduped.contains(&r) {
                deduped.push(r);
            }
        }
        deduped
    }

    /// Expression reads inside a nested function body (no bindings recorded
    /// at cell level).
    fn read_body_stmt(&mut self, stmt: &Stmt, refs: &mut Vec<RefPath>) {
        match &stmt.kind {
            StmtKind::Assign { value, .. }
            | StmtKind::AugAssign { value, .. }
            | StmtKind::Expr { value } => self.read_expr(value, refs),
            StmtKind::AnnAssign { value, .. } | StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.read_expr(value, refs);
                }
            }
            StmtKind::For {
                iter, body, orelse, ..
            } => {
                self.read_expr(iter, refs);
                for inner in body.iter().chain(orelse) {
                    self.read_body_stmt(inner, refs);
                }
            }
            StmtKind::While { test, body, orelse } | StmtKind::If { test, body, orelse } => {
                self.read_expr(test, refs);
                for inner in body.iter().chain(orelse) {
                    self.read_body_stmt(inner, refs);
                }
            }
            StmtKind::FuncDef { params, body, .. } => {
                // Nested function: its free names may still escape to the
                // cell scope.
                let inner = self.free_refs(params, body);
                for r in inner {
                    if !self.is_local(&r.root) {
                        refs.push(r);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Pure reference extraction, no liveness bookkeeping. Used for
/// element-wise unpacking edges.
fn extract_refs(expr: &Expr) -> Vec<RefPath> {
    let mut out = Vec::new();
    extract_refs_into(expr, &mut out);
    out
}

fn extract_refs_into(expr: &Expr, out: &mut Vec<RefPath>) {
    if let Some(path) = expr.ref_path() {
        out.push(path);
        return;
    }
    match expr {
        Expr::Attribute { value, .. } => extract_refs_into(value, out),
        Expr::Subscript { value, key } => {
            extract_refs_into(value, out);
            if let SubKey::Dynamic(inner) = key {
                extract_refs_into(inner, out);
            }
        }
        Expr::Call(call) => {
            extract_refs_into(&call.func, out);
            for arg in &call.args {
                extract_refs_into(arg, out);
            }
            for (_, arg) in &call.kwargs {
                extract_refs_into(arg, out);
            }
        }
        Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
            for item in items {
                extract_refs_into(item, out);
            }
        }
        Expr::Dict(items) => {
            for (k, v) in items {
                extract_refs_into(k, out);
                extract_refs_into(v, out);
            }
        }
        Expr::BinOp { left, right } => {
            extract_refs_into(left, out);
            extract_refs_into(right, out);
        }
        Expr::UnaryOp { operand } | Expr::Starred(operand) => extract_refs_into(operand, out),
        Expr::Compare { left, rest } => {
            extract_refs_into(left, out);
            for item in rest {
                extract_refs_into(item, out);
            }
        }
        Expr::BoolOp { values } => {
            for value in values {
                extract_refs_into(value, out);
            }
        }
        Expr::Lambda { .. } | Expr::Comp(_) | Expr::Literal(_) | Expr::Name(_) => {}
    }
}

fn collect_target_names(target: &Target, out: &mut FxHashSet<String>) {
    match target {
        Target::Name(name) => {
            out.insert(name.clone());
        }
        Target::Tuple(items) | Target::List(items) => {
            for item in items {
                collect_target_names(item, out);
            }
        }
        Target::Starred(inner) => collect_target_names(inner, out),
        Target::Attribute { .. } | Target::Subscript { .. } => {}
    }
}

/// Names assigned anywhere in a statement list (function-local semantics).
fn collect_assigned_names(stmts: &[Stmt], out: &mut FxHashSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    collect_target_names(target, out);
                }
            }
            StmtKind::AugAssign { target, .. } | StmtKind::AnnAssign { target, .. } => {
                collect_target_names(target, out);
            }
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                collect_target_names(target, out);
                collect_assigned_names(body, out);
                collect_assigned_names(orelse, out);
            }
            StmtKind::While { body, orelse, .. } | StmtKind::If { body, orelse, .. } => {
                collect_assigned_names(body, out);
                collect_assigned_names(orelse, out);
            }
            StmtKind::FuncDef { name, .. } | StmtKind::ClassDef { name, .. } => {
                out.insert(name.clone());
            }
            StmtKind::Import { names } => {
                for imported in names {
                    out.insert(imported.bound_name().to_string());
                }
            }
            StmtKind::Global { names } | StmtKind::Nonlocal { names } => {
                // Declared names bind outside this scope.
                for name in names {
                    out.remove(name);
                }
            }
            _ => {}
        }
    }
}
