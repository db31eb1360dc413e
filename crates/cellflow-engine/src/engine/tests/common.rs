//! Test host: submits cells and replays their ASTs as the event stream a
//! real instrumentation collaborator would produce.

use cellflow_analysis::{CellAst, Expr, Literal, Stmt, StmtKind, SubKey, Target};
use cellflow_common::ValueHandle;
use rustc_hash::FxHashMap;

use crate::engine::{EngineConfig, FlowEngine};
use crate::handlers::CallSignature;

pub const CLASS_INT: u32 = 1;
pub const CLASS_STR: u32 = 2;
pub const CLASS_LIST: u32 = 3;
pub const CLASS_TUPLE: u32 = 4;
pub const CLASS_DICT: u32 = 5;
pub const CLASS_OBJECT: u32 = 6;

pub struct Host {
    pub engine: FlowEngine,
    env: FxHashMap<String, ValueHandle>,
    asts: FxHashMap<String, CellAst>,
    next_obj: u64,
}

impl Host {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: FlowEngine::new(config),
            env: FxHashMap::default(),
            asts: FxHashMap::default(),
            next_obj: 1,
        }
    }

    pub fn submit(&mut self, id: &str, source: &str, ast: CellAst) {
        self.engine.on_cell_submit(id, source, &ast);
        self.asts.insert(id.to_string(), ast);
    }

    /// Submit with document order, then run.
    pub fn submit_at(&mut self, id: &str, order: u32, source: &str, ast: CellAst) {
        self.submit(id, source, ast);
        self.engine.set_cell_order(id, order);
    }

    pub fn run(&mut self, id: &str) {
        let ast = self.asts.get(id).cloned().expect("cell submitted");
        self.engine.begin_execution(id);
        for stmt in &ast.stmts {
            self.exec_stmt(stmt);
        }
        self.engine.finish_execution(id, false);
    }

    pub fn run_error(&mut self, id: &str) {
        let ast = self.asts.get(id).cloned().expect("cell submitted");
        self.engine.begin_execution(id);
        if let Some(stmt) = ast.stmts.first() {
            self.engine.on_statement_enter(stmt.id.0);
            self.engine.on_statement_exit(stmt.id.0, true);
        }
        self.engine.finish_execution(id, true);
    }

    fn fresh(&mut self, class: u32) -> ValueHandle {
        let handle = ValueHandle::new(self.next_obj, class);
        self.next_obj += 1;
        handle
    }

    fn class_name(class: u32) -> &'static str {
        match class {
            CLASS_INT => "int",
            CLASS_STR => "str",
            CLASS_LIST => "list",
            CLASS_TUPLE => "tuple",
            CLASS_DICT => "dict",
            _ => "object",
        }
    }

    fn is_builtin(name: &str) -> bool {
        crate::engine::DEFAULT_BUILTINS.contains(&name)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) {
        self.engine.on_statement_enter(stmt.id.0);
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let handle = self.eval(value);
                for target in targets {
                    self.assign_target(target, value, handle);
                }
            }
            StmtKind::AugAssign { target, value } => {
                if let Target::Name(name) = target {
                    self.engine.on_name_load(name);
                }
                self.eval(value);
                if let Target::Name(name) = target {
                    let handle = self.fresh(CLASS_INT);
                    self.env.insert(name.clone(), handle);
                    self.engine.on_name_store(name, handle);
                }
            }
            StmtKind::Expr { value } => {
                self.eval(value);
            }
            StmtKind::Delete { targets } => {
                for target in targets {
                    if let Target::Name(name) = target {
                        self.env.remove(name);
                        self.engine
                            .handle_event(crate::engine::TraceEvent::Delete { name: name.clone() });
                    }
                }
            }
            StmtKind::Import { names } => {
                for imported in names {
                    let handle = self.fresh(CLASS_OBJECT);
                    let bound = imported.bound_name().to_string();
                    self.env.insert(bound.clone(), handle);
                    self.engine.on_name_store(&bound, handle);
                }
            }
            StmtKind::FuncDef { name, .. } | StmtKind::ClassDef { name, .. } => {
                let handle = self.fresh(CLASS_OBJECT);
                self.env.insert(name.clone(), handle);
                self.engine.on_name_store(name, handle);
            }
            _ => {}
        }
        self.engine.on_statement_exit(stmt.id.0, false);
    }

    fn assign_target(&mut self, target: &Target, value: &Expr, handle: ValueHandle) {
        match target {
            Target::Name(name) => {
                self.env.insert(name.clone(), handle);
                self.engine.on_name_store(name, handle);
            }
            Target::Tuple(items) | Target::List(items) => {
                // Element-wise when the value is a literal tuple/list.
                match value {
                    Expr::Tuple(elems) | Expr::List(elems) if elems.len() == items.len() => {
                        for (item, elem) in items.iter().zip(elems) {
                            let elem_handle = self.eval(elem);
                            self.assign_target(item, elem, elem_handle);
                        }
                    }
                    _ => {
                        for item in items {
                            let fresh = self.fresh(CLASS_OBJECT);
                            self.assign_target(item, value, fresh);
                        }
                    }
                }
            }
            Target::Attribute { value: base, attr } => {
                if let Expr::Name(obj) = base {
                    self.engine.on_name_load(obj);
                    if let Some(&obj_handle) = self.env.get(obj) {
                        self.engine.on_attr_store(obj_handle, attr, handle);
                    }
                }
            }
            Target::Subscript { value: base, key } => {
                if let Expr::Name(obj) = base {
                    self.engine.on_name_load(obj);
                    if let (Some(&obj_handle), Some(ns_key)) =
                        (self.env.get(obj), key.as_ns_key())
                    {
                        self.engine.on_subscript_store(obj_handle, ns_key, handle);
                    }
                }
            }
            Target::Starred(inner) => {
                self.assign_target(inner, value, handle);
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> ValueHandle {
        match expr {
            Expr::Literal(lit) => {
                let class = match lit {
                    Literal::Int(_) | Literal::Bool(_) => CLASS_INT,
                    Literal::Float(_) => CLASS_INT,
                    Literal::Str(_) => CLASS_STR,
                    Literal::None => CLASS_OBJECT,
                };
                self.fresh(class)
            }
            Expr::Name(name) => {
                self.engine.on_name_load(name);
                match self.env.get(name) {
                    Some(&handle) => handle,
                    None => self.fresh(CLASS_OBJECT),
                }
            }
            Expr::Attribute { value, attr } => {
                let base = self.eval(value);
                self.engine.on_attr_load(base, attr);
                self.fresh(CLASS_OBJECT)
            }
            Expr::Subscript { value, key } => {
                let base = self.eval(value);
                if let Some(ns_key) = key.as_ns_key() {
                    self.engine.on_subscript_load(base, ns_key);
                } else if let SubKey::Dynamic(inner) = key {
                    self.eval(inner);
                }
                self.fresh(CLASS_OBJECT)
            }
            Expr::BinOp { left, right } => {
                self.eval(left);
                self.eval(right);
                self.fresh(CLASS_INT)
            }
            Expr::Compare { left, rest } => {
                self.eval(left);
                for item in rest {
                    self.eval(item);
                }
                self.fresh(CLASS_INT)
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.eval(item);
                }
                self.fresh(CLASS_TUPLE)
            }
            Expr::List(items) => {
                for item in items {
                    self.eval(item);
                }
                self.fresh(CLASS_LIST)
            }
            Expr::Dict(items) => {
                for (k, v) in items {
                    self.eval(k);
                    self.eval(v);
                }
                self.fresh(CLASS_DICT)
            }
            Expr::Call(call) => self.eval_call(call),
            _ => self.fresh(CLASS_OBJECT),
        }
    }

    fn eval_call(&mut self, call: &cellflow_analysis::CallExpr) -> ValueHandle {
        match call.func.as_ref() {
            // Method call: the receiver crosses the trace boundary.
            Expr::Attribute { value, attr } => {
                let receiver = self.eval(value);
                self.engine.on_attr_load(receiver, attr);
                let args: Vec<ValueHandle> = call.args.iter().map(|a| self.eval(a)).collect();
                let ret = self.fresh(CLASS_OBJECT);
                self.engine.on_external_call(
                    CallSignature {
                        module: None,
                        qualname: None,
                        receiver_type: Some(Self::class_name(receiver.class).to_string()),
                        method: Some(attr.clone()),
                    },
                    Some(receiver),
                    args,
                    Some(ret),
                );
                ret
            }
            Expr::Name(name) => {
                self.engine.on_name_load(name);
                let args: Vec<ValueHandle> = call.args.iter().map(|a| self.eval(a)).collect();
                let module = Self::is_builtin(name).then(|| "builtins".to_string());
                let ret = self.fresh(CLASS_OBJECT);
                self.engine.on_external_call(
                    CallSignature {
                        module,
                        qualname: Some(name.clone()),
                        receiver_type: None,
                        method: None,
                    },
                    None,
                    args,
                    Some(ret),
                );
                ret
            }
            other => {
                self.eval(other);
                self.fresh(CLASS_OBJECT)
            }
        }
    }
}

// ----------------------------------------------------------------------
// AST shorthands shared by the scenario tests.
// ----------------------------------------------------------------------

/// `target = <int literal>`
pub fn assign_lit(id: u32, target: &str, v: i64) -> Stmt {
    Stmt::assign(id, Target::name(target), Expr::int(v))
}

/// `target = source`
pub fn assign_name(id: u32, target: &str, source: &str) -> Stmt {
    Stmt::assign(id, Target::name(target), Expr::name(source))
}

/// `target = source + <int literal>`
pub fn assign_add(id: u32, target: &str, source: &str, v: i64) -> Stmt {
    Stmt::assign(
        id,
        Target::name(target),
        Expr::binop(Expr::name(source), Expr::int(v)),
    )
}

/// `print(arg)`
pub fn print_stmt(id: u32, arg: &str) -> Stmt {
    Stmt::expr(
        id,
        Expr::call(id + 100, Expr::name("print"), vec![Expr::name(arg)]),
    )
}

/// `recv.method(arg)`
pub fn method_call(id: u32, recv: &str, method: &str, arg: i64) -> Stmt {
    Stmt::expr(
        id,
        Expr::call(
            id + 100,
            Expr::attr(Expr::name(recv), method),
            vec![Expr::int(arg)],
        ),
    )
}

pub fn cell(stmts: Vec<Stmt>) -> CellAst {
    CellAst::new(stmts)
}
