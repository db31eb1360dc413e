//! Cell AST surface.
//!
//! The engine never parses source text: the host's parser bridge builds
//! these nodes and hands them over with `on_cell_submit`. The shape is a
//! deliberately small, dataflow-oriented subset — operators carry no
//! identity of their own, only the references flowing through them matter.
//!
//! `NodeId`s are host-assigned and must be stable across re-executions of
//! unchanged source; the tracer keys its trace-once bookkeeping on them.

use cellflow_common::{NodeId, NsKey, RefPath};

/// A cell body: statements in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellAst {
    pub stmts: Vec<Stmt>,
}

impl CellAst {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `a = b = rhs` carries both targets.
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    /// `x += e`: reads and writes the target.
    AugAssign {
        target: Target,
        value: Expr,
    },
    /// `x: T = e` or `x: T`. Without a value this declares but does not
    /// define.
    AnnAssign {
        target: Target,
        value: Option<Expr>,
    },
    Delete {
        targets: Vec<Target>,
    },
    Import {
        names: Vec<ImportedName>,
    },
    Expr {
        value: Expr,
    },
    FuncDef {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Global {
        names: Vec<String>,
    },
    Nonlocal {
        names: Vec<String>,
    },
    Pass,
}

impl Stmt {
    pub fn new(id: u32, kind: StmtKind) -> Self {
        Self {
            id: NodeId::new(id),
            kind,
        }
    }

    pub fn assign(id: u32, target: Target, value: Expr) -> Self {
        Self::new(
            id,
            StmtKind::Assign {
                targets: vec![target],
                value,
            },
        )
    }

    pub fn aug_assign(id: u32, target: Target, value: Expr) -> Self {
        Self::new(id, StmtKind::AugAssign { target, value })
    }

    pub fn expr(id: u32, value: Expr) -> Self {
        Self::new(id, StmtKind::Expr { value })
    }

    pub fn delete(id: u32, target: Target) -> Self {
        Self::new(
            id,
            StmtKind::Delete {
                targets: vec![target],
            },
        )
    }
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Attribute { value: Expr, attr: String },
    Subscript { value: Expr, key: SubKey },
    Tuple(Vec<Target>),
    List(Vec<Target>),
    Starred(Box<Target>),
}

impl Target {
    pub fn name<S: Into<String>>(name: S) -> Self {
        Target::Name(name.into())
    }
}

/// Formal parameter of a function or lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default<S: Into<String>>(name: S, default: Expr) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// One name bound by an import statement.
///
/// `import numpy as np` is `{ module: "numpy", name: None, asname: Some("np") }`;
/// `from os import path` is `{ module: "os", name: Some("path"), asname: None }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedName {
    pub module: String,
    pub name: Option<String>,
    pub asname: Option<String>,
}

impl ImportedName {
    /// The name this import binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        if let Some(asname) = &self.asname {
            return asname;
        }
        match &self.name {
            Some(name) => name,
            // `import a.b` binds `a`.
            None => self.module.split('.').next().unwrap_or(&self.module),
        }
    }
}

/// Subscript key as written in source. Literal keys become namespace keys;
/// a dynamic key degrades the access to its root.
#[derive(Debug, Clone, PartialEq)]
pub enum SubKey {
    Int(i64),
    Str(String),
    Tuple(Vec<SubKey>),
    Dynamic(Box<Expr>),
}

impl SubKey {
    /// Literal keys map onto namespace keys; dynamic keys do not.
    pub fn as_ns_key(&self) -> Option<NsKey> {
        match self {
            SubKey::Int(i) => Some(NsKey::Int(*i)),
            SubKey::Str(s) => Some(NsKey::Str(s.clone())),
            SubKey::Tuple(parts) => parts
                .iter()
                .map(|p| p.as_ns_key())
                .collect::<Option<Vec<_>>>()
                .map(NsKey::Tuple),
            SubKey::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        key: SubKey,
    },
    Call(CallExpr),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    BinOp {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        rest: Vec<Expr>,
    },
    BoolOp {
        values: Vec<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Comp(Box<Comprehension>),
    Starred(Box<Expr>),
    Literal(Literal),
}

/// A call site. `site` identifies the call expression for trace-once
/// bookkeeping and for pairing with runtime call events.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub site: NodeId,
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

/// A comprehension: the iterable is evaluated in the enclosing scope, the
/// element and filters in a scope of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub element: Expr,
    /// Present for dict comprehensions (the value part).
    pub value: Option<Expr>,
    pub target: Target,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl Expr {
    pub fn name<S: Into<String>>(name: S) -> Self {
        Expr::Name(name.into())
    }

    pub fn attr<S: Into<String>>(value: Expr, attr: S) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    pub fn index(value: Expr, key: SubKey) -> Self {
        Expr::Subscript {
            value: Box::new(value),
            key,
        }
    }

    pub fn call(site: u32, func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            site: NodeId::new(site),
            func: Box::new(func),
            args,
            kwargs: Vec::new(),
        })
    }

    pub fn binop(left: Expr, right: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(Literal::Int(v))
    }

    pub fn str<S: Into<String>>(v: S) -> Self {
        Expr::Literal(Literal::Str(v.into()))
    }

    /// If this expression is a pure access path (`a`, `a.b`, `a[0].c`),
    /// return its reference descriptor. Dynamic subscripts cut the path at
    /// the deepest literal prefix.
    pub fn ref_path(&self) -> Option<RefPath> {
        match self {
            Expr::Name(name) => Some(RefPath::name(name.clone())),
            Expr::Attribute { value, attr } => value
                .ref_path()
                .map(|p| p.child(NsKey::Attr(attr.clone()))),
            Expr::Subscript { value, key } => {
                let base = value.ref_path()?;
                match key.as_ns_key() {
                    Some(k) => Some(base.child(k)),
                    None => Some(base),
                }
            }
            _ => None,
        }
    }
}

impl Target {
    /// Reference descriptor of a non-destructuring target.
    pub fn ref_path(&self) -> Option<RefPath> {
        match self {
            Target::Name(name) => Some(RefPath::name(name.clone())),
            Target::Attribute { value, attr } => value
                .ref_path()
                .map(|p| p.child(NsKey::Attr(attr.clone()))),
            Target::Subscript { value, key } => {
                let base = value.ref_path()?;
                match key.as_ns_key() {
                    Some(k) => Some(base.child(k)),
                    None => Some(base),
                }
            }
            _ => None,
        }
    }
}
