pub mod analyzer;
pub mod ast;

pub use analyzer::{AssignEdge, AssignKind, CallSite, CellAnalysis, analyze};
pub use ast::{
    CallExpr, CellAst, Comprehension, Expr, ImportedName, Literal, Param, Stmt, StmtKind, SubKey,
    Target,
};

// Re-export common types
pub use cellflow_common::{NodeId, NsKey, RefPath};
