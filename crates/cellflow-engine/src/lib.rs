pub mod engine;
pub mod handlers;
pub mod protocol;

pub use engine::{
    Classification, Clock, DataflowGraph, EngineConfig, EngineInstrumentation, FlowEngine,
    ReactiveSession, Schedule, Scheduler, SnapshotDoc, SymbolKind, SymbolStore, TraceEvent,
    Tracer, new_engine,
};
pub use handlers::{CallSignature, Effect, HandlerRegistry, HandlerSpec, ParamRef};
pub use protocol::{CellMetadata, CellType, ClientRequest, ExecScheduleReply, ServerResponse};

// Re-export the analysis surface and common leaf types.
pub use cellflow_analysis::{CellAnalysis, CellAst, Expr, Stmt, StmtKind, Target, analyze};
pub use cellflow_common::{
    ExecMode, ExecSchedule, FlowError, FlowErrorKind, FlowOrder, Highlights, NodeId, NsKey,
    ReactivityMode, RefPath, Settings, SymbolId, Timestamp, ValueHandle,
};
