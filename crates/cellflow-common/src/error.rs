//! Engine error representation.
//!
//! - **`FlowErrorKind`** : the canonical set of recoverable/fatal conditions
//! - **`ErrorContext`**  : lightweight location info (cell, AST node)
//! - **`FlowError`**     : one struct that glues the two together
//!
//! Every kind except `InvariantViolation` is recoverable: the engine logs,
//! degrades precision, and keeps going. Nothing here ever propagates to the
//! host runtime.

use std::{error::Error, fmt};

/// All recognised engine error conditions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FlowErrorKind {
    /// A static live reference could not be bound in any scope.
    UnresolvableReference,
    /// The tracer saw an exit without a matching enter (or vice versa).
    TraceInconsistency,
    /// An external call matched no registered handler.
    HandlerNotMatched,
    /// A cycle was found while walking the cell graph.
    CycleInScheduler,
    /// The host reported that a cell execution raised.
    CellExecutionError,
    /// The host handed over an AST the analyzer could not process.
    StaticAnalysisFailure,
    /// An internal assertion failed. Not recoverable.
    InvariantViolation,
}

impl fmt::Display for FlowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnresolvableReference => "unresolvable-reference",
            Self::TraceInconsistency => "trace-inconsistency",
            Self::HandlerNotMatched => "handler-not-matched",
            Self::CycleInScheduler => "cycle-in-scheduler",
            Self::CellExecutionError => "cell-execution-error",
            Self::StaticAnalysisFailure => "static-analysis-failure",
            Self::InvariantViolation => "invariant-violation",
        })
    }
}

impl FlowErrorKind {
    /// Whether the engine recovers from this condition by degrading
    /// precision rather than aborting.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::InvariantViolation)
    }
}

/// Generic, lightweight metadata that any error may carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ErrorContext {
    pub cell_id: Option<String>,
    pub node: Option<u32>,
    pub symbol: Option<String>,
}

/// The single error struct the engine passes around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowError {
    pub kind: FlowErrorKind,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

impl FlowError {
    pub fn new(kind: FlowErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cell<S: Into<String>>(mut self, cell_id: S) -> Self {
        self.context
            .get_or_insert_with(ErrorContext::default)
            .cell_id = Some(cell_id.into());
        self
    }

    pub fn with_symbol<S: Into<String>>(mut self, symbol: S) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).symbol = Some(symbol.into());
        self
    }

    #[inline]
    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl From<FlowErrorKind> for FlowError {
    fn from(kind: FlowErrorKind) -> Self {
        FlowError::new(kind)
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(ctx) = &self.context {
            if let Some(cell) = &ctx.cell_id {
                write!(f, " (cell {cell})")?;
            }
            if let Some(sym) = &ctx.symbol {
                write!(f, " (symbol {sym})")?;
            }
        }
        Ok(())
    }
}

impl Error for FlowError {}
