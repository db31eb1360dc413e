use cellflow_common::Timestamp;

/// The process-wide logical clock: one owned instance per engine, advanced
/// only from the engine thread.
///
/// `new_cell` opens a new execution (statement index resets to 0); `tick`
/// advances the statement index within the current execution. Ticks are
/// never retracted, even when the host aborts an execution mid-flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    exec: u32,
    stmt: u32,
}

impl Clock {
    pub fn new() -> Self {
        Self { exec: 0, stmt: 0 }
    }

    /// Open a new cell execution and return its first tick.
    pub fn new_cell(&mut self) -> Timestamp {
        self.exec += 1;
        self.stmt = 0;
        self.current()
    }

    /// Advance the statement index within the current execution.
    pub fn tick(&mut self) -> Timestamp {
        debug_assert!(self.exec > 0, "tick before first execution");
        self.stmt += 1;
        self.current()
    }

    #[inline]
    pub fn current(&self) -> Timestamp {
        Timestamp::new(self.exec, self.stmt)
    }

    /// Execution counter of the current (or last) cell run.
    #[inline]
    pub fn exec_count(&self) -> u32 {
        self.exec
    }

    /// Move past restored history; the clock never runs backwards.
    pub fn fast_forward(&mut self, exec: u32) {
        if exec > self.exec {
            self.exec = exec;
            self.stmt = 0;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
