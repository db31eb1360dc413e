use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical time: `(execution counter, statement index)`, ordered
/// lexicographically.
///
/// Execution counters start at 1; `(0, 0)` is reserved as the
/// never-executed sentinel and compares below every real tick.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    pub exec: u32,
    pub stmt: u32,
}

impl Timestamp {
    /// Sentinel for things that have never been assigned or executed.
    pub const NEVER: Timestamp = Timestamp { exec: 0, stmt: 0 };

    pub const fn new(exec: u32, stmt: u32) -> Self {
        Self { exec, stmt }
    }

    #[inline]
    pub fn is_never(self) -> bool {
        self.exec == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            f.write_str("(never)")
        } else {
            write!(f, "({}, {})", self.exec, self.stmt)
        }
    }
}

/// Range of ticks covered by one cell execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ExecRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_order() {
        assert!(Timestamp::new(1, 5) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 0) < Timestamp::new(2, 1));
        assert!(Timestamp::NEVER < Timestamp::new(1, 0));
    }

    #[test]
    fn test_never_sentinel() {
        assert!(Timestamp::NEVER.is_never());
        assert!(!Timestamp::new(1, 0).is_never());
        assert_eq!(Timestamp::default(), Timestamp::NEVER);
    }

    #[test]
    fn test_exec_range_contains() {
        let range = ExecRange::new(Timestamp::new(3, 0), Timestamp::new(3, 7));
        assert!(range.contains(Timestamp::new(3, 4)));
        assert!(!range.contains(Timestamp::new(4, 0)));
        assert!(!range.contains(Timestamp::NEVER));
    }
}
