//! Optional persisted state: enough of the cell graph to survive a
//! session restart. Symbol values are never serialized.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use cellflow_common::{ExecRange, RefPath};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::FlowEngine;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Per-cell persisted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellSnapshot {
    pub last_execution_ts: Option<ExecRange>,
    pub exec_count: u32,
    pub source_hash: u64,
    /// Live references of the last analysis and the static parents
    /// reaching them, for rebuilding cell links before any re-execution.
    pub static_parents_of_lastlive: BTreeMap<String, Vec<RefPath>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SnapshotDoc {
    pub cells: BTreeMap<String, CellSnapshot>,
}

pub fn source_hash(source: &str) -> u64 {
    let mut hasher = FxHasher::default();
    source.hash(&mut hasher);
    hasher.finish()
}

impl SnapshotDoc {
    pub fn capture(engine: &FlowEngine) -> Self {
        let mut cells = BTreeMap::new();
        for (_, cell) in engine.cells().iter() {
            let mut static_parents = BTreeMap::new();
            if let Some(analysis) = &cell.analysis {
                for live in &analysis.live_refs {
                    let sources = analysis
                        .reaching
                        .get(&live.root)
                        .cloned()
                        .unwrap_or_default();
                    static_parents.insert(live.to_string(), sources);
                }
            }
            cells.insert(
                cell.id.clone(),
                CellSnapshot {
                    last_execution_ts: cell.last_exec,
                    exec_count: cell.exec_count,
                    source_hash: source_hash(&cell.source),
                    static_parents_of_lastlive: static_parents,
                },
            );
        }
        SnapshotDoc { cells }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, SnapshotError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl FlowEngine {
    pub fn snapshot(&self) -> SnapshotDoc {
        SnapshotDoc::capture(self)
    }

    /// Restore execution history for cells whose text still matches the
    /// snapshot. Mismatched or unknown cells come back dirty, as if
    /// freshly edited. The clock fast-forwards past every restored tick.
    pub fn restore(&mut self, doc: &SnapshotDoc) {
        let mut max_exec = 0u32;
        for (id, snap) in &doc.cells {
            let Some(slot) = self.cells_mut_slot(id) else {
                continue;
            };
            let cell = self.cells_mut().get_mut(slot);
            if source_hash(&cell.source) != snap.source_hash {
                warn!(cell = id.as_str(), "snapshot hash mismatch; cell stays dirty");
                cell.dirty = true;
                continue;
            }
            cell.last_exec = snap.last_execution_ts;
            cell.exec_count = snap.exec_count;
            if let Some(range) = snap.last_execution_ts {
                max_exec = max_exec.max(range.end.exec);
            }
        }
        self.fast_forward_clock(max_exec);
    }
}
