use cellflow_analysis::CellAnalysis;
use cellflow_common::{CellSlot, ExecRange, SymbolId};
use rustc_hash::FxHashMap;

/// One notebook cell as the engine knows it.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: String,
    /// Document position, as last reported by the front-end.
    pub order_idx: u32,
    pub source: String,
    /// Text edited since the last execution.
    pub dirty: bool,
    /// How many times this cell has executed.
    pub exec_count: u32,
    /// Tick range of the most recent execution.
    pub last_exec: Option<ExecRange>,
    /// Cached static analysis; invalidated on edit.
    pub analysis: Option<CellAnalysis>,
    /// User override: always re-execute when referenced symbols change.
    pub forced_reactive: bool,
    /// Whether the most recent execution raised.
    pub last_error: bool,
    /// Symbols the tracer saw this cell read during its last execution.
    pub last_reads: Vec<SymbolId>,
    /// Symbols the tracer saw this cell define or mutate.
    pub last_writes: Vec<SymbolId>,
    /// The host's parser failed and no cached analysis exists; classify
    /// pessimistically.
    pub analysis_failed: bool,
}

impl Cell {
    fn new(id: String, order_idx: u32) -> Self {
        Self {
            id,
            order_idx,
            source: String::new(),
            dirty: false,
            exec_count: 0,
            last_exec: None,
            analysis: None,
            forced_reactive: false,
            last_error: false,
            last_reads: Vec::new(),
            last_writes: Vec::new(),
            analysis_failed: false,
        }
    }

    #[inline]
    pub fn executed(&self) -> bool {
        self.last_exec.is_some()
    }
}

/// Arena of cells keyed by the front-end's opaque ids.
#[derive(Debug, Default)]
pub struct CellRegistry {
    cells: Vec<Cell>,
    by_id: FxHashMap<String, CellSlot>,
}

impl CellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, id: &str) -> Option<CellSlot> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, slot: CellSlot) -> &Cell {
        &self.cells[slot.as_index()]
    }

    pub fn get_mut(&mut self, slot: CellSlot) -> &mut Cell {
        &mut self.cells[slot.as_index()]
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Cell> {
        self.slot(id).map(|slot| self.get(slot))
    }

    /// Existing slot for `id`, or a fresh record.
    pub fn ensure(&mut self, id: &str) -> CellSlot {
        if let Some(slot) = self.slot(id) {
            return slot;
        }
        let slot = CellSlot::new(self.cells.len() as u32);
        self.cells
            .push(Cell::new(id.to_string(), self.cells.len() as u32));
        self.by_id.insert(id.to_string(), slot);
        slot
    }

    /// Update source text; returns whether the text actually changed.
    /// A change marks the cell dirty and invalidates its cached analysis,
    /// but dynamic edges from the previous run are kept — they remain the
    /// best available evidence until the cell re-executes.
    pub fn update_source(&mut self, slot: CellSlot, source: &str) -> bool {
        let cell = self.get_mut(slot);
        if cell.source == source {
            return false;
        }
        cell.source = source.to_string();
        cell.dirty = true;
        cell.analysis = None;
        true
    }

    pub fn set_order(&mut self, slot: CellSlot, order_idx: u32) {
        self.get_mut(slot).order_idx = order_idx;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellSlot, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, c)| (CellSlot::new(i as u32), c))
    }

    pub fn slots(&self) -> impl Iterator<Item = CellSlot> + '_ {
        (0..self.cells.len() as u32).map(CellSlot::new)
    }
}
