//! Generation-tagged row collection shared between the owner thread and the
//! resolver's apply step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vault_session_core::Store;

/// One displayed list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Entry the row displays.
    pub entry_id: String,
    /// Display text per column.
    pub cells: Vec<String>,
}

#[derive(Debug, Default)]
struct RowTable {
    generation: u64,
    rows: Vec<Row>,
}

/// Shared handle to the displayed rows.
///
/// Clones share the same table. Every mutation takes the table lock, and
/// every rebuild or cancel advances the generation under that lock.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    table: Arc<Mutex<RowTable>>,
    // Mirror of `RowTable::generation` for lock-free staleness checks; only
    // written while the table lock is held.
    generation: Arc<AtomicU64>,
}

impl RowSet {
    /// Creates an empty row set at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all rows and advances the generation.
    ///
    /// # Returns
    /// The new generation.
    pub fn rebuild(&self, rows: Vec<Row>) -> u64 {
        let mut table = self.lock();
        table.rows = rows;
        self.advance(&mut table)
    }

    /// Advances the generation without touching rows.
    pub fn invalidate(&self) -> u64 {
        let mut table = self.lock();
        self.advance(&mut table)
    }

    /// Removes every row and advances the generation.
    pub fn clear(&self) -> u64 {
        self.rebuild(Vec::new())
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Appends a row without changing the generation.
    pub fn push(&self, row: Row) {
        self.lock().rows.push(row);
    }

    /// Removes the row for `entry_id`; returns `true` if one was removed.
    pub fn remove(&self, entry_id: &str) -> bool {
        let mut table = self.lock();
        let before = table.rows.len();
        table.rows.retain(|row| row.entry_id != entry_id);
        table.rows.len() != before
    }

    /// Reads one cell.
    pub fn cell(&self, entry_id: &str, column: usize) -> Option<String> {
        self.lock()
            .rows
            .iter()
            .find(|row| row.entry_id == entry_id)
            .and_then(|row| row.cells.get(column).cloned())
    }

    /// Copies the current rows.
    pub fn snapshot(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Returns `true` when no rows are displayed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `text` into a cell if `generation` is still current and the
    /// cell exists.
    ///
    /// # Returns
    /// `true` when the cell was written.
    pub(crate) fn apply_if_current(
        &self,
        generation: u64,
        entry_id: &str,
        column: usize,
        text: String,
    ) -> bool {
        let mut table = self.lock();
        if table.generation != generation {
            return false;
        }
        let Some(cell) = table
            .rows
            .iter_mut()
            .find(|row| row.entry_id == entry_id)
            .and_then(|row| row.cells.get_mut(column))
        else {
            return false;
        };
        *cell = text;
        true
    }

    fn advance(&self, table: &mut RowTable) -> u64 {
        table.generation = table.generation.wrapping_add(1);
        self.generation.store(table.generation, Ordering::Release);
        table.generation
    }

    fn lock(&self) -> MutexGuard<'_, RowTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `true` when `raw` may contain a placeholder.
pub fn needs_expansion(raw: &str) -> bool {
    raw.contains('{')
}

/// Materializes rows for the entries of `group_id` with raw field values.
///
/// Entries keep storage order; each column reads the named field, missing
/// fields display as empty.
pub fn populate_rows(store: &Store, group_id: &str, columns: &[&str]) -> Vec<Row> {
    store
        .entries_in_group(group_id)
        .map(|entry| Row {
            entry_id: entry.id.clone(),
            cells: columns
                .iter()
                .map(|column| entry.read_safe(column).to_string())
                .collect(),
        })
        .collect()
}
