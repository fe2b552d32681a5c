//! Undo log for transactions.
//!
//! Every primitive mutation of a table writes one [`LogEntry`] to the
//! transaction that performed it. Entries are undone newest first, either
//! all of them when the transaction rolls back or the tail written inside an
//! abandoned [`AtomicLogScope`].

use crate::table::Table;
use crate::transaction::Transaction;
use marrow_core::{Key, Row, RowId};
use std::sync::Arc;
use tracing::{debug, warn};

/// One undoable mutation.
#[derive(Debug)]
pub enum LogEntry {
    /// A key was added to an index; undone by removing it.
    IndexInsert {
        table: Arc<Table>,
        index: usize,
        key: Key,
        row: RowId,
    },
    /// A key was removed from an index; undone by adding it back.
    IndexDelete {
        table: Arc<Table>,
        index: usize,
        key: Key,
        row: RowId,
    },
    /// A row was stored; undone by dropping it.
    RowInsert { table: Arc<Table>, row: RowId },
    /// A row was dropped; undone by storing it again.
    RowDelete { table: Arc<Table>, row: Arc<Row> },
    /// A row was replaced; undone by restoring the pre-image.
    RowUpdate { table: Arc<Table>, before: Arc<Row> },
}

impl LogEntry {
    /// Returns the table the entry belongs to.
    pub fn table(&self) -> &Arc<Table> {
        match self {
            LogEntry::IndexInsert { table, .. }
            | LogEntry::IndexDelete { table, .. }
            | LogEntry::RowInsert { table, .. }
            | LogEntry::RowDelete { table, .. }
            | LogEntry::RowUpdate { table, .. } => table,
        }
    }

    /// Short name of the entry kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::IndexInsert { .. } => "index_insert",
            LogEntry::IndexDelete { .. } => "index_delete",
            LogEntry::RowInsert { .. } => "row_insert",
            LogEntry::RowDelete { .. } => "row_delete",
            LogEntry::RowUpdate { .. } => "row_update",
        }
    }

    /// Reverts the mutation this entry describes.
    pub fn undo(self) {
        match self {
            LogEntry::IndexInsert {
                table,
                index,
                key,
                row,
            } => table.raw_index_remove(index, &key, row),
            LogEntry::IndexDelete {
                table,
                index,
                key,
                row,
            } => {
                if let Err(e) = table.raw_index_add(index, key, row) {
                    warn!(table = table.name(), index, row, error = %e, "undo could not restore index entry");
                }
            }
            LogEntry::RowInsert { table, row } => table.raw_remove_row(row),
            LogEntry::RowDelete { table, row } | LogEntry::RowUpdate { table, before: row } => {
                table.raw_put_row(row)
            }
        }
    }
}

/// Ordered list of undo entries of one transaction.
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Vec<LogEntry>,
}

impl TransactionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next entry will be written at.
    pub fn position(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry.
    pub fn write(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Returns the entries in write order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Removes and returns the entries written at or after `position`.
    pub fn split_off(&mut self, position: usize) -> Vec<LogEntry> {
        if position >= self.entries.len() {
            return Vec::new();
        }
        self.entries.split_off(position)
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Scoped checkpoint of a transaction log.
///
/// Entries written through the scope are undone when it is dropped, unless
/// [`complete`](AtomicLogScope::complete) was called first.
pub struct AtomicLogScope<'a> {
    txn: &'a Transaction,
    checkpoint: usize,
    completed: bool,
}

impl<'a> AtomicLogScope<'a> {
    /// Opens a scope at the current end of the transaction log.
    pub fn begin(txn: &'a Transaction) -> Self {
        Self {
            txn,
            checkpoint: txn.log_position(),
            completed: false,
        }
    }

    /// Returns the transaction the scope writes to.
    pub fn transaction(&self) -> &'a Transaction {
        self.txn
    }

    /// Log position the scope rolls back to.
    pub fn checkpoint(&self) -> usize {
        self.checkpoint
    }

    /// Number of entries written since the scope opened.
    pub fn written(&self) -> usize {
        self.txn.log_position().saturating_sub(self.checkpoint)
    }

    /// Records an entry.
    pub fn write(&self, entry: LogEntry) {
        self.txn.write_log(entry);
    }

    /// Keeps everything written through the scope.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for AtomicLogScope<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let undone = self.txn.rollback_log_to(self.checkpoint);
            if undone > 0 {
                debug!(txn = self.txn.id(), entries = undone, "atomic log scope rolled back");
            }
        }
    }
}
