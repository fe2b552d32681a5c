//! Entities.
//!
//! A [`Row`] holds the field values of one entity in column order. Stored rows
//! are immutable behind an `Arc`; updates build a modified copy with a bumped
//! version and swap it in.

use crate::value::Value;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

/// Store-assigned identifier of a row, unique within the process.
pub type RowId = u64;

static ROW_IDS: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh row identifier.
pub fn next_row_id() -> RowId {
    ROW_IDS.fetch_add(1, Ordering::Relaxed)
}

/// One entity of a table.
///
/// Equality compares the identifier and the values; the version is
/// bookkeeping and does not take part.
#[derive(Clone, Debug)]
pub struct Row {
    id: RowId,
    version: u64,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row with an explicit identifier, at version 1.
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self {
            id,
            version: 1,
            values,
        }
    }

    /// Builds a row with a freshly allocated identifier.
    pub fn create(values: Vec<Value>) -> Self {
        Self::new(next_row_id(), values)
    }

    #[inline]
    pub fn id(&self) -> RowId {
        self.id
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Gives the row a new identifier, detaching it from any stored row it
    /// was copied from.
    pub fn renumber(&mut self) -> RowId {
        self.id = next_row_id();
        self.id
    }

    /// Bumps the version and returns it.
    #[inline]
    pub fn increment_version(&mut self) -> u64 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Mutable access to the values. Callers may push or truncate; the table
    /// checks the arity against its schema before storing.
    #[inline]
    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    /// Overwrites the field at `index`. Returns false if the row has no such
    /// field.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.values == other.values
    }
}
