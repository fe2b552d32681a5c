//! Index trait definitions for Marrow.
//!
//! Every index variant (ordered or hashed, unique or multi-valued) satisfies
//! [`Index`]; ordered variants also satisfy [`RangeIndex`].

use crate::comparator::Comparator;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::ops::Bound;
use marrow_core::RowId;

/// A range of keys, each end open, closed or unbounded.
///
/// Bounds are interpreted by the comparator of the index being walked, so
/// under a descending order `lower` is the numerically larger end.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRange<K> {
    lower: Bound<K>,
    upper: Bound<K>,
}

impl<K> KeyRange<K> {
    pub fn new(lower: Bound<K>, upper: Bound<K>) -> Self {
        Self { lower, upper }
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// `from..`; `open` excludes `from` itself.
    pub fn lower_bound(from: K, open: bool) -> Self {
        Self::new(edge(from, open), Bound::Unbounded)
    }

    /// `..to`; `open` excludes `to` itself.
    pub fn upper_bound(to: K, open: bool) -> Self {
        Self::new(Bound::Unbounded, edge(to, open))
    }

    pub fn bound(from: K, to: K, from_open: bool, to_open: bool) -> Self {
        Self::new(edge(from, from_open), edge(to, to_open))
    }

    pub fn is_all(&self) -> bool {
        matches!((&self.lower, &self.upper), (Bound::Unbounded, Bound::Unbounded))
    }

    /// Lower end and whether it is open.
    pub fn lower(&self) -> Option<(&K, bool)> {
        split(&self.lower)
    }

    /// Upper end and whether it is open.
    pub fn upper(&self) -> Option<(&K, bool)> {
        split(&self.upper)
    }

    /// True if `key` sorts before the lower end under `cmp`.
    pub fn is_below_by<C: Comparator<K>>(&self, key: &K, cmp: &C) -> bool {
        self.lower().is_some_and(|(bound, open)| match cmp.compare(key, bound) {
            Ordering::Less => true,
            Ordering::Equal => open,
            Ordering::Greater => false,
        })
    }

    /// True if `key` sorts after the upper end under `cmp`.
    pub fn is_above_by<C: Comparator<K>>(&self, key: &K, cmp: &C) -> bool {
        self.upper().is_some_and(|(bound, open)| match cmp.compare(key, bound) {
            Ordering::Greater => true,
            Ordering::Equal => open,
            Ordering::Less => false,
        })
    }

    pub fn contains_by<C: Comparator<K>>(&self, key: &K, cmp: &C) -> bool {
        !self.is_below_by(key, cmp) && !self.is_above_by(key, cmp)
    }
}

impl<K: Ord> KeyRange<K> {
    /// Membership under the natural order of `K`.
    pub fn contains(&self, key: &K) -> bool {
        self.contains_by(key, &crate::comparator::SimpleComparator::asc())
    }
}

fn edge<K>(key: K, open: bool) -> Bound<K> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

fn split<K>(bound: &Bound<K>) -> Option<(&K, bool)> {
    match bound {
        Bound::Included(k) => Some((k, false)),
        Bound::Excluded(k) => Some((k, true)),
        Bound::Unbounded => None,
    }
}

/// A map from keys to buckets of row IDs. Rows live in the owning table.
pub trait Index<K> {
    /// Adds `value` under `key`. A unique index refuses a second row for an
    /// existing key.
    fn add(&mut self, key: K, value: RowId) -> Result<(), IndexError>;

    /// Bucket of `key`, in insertion order.
    fn get(&self, key: &K) -> Vec<RowId>;

    fn get_all(&self) -> Vec<RowId>;

    /// Removes `value` from the bucket of `key`, or the whole bucket when
    /// `value` is `None`. Returns how many row IDs went.
    fn remove(&mut self, key: &K, value: Option<RowId>) -> usize;

    fn contains_key(&self, key: &K) -> bool;

    /// Number of (key, row) entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct keys.
    fn key_count(&self) -> usize;

    fn clear(&mut self);

    fn is_unique(&self) -> bool;
}

/// An index with key order.
pub trait RangeIndex<K>: Index<K> {
    /// Row IDs whose key lies in `range`, in index order (or its reverse),
    /// after skipping `skip` and up to `limit`.
    fn get_range(
        &self,
        range: &KeyRange<K>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<RowId>;

    fn select_range(&self, from: K, to: K, from_open: bool, to_open: bool) -> Vec<RowId> {
        self.get_range(&KeyRange::bound(from, to, from_open, to_open), false, None, 0)
    }

    fn select_greater(&self, from: K, open: bool) -> Vec<RowId> {
        self.get_range(&KeyRange::lower_bound(from, open), false, None, 0)
    }

    fn select_less(&self, to: K, open: bool) -> Vec<RowId> {
        self.get_range(&KeyRange::upper_bound(to, open), false, None, 0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// A unique index already holds the key.
    DuplicateKey,
    /// Range select on a hash index.
    RangeUnsupported,
}

impl core::fmt::Display for IndexError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            IndexError::DuplicateKey => "duplicate key in unique index",
            IndexError::RangeUnsupported => "index has no key order",
        })
    }
}
