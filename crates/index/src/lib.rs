//! Marrow Index - Index structures for the Marrow data store.
//!
//! This crate provides the keyed containers a table maintains over its rows:
//!
//! - `BTreeIndex`: arena B+Tree ordered by an injected comparator, with
//!   point lookups and half/fully-open range selects
//! - `HashIndex`: O(1) point lookups, no key order
//!
//! Both come in unique and multi-valued flavors. Indexes map keys to row IDs;
//! multi-valued buckets keep row IDs in insertion order.
//!
//! # Example
//!
//! ```rust
//! use marrow_index::{BTreeIndex, HashIndex, Index, RangeIndex};
//!
//! let mut btree: BTreeIndex<i32> = BTreeIndex::new(64, true);
//! for k in [1, 3, 5, 7] {
//!     btree.add(k, k as u64).unwrap();
//! }
//!
//! assert_eq!(btree.get(&3), vec![3]);
//! assert_eq!(btree.select_range(3, 7, false, true), vec![3, 5]);
//! assert_eq!(btree.select_greater(5, true), vec![7]);
//!
//! let mut hash: HashIndex<i32> = HashIndex::new(false);
//! hash.add(10, 100).unwrap();
//! hash.add(10, 101).unwrap();
//! assert_eq!(hash.get(&10), vec![100, 101]);
//! ```

#![no_std]

extern crate alloc;

pub mod btree;
pub mod comparator;
pub mod hash;
pub mod traits;

pub use btree::{BTreeIndex, DEFAULT_ORDER};
pub use comparator::{Comparator, KeyComparator, Order, SimpleComparator};
pub use hash::HashIndex;
pub use traits::{Index, IndexError, KeyRange, RangeIndex};
