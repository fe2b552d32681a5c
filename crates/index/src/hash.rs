//! Hash index.
//!
//! Constant-time point lookups with no key order, so no range selects.

use crate::traits::{Index, IndexError};
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;
use marrow_core::RowId;

/// A hashed index, unique or multi-valued.
///
/// Buckets keep row IDs in insertion order; a key leaves the map as soon as
/// its bucket empties.
#[derive(Debug)]
pub struct HashIndex<K> {
    buckets: HashMap<K, Vec<RowId>>,
    unique: bool,
    entries: usize,
}

impl<K: Eq + Hash> HashIndex<K> {
    pub fn new(unique: bool) -> Self {
        Self {
            buckets: HashMap::new(),
            unique,
            entries: 0,
        }
    }

    /// Every key with its bucket, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[RowId])> {
        self.buckets.iter().map(|(k, b)| (k, b.as_slice()))
    }
}

impl<K: Eq + Hash> Index<K> for HashIndex<K> {
    fn add(&mut self, key: K, value: RowId) -> Result<(), IndexError> {
        match self.buckets.get_mut(&key) {
            Some(_) if self.unique => return Err(IndexError::DuplicateKey),
            Some(bucket) => bucket.push(value),
            None => {
                self.buckets.insert(key, alloc::vec![value]);
            }
        }
        self.entries += 1;
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<RowId> {
        self.buckets.get(key).cloned().unwrap_or_default()
    }

    fn get_all(&self) -> Vec<RowId> {
        self.buckets.values().flatten().copied().collect()
    }

    fn remove(&mut self, key: &K, value: Option<RowId>) -> usize {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return 0;
        };
        let removed = match value {
            Some(v) => {
                let before = bucket.len();
                bucket.retain(|&x| x != v);
                before - bucket.len()
            }
            None => core::mem::take(bucket).len(),
        };
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        self.entries -= removed;
        removed
    }

    fn contains_key(&self, key: &K) -> bool {
        self.buckets.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn key_count(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.entries = 0;
    }

    fn is_unique(&self) -> bool {
        self.unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_unique_rejects_second_row() {
        let mut index = HashIndex::new(true);
        index.add(1, 100).unwrap();
        index.add(2, 200).unwrap();
        assert_eq!(index.add(1, 101), Err(IndexError::DuplicateKey));

        assert_eq!(index.get(&1), vec![100]);
        assert_eq!(index.get(&3), Vec::<RowId>::new());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_bucket_keeps_insertion_order() {
        let mut index = HashIndex::new(false);
        for row in [300, 100, 200] {
            index.add("k", row).unwrap();
        }
        index.add("j", 400).unwrap();

        assert_eq!(index.get(&"k"), vec![300, 100, 200]);
        assert_eq!(index.len(), 4);
        assert_eq!(index.key_count(), 2);

        let mut all = index.get_all();
        all.sort_unstable();
        assert_eq!(all, vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_remove() {
        let mut index = HashIndex::new(false);
        index.add(1, 100).unwrap();
        index.add(1, 101).unwrap();
        index.add(2, 200).unwrap();

        assert_eq!(index.remove(&1, Some(999)), 0);
        assert_eq!(index.remove(&9, None), 0);
        assert_eq!(index.remove(&1, Some(100)), 1);
        assert_eq!(index.get(&1), vec![101]);

        assert_eq!(index.remove(&1, Some(101)), 1);
        assert!(!index.contains_key(&1));
        assert_eq!(index.remove(&2, None), 1);
        assert!(index.is_empty());
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut index = HashIndex::new(true);
        for k in 0..100 {
            index.add(k, k as u64).unwrap();
        }
        index.clear();
        assert!(index.is_empty());
        index.add(1, 1000).unwrap();
        assert_eq!(index.get(&1), vec![1000]);
    }
}
