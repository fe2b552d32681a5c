//! B+Tree node definitions.

use crate::comparator::Comparator;
use alloc::vec::Vec;
use marrow_core::RowId;

/// Node identifier in the B+Tree arena.
pub type NodeId = usize;

/// A node in the B+Tree.
///
/// Leaves hold one bucket of row IDs per key and are chained through
/// `next`; internal nodes hold `keys.len() + 1` children.
#[derive(Clone, Debug)]
pub struct Node<K> {
    pub keys: Vec<K>,
    pub buckets: Vec<Vec<RowId>>,
    pub children: Vec<NodeId>,
    pub next: Option<NodeId>,
    pub is_leaf: bool,
    pub parent: Option<NodeId>,
}

impl<K> Node<K> {
    pub fn new_leaf() -> Self {
        Self {
            keys: Vec::new(),
            buckets: Vec::new(),
            children: Vec::new(),
            next: None,
            is_leaf: true,
            parent: None,
        }
    }

    pub fn new_internal() -> Self {
        Self {
            is_leaf: false,
            ..Self::new_leaf()
        }
    }

    #[inline]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the position of the first key not less than `key`.
    pub fn lower_bound<C: Comparator<K>>(&self, key: &K, cmp: &C) -> usize {
        self.keys.partition_point(|k| cmp.is_less(k, key))
    }

    /// Position of `key` itself, if present.
    pub fn find_key<C: Comparator<K>>(&self, key: &K, cmp: &C) -> Option<usize> {
        let pos = self.lower_bound(key, cmp);
        if pos < self.keys.len() && cmp.is_equal(&self.keys[pos], key) {
            Some(pos)
        } else {
            None
        }
    }

    /// Adds `value` to the bucket of `key`, creating the key if needed.
    /// Returns true if the key is new.
    pub fn insert_at<C: Comparator<K>>(&mut self, key: K, value: RowId, cmp: &C) -> bool {
        debug_assert!(self.is_leaf);
        let pos = self.lower_bound(&key, cmp);
        if pos < self.keys.len() && cmp.is_equal(&self.keys[pos], &key) {
            self.buckets[pos].push(value);
            false
        } else {
            self.keys.insert(pos, key);
            self.buckets.insert(pos, alloc::vec![value]);
            true
        }
    }

    /// Removes row IDs from the bucket at `pos`: just `value` if given,
    /// else all of them. An emptied bucket takes its key with it.
    ///
    /// Returns how many IDs went and whether the key went too.
    pub fn remove_at(&mut self, pos: usize, value: Option<RowId>) -> (usize, bool) {
        debug_assert!(self.is_leaf);
        match value {
            Some(v) => {
                let bucket = &mut self.buckets[pos];
                let before = bucket.len();
                bucket.retain(|&x| x != v);
                let removed = before - bucket.len();
                if bucket.is_empty() {
                    self.keys.remove(pos);
                    self.buckets.remove(pos);
                    (removed, true)
                } else {
                    (removed, false)
                }
            }
            None => {
                self.keys.remove(pos);
                (self.buckets.remove(pos).len(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::SimpleComparator;
    use alloc::vec;

    #[test]
    fn test_leaf_insert_and_find() {
        let cmp = SimpleComparator::asc();
        let mut leaf = Node::new_leaf();
        assert!(leaf.insert_at(5, 50, &cmp));
        assert!(leaf.insert_at(1, 10, &cmp));
        assert!(!leaf.insert_at(5, 51, &cmp));

        assert_eq!(leaf.keys, vec![1, 5]);
        assert_eq!(leaf.buckets[1], vec![50, 51]);
        assert_eq!(leaf.find_key(&5, &cmp), Some(1));
        assert_eq!(leaf.find_key(&3, &cmp), None);
        assert_eq!(leaf.lower_bound(&3, &cmp), 1);
    }

    #[test]
    fn test_leaf_descending() {
        let cmp = SimpleComparator::desc();
        let mut leaf = Node::new_leaf();
        for k in [1, 3, 2] {
            leaf.insert_at(k, k as u64, &cmp);
        }
        assert_eq!(leaf.keys, vec![3, 2, 1]);
    }

    #[test]
    fn test_leaf_remove() {
        let cmp = SimpleComparator::asc();
        let mut leaf = Node::new_leaf();
        leaf.insert_at(1, 10, &cmp);
        leaf.insert_at(1, 11, &cmp);

        assert_eq!(leaf.remove_at(0, Some(10)), (1, false));
        assert_eq!(leaf.remove_at(0, Some(11)), (1, true));
        assert!(leaf.is_empty());
    }
}
