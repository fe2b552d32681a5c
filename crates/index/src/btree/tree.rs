//! B+Tree implementation.

use super::iter::BTreeIterator;
use super::node::{Node, NodeId};
use crate::comparator::{Comparator, SimpleComparator};
use crate::traits::{Index, IndexError, KeyRange, RangeIndex};
use alloc::vec::Vec;
use marrow_core::RowId;

/// Default order (branching factor) for the B+Tree.
/// Sized for L1 cache (64 keys * 8 bytes = 512 bytes per node).
pub const DEFAULT_ORDER: usize = 64;

const MIN_ORDER: usize = 4;

/// A B+Tree index for point lookups and range selects.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]; slots freed
/// by merges are recycled. All key comparisons go through the comparator `C`.
#[derive(Debug)]
pub struct BTreeIndex<K, C = SimpleComparator> {
    arena: Vec<Node<K>>,
    free: Vec<NodeId>,
    root: NodeId,
    order: usize,
    unique: bool,
    comparator: C,
    entries: usize,
    keys: usize,
}

impl<K: Clone + Ord> BTreeIndex<K, SimpleComparator> {
    /// Creates a new ascending B+Tree index with the given order.
    pub fn new(order: usize, unique: bool) -> Self {
        Self::with_comparator(order, unique, SimpleComparator::asc())
    }
}

impl<K: Clone, C: Comparator<K>> BTreeIndex<K, C> {
    /// Creates a new B+Tree index ordered by `comparator`.
    pub fn with_comparator(order: usize, unique: bool, comparator: C) -> Self {
        Self {
            arena: alloc::vec![Node::new_leaf()],
            free: Vec::new(),
            root: 0,
            order: order.max(MIN_ORDER),
            unique,
            comparator,
            entries: 0,
            keys: 0,
        }
    }

    /// Returns the comparator ordering this index.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Iterates over every key and its bucket in index order.
    pub fn iter(&self) -> BTreeIterator<'_, K> {
        BTreeIterator::new_at(&self.arena, Some(self.leftmost_leaf()), 0)
    }

    fn alloc_node(&mut self, node: Node<K>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.arena[id] = node;
                id
            }
            None => {
                self.arena.push(node);
                self.arena.len() - 1
            }
        }
    }

    fn release_node(&mut self, id: NodeId) {
        self.arena[id] = Node::new_leaf();
        self.free.push(id);
    }

    #[inline]
    fn min_keys(&self) -> usize {
        (self.order - 1) / 2
    }

    /// Finds the leaf node that should contain the given key.
    fn find_leaf(&self, key: &K) -> NodeId {
        let mut current = self.root;
        loop {
            let node = &self.arena[current];
            if node.is_leaf {
                return current;
            }
            current = node.children[self.find_child_position(node, key)];
        }
    }

    /// Position of the child to descend into: the first separator greater
    /// than `key`.
    #[inline]
    fn find_child_position(&self, node: &Node<K>, key: &K) -> usize {
        let pos = node
            .keys
            .partition_point(|k| !self.comparator.is_less(key, k));
        pos.min(node.children.len().saturating_sub(1))
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut current = self.root;
        while !self.arena[current].is_leaf {
            current = self.arena[current].children[0];
        }
        current
    }

    fn insert(&mut self, key: K, value: RowId) -> Result<(), IndexError> {
        let leaf_id = self.find_leaf(&key);

        if self.unique && self.arena[leaf_id].find_key(&key, &self.comparator).is_some() {
            return Err(IndexError::DuplicateKey);
        }

        if self.arena[leaf_id].insert_at(key, value, &self.comparator) {
            self.keys += 1;
        }
        self.entries += 1;

        if self.arena[leaf_id].key_count() >= self.order {
            self.split_leaf(leaf_id);
        }
        Ok(())
    }

    fn split_leaf(&mut self, leaf_id: NodeId) {
        let mid = self.arena[leaf_id].key_count() / 2;

        let mut new_leaf = Node::new_leaf();
        new_leaf.keys = self.arena[leaf_id].keys.split_off(mid);
        new_leaf.buckets = self.arena[leaf_id].buckets.split_off(mid);
        new_leaf.next = self.arena[leaf_id].next;
        new_leaf.parent = self.arena[leaf_id].parent;
        let promote_key = new_leaf.keys[0].clone();

        let new_leaf_id = self.alloc_node(new_leaf);
        self.arena[leaf_id].next = Some(new_leaf_id);

        self.insert_into_parent(leaf_id, promote_key, new_leaf_id);
    }

    fn insert_into_parent(&mut self, left_id: NodeId, key: K, right_id: NodeId) {
        match self.arena[left_id].parent {
            None => {
                let mut new_root = Node::new_internal();
                new_root.children.push(left_id);
                new_root.children.push(right_id);
                new_root.keys.push(key);

                let new_root_id = self.alloc_node(new_root);
                self.arena[left_id].parent = Some(new_root_id);
                self.arena[right_id].parent = Some(new_root_id);
                self.root = new_root_id;
            }
            Some(parent_id) => {
                let pos = self.find_child_position(&self.arena[parent_id], &key);
                self.arena[parent_id].keys.insert(pos, key);
                self.arena[parent_id].children.insert(pos + 1, right_id);
                self.arena[right_id].parent = Some(parent_id);

                if self.arena[parent_id].key_count() >= self.order {
                    self.split_internal(parent_id);
                }
            }
        }
    }

    fn split_internal(&mut self, node_id: NodeId) {
        let mid = self.arena[node_id].key_count() / 2;
        let promote_key = self.arena[node_id].keys[mid].clone();

        let mut new_node = Node::new_internal();
        new_node.keys = self.arena[node_id].keys.split_off(mid + 1);
        new_node.children = self.arena[node_id].children.split_off(mid + 1);
        new_node.parent = self.arena[node_id].parent;
        // Drop the promoted separator from the left half.
        self.arena[node_id].keys.pop();

        let new_node_id = self.alloc_node(new_node);
        for i in 0..self.arena[new_node_id].children.len() {
            let child_id = self.arena[new_node_id].children[i];
            self.arena[child_id].parent = Some(new_node_id);
        }

        self.insert_into_parent(node_id, promote_key, new_node_id);
    }

    fn delete(&mut self, key: &K, value: Option<RowId>) -> usize {
        let leaf_id = self.find_leaf(key);
        let pos = match self.arena[leaf_id].find_key(key, &self.comparator) {
            Some(pos) => pos,
            None => return 0,
        };

        let (removed, key_dropped) = self.arena[leaf_id].remove_at(pos, value);
        self.entries -= removed;
        if key_dropped {
            self.keys -= 1;
        }
        if key_dropped && leaf_id != self.root {
            self.handle_underflow(leaf_id);
        }
        removed
    }

    fn handle_underflow(&mut self, node_id: NodeId) {
        let parent_id = match self.arena[node_id].parent {
            Some(p) => p,
            None => return,
        };
        let min_keys = self.min_keys();
        if self.arena[node_id].key_count() >= min_keys {
            return;
        }

        let siblings = self.arena[parent_id].children.len();
        let pos = match self.arena[parent_id]
            .children
            .iter()
            .position(|&c| c == node_id)
        {
            Some(pos) => pos,
            None => return,
        };

        if pos > 0 {
            let left_id = self.arena[parent_id].children[pos - 1];
            if self.arena[left_id].key_count() > min_keys {
                self.borrow_from_left(node_id, left_id, parent_id, pos);
                return;
            }
        }
        if pos + 1 < siblings {
            let right_id = self.arena[parent_id].children[pos + 1];
            if self.arena[right_id].key_count() > min_keys {
                self.borrow_from_right(node_id, right_id, parent_id, pos);
                return;
            }
        }

        if pos > 0 {
            let left_id = self.arena[parent_id].children[pos - 1];
            self.merge_nodes(left_id, node_id, parent_id, pos - 1);
        } else if pos + 1 < siblings {
            let right_id = self.arena[parent_id].children[pos + 1];
            self.merge_nodes(node_id, right_id, parent_id, pos);
        }
    }

    fn borrow_from_left(&mut self, node_id: NodeId, left_id: NodeId, parent_id: NodeId, pos: usize) {
        if self.arena[node_id].is_leaf {
            let left = &mut self.arena[left_id];
            let (key, bucket) = match (left.keys.pop(), left.buckets.pop()) {
                (Some(k), Some(b)) => (k, b),
                _ => return,
            };
            self.arena[node_id].keys.insert(0, key.clone());
            self.arena[node_id].buckets.insert(0, bucket);
            self.arena[parent_id].keys[pos - 1] = key;
        } else {
            let left = &mut self.arena[left_id];
            let (left_key, left_child) = match (left.keys.pop(), left.children.pop()) {
                (Some(k), Some(c)) => (k, c),
                _ => return,
            };
            let separator = core::mem::replace(&mut self.arena[parent_id].keys[pos - 1], left_key);
            self.arena[node_id].keys.insert(0, separator);
            self.arena[node_id].children.insert(0, left_child);
            self.arena[left_child].parent = Some(node_id);
        }
    }

    fn borrow_from_right(&mut self, node_id: NodeId, right_id: NodeId, parent_id: NodeId, pos: usize) {
        if self.arena[node_id].is_leaf {
            let key = self.arena[right_id].keys.remove(0);
            let bucket = self.arena[right_id].buckets.remove(0);
            self.arena[node_id].keys.push(key);
            self.arena[node_id].buckets.push(bucket);
            let separator = self.arena[right_id].keys[0].clone();
            self.arena[parent_id].keys[pos] = separator;
        } else {
            let right_key = self.arena[right_id].keys.remove(0);
            let right_child = self.arena[right_id].children.remove(0);
            let separator = core::mem::replace(&mut self.arena[parent_id].keys[pos], right_key);
            self.arena[node_id].keys.push(separator);
            self.arena[node_id].children.push(right_child);
            self.arena[right_child].parent = Some(node_id);
        }
    }

    /// Folds `right_id` into `left_id`; `pos` is the separator between them.
    fn merge_nodes(&mut self, left_id: NodeId, right_id: NodeId, parent_id: NodeId, pos: usize) {
        let right_keys = core::mem::take(&mut self.arena[right_id].keys);

        if self.arena[left_id].is_leaf {
            let right_buckets = core::mem::take(&mut self.arena[right_id].buckets);
            self.arena[left_id].keys.extend(right_keys);
            self.arena[left_id].buckets.extend(right_buckets);
            self.arena[left_id].next = self.arena[right_id].next;
        } else {
            let separator = self.arena[parent_id].keys[pos].clone();
            let right_children = core::mem::take(&mut self.arena[right_id].children);
            for &child_id in &right_children {
                self.arena[child_id].parent = Some(left_id);
            }
            self.arena[left_id].keys.push(separator);
            self.arena[left_id].keys.extend(right_keys);
            self.arena[left_id].children.extend(right_children);
        }

        self.arena[parent_id].keys.remove(pos);
        self.arena[parent_id].children.remove(pos + 1);
        self.release_node(right_id);

        if parent_id == self.root {
            if self.arena[parent_id].keys.is_empty() {
                self.root = left_id;
                self.arena[left_id].parent = None;
                self.release_node(parent_id);
            }
        } else {
            self.handle_underflow(parent_id);
        }
    }

    /// Leaf and position of the first key that may fall inside `range`.
    fn range_start(&self, range: &KeyRange<K>) -> (NodeId, usize) {
        match range.lower() {
            None => (self.leftmost_leaf(), 0),
            Some((key, _)) => {
                let leaf = self.find_leaf(key);
                (leaf, self.arena[leaf].lower_bound(key, &self.comparator))
            }
        }
    }
}

impl<K: Clone, C: Comparator<K>> Index<K> for BTreeIndex<K, C> {
    fn add(&mut self, key: K, value: RowId) -> Result<(), IndexError> {
        self.insert(key, value)
    }

    fn get(&self, key: &K) -> Vec<RowId> {
        let leaf = &self.arena[self.find_leaf(key)];
        match leaf.find_key(key, &self.comparator) {
            Some(pos) => leaf.buckets[pos].clone(),
            None => Vec::new(),
        }
    }

    fn get_all(&self) -> Vec<RowId> {
        self.iter()
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .collect()
    }

    fn remove(&mut self, key: &K, value: Option<RowId>) -> usize {
        self.delete(key, value)
    }

    fn contains_key(&self, key: &K) -> bool {
        let leaf = self.find_leaf(key);
        self.arena[leaf].find_key(key, &self.comparator).is_some()
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn key_count(&self) -> usize {
        self.keys
    }

    fn clear(&mut self) {
        self.arena.clear();
        self.free.clear();
        self.arena.push(Node::new_leaf());
        self.root = 0;
        self.entries = 0;
        self.keys = 0;
    }

    fn is_unique(&self) -> bool {
        self.unique
    }
}

impl<K: Clone, C: Comparator<K>> RangeIndex<K> for BTreeIndex<K, C> {
    /// Walks the leaf chain from the lower bound until the first key past the
    /// upper bound. `reverse` yields the same rows in the opposite order.
    fn get_range(
        &self,
        range: &KeyRange<K>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<RowId> {
        let (start, pos) = self.range_start(range);
        let mut rows = Vec::new();
        for (key, bucket) in BTreeIterator::new_at(&self.arena, Some(start), pos) {
            if range.is_above_by(key, &self.comparator) {
                break;
            }
            if range.is_below_by(key, &self.comparator) {
                continue;
            }
            rows.extend_from_slice(bucket);
        }
        if reverse {
            rows.reverse();
        }
        rows.into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}
