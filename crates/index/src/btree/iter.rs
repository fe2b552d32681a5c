//! In-order traversal of B+Tree leaves.

use super::node::{Node, NodeId};
use marrow_core::RowId;

/// Iterator over the `(key, bucket)` entries of a B+Tree, in index order.
pub struct BTreeIterator<'a, K> {
    arena: &'a [Node<K>],
    current_node: Option<NodeId>,
    current_pos: usize,
}

impl<'a, K> BTreeIterator<'a, K> {
    /// Creates an iterator starting at `pos` within leaf `node`.
    pub(crate) fn new_at(arena: &'a [Node<K>], node: Option<NodeId>, pos: usize) -> Self {
        Self {
            arena,
            current_node: node,
            current_pos: pos,
        }
    }
}

impl<'a, K> Iterator for BTreeIterator<'a, K> {
    type Item = (&'a K, &'a [RowId]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = &self.arena[self.current_node?];
            if self.current_pos < node.key_count() {
                let pos = self.current_pos;
                self.current_pos += 1;
                return Some((&node.keys[pos], node.buckets[pos].as_slice()));
            }
            // Empty leaves are skipped rather than ending the walk.
            self.current_node = node.next;
            self.current_pos = 0;
        }
    }
}
