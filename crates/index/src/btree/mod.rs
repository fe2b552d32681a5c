//! B+Tree index implementation for Marrow.
//!
//! An arena-allocated B+Tree whose node ordering is driven entirely by an
//! injected comparator, so composite keys can mix ascending and descending
//! components.

mod iter;
mod node;
mod tree;

pub use iter::BTreeIterator;
pub use node::{Node, NodeId};
pub use tree::{BTreeIndex, DEFAULT_ORDER};
