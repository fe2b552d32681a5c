//! Schema module for Marrow.
//!
//! This module contains the table schema definitions: columns, the primary key,
//! secondary indexes and their sort orders.

mod column;
mod index;
mod table;

pub use column::Column;
pub use index::{IndexDef, IndexType, IndexedColumn, Order};
pub use table::{TableBuilder, TableSchema};
