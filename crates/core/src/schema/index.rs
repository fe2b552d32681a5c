//! Index definitions.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;

/// Physical structure backing an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    /// Exact lookups only.
    Hash,
    /// Ordered; answers range selections too.
    #[default]
    BTree,
}

/// Sort direction of one key component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    /// Maps an ascending comparison to this direction.
    #[inline]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    }
}

/// A column named in an index, with its sort direction.
#[derive(Clone, Debug)]
pub struct IndexedColumn {
    pub name: String,
    pub order: Order,
    /// Only meaningful on a single-column primary key.
    pub auto_increment: bool,
}

impl IndexedColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Order::Asc,
            auto_increment: false,
        }
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Definition of one index of a table.
///
/// Column positions are resolved when the definition is attached to a
/// schema, so key extraction never looks columns up by name.
#[derive(Clone, Debug)]
pub struct IndexDef {
    name: String,
    columns: Vec<IndexedColumn>,
    positions: Vec<usize>,
    unique: bool,
    kind: IndexType,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: Vec<IndexedColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            positions: Vec::new(),
            unique: false,
            kind: IndexType::BTree,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn index_type(mut self, kind: IndexType) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn with_column_indices(mut self, positions: Vec<usize>) -> Self {
        self.positions = positions;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn columns(&self) -> &[IndexedColumn] {
        &self.columns
    }

    /// Row positions of the key components, in key order.
    #[inline]
    pub fn column_indices(&self) -> &[usize] {
        &self.positions
    }

    pub fn orders(&self) -> Vec<Order> {
        self.columns.iter().map(|c| c.order).collect()
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[inline]
    pub fn kind(&self) -> IndexType {
        self.kind
    }

    pub fn has_auto_increment(&self) -> bool {
        self.columns.iter().any(|c| c.auto_increment)
    }

    /// True if the key of this index reads column `position`.
    pub fn covers_column(&self, position: usize) -> bool {
        self.positions.contains(&position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_defaults() {
        let idx = IndexDef::new("idx_email", vec![IndexedColumn::new("email")]);
        assert!(!idx.is_unique());
        assert_eq!(idx.kind(), IndexType::BTree);
        assert!(!idx.has_auto_increment());

        let idx = idx.unique(true).index_type(IndexType::Hash);
        assert!(idx.is_unique());
        assert_eq!(idx.kind(), IndexType::Hash);
    }

    #[test]
    fn test_composite_key_positions() {
        let idx = IndexDef::new(
            "idx_name_age",
            vec![
                IndexedColumn::new("last_name"),
                IndexedColumn::new("age").order(Order::Desc),
            ],
        )
        .with_column_indices(vec![2, 4]);

        assert_eq!(idx.orders(), vec![Order::Asc, Order::Desc]);
        assert!(idx.covers_column(4));
        assert!(!idx.covers_column(0));
    }

    #[test]
    fn test_descending_reverses() {
        assert_eq!(Order::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(Order::Desc.apply(Ordering::Less), Ordering::Greater);
        assert_eq!(Order::Desc.apply(Ordering::Equal), Ordering::Equal);
    }
}
