//! Table storage for Marrow.
//!
//! A [`Table`] owns its rows and every index over them. Index 0 is the
//! primary index; secondary indexes follow in declaration order, then the
//! indexes created at runtime.
//!
//! The physical latch inside a table only keeps its structures consistent;
//! isolation between transactions comes from the table locks taken by the
//! [`ConcurrencyManager`](crate::ConcurrencyManager). Mutating operations
//! take an [`AtomicLogScope`] and record one undo entry per primitive change.

use crate::constraint::{check_row, Constraint};
use crate::journal::{AtomicLogScope, LogEntry};
use hashbrown::HashMap;
use marrow_core::schema::{IndexDef, IndexType, IndexedColumn, TableSchema};
use marrow_core::{DataType, Error, Key, Result, Row, RowId, Value};
use marrow_index::{BTreeIndex, HashIndex, Index, IndexError, KeyComparator, KeyRange, RangeIndex};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifier of a table within its database.
pub type TableId = usize;

/// Identity of an index: its table and its position in that table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId {
    pub table: TableId,
    pub index: usize,
}

impl IndexId {
    pub fn new(table: TableId, index: usize) -> Self {
        Self { table, index }
    }
}

#[derive(Debug)]
enum IndexKind {
    Ordered(BTreeIndex<Key, KeyComparator>),
    Hashed(HashIndex<Key>),
}

/// One index of a table, ordered or hashed.
#[derive(Debug)]
pub struct TableIndex {
    def: IndexDef,
    kind: IndexKind,
}

impl TableIndex {
    /// Creates an empty index for `def`.
    pub fn new(def: IndexDef, btree_order: usize) -> Self {
        let kind = match def.kind() {
            IndexType::BTree => IndexKind::Ordered(BTreeIndex::with_comparator(
                btree_order,
                def.is_unique(),
                KeyComparator::new(def.orders()),
            )),
            IndexType::Hash => IndexKind::Hashed(HashIndex::new(def.is_unique())),
        };
        Self { def, kind }
    }

    /// Returns the index definition.
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Returns true if the index supports range selects.
    pub fn is_ordered(&self) -> bool {
        matches!(self.kind, IndexKind::Ordered(_))
    }

    /// Extracts this index's key from a row.
    pub fn key_of(&self, row: &Row) -> Key {
        Key::from_row(row, self.def.column_indices())
    }

    fn index(&self) -> &dyn Index<Key> {
        match &self.kind {
            IndexKind::Ordered(tree) => tree as &dyn Index<Key>,
            IndexKind::Hashed(hash) => hash as &dyn Index<Key>,
        }
    }

    fn index_mut(&mut self) -> &mut dyn Index<Key> {
        match &mut self.kind {
            IndexKind::Ordered(tree) => tree as &mut dyn Index<Key>,
            IndexKind::Hashed(hash) => hash as &mut dyn Index<Key>,
        }
    }

    pub fn add(&mut self, key: Key, row: RowId) -> core::result::Result<(), IndexError> {
        self.index_mut().add(key, row)
    }

    pub fn remove(&mut self, key: &Key, row: RowId) -> usize {
        self.index_mut().remove(key, Some(row))
    }

    pub fn get(&self, key: &Key) -> Vec<RowId> {
        self.index().get(key)
    }

    /// Every row ID, in key order for ordered indexes.
    pub fn get_all(&self) -> Vec<RowId> {
        self.index().get_all()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.index().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.index().key_count()
    }

    /// Row IDs whose key lies in `range`.
    pub fn range(
        &self,
        range: &KeyRange<Key>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> core::result::Result<Vec<RowId>, IndexError> {
        match &self.kind {
            IndexKind::Ordered(tree) => Ok(tree.get_range(range, reverse, limit, skip)),
            IndexKind::Hashed(_) => Err(IndexError::RangeUnsupported),
        }
    }
}

struct TableStore {
    rows: HashMap<RowId, Arc<Row>>,
    indexes: Vec<TableIndex>,
}

/// A table: rows of one schema plus their indexes.
pub struct Table {
    id: TableId,
    schema: TableSchema,
    btree_order: usize,
    data: RwLock<TableStore>,
    identity: AtomicI64,
    constraints: RwLock<Vec<Arc<dyn Constraint>>>,
}

impl Table {
    /// Creates an empty table with one index per schema index.
    pub fn new(id: TableId, schema: TableSchema, btree_order: usize) -> Self {
        let indexes = schema
            .indices()
            .iter()
            .map(|def| TableIndex::new(def.clone(), btree_order))
            .collect();
        Self {
            id,
            schema,
            btree_order,
            data: RwLock::new(TableStore {
                rows: HashMap::new(),
                indexes,
            }),
            identity: AtomicI64::new(1),
            constraints: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.data.read().rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- indexes ----

    /// Number of indexes, the primary included.
    pub fn index_count(&self) -> usize {
        self.data.read().indexes.len()
    }

    /// Returns the definition of the index at `index`.
    pub fn index_def(&self, index: usize) -> Result<IndexDef> {
        self.data
            .read()
            .indexes
            .get(index)
            .map(|i| i.def().clone())
            .ok_or_else(|| self.missing_index(index))
    }

    /// Returns the position of the index called `name`.
    pub fn index_position(&self, name: &str) -> Result<usize> {
        self.data
            .read()
            .indexes
            .iter()
            .position(|i| i.def().name() == name)
            .ok_or_else(|| Error::index_not_found(self.name(), name))
    }

    /// Returns the positions of the indexes whose key uses any of `columns`.
    pub fn indexes_covering(&self, columns: &[usize]) -> Vec<usize> {
        self.data
            .read()
            .indexes
            .iter()
            .enumerate()
            .filter(|(_, i)| columns.iter().any(|&c| i.def().covers_column(c)))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Number of entries in the index at `index`.
    pub fn index_len(&self, index: usize) -> usize {
        self.data.read().indexes.get(index).map_or(0, TableIndex::len)
    }

    /// Number of distinct keys in the index at `index`.
    pub fn index_key_count(&self, index: usize) -> usize {
        self.data.read().indexes.get(index).map_or(0, TableIndex::key_count)
    }

    /// Returns true if the index at `index` is unique.
    pub fn is_unique_index(&self, index: usize) -> bool {
        self.data
            .read()
            .indexes
            .get(index)
            .is_some_and(|i| i.def().is_unique())
    }

    /// Extracts the key of the index at `index` from `row`.
    pub fn index_key(&self, index: usize, row: &Row) -> Result<Key> {
        self.data
            .read()
            .indexes
            .get(index)
            .map(|i| i.key_of(row))
            .ok_or_else(|| self.missing_index(index))
    }

    /// Creates an index over existing and future rows and returns its
    /// position.
    pub fn create_index(
        &self,
        name: &str,
        columns: Vec<IndexedColumn>,
        unique: bool,
        index_type: IndexType,
    ) -> Result<usize> {
        let def = self.schema.define_index(name, columns, unique, index_type)?;
        let mut store = self.data.write();
        if store.indexes.iter().any(|i| i.def().name() == name) {
            return Err(Error::invalid_schema(format!(
                "Index already exists: {}",
                name
            )));
        }
        let mut index = TableIndex::new(def, self.btree_order);
        for row in store.rows.values() {
            let key = index.key_of(row);
            index
                .add(key.clone(), row.id())
                .map_err(|e| self.index_error(index.def(), e, key))?;
        }
        store.indexes.push(index);
        debug!(table = self.name(), index = name, "index created");
        Ok(store.indexes.len() - 1)
    }

    // ---- reads ----

    /// Returns the row with the given ID.
    pub fn get(&self, row_id: RowId) -> Option<Arc<Row>> {
        self.data.read().rows.get(&row_id).cloned()
    }

    /// Returns every row, in primary index order.
    pub fn rows(&self) -> Vec<Arc<Row>> {
        let store = self.data.read();
        let ids = store.indexes[0].get_all();
        Self::resolve(&store, ids)
    }

    /// Finds a row by primary key.
    pub fn find(&self, key: &Key) -> Option<Arc<Row>> {
        let store = self.data.read();
        let ids = store.indexes[0].get(key);
        Self::resolve(&store, ids).into_iter().next()
    }

    /// Returns true if the index at `index` contains `key`.
    pub fn contains_key(&self, index: usize, key: &Key) -> bool {
        self.data
            .read()
            .indexes
            .get(index)
            .is_some_and(|i| i.contains_key(key))
    }

    /// Rows whose key in the index at `index` equals `key`.
    pub fn select(&self, index: usize, key: &Key) -> Result<Vec<Arc<Row>>> {
        let store = self.data.read();
        let ids = store
            .indexes
            .get(index)
            .ok_or_else(|| self.missing_index(index))?
            .get(key);
        Ok(Self::resolve(&store, ids))
    }

    /// Every row reachable through the index at `index`, in its order.
    pub fn select_all(&self, index: usize) -> Result<Vec<Arc<Row>>> {
        let store = self.data.read();
        let ids = store
            .indexes
            .get(index)
            .ok_or_else(|| self.missing_index(index))?
            .get_all();
        Ok(Self::resolve(&store, ids))
    }

    /// Rows whose key in the ordered index at `index` lies in `range`.
    pub fn select_range(
        &self,
        index: usize,
        range: &KeyRange<Key>,
        reverse: bool,
    ) -> Result<Vec<Arc<Row>>> {
        let store = self.data.read();
        let idx = store
            .indexes
            .get(index)
            .ok_or_else(|| self.missing_index(index))?;
        let ids = idx
            .range(range, reverse, None, 0)
            .map_err(|e| self.index_error(idx.def(), e, Key::new(Vec::new())))?;
        Ok(Self::resolve(&store, ids))
    }

    /// Rows with a key between `from` and `to`.
    pub fn select_between(
        &self,
        index: usize,
        from: Key,
        to: Key,
        from_open: bool,
        to_open: bool,
    ) -> Result<Vec<Arc<Row>>> {
        self.select_range(index, &KeyRange::bound(from, to, from_open, to_open), false)
    }

    /// Rows with a key after `from`.
    pub fn select_greater(&self, index: usize, from: Key, open: bool) -> Result<Vec<Arc<Row>>> {
        self.select_range(index, &KeyRange::lower_bound(from, open), false)
    }

    /// Rows with a key before `to`.
    pub fn select_less(&self, index: usize, to: Key, open: bool) -> Result<Vec<Arc<Row>>> {
        self.select_range(index, &KeyRange::upper_bound(to, open), false)
    }

    fn resolve(store: &TableStore, ids: Vec<RowId>) -> Vec<Arc<Row>> {
        ids.into_iter()
            .filter_map(|id| store.rows.get(&id).cloned())
            .collect()
    }

    // ---- constraints and identity ----

    /// Adds a constraint applied to every future insert and update.
    pub fn add_constraint(&self, constraint: Arc<dyn Constraint>) {
        self.constraints.write().push(constraint);
    }

    /// Number of registered constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.read().len()
    }

    /// Runs column checks and every registered constraint on `row`.
    pub fn apply_constraints(&self, row: &mut Row) -> Result<()> {
        check_row(&self.schema, row)?;
        for constraint in self.constraints.read().iter() {
            constraint.apply(&self.schema, row)?;
        }
        Ok(())
    }

    /// Next value the identity sequence will hand out.
    pub fn next_identity(&self) -> i64 {
        self.identity.load(Ordering::SeqCst)
    }

    /// Fills a `Null` identity field from the sequence; an explicit value
    /// advances the sequence past itself.
    pub fn assign_identity(&self, row: &mut Row) -> Result<()> {
        let Some(col) = self.schema.identity_column() else {
            return Ok(());
        };
        let data_type = self.schema.columns()[col].data_type();
        match row.get(col) {
            Some(Value::Null) => {
                let next = self.identity.fetch_add(1, Ordering::SeqCst);
                let value = match data_type {
                    DataType::Int32 => Value::Int32(i32::try_from(next).map_err(|_| {
                        Error::constraint_violation(
                            self.name(),
                            self.schema.columns()[col].name(),
                            "identity sequence exhausted",
                        )
                    })?),
                    _ => Value::Int64(next),
                };
                row.set(col, value);
            }
            Some(value) => {
                if let Some(explicit) = value.as_integer() {
                    self.identity
                        .fetch_max(explicit.saturating_add(1), Ordering::SeqCst);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Turns a caller-provided row into one ready for insertion: fresh row
    /// ID, identity value and constraints applied.
    pub fn prepare_insert(&self, mut row: Row) -> Result<Row> {
        row.renumber();
        self.assign_identity(&mut row)?;
        self.apply_constraints(&mut row)?;
        Ok(row)
    }

    // ---- logged mutations ----

    /// Prepares and inserts a row.
    pub fn insert(self: &Arc<Self>, row: Row, scope: &AtomicLogScope<'_>) -> Result<Arc<Row>> {
        let row = self.prepare_insert(row)?;
        self.insert_row(row, scope)
    }

    /// Adds an already prepared row to every index and to the row store.
    ///
    /// On a unique violation the error is returned with the entries written
    /// so far still in the scope; abandoning the scope undoes them.
    pub fn insert_row(self: &Arc<Self>, row: Row, scope: &AtomicLogScope<'_>) -> Result<Arc<Row>> {
        let row = Arc::new(row);
        let mut store = self.data.write();
        for (position, index) in store.indexes.iter_mut().enumerate() {
            let key = index.key_of(&row);
            index
                .add(key.clone(), row.id())
                .map_err(|e| self.index_error(index.def(), e, key.clone()))?;
            scope.write(LogEntry::IndexInsert {
                table: Arc::clone(self),
                index: position,
                key,
                row: row.id(),
            });
        }
        store.rows.insert(row.id(), Arc::clone(&row));
        scope.write(LogEntry::RowInsert {
            table: Arc::clone(self),
            row: row.id(),
        });
        Ok(row)
    }

    /// Removes a row from every index and from the row store. Returns the
    /// removed row, or `None` if it was already gone.
    pub fn delete_row(self: &Arc<Self>, row_id: RowId, scope: &AtomicLogScope<'_>) -> Option<Arc<Row>> {
        let mut store = self.data.write();
        let row = store.rows.remove(&row_id)?;
        for (position, index) in store.indexes.iter_mut().enumerate() {
            let key = index.key_of(&row);
            if index.remove(&key, row_id) > 0 {
                scope.write(LogEntry::IndexDelete {
                    table: Arc::clone(self),
                    index: position,
                    key,
                    row: row_id,
                });
            }
        }
        scope.write(LogEntry::RowDelete {
            table: Arc::clone(self),
            row: Arc::clone(&row),
        });
        Some(row)
    }

    /// Removes `row`'s keys from the listed indexes.
    pub fn unindex(self: &Arc<Self>, indexes: &[usize], row: &Row, scope: &AtomicLogScope<'_>) {
        let mut store = self.data.write();
        for &position in indexes {
            let Some(index) = store.indexes.get_mut(position) else {
                continue;
            };
            let key = index.key_of(row);
            if index.remove(&key, row.id()) > 0 {
                scope.write(LogEntry::IndexDelete {
                    table: Arc::clone(self),
                    index: position,
                    key,
                    row: row.id(),
                });
            }
        }
    }

    /// Adds `row`'s keys to the listed indexes.
    pub fn reindex(
        self: &Arc<Self>,
        indexes: &[usize],
        row: &Row,
        scope: &AtomicLogScope<'_>,
    ) -> Result<()> {
        let mut store = self.data.write();
        for &position in indexes {
            let index = match store.indexes.get_mut(position) {
                Some(index) => index,
                None => return Err(self.missing_index(position)),
            };
            let key = index.key_of(row);
            index
                .add(key.clone(), row.id())
                .map_err(|e| self.index_error(index.def(), e, key.clone()))?;
            scope.write(LogEntry::IndexInsert {
                table: Arc::clone(self),
                index: position,
                key,
                row: row.id(),
            });
        }
        Ok(())
    }

    /// Replaces the stored version of a row, keeping the previous one in the
    /// log. The indexes are not touched.
    pub fn replace_row(self: &Arc<Self>, row: Arc<Row>, scope: &AtomicLogScope<'_>) -> Result<()> {
        let row_id = row.id();
        let mut store = self.data.write();
        if !store.rows.contains_key(&row_id) {
            return Err(Error::invalid_operation(format!(
                "Row {} is not stored in {}",
                row_id,
                self.name()
            )));
        }
        let Some(before) = store.rows.insert(row_id, row) else {
            return Ok(());
        };
        scope.write(LogEntry::RowUpdate {
            table: Arc::clone(self),
            before,
        });
        Ok(())
    }

    // ---- undo primitives ----

    pub(crate) fn raw_index_add(&self, index: usize, key: Key, row: RowId) -> Result<()> {
        let mut store = self.data.write();
        match store.indexes.get_mut(index) {
            Some(idx) => idx
                .add(key.clone(), row)
                .map_err(|e| self.index_error(idx.def(), e, key)),
            None => Err(self.missing_index(index)),
        }
    }

    pub(crate) fn raw_index_remove(&self, index: usize, key: &Key, row: RowId) {
        if let Some(idx) = self.data.write().indexes.get_mut(index) {
            idx.remove(key, row);
        }
    }

    pub(crate) fn raw_remove_row(&self, row: RowId) {
        self.data.write().rows.remove(&row);
    }

    pub(crate) fn raw_put_row(&self, row: Arc<Row>) {
        self.data.write().rows.insert(row.id(), row);
    }

    fn index_error(&self, def: &IndexDef, err: IndexError, key: Key) -> Error {
        match err {
            IndexError::DuplicateKey => Error::unique_constraint(self.name(), def.name(), key),
            IndexError::RangeUnsupported => Error::invalid_operation(format!(
                "Index {}.{} does not support range selects",
                self.name(),
                def.name()
            )),
        }
    }

    fn missing_index(&self, index: usize) -> Error {
        Error::index_not_found(self.name(), format!("#{}", index))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("rows", &self.len())
            .field("indexes", &self.index_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{group, groups_table, member, members_table};
    use crate::transaction::{IsolationLevel, Transaction};
    use marrow_core::schema::{Order, TableBuilder};

    fn committed<T>(f: impl FnOnce(&AtomicLogScope<'_>) -> T) -> T {
        let txn = Transaction::new(IsolationLevel::ReadCommitted);
        let scope = AtomicLogScope::begin(&txn);
        let out = f(&scope);
        scope.complete();
        out
    }

    #[test]
    fn test_insert_and_select() {
        let groups = groups_table(0);
        committed(|scope| {
            for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
                groups.insert(group(id, name), scope).unwrap();
            }
        });
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.index_len(0), 3);
        assert_eq!(groups.index_len(1), 3);

        let found = groups.find(&Key::from(2i64)).unwrap();
        assert_eq!(found.get(1), Some(&Value::from("b")));
        let by_name = groups.select(1, &Key::from("c")).unwrap();
        assert_eq!(by_name.len(), 1);
        assert!(groups.contains_key(0, &Key::from(1i64)));
        assert!(!groups.contains_key(0, &Key::from(9i64)));

        let ids: Vec<_> = groups
            .rows()
            .iter()
            .filter_map(|r| r.get(0).and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_unique_violation_leaves_counts_unchanged() {
        let groups = groups_table(0);
        committed(|scope| groups.insert(group(1, "a"), scope).unwrap());

        let txn = Transaction::new(IsolationLevel::ReadCommitted);
        let err = {
            let scope = AtomicLogScope::begin(&txn);
            // Primary key is new, secondary unique name collides.
            groups.insert(group(2, "a"), &scope).unwrap_err()
        };
        assert!(matches!(err, Error::UniqueConstraint { .. }));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.index_len(0), 1);
        assert_eq!(groups.index_len(1), 1);
        assert_eq!(txn.log_position(), 0);
    }

    #[test]
    fn test_identity_assignment() {
        let members = members_table(1);
        let rows = committed(|scope| {
            let a = members.insert(member(None, Some(1), "a"), scope).unwrap();
            let b = members.insert(member(Some(10), Some(1), "b"), scope).unwrap();
            let c = members.insert(member(None, None, "c"), scope).unwrap();
            vec![a, b, c]
        });
        assert_eq!(rows[0].get(0), Some(&Value::Int64(1)));
        assert_eq!(rows[1].get(0), Some(&Value::Int64(10)));
        assert_eq!(rows[2].get(0), Some(&Value::Int64(11)));
        assert_eq!(members.next_identity(), 12);
    }

    #[test]
    fn test_int32_identity() {
        let schema = TableBuilder::new("tags")
            .unwrap()
            .add_column("id", DataType::Int32)
            .unwrap()
            .add_primary_key(&["id"], true)
            .unwrap()
            .build()
            .unwrap();
        let tags = Arc::new(Table::new(3, schema, 8));
        let rows = committed(|scope| {
            let a = tags.insert(Row::new(0, vec![Value::Int32(5)]), scope).unwrap();
            let b = tags.insert(Row::new(0, vec![Value::Null]), scope).unwrap();
            vec![a, b]
        });
        assert_eq!(rows[1].get(0), Some(&Value::Int32(6)));
        assert_eq!(tags.next_identity(), 7);
    }

    #[test]
    fn test_delete_row_and_undo() {
        let groups = groups_table(0);
        let row = committed(|scope| groups.insert(group(1, "a"), scope).unwrap());

        let txn = Transaction::new(IsolationLevel::ReadCommitted);
        {
            let scope = AtomicLogScope::begin(&txn);
            let removed = groups.delete_row(row.id(), &scope).unwrap();
            assert_eq!(removed.id(), row.id());
            assert!(groups.delete_row(row.id(), &scope).is_none());
            assert!(groups.is_empty());
            assert_eq!(groups.index_len(1), 0);
        }
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key(1, &Key::from("a")));
    }

    #[test]
    fn test_reindex_and_replace() {
        let groups = groups_table(0);
        let row = committed(|scope| groups.insert(group(1, "a"), scope).unwrap());

        let txn = Transaction::new(IsolationLevel::ReadCommitted);
        let scope = AtomicLogScope::begin(&txn);
        let mut updated = (*row).clone();
        updated.set(1, "z".into());
        groups.unindex(&[1], &row, &scope);
        groups.reindex(&[1], &updated, &scope).unwrap();
        groups.replace_row(Arc::new(updated), &scope).unwrap();
        assert!(groups.contains_key(1, &Key::from("z")));
        assert!(!groups.contains_key(1, &Key::from("a")));
        drop(scope);

        assert!(groups.contains_key(1, &Key::from("a")));
        assert_eq!(groups.get(row.id()).unwrap().get(1), Some(&Value::from("a")));
    }

    #[test]
    fn test_range_selects() {
        let groups = groups_table(0);
        committed(|scope| {
            for (id, name) in [(1, "a"), (3, "b"), (5, "c"), (7, "d")] {
                groups.insert(group(id, name), scope).unwrap();
            }
        });
        let keys = |rows: Vec<Arc<Row>>| -> Vec<i64> {
            rows.iter().filter_map(|r| r.get(0).and_then(Value::as_i64)).collect()
        };
        assert_eq!(
            keys(groups.select_between(0, 3i64.into(), 7i64.into(), false, true).unwrap()),
            vec![3, 5]
        );
        assert_eq!(keys(groups.select_greater(0, 5i64.into(), true).unwrap()), vec![7]);
        assert_eq!(keys(groups.select_less(0, 3i64.into(), false).unwrap()), vec![1, 3]);
        assert_eq!(
            keys(groups.select_range(0, &KeyRange::all(), true).unwrap()),
            vec![7, 5, 3, 1]
        );
    }

    #[test]
    fn test_range_on_hash_index_fails() {
        let members = members_table(1);
        let pos = members
            .create_index("idx_name", vec![IndexedColumn::new("name")], false, IndexType::Hash)
            .unwrap();
        assert!(matches!(
            members.select_greater(pos, "a".into(), false),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_create_index_populates_and_checks_uniqueness() {
        let members = members_table(1);
        committed(|scope| {
            members.insert(member(None, Some(1), "x"), scope).unwrap();
            members.insert(member(None, Some(1), "y"), scope).unwrap();
        });

        let pos = members
            .create_index(
                "idx_name_desc",
                vec![IndexedColumn::new("name").order(Order::Desc)],
                true,
                IndexType::BTree,
            )
            .unwrap();
        let names: Vec<_> = members
            .select_all(pos)
            .unwrap()
            .iter()
            .filter_map(|r| r.get(2).and_then(Value::as_str).map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["y".to_string(), "x".to_string()]);
        assert_eq!(members.index_position("idx_name_desc").unwrap(), pos);

        assert!(matches!(
            members.create_index(
                "uq_group",
                vec![IndexedColumn::new("group_id")],
                true,
                IndexType::Hash
            ),
            Err(Error::UniqueConstraint { .. })
        ));
        assert!(members
            .create_index("idx_name_desc", vec![IndexedColumn::new("name")], false, IndexType::Hash)
            .is_err());
    }

    #[test]
    fn test_constraints_run_on_prepare() {
        let groups = groups_table(0);
        groups.add_constraint(Arc::new(crate::constraint::MaxLength::new("name", 2)));
        assert_eq!(groups.constraint_count(), 1);
        assert!(matches!(
            groups.prepare_insert(group(1, "long")),
            Err(Error::ConstraintViolation { .. })
        ));
        assert!(groups.prepare_insert(group(1, "ok")).is_ok());
    }

    #[test]
    fn test_indexes_covering() {
        let members = members_table(1);
        assert_eq!(members.indexes_covering(&[1]), vec![1]);
        assert_eq!(members.indexes_covering(&[0]), vec![0]);
        assert!(members.indexes_covering(&[2]).is_empty());
    }
}
