//! Relations (foreign keys) between table indexes.
//!
//! A [`Relation`] links a foreign index to a unique primary index. Rows on
//! the foreign side *refer* to rows on the primary side:
//!
//! - the **referred** check runs when foreign-side rows are inserted or
//!   updated: their key must exist in the primary index;
//! - the **referring** check runs when primary-side rows are deleted or
//!   their key changes: no foreign-side row may still refer to a key that
//!   is gone, unless the relation cascades deletions.

use crate::table::{IndexId, Table, TableId};
use hashbrown::HashMap;
use marrow_core::{Error, Key, Result, Row};
use std::fmt;
use std::sync::Arc;

/// Converts a key of one side of a relation into a key of the other side.
pub type KeyConverter = Arc<dyn Fn(&Key) -> Key + Send + Sync>;

/// A converter that passes keys through unchanged.
pub fn identity_converter() -> KeyConverter {
    Arc::new(|key: &Key| key.clone())
}

/// Relation identifier within a database.
pub type RelationId = usize;

/// Reference to one index of a table.
#[derive(Clone)]
pub struct IndexRef {
    pub table: Arc<Table>,
    pub index: usize,
}

impl IndexRef {
    pub fn new(table: Arc<Table>, index: usize) -> Self {
        Self { table, index }
    }

    /// References the primary index of `table`.
    pub fn primary(table: Arc<Table>) -> Self {
        Self::new(table, 0)
    }

    /// References the index of `table` called `name`.
    pub fn by_name(table: Arc<Table>, name: &str) -> Result<Self> {
        let index = table.index_position(name)?;
        Ok(Self::new(table, index))
    }

    pub fn id(&self) -> IndexId {
        IndexId::new(self.table.id(), self.index)
    }

    /// Extracts the referenced index's key from a row of its table.
    pub fn key_of(&self, row: &Row) -> Result<Key> {
        self.table.index_key(self.index, row)
    }
}

impl fmt::Debug for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table.name(), self.index)
    }
}

/// Options of a relation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationOptions {
    /// Deleting a primary-side row deletes the rows referring to it.
    pub cascaded_deletion: bool,
}

impl RelationOptions {
    /// Options with cascaded deletion enabled.
    pub fn cascading() -> Self {
        Self {
            cascaded_deletion: true,
        }
    }
}

/// A foreign-key relation between two indexes.
pub struct Relation {
    id: RelationId,
    name: String,
    primary: IndexRef,
    foreign: IndexRef,
    primary_to_foreign: KeyConverter,
    foreign_to_primary: KeyConverter,
    options: RelationOptions,
}

impl Relation {
    /// Creates a relation. The primary index must be unique.
    pub fn new(
        id: RelationId,
        name: impl Into<String>,
        primary: IndexRef,
        foreign: IndexRef,
        primary_to_foreign: KeyConverter,
        foreign_to_primary: KeyConverter,
        options: RelationOptions,
    ) -> Result<Self> {
        let name = name.into();
        if !primary.table.is_unique_index(primary.index) {
            return Err(Error::invalid_schema(format!(
                "Relation {} must reference a unique index, {:?} is not",
                name, primary
            )));
        }
        if foreign.index >= foreign.table.index_count() {
            return Err(Error::index_not_found(
                foreign.table.name(),
                format!("#{}", foreign.index),
            ));
        }
        Ok(Self {
            id,
            name,
            primary,
            foreign,
            primary_to_foreign,
            foreign_to_primary,
            options,
        })
    }

    pub fn id(&self) -> RelationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary(&self) -> &IndexRef {
        &self.primary
    }

    pub fn foreign(&self) -> &IndexRef {
        &self.foreign
    }

    pub fn options(&self) -> RelationOptions {
        self.options
    }

    pub fn is_cascading(&self) -> bool {
        self.options.cascaded_deletion
    }

    /// Primary key a foreign-side row refers to.
    pub fn referred_key(&self, foreign_row: &Row) -> Result<Key> {
        Ok((self.foreign_to_primary)(&self.foreign.key_of(foreign_row)?))
    }

    /// Foreign-side rows referring to `primary_key`.
    pub fn referring_rows(&self, primary_key: &Key) -> Result<Vec<Arc<Row>>> {
        let foreign_key = (self.primary_to_foreign)(primary_key);
        if foreign_key.is_null() {
            return Ok(Vec::new());
        }
        self.foreign.table.select(self.foreign.index, &foreign_key)
    }

    /// Checks that every foreign-side row refers to an existing primary key.
    /// Rows whose key has a `Null` component refer to nothing.
    pub fn validate_referred(&self, foreign_rows: &[Arc<Row>]) -> Result<()> {
        for row in foreign_rows {
            let key = self.referred_key(row)?;
            if key.is_null() {
                continue;
            }
            if !self.primary.table.contains_key(self.primary.index, &key) {
                return Err(self.violation(key));
            }
        }
        Ok(())
    }

    /// Checks that no foreign-side row still refers to a key of
    /// `old_primary_rows` that has left the primary index.
    pub fn validate_referring(&self, old_primary_rows: &[Arc<Row>]) -> Result<()> {
        for row in old_primary_rows {
            let key = self.primary.key_of(row)?;
            if self.primary.table.contains_key(self.primary.index, &key) {
                continue;
            }
            if !self.referring_rows(&key)?.is_empty() {
                return Err(self.violation(key));
            }
        }
        Ok(())
    }

    fn violation(&self, key: Key) -> Error {
        Error::foreign_key_violation(
            &self.name,
            self.primary.table.name(),
            self.foreign.table.name(),
            key,
        )
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("primary", &self.primary)
            .field("foreign", &self.foreign)
            .field("options", &self.options)
            .finish()
    }
}

/// Which relations to look up for a set of indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationDirection {
    /// Relations whose primary index is in the set.
    Referring,
    /// Relations whose foreign index is in the set.
    Referred,
    /// Both of the above.
    Both,
}

impl RelationDirection {
    fn referring(self) -> bool {
        matches!(self, RelationDirection::Referring | RelationDirection::Both)
    }

    fn referred(self) -> bool {
        matches!(self, RelationDirection::Referred | RelationDirection::Both)
    }
}

/// Relations of a database, keyed by the indexes they connect.
#[derive(Default)]
pub struct RelationRegistry {
    relations: Vec<Arc<Relation>>,
    /// Primary index -> relations referring to it.
    referring: HashMap<IndexId, Vec<RelationId>>,
    /// Foreign index -> relations it is referred through.
    referred: HashMap<IndexId, Vec<RelationId>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the next registered relation must carry.
    pub fn next_id(&self) -> RelationId {
        self.relations.len()
    }

    /// Registers a relation built with [`next_id`](Self::next_id).
    pub fn register(&mut self, relation: Relation) -> Result<Arc<Relation>> {
        if relation.id() != self.next_id() {
            return Err(Error::invalid_operation(format!(
                "Relation {} has id {}, expected {}",
                relation.name(),
                relation.id(),
                self.next_id()
            )));
        }
        if self.get(relation.name()).is_some() {
            return Err(Error::invalid_schema(format!(
                "Relation already exists: {}",
                relation.name()
            )));
        }
        let relation = Arc::new(relation);
        self.referring
            .entry(relation.primary().id())
            .or_default()
            .push(relation.id());
        self.referred
            .entry(relation.foreign().id())
            .or_default()
            .push(relation.id());
        self.relations.push(Arc::clone(&relation));
        Ok(relation)
    }

    /// Finds a relation by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Relation>> {
        self.relations.iter().find(|r| r.name() == name)
    }

    /// Number of relations.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Relations connected to any of `indexes` of `table` in `direction`,
    /// each reported once, in registration order.
    pub fn find(
        &self,
        table: TableId,
        indexes: &[usize],
        direction: RelationDirection,
    ) -> Vec<Arc<Relation>> {
        let mut ids: Vec<RelationId> = Vec::new();
        for &index in indexes {
            let id = IndexId::new(table, index);
            if direction.referring() {
                ids.extend(self.referring.get(&id).into_iter().flatten());
            }
            if direction.referred() {
                ids.extend(self.referred.get(&id).into_iter().flatten());
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.relations.get(id).cloned())
            .collect()
    }

    /// Relations connected to any index of `table` in `direction`.
    pub fn find_for_table(&self, table: &Table, direction: RelationDirection) -> Vec<Arc<Relation>> {
        let indexes: Vec<usize> = (0..table.index_count()).collect();
        self.find(table.id(), &indexes, direction)
    }
}

impl fmt::Debug for RelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.relations.iter()).finish()
    }
}
