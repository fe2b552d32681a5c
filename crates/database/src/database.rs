//! Database - Main entry point for Marrow.
//!
//! A [`Database`] owns the tables, the relations between them and the
//! concurrency manager that arbitrates table locks. It is meant to be shared
//! between threads (usually behind an `Arc`); every operation runs in an
//! explicit transaction carried by an [`ExecutionContext`].

use crate::config::DatabaseConfig;
use crate::context::ExecutionContext;
use hashbrown::HashMap;
use marrow_core::schema::{IndexType, IndexedColumn, TableSchema};
use marrow_core::{Error, Result};
use marrow_storage::{
    identity_converter, ConcurrencyManager, IndexRef, IsolationLevel, KeyConverter, Relation,
    RelationDirection, RelationOptions, RelationRegistry, Table, TableId, Transaction,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Catalog {
    tables: Vec<Arc<Table>>,
    by_name: HashMap<String, TableId>,
}

/// An in-process transactional data store.
pub struct Database {
    config: DatabaseConfig,
    catalog: RwLock<Catalog>,
    relations: RwLock<RelationRegistry>,
    concurrency: Arc<ConcurrencyManager>,
}

impl Database {
    /// Creates an empty database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self {
            config,
            catalog: RwLock::new(Catalog::default()),
            relations: RwLock::new(RelationRegistry::new()),
            concurrency: Arc::new(ConcurrencyManager::new(config.backoff)),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The lock manager shared by every transaction of this database.
    pub fn concurrency(&self) -> &Arc<ConcurrencyManager> {
        &self.concurrency
    }

    // ---- tables ----

    /// Creates a table from `schema`.
    pub fn create_table(&self, schema: TableSchema) -> Result<Arc<Table>> {
        let mut catalog = self.catalog.write();
        if catalog.by_name.contains_key(schema.name()) {
            return Err(Error::invalid_schema(format!(
                "Table already exists: {}",
                schema.name()
            )));
        }
        let id = catalog.tables.len();
        let table = Arc::new(Table::new(id, schema, self.config.btree_order));
        catalog.by_name.insert(table.name().to_string(), id);
        catalog.tables.push(Arc::clone(&table));
        debug!(table = table.name(), id, "table created");
        Ok(table)
    }

    /// Looks a table up by name.
    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        let catalog = self.catalog.read();
        catalog
            .by_name
            .get(name)
            .and_then(|&id| catalog.tables.get(id))
            .cloned()
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn table_by_id(&self, id: TableId) -> Option<Arc<Table>> {
        self.catalog.read().tables.get(id).cloned()
    }

    /// Names of all tables in creation order.
    pub fn table_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .tables
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn table_count(&self) -> usize {
        self.catalog.read().tables.len()
    }

    /// Adds a secondary index over existing and future rows of `table`.
    /// Returns the index position.
    pub fn create_index(
        &self,
        table: &str,
        name: &str,
        columns: &[&str],
        unique: bool,
        index_type: IndexType,
    ) -> Result<usize> {
        let table = self.table(table)?;
        let columns = columns.iter().map(|c| IndexedColumn::new(*c)).collect();
        table.create_index(name, columns, unique, index_type)
    }

    fn check_owned(&self, table: &Arc<Table>) -> Result<()> {
        match self.table_by_id(table.id()) {
            Some(owned) if Arc::ptr_eq(&owned, table) => Ok(()),
            _ => Err(Error::table_not_found(table.name())),
        }
    }

    // ---- relations ----

    /// Creates a relation from `foreign` to the unique index `primary`.
    ///
    /// Rows already stored on the foreign side must satisfy the relation.
    pub fn create_relation(
        &self,
        name: &str,
        primary: IndexRef,
        foreign: IndexRef,
        primary_to_foreign: KeyConverter,
        foreign_to_primary: KeyConverter,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        self.check_owned(&primary.table)?;
        self.check_owned(&foreign.table)?;
        let mut registry = self.relations.write();
        let relation = Relation::new(
            registry.next_id(),
            name,
            primary,
            foreign,
            primary_to_foreign,
            foreign_to_primary,
            options,
        )?;
        relation.validate_referred(&relation.foreign().table.rows())?;
        let relation = registry.register(relation)?;
        debug!(
            relation = relation.name(),
            primary = relation.primary().table.name(),
            foreign = relation.foreign().table.name(),
            cascade = relation.is_cascading(),
            "relation created"
        );
        Ok(relation)
    }

    /// Relates `foreign_index` of `foreign_table` to the primary key of
    /// `primary_table`; both keys have the same shape.
    pub fn relate(
        &self,
        name: &str,
        primary_table: &str,
        foreign_table: &str,
        foreign_index: &str,
        options: RelationOptions,
    ) -> Result<Arc<Relation>> {
        let primary = IndexRef::primary(self.table(primary_table)?);
        let foreign = IndexRef::by_name(self.table(foreign_table)?, foreign_index)?;
        self.create_relation(
            name,
            primary,
            foreign,
            identity_converter(),
            identity_converter(),
            options,
        )
    }

    pub fn relation(&self, name: &str) -> Option<Arc<Relation>> {
        self.relations.read().get(name).cloned()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.read().len()
    }

    /// Relations connected to `indexes` of `table` in `direction`.
    pub fn relations(
        &self,
        table: &Table,
        indexes: &[usize],
        direction: RelationDirection,
    ) -> Vec<Arc<Relation>> {
        self.relations.read().find(table.id(), indexes, direction)
    }

    /// Relations connected to any index of `table` in `direction`.
    pub fn relations_for_table(&self, table: &Table, direction: RelationDirection) -> Vec<Arc<Relation>> {
        self.relations.read().find_for_table(table, direction)
    }

    // ---- transactions ----

    /// Begins a transaction at the configured default isolation level.
    pub fn begin(&self) -> Arc<Transaction> {
        self.begin_with(self.config.default_isolation)
    }

    pub fn begin_with(&self, isolation: IsolationLevel) -> Arc<Transaction> {
        Transaction::begin(isolation)
    }

    /// Creates an execution context for `txn`.
    pub fn context(&self, txn: Arc<Transaction>) -> ExecutionContext<'_> {
        ExecutionContext::new(self, txn)
    }

    /// Runs `f` in a new transaction at the default isolation level,
    /// committing on success and rolling back on error.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ExecutionContext<'_>) -> Result<T>,
    {
        self.transact_with(self.config.default_isolation, f)
    }

    pub fn transact_with<T, F>(&self, isolation: IsolationLevel, f: F) -> Result<T>
    where
        F: FnOnce(&ExecutionContext<'_>) -> Result<T>,
    {
        let txn = self.begin_with(isolation);
        let ctx = self.context(Arc::clone(&txn));
        match f(&ctx) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback() {
                    warn!(txn = txn.id(), error = %rollback, "rollback after failed transaction");
                }
                Err(e)
            }
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.table_names())
            .field("relations", &self.relation_count())
            .field("config", &self.config)
            .finish()
    }
}
