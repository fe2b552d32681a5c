//! Command executor.
//!
//! Every command follows the same discipline: find the relations it must
//! honor, take table locks (the operand's write lock, related tables'
//! read locks), validate what can be validated up front, then mutate inside
//! the transaction's atomic section through an [`AtomicLogScope`]. A command
//! that fails leaves its scope incomplete, so everything it wrote is undone
//! before the error reaches the caller. Locks taken by the command are
//! handed back to the concurrency manager on every exit path, which keeps
//! or releases them according to the isolation level.

use crate::context::ExecutionContext;
use crate::database::Database;
use crate::plan::{Detach, ExecutionPlan, FnPlan, LookupPlan, QueryOptions, Updater};
use hashbrown::HashSet;
use marrow_core::{Error, Key, Result, Row};
use marrow_storage::{
    AtomicLogScope, ConcurrencyManager, IndexRef, Relation, RelationDirection, Table,
    TableId, Transaction,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Runs Insert, Update, Delete and Query commands in one execution context.
pub struct Executor<'c, 'db> {
    ctx: &'c ExecutionContext<'db>,
}

impl<'c, 'db> Executor<'c, 'db> {
    pub fn new(ctx: &'c ExecutionContext<'db>) -> Self {
        Self { ctx }
    }

    fn db(&self) -> &'db Database {
        self.ctx.database()
    }

    fn txn(&self) -> &'c Arc<Transaction> {
        self.ctx.transaction()
    }

    fn locks(&self) -> OperationLocks<'c> {
        OperationLocks::new(self.ctx.database().concurrency(), self.ctx.transaction())
    }

    // ---- insert ----

    /// Inserts one entity and returns it as stored.
    pub fn insert(&self, table: &Arc<Table>, row: Row) -> Result<Arc<Row>> {
        self.insert_many(table, vec![row])?
            .pop()
            .ok_or_else(|| Error::invalid_operation("insert stored no row"))
    }

    /// Inserts entities as one unit: either all of them are stored or none.
    pub fn insert_many(&self, table: &Arc<Table>, rows: Vec<Row>) -> Result<Vec<Arc<Row>>> {
        let txn = self.txn();
        txn.check_active()?;

        let rows = rows
            .into_iter()
            .map(|row| table.prepare_insert(row))
            .collect::<Result<Vec<_>>>()?;
        let relations = self.db().relations_for_table(table, RelationDirection::Referred);

        let mut locks = self.locks();
        locks.write(table)?;
        for relation in &relations {
            locks.related(&relation.primary().table)?;
        }

        if !relations.is_empty() {
            let candidates: Vec<Arc<Row>> = rows.iter().cloned().map(Arc::new).collect();
            for relation in &relations {
                relation.validate_referred(&candidates)?;
            }
        }

        let _section = txn.enter_atomic_section()?;
        let scope = AtomicLogScope::begin(txn);
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(table.insert_row(row, &scope)?);
        }
        scope.complete();
        trace!(txn = txn.id(), table = table.name(), rows = stored.len(), "insert");
        Ok(stored)
    }

    // ---- update ----

    /// Applies `updater` to every entity of `table` matched by `plan` and
    /// returns the new versions.
    pub fn update<P>(&self, table: &Arc<Table>, plan: &P, updater: &Updater) -> Result<Vec<Arc<Row>>>
    where
        P: ExecutionPlan<Output = Vec<Arc<Row>>> + ?Sized,
    {
        let txn = self.txn();
        txn.check_active()?;

        let mut locks = self.locks();
        locks.write(table)?;
        for other in plan.tables() {
            if other.id() != table.id() {
                locks.read(&other)?;
            }
        }
        let matched = self.materialize(table, plan)?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        // Constraints may normalize columns the updater never declared, so
        // the affected indexes come from what actually changed.
        let mut changed = updater.columns().to_vec();
        let mut staged = Vec::with_capacity(matched.len());
        for old in &matched {
            let mut row = Row::clone(old);
            updater.apply(&mut row)?;
            table.assign_identity(&mut row)?;
            table.apply_constraints(&mut row)?;
            for (pos, (before, after)) in old.values().iter().zip(row.values()).enumerate() {
                if before != after && !changed.contains(&pos) {
                    changed.push(pos);
                }
            }
            row.increment_version();
            staged.push(row);
        }
        let affected = table.indexes_covering(&changed);
        let relations: Vec<UpdateRelation> = self
            .db()
            .relations(table, &affected, RelationDirection::Both)
            .into_iter()
            .map(|relation| UpdateRelation::new(relation, table, &affected))
            .collect();
        for relation in &relations {
            if relation.check_referred {
                locks.related(&relation.inner.primary().table)?;
            }
            if relation.check_referring {
                locks.related(&relation.inner.foreign().table)?;
            }
        }

        let _section = txn.enter_atomic_section()?;
        let scope = AtomicLogScope::begin(txn);
        let mut updated = Vec::with_capacity(matched.len());
        for (old, row) in matched.iter().zip(staged) {
            table.unindex(&affected, old, &scope);
            table.reindex(&affected, &row, &scope)?;
            let row = Arc::new(row);
            table.replace_row(Arc::clone(&row), &scope)?;
            updated.push(row);
        }

        for relation in &relations {
            if relation.check_referred {
                relation.inner.validate_referred(&updated)?;
            }
            if relation.check_referring {
                relation.inner.validate_referring(&matched)?;
            }
        }
        scope.complete();
        trace!(txn = txn.id(), table = table.name(), rows = updated.len(), "update");
        Ok(updated)
    }

    /// Replaces the entity whose primary key is `old`'s with `new`. The
    /// primary key itself may change.
    pub fn update_entity(&self, table: &Arc<Table>, old: &Row, new: Row) -> Result<Arc<Row>> {
        let key = table.index_key(0, old)?;
        let updater = Updater::replace(table.schema(), new.values().to_vec())?;
        let plan = LookupPlan::primary(Arc::clone(table), key.clone());
        self.update(table, &plan, &updater)?
            .pop()
            .ok_or_else(|| Error::not_found(table.name(), key))
    }

    // ---- delete ----

    /// Deletes every entity of `table` matched by `plan`, cascading along
    /// relations that allow it. Returns the deleted entities of `table`.
    pub fn delete<P>(&self, table: &Arc<Table>, plan: &P) -> Result<Vec<Arc<Row>>>
    where
        P: ExecutionPlan<Output = Vec<Arc<Row>>> + ?Sized,
    {
        let txn = self.txn();
        txn.check_active()?;

        let closure = self.cascade_closure(table);
        let in_closure = |id: TableId| closure.iter().any(|c| c.id() == id);
        let referring: Vec<Arc<Relation>> = closure
            .iter()
            .flat_map(|t| self.db().relations_for_table(t, RelationDirection::Referring))
            .collect();

        let mut locks = self.locks();
        locks.write(table)?;
        for other in plan.tables() {
            if !in_closure(other.id()) {
                locks.read(&other)?;
            }
        }
        let matched = self.materialize(table, plan)?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }
        for cascaded in closure.iter().skip(1) {
            locks.write(cascaded)?;
        }
        for relation in &referring {
            let foreign = &relation.foreign().table;
            if !in_closure(foreign.id()) {
                locks.related(foreign)?;
            }
        }

        let _section = txn.enter_atomic_section()?;
        let scope = AtomicLogScope::begin(txn);
        let deleted = self.delete_rows(table, &matched, &scope)?;
        scope.complete();
        trace!(txn = txn.id(), table = table.name(), rows = deleted.len(), "delete");
        Ok(deleted)
    }

    /// Deletes the entity with `row`'s primary key.
    pub fn delete_entity(&self, table: &Arc<Table>, row: &Row) -> Result<Arc<Row>> {
        let key = table.index_key(0, row)?;
        self.delete_by_key(table, key)
    }

    /// Deletes the entity with primary key `key`.
    pub fn delete_by_key(&self, table: &Arc<Table>, key: impl Into<Key>) -> Result<Arc<Row>> {
        let key = key.into();
        let plan = LookupPlan::primary(Arc::clone(table), key.clone());
        self.delete(table, &plan)?
            .pop()
            .ok_or_else(|| Error::not_found(table.name(), key))
    }

    /// `table` followed by every table reachable from it through relations
    /// with cascaded deletion, each listed once.
    fn cascade_closure(&self, table: &Arc<Table>) -> Vec<Arc<Table>> {
        let mut closure = vec![Arc::clone(table)];
        let mut next = 0;
        while next < closure.len() {
            let current = Arc::clone(&closure[next]);
            next += 1;
            for relation in self
                .db()
                .relations_for_table(&current, RelationDirection::Referring)
            {
                let foreign = &relation.foreign().table;
                if relation.is_cascading() && !closure.iter().any(|t| t.id() == foreign.id()) {
                    closure.push(Arc::clone(foreign));
                }
            }
        }
        closure
    }

    fn delete_rows(
        &self,
        table: &Arc<Table>,
        rows: &[Arc<Row>],
        scope: &AtomicLogScope<'_>,
    ) -> Result<Vec<Arc<Row>>> {
        let removed: Vec<Arc<Row>> = rows
            .iter()
            .filter_map(|row| table.delete_row(row.id(), scope))
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        let relations = self
            .db()
            .relations_for_table(table, RelationDirection::Referring);
        for relation in relations.iter().filter(|r| r.is_cascading()) {
            let primary = relation.primary();
            let mut seen = HashSet::new();
            let mut children = Vec::new();
            for row in &removed {
                let key = primary.key_of(row)?;
                if primary.table.contains_key(primary.index, &key) {
                    continue;
                }
                for child in relation.referring_rows(&key)? {
                    if seen.insert(child.id()) {
                        children.push(child);
                    }
                }
            }
            if !children.is_empty() {
                debug!(
                    txn = self.txn().id(),
                    relation = relation.name(),
                    table = relation.foreign().table.name(),
                    rows = children.len(),
                    "cascading delete"
                );
                self.delete_rows(&relation.foreign().table, &children, scope)?;
            }
        }
        for relation in relations.iter().filter(|r| !r.is_cascading()) {
            relation.validate_referring(&removed)?;
        }
        Ok(removed)
    }

    // ---- query ----

    /// Runs `plan` under read locks on every table it touches.
    pub fn query<P>(&self, plan: &P) -> Result<P::Output>
    where
        P: ExecutionPlan + ?Sized,
        P::Output: Detach,
    {
        self.query_with(plan, QueryOptions::default())
    }

    /// Runs `plan` with explicit query options.
    pub fn query_with<P>(&self, plan: &P, options: QueryOptions) -> Result<P::Output>
    where
        P: ExecutionPlan + ?Sized,
        P::Output: Detach,
    {
        self.txn().check_active()?;
        let mut locks = self.locks();
        for table in plan.tables() {
            locks.read(&table)?;
        }
        let output = plan.execute(self.ctx)?;
        let clone = options
            .clone_entities
            .unwrap_or(self.db().config().clone_entities);
        Ok(if clone { output.detach() } else { output })
    }

    /// Finds the entity with primary key `key`.
    pub fn find(&self, table: &Arc<Table>, key: impl Into<Key>) -> Result<Option<Arc<Row>>> {
        let rows = self.query(&LookupPlan::primary(Arc::clone(table), key))?;
        Ok(rows.into_iter().next())
    }

    /// Number of entities in `table`.
    pub fn count(&self, table: &Arc<Table>) -> Result<usize> {
        let counted = Arc::clone(table);
        self.query(&FnPlan::new(vec![Arc::clone(table)], move |_| {
            Ok(counted.len())
        }))
    }

    /// Runs `plan` and re-reads each matched entity from `table`.
    fn materialize<P>(&self, table: &Table, plan: &P) -> Result<Vec<Arc<Row>>>
    where
        P: ExecutionPlan<Output = Vec<Arc<Row>>> + ?Sized,
    {
        let mut seen = HashSet::new();
        plan.execute(self.ctx)?
            .into_iter()
            .filter(|row| seen.insert(row.id()))
            .map(|row| {
                table.get(row.id()).ok_or_else(|| {
                    Error::invalid_operation(format!(
                        "Row {} does not belong to {}",
                        row.id(),
                        table.name()
                    ))
                })
            })
            .collect()
    }
}

/// A relation touched by an update and the checks it needs.
struct UpdateRelation {
    inner: Arc<Relation>,
    /// The updated table is the foreign side and its foreign index changes.
    check_referred: bool,
    /// The updated table is the primary side and its primary index changes.
    check_referring: bool,
}

impl UpdateRelation {
    fn new(inner: Arc<Relation>, table: &Table, affected: &[usize]) -> Self {
        let touches = |side: &IndexRef| {
            side.table.id() == table.id() && affected.contains(&side.index)
        };
        Self {
            check_referred: touches(inner.foreign()),
            check_referring: touches(inner.primary()),
            inner,
        }
    }
}

/// Table locks taken by one command, handed back when it ends.
struct OperationLocks<'a> {
    manager: &'a Arc<ConcurrencyManager>,
    txn: &'a Transaction,
    writes: Vec<Arc<Table>>,
    reads: Vec<Arc<Table>>,
}

impl<'a> OperationLocks<'a> {
    fn new(manager: &'a Arc<ConcurrencyManager>, txn: &'a Transaction) -> Self {
        Self {
            manager,
            txn,
            writes: Vec::new(),
            reads: Vec::new(),
        }
    }

    fn write(&mut self, table: &Arc<Table>) -> Result<()> {
        self.manager.acquire_table_write_lock(self.txn, table)?;
        self.writes.push(Arc::clone(table));
        Ok(())
    }

    fn read(&mut self, table: &Arc<Table>) -> Result<()> {
        self.manager.acquire_table_read_lock(self.txn, table)?;
        self.reads.push(Arc::clone(table));
        Ok(())
    }

    /// Related locks stay until the transaction ends.
    fn related(&mut self, table: &Arc<Table>) -> Result<()> {
        self.manager.acquire_related_table_lock(self.txn, table)
    }
}

impl Drop for OperationLocks<'_> {
    fn drop(&mut self) {
        for table in self.writes.drain(..).rev() {
            self.manager.release_table_write_lock(self.txn, &table);
        }
        for table in self.reads.drain(..).rev() {
            self.manager.release_table_read_lock(self.txn, &table);
        }
    }
}
