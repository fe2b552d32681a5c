//! Execution plans.
//!
//! The executor treats a plan as a black box: it asks which tables the plan
//! touches, locks them, then runs it. The plans here cover the common cases
//! (full scans, point lookups, index ranges, arbitrary closures) and are
//! what a query front end would produce.

use crate::context::ExecutionContext;
use marrow_core::schema::TableSchema;
use marrow_core::{Error, Key, Result, Row, Value};
use marrow_index::KeyRange;
use marrow_storage::Table;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Something the executor can run under table locks.
pub trait ExecutionPlan {
    type Output;

    /// Tables the plan reads.
    fn tables(&self) -> Vec<Arc<Table>>;

    /// Runs the plan.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Self::Output>;
}

/// Query results that can be detached from the stored entities.
///
/// Detaching copies every entity so that the caller's values never alias
/// the ones held by the tables. Results without entities are returned as
/// they are.
pub trait Detach {
    fn detach(self) -> Self;
}

impl Detach for Arc<Row> {
    fn detach(self) -> Self {
        Arc::new(Row::clone(&self))
    }
}

impl<T: Detach> Detach for Vec<T> {
    fn detach(self) -> Self {
        self.into_iter().map(Detach::detach).collect()
    }
}

impl<T: Detach> Detach for Option<T> {
    fn detach(self) -> Self {
        self.map(Detach::detach)
    }
}

macro_rules! detach_as_is {
    ($($ty:ty),* $(,)?) => {
        $(impl Detach for $ty {
            #[inline]
            fn detach(self) -> Self {
                self
            }
        })*
    };
}

detach_as_is!((), bool, usize, u64, i64, Row, Value, Key, String);

/// Per-query options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Overrides the database's `clone_entities` setting.
    pub clone_entities: Option<bool>,
}

impl QueryOptions {
    /// Always copy returned entities.
    pub fn cloned() -> Self {
        Self {
            clone_entities: Some(true),
        }
    }

    /// Return the stored entities themselves.
    pub fn shared() -> Self {
        Self {
            clone_entities: Some(false),
        }
    }
}

/// A plan backed by a closure.
pub struct FnPlan<F, T> {
    tables: Vec<Arc<Table>>,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnPlan<F, T>
where
    F: Fn(&ExecutionContext<'_>) -> Result<T>,
{
    /// Creates a plan reading `tables` by running `f`.
    pub fn new(tables: Vec<Arc<Table>>, f: F) -> Self {
        Self {
            tables,
            f,
            _output: PhantomData,
        }
    }
}

impl<F, T> ExecutionPlan for FnPlan<F, T>
where
    F: Fn(&ExecutionContext<'_>) -> Result<T>,
{
    type Output = T;

    fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.clone()
    }

    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<T> {
        (self.f)(ctx)
    }
}

/// Row filter of a [`ScanPlan`].
pub type RowFilter = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Every row of a table in primary key order, optionally filtered.
#[derive(Clone)]
pub struct ScanPlan {
    table: Arc<Table>,
    filter: Option<RowFilter>,
}

impl ScanPlan {
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            filter: None,
        }
    }

    /// Scans `table` keeping the rows `filter` accepts.
    pub fn filtered<F>(table: Arc<Table>, filter: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        Self {
            table,
            filter: Some(Arc::new(filter)),
        }
    }
}

impl ExecutionPlan for ScanPlan {
    type Output = Vec<Arc<Row>>;

    fn tables(&self) -> Vec<Arc<Table>> {
        vec![Arc::clone(&self.table)]
    }

    fn execute(&self, _ctx: &ExecutionContext<'_>) -> Result<Vec<Arc<Row>>> {
        let rows = self.table.rows();
        Ok(match &self.filter {
            Some(filter) => rows.into_iter().filter(|r| filter(r)).collect(),
            None => rows,
        })
    }
}

impl fmt::Debug for ScanPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanPlan")
            .field("table", &self.table.name())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Where a [`LookupPlan`] takes its key from.
#[derive(Clone, Debug, PartialEq)]
pub enum KeySource {
    Literal(Key),
    /// A single-column key read from a named parameter.
    Parameter(String),
}

/// Rows with one key in one index.
#[derive(Clone, Debug)]
pub struct LookupPlan {
    table: Arc<Table>,
    index: usize,
    key: KeySource,
}

impl LookupPlan {
    pub fn new(table: Arc<Table>, index: usize, key: impl Into<Key>) -> Self {
        Self {
            table,
            index,
            key: KeySource::Literal(key.into()),
        }
    }

    /// Looks `key` up in the primary index.
    pub fn primary(table: Arc<Table>, key: impl Into<Key>) -> Self {
        Self::new(table, 0, key)
    }

    /// Looks `key` up in the index called `index`.
    pub fn by_name(table: Arc<Table>, index: &str, key: impl Into<Key>) -> Result<Self> {
        let index = table.index_position(index)?;
        Ok(Self::new(table, index, key))
    }

    /// Looks up the value of parameter `name` when the plan runs.
    pub fn parameterized(table: Arc<Table>, index: usize, name: impl Into<String>) -> Self {
        Self {
            table,
            index,
            key: KeySource::Parameter(name.into()),
        }
    }
}

impl ExecutionPlan for LookupPlan {
    type Output = Vec<Arc<Row>>;

    fn tables(&self) -> Vec<Arc<Table>> {
        vec![Arc::clone(&self.table)]
    }

    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Vec<Arc<Row>>> {
        match &self.key {
            KeySource::Literal(key) => self.table.select(self.index, key),
            KeySource::Parameter(name) => {
                let key = Key::single(ctx.parameter(name)?.clone());
                self.table.select(self.index, &key)
            }
        }
    }
}

/// Rows of an ordered index within a key range.
#[derive(Clone, Debug)]
pub struct RangePlan {
    table: Arc<Table>,
    index: usize,
    range: KeyRange<Key>,
    reverse: bool,
    skip: usize,
    limit: Option<usize>,
}

impl RangePlan {
    pub fn new(table: Arc<Table>, index: usize, range: KeyRange<Key>) -> Self {
        Self {
            table,
            index,
            range,
            reverse: false,
            skip: 0,
            limit: None,
        }
    }

    /// Keys between `from` and `to`.
    pub fn between(
        table: Arc<Table>,
        index: usize,
        from: impl Into<Key>,
        to: impl Into<Key>,
        from_open: bool,
        to_open: bool,
    ) -> Self {
        Self::new(
            table,
            index,
            KeyRange::bound(from.into(), to.into(), from_open, to_open),
        )
    }

    /// Keys after `from`.
    pub fn greater(table: Arc<Table>, index: usize, from: impl Into<Key>, open: bool) -> Self {
        Self::new(table, index, KeyRange::lower_bound(from.into(), open))
    }

    /// Keys before `to`.
    pub fn less(table: Arc<Table>, index: usize, to: impl Into<Key>, open: bool) -> Self {
        Self::new(table, index, KeyRange::upper_bound(to.into(), open))
    }

    /// Returns rows in descending key order.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl ExecutionPlan for RangePlan {
    type Output = Vec<Arc<Row>>;

    fn tables(&self) -> Vec<Arc<Table>> {
        vec![Arc::clone(&self.table)]
    }

    fn execute(&self, _ctx: &ExecutionContext<'_>) -> Result<Vec<Arc<Row>>> {
        let rows = self
            .table
            .select_range(self.index, &self.range, self.reverse)?;
        let rows = rows.into_iter().skip(self.skip);
        Ok(match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }
}

type UpdateFn = Box<dyn Fn(&mut Row) -> Result<()> + Send + Sync>;

/// Update function together with the columns it may write.
///
/// Only indexes over the declared columns are maintained by an update, so
/// changing any other column is rejected.
pub struct Updater {
    table: String,
    names: Vec<String>,
    columns: Vec<usize>,
    apply: UpdateFn,
}

impl Updater {
    /// Creates an updater writing `columns` of `schema` through `f`.
    pub fn new<F>(schema: &TableSchema, columns: &[&str], f: F) -> Result<Self>
    where
        F: Fn(&mut Row) -> Result<()> + Send + Sync + 'static,
    {
        let columns = columns
            .iter()
            .map(|name| schema.column_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_positions(schema, columns, Box::new(f)))
    }

    /// Sets `column` to `value`.
    pub fn set(schema: &TableSchema, column: &str, value: impl Into<Value>) -> Result<Self> {
        let position = schema.column_index(column)?;
        let value = value.into();
        Ok(Self::from_positions(
            schema,
            vec![position],
            Box::new(move |row: &mut Row| {
                row.set(position, value.clone());
                Ok(())
            }),
        ))
    }

    /// Replaces every value of the entity.
    pub fn replace(schema: &TableSchema, values: Vec<Value>) -> Result<Self> {
        let arity = schema.columns().len();
        if values.len() != arity {
            return Err(Error::invalid_operation(format!(
                "{} expects {} values, got {}",
                schema.name(),
                arity,
                values.len()
            )));
        }
        Ok(Self::from_positions(
            schema,
            (0..arity).collect(),
            Box::new(move |row: &mut Row| {
                row.values_mut().clone_from(&values);
                Ok(())
            }),
        ))
    }

    fn from_positions(schema: &TableSchema, mut columns: Vec<usize>, apply: UpdateFn) -> Self {
        columns.sort_unstable();
        columns.dedup();
        Self {
            table: schema.name().to_string(),
            names: schema.columns().iter().map(|c| c.name().to_string()).collect(),
            columns,
            apply,
        }
    }

    /// Positions of the declared columns, ascending.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Runs the update function on `row`.
    pub fn apply(&self, row: &mut Row) -> Result<()> {
        let before = row.values().to_vec();
        (self.apply)(row)?;
        if row.len() != before.len() {
            return Err(Error::invalid_operation(format!(
                "Update of {} changed the number of values",
                self.table
            )));
        }
        let changed = before
            .iter()
            .zip(row.values())
            .enumerate()
            .find(|(pos, (old, new))| old != new && self.columns.binary_search(pos).is_err());
        if let Some((pos, _)) = changed {
            let column = self.names.get(pos).map_or("?", String::as_str);
            return Err(Error::invalid_operation(format!(
                "Update of {} changed undeclared column {}",
                self.table, column
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}
