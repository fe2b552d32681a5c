//! Field constraints applied to entities before they are stored.
//!
//! Every insert and update runs [`check_row`] (arity, column types,
//! nullability and explicit defaults) followed by the table's own
//! [`Constraint`]s in registration order. A constraint may normalize the row
//! in place or reject it.

use marrow_core::schema::TableSchema;
use marrow_core::{Error, Result, Row, Value};
use std::fmt;

/// A rule applied to every entity stored in a table.
pub trait Constraint: Send + Sync {
    /// Constraint name, for diagnostics.
    fn name(&self) -> &str;

    /// Checks, and possibly normalizes, `row`.
    fn apply(&self, schema: &TableSchema, row: &mut Row) -> Result<()>;
}

/// Checks a row against the column definitions of `schema`.
///
/// A `Null` field whose column has an explicit default takes the default.
pub fn check_row(schema: &TableSchema, row: &mut Row) -> Result<()> {
    let columns = schema.columns();
    if row.len() != columns.len() {
        return Err(Error::invalid_operation(format!(
            "Row for {} has {} values, expected {}",
            schema.name(),
            row.len(),
            columns.len()
        )));
    }
    for (i, column) in columns.iter().enumerate() {
        let Some(value) = row.get_mut(i) else {
            continue;
        };
        if value.is_null() {
            if let Some(default) = column.default() {
                *value = default.clone();
            }
        }
        column.validate(schema.name(), value)?;
    }
    Ok(())
}

/// Rejects `Null` in a column, whatever its declared nullability.
#[derive(Clone, Debug)]
pub struct NotNull {
    column: String,
}

impl NotNull {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Constraint for NotNull {
    fn name(&self) -> &str {
        "not_null"
    }

    fn apply(&self, schema: &TableSchema, row: &mut Row) -> Result<()> {
        let idx = schema.column_index(&self.column)?;
        match row.get(idx) {
            Some(Value::Null) | None => Err(Error::null_constraint(schema.name(), &self.column)),
            Some(_) => Ok(()),
        }
    }
}

/// Limits the length of a string (in characters) or bytes (in bytes) column.
#[derive(Clone, Debug)]
pub struct MaxLength {
    column: String,
    max: usize,
}

impl MaxLength {
    pub fn new(column: impl Into<String>, max: usize) -> Self {
        Self {
            column: column.into(),
            max,
        }
    }
}

impl Constraint for MaxLength {
    fn name(&self) -> &str {
        "max_length"
    }

    fn apply(&self, schema: &TableSchema, row: &mut Row) -> Result<()> {
        let idx = schema.column_index(&self.column)?;
        let len = match row.get(idx) {
            Some(Value::String(s)) => s.chars().count(),
            Some(Value::Bytes(b)) => b.len(),
            _ => return Ok(()),
        };
        if len > self.max {
            return Err(Error::constraint_violation(
                schema.name(),
                &self.column,
                format!("length {} exceeds maximum {}", len, self.max),
            ));
        }
        Ok(())
    }
}

/// A constraint backed by a closure.
pub struct FnConstraint<F> {
    name: String,
    check: F,
}

impl<F> FnConstraint<F>
where
    F: Fn(&TableSchema, &mut Row) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> Constraint for FnConstraint<F>
where
    F: Fn(&TableSchema, &mut Row) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, schema: &TableSchema, row: &mut Row) -> Result<()> {
        (self.check)(schema, row)
    }
}

impl<F> fmt::Debug for FnConstraint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConstraint").field("name", &self.name).finish()
    }
}
