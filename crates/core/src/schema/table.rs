//! Table schema definition for Marrow.

use super::column::Column;
use super::index::{IndexDef, IndexType, IndexedColumn};
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// The schema of a table: its columns and its indexes.
///
/// The primary index is always present and always sits at position 0 of
/// [`TableSchema::indices`]; secondary indexes follow in declaration order.
#[derive(Clone, Debug)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    indices: Vec<IndexDef>,
    identity: Option<usize>,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the indices, primary first.
    #[inline]
    pub fn indices(&self) -> &[IndexDef] {
        &self.indices
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column index by name.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Gets a column index by name, or a `ColumnNotFound` error.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.get_column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Gets an index by name.
    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indices.iter().find(|i| i.name() == name)
    }

    /// Gets the position of an index by name.
    pub fn get_index_position(&self, name: &str) -> Option<usize> {
        self.indices.iter().position(|i| i.name() == name)
    }

    /// Returns the primary key index.
    #[inline]
    pub fn primary_key(&self) -> &IndexDef {
        &self.indices[0]
    }

    /// Returns the position of the identity column, if the table has one.
    #[inline]
    pub fn identity_column(&self) -> Option<usize> {
        self.identity
    }

    /// Defines an additional index over this table's columns.
    ///
    /// The definition is validated and resolved against the columns but not
    /// registered in the schema; tables that create indexes after
    /// construction keep track of them themselves.
    pub fn define_index(
        &self,
        name: impl Into<String>,
        columns: Vec<IndexedColumn>,
        unique: bool,
        index_type: IndexType,
    ) -> Result<IndexDef> {
        let name = name.into();
        TableBuilder::check_naming_rules(&name)?;
        if columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Index has no columns: {}",
                name
            )));
        }
        let mut positions = Vec::with_capacity(columns.len());
        for col in &columns {
            let position = self.column_index(&col.name)?;
            if !self.columns[position].is_indexable() {
                return Err(Error::invalid_schema(format!(
                    "Column is not indexable: {}",
                    col.name
                )));
            }
            if positions.contains(&position) {
                return Err(Error::invalid_schema(format!(
                    "Column listed twice in index {}: {}",
                    name, col.name
                )));
            }
            positions.push(position);
        }
        Ok(IndexDef::new(name, columns)
            .unique(unique)
            .index_type(index_type)
            .with_column_indices(positions))
    }
}

/// Builder for creating table schemas.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    indices: Vec<IndexDef>,
    pk: Option<IndexDef>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            indices: Vec::new(),
            pk: None,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column to the table.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Marks columns as nullable.
    pub fn add_nullable(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                col.set_nullable();
            }
        }
        self
    }

    /// Sets the default value of a column, used when an entity is created
    /// from a partial set of fields.
    pub fn add_default(mut self, column: &str, value: crate::value::Value) -> Result<Self> {
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column)
            .ok_or_else(|| Error::column_not_found(&self.name, column))?;
        col.set_default(value);
        Ok(self)
    }

    /// Sets the primary key. With `auto_increment` on a single integer
    /// column, that column becomes the table's identity column.
    pub fn add_primary_key(mut self, columns: &[&str], auto_increment: bool) -> Result<Self> {
        let pk_name = format!("pk{}", capitalize(&self.name));
        Self::check_naming_rules(&pk_name)?;

        let indexed_cols: Vec<IndexedColumn> = columns
            .iter()
            .map(|name| {
                IndexedColumn::new(*name).auto_increment(auto_increment && columns.len() == 1)
            })
            .collect();

        for col in &indexed_cols {
            let column = self.columns.iter().find(|c| c.name() == col.name);
            match column {
                None => {
                    return Err(Error::invalid_schema(format!(
                        "Column not found: {}",
                        col.name
                    )))
                }
                Some(c) if !c.is_indexable() => {
                    return Err(Error::invalid_schema(format!(
                        "Column is not indexable: {}",
                        col.name
                    )))
                }
                Some(c) if col.auto_increment && !c.data_type().is_integer() => {
                    return Err(Error::invalid_schema(
                        "Auto-increment requires integer type",
                    ))
                }
                _ => {}
            }
        }

        self.pk = Some(IndexDef::new(pk_name, indexed_cols).unique(true));
        Ok(self)
    }

    /// Adds a unique ordered index.
    pub fn add_unique(self, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        self.add_index(name, columns, true)
    }

    /// Adds an ordered (B+Tree) index with ascending columns.
    pub fn add_index(
        self,
        name: impl Into<String>,
        columns: &[&str],
        unique: bool,
    ) -> Result<Self> {
        let cols = columns.iter().map(|n| IndexedColumn::new(*n)).collect();
        self.add_index_with(name, cols, unique, IndexType::BTree)
    }

    /// Adds a hash index. Hash indexes answer exact lookups only.
    pub fn add_hash_index(
        self,
        name: impl Into<String>,
        columns: &[&str],
        unique: bool,
    ) -> Result<Self> {
        let cols = columns.iter().map(|n| IndexedColumn::new(*n)).collect();
        self.add_index_with(name, cols, unique, IndexType::Hash)
    }

    /// Adds an index with explicit per-column sort orders and type.
    pub fn add_index_with(
        mut self,
        name: impl Into<String>,
        columns: Vec<IndexedColumn>,
        unique: bool,
        index_type: IndexType,
    ) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Index has no columns: {}",
                name
            )));
        }
        if self.indices.iter().any(|i| i.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Index already exists: {}",
                name
            )));
        }

        for col in &columns {
            match self.columns.iter().find(|c| c.name() == col.name) {
                None => {
                    return Err(Error::invalid_schema(format!(
                        "Column not found: {}",
                        col.name
                    )))
                }
                Some(c) if !c.is_indexable() => {
                    return Err(Error::invalid_schema(format!(
                        "Column is not indexable: {}",
                        col.name
                    )))
                }
                _ => {}
            }
        }

        let idx = IndexDef::new(name, columns)
            .unique(unique)
            .index_type(index_type);
        self.indices.push(idx);
        Ok(self)
    }

    /// Builds the table schema. A primary key is required.
    pub fn build(self) -> Result<TableSchema> {
        let pk = self.pk.ok_or_else(|| {
            Error::invalid_schema(format!("Table {} has no primary key", self.name))
        })?;

        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.at(i))
            .collect();

        let resolve = |idx: IndexDef| -> Result<IndexDef> {
            let positions = idx
                .columns()
                .iter()
                .map(|c| {
                    columns
                        .iter()
                        .position(|col| col.name() == c.name)
                        .ok_or_else(|| Error::column_not_found(&self.name, &c.name))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(idx.with_column_indices(positions))
        };

        let pk = resolve(pk)?;
        let identity = if pk.has_auto_increment() {
            pk.column_indices().first().copied()
        } else {
            None
        };

        let mut indices = Vec::with_capacity(self.indices.len() + 1);
        indices.push(pk);
        for idx in self.indices {
            indices.push(resolve(idx)?);
        }

        Ok(TableSchema {
            name: self.name,
            columns,
            indices,
            identity,
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().chain(chars).collect(),
    }
}
