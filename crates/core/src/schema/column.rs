//! Column definitions.

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;
use alloc::string::String;

/// One column of a table schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    default: Option<Value>,
    position: usize,
}

impl Column {
    /// A non-nullable column without a default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            default: None,
            position: 0,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Value substituted for `Null` when a row is stored.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub(crate) fn set_nullable(&mut self) {
        self.nullable = true;
    }

    pub(crate) fn set_default(&mut self, value: Value) {
        self.default = Some(value);
    }

    pub(crate) fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Position of the column in the row.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn is_indexable(&self) -> bool {
        self.data_type.is_indexable()
    }

    /// Checks a field value against the column's type and nullability.
    pub fn validate(&self, table: &str, value: &Value) -> Result<()> {
        match value.data_type() {
            None if self.nullable => Ok(()),
            None => Err(Error::null_constraint(table, &self.name)),
            Some(dt) if dt == self.data_type => Ok(()),
            Some(dt) => Err(Error::type_mismatch(&self.name, self.data_type, dt)),
        }
    }
}
