//! Index keys for Marrow.
//!
//! A `Key` is the value an index is ordered or hashed by. Single-column keys
//! and composite keys share one representation: a tuple of [`Value`]s. Tuples
//! compare component by component, and because `Value::Null` sorts before every
//! non-null value, a null component is strictly less than any non-null value
//! of the same column in both hash and ordered indexes.

use crate::row::Row;
use crate::value::Value;
use alloc::vec::Vec;
use core::fmt;

/// A comparable, hashable index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<Value>);

impl Key {
    /// Creates a key from its components.
    pub fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    /// Creates a single-component key.
    pub fn single(value: Value) -> Self {
        Self(alloc::vec![value])
    }

    /// Extracts a key from a row using the given column positions.
    /// Missing columns are read as `Null`.
    pub fn from_row(row: &Row, columns: &[usize]) -> Self {
        Self(
            columns
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Returns the key components.
    #[inline]
    pub fn components(&self) -> &[Value] {
        &self.0
    }

    /// Returns the component at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Returns the number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the key does not reference anything: it has no
    /// components or at least one of them is `Null`.
    ///
    /// Foreign keys with an empty value are not checked against the primary
    /// index.
    pub fn is_null(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(Value::is_null)
    }

    /// Consumes the key and returns its components.
    pub fn into_components(self) -> Vec<Value> {
        self.0
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::single(value)
    }
}

impl From<Vec<Value>> for Key {
    fn from(components: Vec<Value>) -> Self {
        Key::new(components)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::single(Value::Int64(v))
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::single(Value::Int32(v))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::single(Value::from(v))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_key_from_row() {
        let row = Row::new(1, vec![Value::Int64(7), Value::String("a".into()), Value::Null]);
        assert_eq!(Key::from_row(&row, &[0]), Key::single(Value::Int64(7)));
        assert_eq!(
            Key::from_row(&row, &[1, 0]),
            Key::new(vec![Value::String("a".into()), Value::Int64(7)])
        );
        assert_eq!(Key::from_row(&row, &[5]), Key::single(Value::Null));
    }

    #[test]
    fn test_null_component_sorts_first() {
        let with_null = Key::new(vec![Value::Int64(1), Value::Null]);
        let with_value = Key::new(vec![Value::Int64(1), Value::Int64(i64::MIN)]);
        assert!(with_null < with_value);
        assert_ne!(with_null, with_value);
    }

    #[test]
    fn test_is_null() {
        assert!(Key::single(Value::Null).is_null());
        assert!(Key::new(vec![Value::Int64(1), Value::Null]).is_null());
        assert!(!Key::from(1i64).is_null());
        assert!(Key::new(Vec::new()).is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Key::from(3i64).to_string(), "3");
        assert_eq!(
            Key::new(vec![Value::Int64(1), Value::Null]).to_string(),
            "(1, null)"
        );
    }
}
