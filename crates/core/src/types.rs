//! Column types.

use core::fmt;

/// Type of a column. Every non-null [`Value`](crate::Value) has exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    String,
    /// Milliseconds since the Unix epoch.
    DateTime,
    Bytes,
}

impl DataType {
    /// Bytes columns hold opaque payloads and cannot be keyed.
    pub fn is_indexable(self) -> bool {
        self != DataType::Bytes
    }

    /// Integer types may back an identity column.
    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_identity_types() {
        assert!(DataType::Int32.is_integer());
        assert!(DataType::Int64.is_integer());
        assert!(!DataType::DateTime.is_integer());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Float64.to_string(), "Float64");
    }
}
