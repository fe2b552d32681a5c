//! Error types for the Marrow data store.

use crate::key::Key;
use crate::types::DataType;
use alloc::string::String;
use core::fmt;

/// Result type alias for Marrow operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types raised by Marrow operations.
///
/// Every variant carries enough context (table, index, relation, key) for the
/// caller to tell which rule was broken. None of them is swallowed inside the
/// engine: they unwind through the atomic log scope, which undoes any partial
/// mutation, and through the executor's lock guards.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Type mismatch error.
    TypeMismatch {
        column: String,
        expected: DataType,
        got: DataType,
    },
    /// Null constraint violation.
    NullConstraint {
        table: String,
        column: String,
    },
    /// A field-level business rule rejected the entity.
    ConstraintViolation {
        table: String,
        column: String,
        message: String,
    },
    /// Unique index rejected a duplicate key.
    UniqueConstraint {
        table: String,
        index: String,
        key: Key,
    },
    /// Foreign key constraint violation.
    ForeignKeyViolation {
        relation: String,
        primary_table: String,
        foreign_table: String,
        key: Key,
    },
    /// Row or record not found.
    NotFound {
        table: String,
        key: Key,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// Column not found.
    ColumnNotFound {
        table: String,
        column: String,
    },
    /// Table not found.
    TableNotFound {
        name: String,
    },
    /// Index not found.
    IndexNotFound {
        table: String,
        index: String,
    },
    /// Waiting for the lock would close a cycle in the wait-for graph.
    Deadlock {
        transaction: u64,
        table: String,
    },
    /// The transaction was rolled back while an operation was in flight.
    TransactionAborted {
        transaction: u64,
    },
    /// The transaction already committed or rolled back.
    TransactionNotActive {
        transaction: u64,
    },
    /// A named query parameter was not supplied.
    ParameterMissing {
        name: String,
    },
    /// A named query parameter has an unusable value.
    InvalidParameter {
        name: String,
        message: String,
    },
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeMismatch {
                column,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Type mismatch on column {}: expected {:?}, got {:?}",
                    column, expected, got
                )
            }
            Error::NullConstraint { table, column } => {
                write!(f, "Null constraint violation on column {}.{}", table, column)
            }
            Error::ConstraintViolation {
                table,
                column,
                message,
            } => {
                write!(
                    f,
                    "Constraint violation on column {}.{}: {}",
                    table, column, message
                )
            }
            Error::UniqueConstraint { table, index, key } => {
                write!(
                    f,
                    "Unique constraint violation on index {}.{}: existing key {}",
                    table, index, key
                )
            }
            Error::ForeignKeyViolation {
                relation,
                primary_table,
                foreign_table,
                key,
            } => {
                write!(
                    f,
                    "Foreign key violation ({}): key {} of {} has no match in {}",
                    relation, key, foreign_table, primary_table
                )
            }
            Error::NotFound { table, key } => {
                write!(f, "Not found in table {}: {}", table, key)
            }
            Error::InvalidSchema { message } => {
                write!(f, "Invalid schema: {}", message)
            }
            Error::ColumnNotFound { table, column } => {
                write!(f, "Column {} not found in table {}", column, table)
            }
            Error::TableNotFound { name } => {
                write!(f, "Table not found: {}", name)
            }
            Error::IndexNotFound { table, index } => {
                write!(f, "Index {} not found in table {}", index, table)
            }
            Error::Deadlock { transaction, table } => {
                write!(
                    f,
                    "Deadlock detected: transaction {} waiting for table {}",
                    transaction, table
                )
            }
            Error::TransactionAborted { transaction } => {
                write!(f, "Transaction {} was aborted", transaction)
            }
            Error::TransactionNotActive { transaction } => {
                write!(f, "Transaction {} is not active", transaction)
            }
            Error::ParameterMissing { name } => {
                write!(f, "Missing parameter: {}", name)
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter {}: {}", name, message)
            }
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl Error {
    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            expected,
            got,
        }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::NullConstraint {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a field constraint error.
    pub fn constraint_violation(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ConstraintViolation {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Creates a unique constraint error.
    pub fn unique_constraint(table: impl Into<String>, index: impl Into<String>, key: Key) -> Self {
        Error::UniqueConstraint {
            table: table.into(),
            index: index.into(),
            key,
        }
    }

    /// Creates a foreign key violation error.
    pub fn foreign_key_violation(
        relation: impl Into<String>,
        primary_table: impl Into<String>,
        foreign_table: impl Into<String>,
        key: Key,
    ) -> Self {
        Error::ForeignKeyViolation {
            relation: relation.into(),
            primary_table: primary_table.into(),
            foreign_table: foreign_table.into(),
            key,
        }
    }

    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, key: Key) -> Self {
        Error::NotFound {
            table: table.into(),
            key,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(table: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            table: table.into(),
            index: index.into(),
        }
    }

    /// Creates a deadlock error.
    pub fn deadlock(transaction: u64, table: impl Into<String>) -> Self {
        Error::Deadlock {
            transaction,
            table: table.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(transaction: u64) -> Self {
        Error::TransactionAborted { transaction }
    }

    /// Creates a transaction not active error.
    pub fn transaction_not_active(transaction: u64) -> Self {
        Error::TransactionNotActive { transaction }
    }

    /// Creates a missing parameter error.
    pub fn parameter_missing(name: impl Into<String>) -> Self {
        Error::ParameterMissing { name: name.into() }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors that a caller may resolve by retrying the
    /// whole operation in a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Deadlock { .. } | Error::TransactionAborted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch("age", DataType::Int32, DataType::String);
        assert!(err.to_string().contains("Type mismatch"));

        let err = Error::null_constraint("users", "name");
        assert!(err.to_string().contains("users.name"));

        let err = Error::table_not_found("users");
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn test_foreign_key_violation_context() {
        let err = Error::foreign_key_violation(
            "fk_member_group",
            "groups",
            "members",
            Key::single(Value::Int64(3)),
        );
        let text = err.to_string();
        assert!(text.contains("fk_member_group"));
        assert!(text.contains("groups"));
        assert!(text.contains("members"));
        assert!(text.contains('3'));
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::unique_constraint("users", "uq_email", Key::single("a@b.c".into()));
        match err {
            Error::UniqueConstraint { index, .. } => assert_eq!(index, "uq_email"),
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_retryable() {
        assert!(Error::deadlock(1, "groups").is_retryable());
        assert!(Error::transaction_aborted(1).is_retryable());
        assert!(!Error::invalid_operation("nope").is_retryable());
    }
}
