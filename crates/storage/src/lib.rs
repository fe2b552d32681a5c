//! Marrow Storage - Tables, locking and transactions for the Marrow data store.
//!
//! This crate provides the storage and transaction engine:
//!
//! - `SpinLock` / `TableLock`: spinning mutex and fair reader/writer lock
//!   with upgrade and downgrade
//! - `WaitForGraph`: deadlock detection between waiting transactions
//! - `ConcurrencyManager`: per-transaction table lock inventory and the
//!   isolation level's release policy
//! - `Transaction`: unit of work with an undo log and an atomic section
//! - `AtomicLogScope`: all-or-nothing checkpoint of a transaction log
//! - `Table`: rows plus ordered and hashed indexes
//! - `Relation`: foreign keys between indexes, with cascaded deletion
//! - `Constraint`: rules applied to entities before they are stored
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use marrow_core::schema::TableBuilder;
//! use marrow_core::{DataType, Row, Value};
//! use marrow_storage::{AtomicLogScope, IsolationLevel, Table, Transaction};
//!
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"], true)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let users = Arc::new(Table::new(0, schema, 64));
//!
//! let txn = Transaction::begin(IsolationLevel::ReadCommitted);
//! {
//!     let scope = AtomicLogScope::begin(&txn);
//!     users
//!         .insert(Row::create(vec![Value::Null, "Alice".into()]), &scope)
//!         .unwrap();
//!     scope.complete();
//! }
//! assert_eq!(users.len(), 1);
//!
//! txn.rollback().unwrap();
//! assert!(users.is_empty());
//! ```

pub mod concurrency;
pub mod constraint;
pub mod journal;
pub mod lock;
pub mod relation;
pub mod table;
pub mod transaction;
pub mod wait_for;

pub use concurrency::{ConcurrencyManager, LockInfo};
pub use constraint::{check_row, Constraint, FnConstraint, MaxLength, NotNull};
pub use journal::{AtomicLogScope, LogEntry, TransactionLog};
pub use lock::{Backoff, BackoffConfig, LockMode, SpinLock, SpinLockGuard, TableLock};
pub use relation::{
    identity_converter, IndexRef, KeyConverter, Relation, RelationDirection, RelationId,
    RelationOptions, RelationRegistry,
};
pub use table::{IndexId, Table, TableId, TableIndex};
pub use transaction::{
    AtomicSection, IsolationLevel, Participant, Transaction, TransactionHandler, TransactionId,
    TransactionState, Vote,
};
pub use wait_for::WaitForGraph;
