//! Marrow Database - Embeddable transactional data store.
//!
//! This crate ties the storage engine together behind a [`Database`] handle:
//!
//! - `Database`: tables, relations and the shared concurrency manager
//! - `DatabaseConfig`: isolation default, entity cloning, lock backoff
//! - `ExecutionContext`: the transaction and parameters an operation runs with
//! - `ExecutionPlan`: what a query front end hands to the executor
//! - `Executor`: Insert, Update, Delete and Query commands
//!
//! # Example
//!
//! ```rust
//! use marrow_core::schema::TableBuilder;
//! use marrow_core::{DataType, Row, Value};
//! use marrow_database::{Database, RelationOptions};
//!
//! let db = Database::new();
//! db.create_table(
//!     TableBuilder::new("groups").unwrap()
//!         .add_column("id", DataType::Int64).unwrap()
//!         .add_primary_key(&["id"], false).unwrap()
//!         .build().unwrap(),
//! ).unwrap();
//! db.create_table(
//!     TableBuilder::new("members").unwrap()
//!         .add_column("id", DataType::Int64).unwrap()
//!         .add_column("group_id", DataType::Int64).unwrap()
//!         .add_primary_key(&["id"], true).unwrap()
//!         .add_index("idx_group", &["group_id"], false).unwrap()
//!         .build().unwrap(),
//! ).unwrap();
//! db.relate("group_members", "groups", "members", "idx_group", RelationOptions::cascading())
//!     .unwrap();
//!
//! let groups = db.table("groups").unwrap();
//! let members = db.table("members").unwrap();
//! db.transact(|ctx| {
//!     let exec = ctx.executor();
//!     exec.insert(&groups, Row::create(vec![Value::Int64(1)]))?;
//!     exec.insert(&members, Row::create(vec![Value::Null, Value::Int64(1)]))?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! db.transact(|ctx| ctx.executor().delete_by_key(&groups, 1i64)).unwrap();
//! assert!(groups.is_empty());
//! assert!(members.is_empty());
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod executor;
pub mod plan;

pub use config::DatabaseConfig;
pub use context::{ExecutionContext, Parameters};
pub use database::Database;
pub use executor::Executor;
pub use plan::{
    Detach, ExecutionPlan, FnPlan, KeySource, LookupPlan, QueryOptions, RangePlan, RowFilter,
    ScanPlan, Updater,
};

pub use marrow_storage::{
    identity_converter, BackoffConfig, IndexRef, IsolationLevel, KeyConverter, Relation,
    RelationDirection, RelationOptions, Table, Transaction,
};
