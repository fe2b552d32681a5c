//! Marrow Core - Core types and schema definitions for the Marrow data store.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - `DataType`: Supported column types (Boolean, Int32, Int64, Float64, String, DateTime, Bytes)
//! - `Value`: Runtime values stored in entity fields
//! - `Row`: An entity, a row of values with a unique identifier
//! - `Key`: A comparable (possibly composite) index key extracted from a row
//! - `schema`: Table schema definitions (columns, primary key, secondary indexes)
//! - `Error`: Error types raised at the engine boundary
//!
//! # Example
//!
//! ```rust
//! use marrow_core::{DataType, Key, Row, Value};
//! use marrow_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("groups")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"], false)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new(1, vec![Value::Int64(1), Value::String("Admins".into())]);
//! let pk = Key::from_row(&row, table.primary_key().column_indices());
//!
//! assert_eq!(pk, Key::single(Value::Int64(1)));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;
mod key;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use key::Key;
pub use row::{next_row_id, Row, RowId};
pub use types::DataType;
pub use value::Value;
