//! # Offgrid Store
//!
//! Durable table store for Offgrid.
//!
//! This crate provides the lowest-level persistence abstraction for the
//! object graph: named tables with a text `id` primary key, single-field
//! secondary indexes, and per-call atomic operations.
//!
//! ## Design Principles
//!
//! - Every call is one atomic transaction: it fully applies and is
//!   durable on return, or fails without effect.
//! - Tables exist only through schema setup; operations never create
//!   one implicitly, and re-opening a database never alters its layout.
//! - Scans return rows in insertion order. The sync queue's FIFO replay
//!   is built on this guarantee.
//! - Queries address exactly one indexed field; multi-field queries are
//!   unsupported and fail fast.
//!
//! ## Available Engines
//!
//! - [`MemoryStore`] - for tests and ephemeral graphs
//! - [`FileStore`] - for persistent graphs, one directory per database
//!
//! ## Example
//!
//! ```rust
//! use offgrid_store::{MemoryStore, StoreBackend, TableSchema, Value};
//! use std::collections::BTreeMap;
//!
//! let store = MemoryStore::new();
//! store.setup(&[TableSchema::new("Task")]).unwrap();
//!
//! let mut row = BTreeMap::new();
//! row.insert("id".to_string(), Value::text("t1"));
//! store.insert("Task", row).unwrap();
//! assert_eq!(store.get_all("Task").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod schema;
mod table;
mod value;

pub use backend::StoreBackend;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use schema::{IndexSpec, TableSchema};
pub use value::{decode_row, encode_row, encode_value, row_key, Row, Value, PRIMARY_KEY};
