//! Store backend trait definition.

use crate::error::StoreResult;
use crate::schema::TableSchema;
use crate::value::{Row, Value};

/// A durable table store.
///
/// Backends expose named tables keyed by a text `id` primary key, with
/// optional single-field secondary indexes. Every call is one atomic
/// transaction against the underlying engine: it either fully applies
/// and is durable on return, or fails without effect.
///
/// # Invariants
///
/// - Operations on a table that schema setup never created fail with
///   `TableNotFound`; tables are never created implicitly.
/// - `get_all` returns rows in insertion order, and `upsert` keeps a
///   replaced row's position. Callers (the sync queue in particular)
///   rely on scans being FIFO by insertion.
/// - Index lookups address exactly one field. Multi-field queries are
///   unsupported by design and have no fallback.
///
/// # Implementors
///
/// - [`super::MemoryStore`] — tests and ephemeral graphs
/// - [`super::FileStore`] — persistent storage
pub trait StoreBackend: Send + Sync {
    /// Idempotent schema setup.
    ///
    /// Creates each missing table together with its declared secondary
    /// indexes. Tables that already exist are left untouched, so
    /// re-opening an existing database never alters its layout.
    fn setup(&self, schemas: &[TableSchema]) -> StoreResult<()>;

    /// Point lookup by primary key.
    fn get(&self, table: &str, key: &str) -> StoreResult<Option<Row>>;

    /// Returns all rows whose indexed `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Fails with `IndexNotFound` if `field` carries no index — there
    /// is deliberately no scan fallback.
    fn get_by_index(&self, table: &str, field: &str, value: &Value) -> StoreResult<Vec<Row>>;

    /// Full scan, in insertion order.
    fn get_all(&self, table: &str) -> StoreResult<Vec<Row>>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateKey` if the primary key already exists.
    fn insert(&self, table: &str, row: Row) -> StoreResult<()>;

    /// Inserts or replaces a row by primary key.
    fn upsert(&self, table: &str, row: Row) -> StoreResult<()>;

    /// Deletes a row by primary key. Deleting an absent key is a no-op.
    fn delete(&self, table: &str, key: &str) -> StoreResult<()>;

    /// Removes every row from a table.
    fn clear(&self, table: &str) -> StoreResult<()>;
}
