//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named table does not exist.
    ///
    /// Tables are created only by schema setup; operations never create
    /// them implicitly.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Name of the missing table.
        table: String,
    },

    /// An insert collided with an existing primary key.
    #[error("duplicate key {key:?} in table {table}")]
    DuplicateKey {
        /// The table written to.
        table: String,
        /// The colliding primary key.
        key: String,
    },

    /// A row was written without a text `id` primary key.
    #[error("row in table {table} has no text \"id\" primary key")]
    MissingPrimaryKey {
        /// The table written to.
        table: String,
    },

    /// An index lookup named a field that is not indexed.
    ///
    /// Queries address exactly one indexed field; anything else fails
    /// fast rather than falling back to a scan.
    #[error("no index on field {field:?} of table {table}")]
    IndexNotFound {
        /// The table queried.
        table: String,
        /// The field that has no index.
        field: String,
    },

    /// The database directory is locked by another process.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Row or value encoding/decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A table file is corrupted or has an unexpected layout.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates a table-not-found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec(message.to_string())
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
