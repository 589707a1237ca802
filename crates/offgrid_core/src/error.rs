//! Error types for the graph engine.

use thiserror::Error;

/// Result type for graph operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in graph operations.
///
/// Delivery failures are deliberately absent: a failed push is not an
/// error, it leaves the change queued for a later replay pass.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store backend error.
    #[error("store error: {0}")]
    Store(#[from] offgrid_store::StoreError),

    /// Sync surface error (malformed outbox record).
    #[error("sync error: {0}")]
    Sync(#[from] offgrid_sync::SyncError),

    /// Caller or schema misuse: missing type/id, a value whose shape
    /// does not match the declared field kind, writes to fields that
    /// are not writable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Type registry validation failed at construction.
    #[error("schema error: {0}")]
    Schema(String),

    /// The entity type is not registered.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// No live entity exists for (type, id).
    #[error("no live entity {id:?} of type {entity_type}")]
    NodeNotFound {
        /// The entity type looked up.
        entity_type: String,
        /// The id looked up.
        id: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a schema validation error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Creates a node-not-found error.
    pub fn node_not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
