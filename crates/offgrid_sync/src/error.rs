//! Error types for the sync surface.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur on the sync surface.
///
/// Delivery-side errors (`ChannelClosed`, `Transport`) are recoverable
/// by design: the push operation absorbs them into a boolean failure
/// and the change stays queued. `MalformedRecord` indicates a corrupted
/// outbox row and is not recoverable.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The duplex channel is not in an open ready state.
    #[error("channel is not open")]
    ChannelClosed,

    /// The transport failed to deliver the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Encoding an outbound body failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// A persisted transaction row could not be interpreted.
    #[error("malformed transaction record: {0}")]
    MalformedRecord(String),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an encode error.
    pub fn encode(message: impl std::fmt::Display) -> Self {
        Self::Encode(message.to_string())
    }

    /// Creates a malformed-record error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }
}
