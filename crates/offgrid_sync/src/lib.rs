//! # Offgrid Sync
//!
//! Outbound sync protocol surface for Offgrid.
//!
//! This crate provides:
//! - The durable [`Transaction`] record persisted to the outbox table
//! - Per-type [`PushConfig`] (duplex socket or HTTP endpoint)
//! - The [`SocketChannel`] / [`HttpClient`] transport traits
//! - Scripted transports for tests
//! - [`PushRouter`], the push operation itself
//!
//! ## Key Invariants
//!
//! - A transaction is durable before any delivery attempt
//! - The push operation reports boolean success only; no partial success
//! - Delivery failures are recoverable by design: the change stays
//!   queued and is retried on a later replay pass
//! - Transports are injected, never resolved from ambient state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod push;
mod transaction;
mod transport;

pub use config::{Endpoint, PushConfig, DEFAULT_METHOD};
pub use error::{SyncError, SyncResult};
pub use push::PushRouter;
pub use transaction::{transactions_schema, Transaction, TRANSACTIONS_TABLE};
pub use transport::{HttpClient, RecordedRequest, ScriptedHttp, ScriptedSocket, SocketChannel};
