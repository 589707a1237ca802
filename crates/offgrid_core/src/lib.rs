//! # Offgrid Core
//!
//! Local-first object graph engine.
//!
//! Application state is a graph of typed entities that live in memory,
//! mirror into a durable table store, and reconcile with a remote
//! authority through a durable FIFO outbox. This crate provides:
//!
//! - The entity type [`Registry`] with startup-validated relationship
//!   declarations
//! - The live [`Node`] index with bidirectional [`Collection`]s
//! - The change [`diff`] engine (live state vs last-persisted snapshot)
//! - The relationship maintainer behind every applied change object
//! - The [`Graph`] orchestrator: lifecycle operations, durable save,
//!   FIFO queue replay, mutation notification hooks
//!
//! ## Key Invariants
//!
//! - Exactly one live node exists per (type, id)
//! - Relationship collections never hold duplicates; both sides of an
//!   edge stay in step, maintained only by the graph
//! - A change set is durably queued before any delivery attempt
//! - Replay processes the outbox strictly in insertion order; after the
//!   first failure of a pass the remainder is applied locally only
//!
//! ## Example
//!
//! ```rust
//! use offgrid_core::{EntityType, Graph, GraphConfig, Registry};
//! use offgrid_store::{MemoryStore, Value};
//! use offgrid_sync::{PushConfig, PushRouter};
//! use std::collections::BTreeMap;
//!
//! let registry = Registry::new(vec![
//!     EntityType::new("Task", PushConfig::endpoint("https://example.com/tasks"))
//!         .with_property("title"),
//! ])
//! .unwrap();
//!
//! let mut graph = Graph::open(
//!     registry,
//!     Box::new(MemoryStore::new()),
//!     PushRouter::new(),
//!     GraphConfig::default(),
//! )
//! .unwrap();
//!
//! let mut task = BTreeMap::new();
//! task.insert("type".to_string(), Value::text("Task"));
//! task.insert("id".to_string(), Value::text("t1"));
//! task.insert("title".to_string(), Value::text("Buy milk"));
//! graph.add(task).unwrap();
//!
//! assert!(graph.get("Task", "t1").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod diff;
mod error;
mod events;
mod graph;
mod node;
mod relations;
mod schema;

pub use collection::{Collection, NodeKey};
pub use diff::diff;
pub use error::{CoreError, CoreResult};
pub use events::{GraphEvent, Listener};
pub use graph::{Graph, GraphConfig, ReplayOutcome, RootSpec};
pub use node::Node;
pub use schema::{EntityType, FieldKind, Registry};
