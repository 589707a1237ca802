//! Mutation notification hook.
//!
//! The graph invokes every registered listener synchronously after each
//! mutation, once state is fully updated. There is no reactive
//! machinery in-core; consumers that want derived or observable views
//! build them on top of these events.

use crate::collection::NodeKey;

/// One mutation the graph performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node was created and indexed.
    Added(NodeKey),
    /// A change object was applied to an existing node.
    Updated(NodeKey),
    /// A node was deleted and de-indexed.
    Deleted(NodeKey),
    /// A live property value was set.
    PropertySet {
        /// The mutated node.
        key: NodeKey,
        /// The property field.
        field: String,
    },
    /// A many-to-one reference changed (including to unset).
    ReferenceSet {
        /// The owning node.
        key: NodeKey,
        /// The reference field.
        field: String,
        /// The new referent, if any.
        referent: Option<NodeKey>,
    },
    /// A relationship collection gained or lost members.
    CollectionChanged {
        /// The node whose collection changed.
        key: NodeKey,
        /// The collection field.
        field: String,
    },
    /// The graph root changed.
    RootChanged(Option<NodeKey>),
}

/// A mutation listener.
pub type Listener = Box<dyn Fn(&GraphEvent) + Send>;
