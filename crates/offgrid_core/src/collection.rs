//! Node identity and relationship collections.

use std::fmt;

/// Identity of one live entity: (type, id).
///
/// Exactly one live node exists per key within a graph, so a key is a
/// faithful stand-in for the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    /// The entity type name.
    pub entity_type: String,
    /// The entity id.
    pub id: String,
}

impl NodeKey {
    /// Creates a key.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// The "many" side of a relationship: an ordered, duplicate-free set of
/// node keys.
///
/// Adding a member twice is a no-op, as is removing a non-member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    members: Vec<NodeKey>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member; returns false if it was already present.
    pub fn add(&mut self, key: NodeKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.members.push(key);
        true
    }

    /// Removes a member; returns false if it was not present.
    pub fn remove(&mut self, key: &NodeKey) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != key);
        self.members.len() != before
    }

    /// Returns true if `key` is a member.
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.members.contains(key)
    }

    /// Iterates members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeKey> {
        self.members.iter()
    }

    /// Iterates member ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|key| key.id.as_str())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the collection has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a NodeKey;
    type IntoIter = std::slice::Iter<'a, NodeKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}
