//! Live entity instances.

use crate::collection::{Collection, NodeKey};
use crate::schema::{EntityType, FieldKind};
use offgrid_store::{Row, Value};
use std::collections::BTreeMap;

/// One live entity.
///
/// A node carries two layers of state:
/// - the **live** layer: current property values, many-to-one
///   references, and relationship collections, possibly ahead of what
///   was last persisted;
/// - the **snapshot**: the last values known to be persisted, in stored
///   row form. The diff engine compares the two to produce minimal
///   change sets.
///
/// Nodes are owned by the graph's live index; relationships are held as
/// [`NodeKey`]s into that index, never as raw ids in the live layer.
#[derive(Debug, Clone)]
pub struct Node {
    key: NodeKey,
    properties: BTreeMap<String, Value>,
    references: BTreeMap<String, Option<NodeKey>>,
    collections: BTreeMap<String, Collection>,
    snapshot: Row,
}

impl Node {
    /// Creates an empty node for a schema: unset references and empty
    /// collections for every declared relationship field, an empty
    /// snapshot, and the `id` property seeded on both layers.
    pub(crate) fn new(schema: &EntityType, id: &str) -> Self {
        let mut references = BTreeMap::new();
        let mut collections = BTreeMap::new();
        for (field, kind) in schema.fields() {
            match kind {
                FieldKind::ManyToOne { .. } => {
                    references.insert(field.to_string(), None);
                }
                FieldKind::OneToMany { .. } | FieldKind::ManyToMany { .. } => {
                    collections.insert(field.to_string(), Collection::new());
                }
                _ => {}
            }
        }

        let mut properties = BTreeMap::new();
        properties.insert("id".to_string(), Value::text(id));
        let mut snapshot = Row::new();
        snapshot.insert("id".to_string(), Value::text(id));

        Self {
            key: NodeKey::new(schema.name(), id),
            properties,
            references,
            collections,
            snapshot,
        }
    }

    /// The node's identity.
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// The entity type name.
    pub fn entity_type(&self) -> &str {
        &self.key.entity_type
    }

    /// The entity id.
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Reads a live property value.
    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    /// Reads a live many-to-one reference. `None` means unset (or not a
    /// reference field).
    pub fn reference(&self, field: &str) -> Option<&NodeKey> {
        self.references.get(field).and_then(Option::as_ref)
    }

    /// Reads a live relationship collection.
    pub fn collection(&self, field: &str) -> Option<&Collection> {
        self.collections.get(field)
    }

    /// The last-persisted snapshot, in stored row form.
    pub fn snapshot(&self) -> &Row {
        &self.snapshot
    }

    pub(crate) fn set_property(&mut self, field: &str, value: Value) {
        self.properties.insert(field.to_string(), value);
    }

    pub(crate) fn set_reference(&mut self, field: &str, target: Option<NodeKey>) {
        self.references.insert(field.to_string(), target);
    }

    pub(crate) fn collection_mut(&mut self, field: &str) -> Option<&mut Collection> {
        self.collections.get_mut(field)
    }

    pub(crate) fn set_snapshot_field(&mut self, field: &str, value: Value) {
        self.snapshot.insert(field.to_string(), value);
    }

    /// The snapshot id of the referent recorded for a many-to-one
    /// field. An empty or null stored id reads as `None`.
    pub(crate) fn snapshot_reference(&self, field: &str) -> Option<&str> {
        self.snapshot
            .get(field)
            .and_then(Value::as_map)
            .and_then(|map| map.get("id"))
            .and_then(Value::as_text)
            .filter(|id| !id.is_empty())
    }

    /// A clone of the snapshot for persistence.
    pub(crate) fn snapshot_row(&self) -> Row {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_sync::PushConfig;

    fn task_type() -> EntityType {
        EntityType::new("Task", PushConfig::Socket)
            .with_property("title")
            .with_many_to_one("list", "List", "tasks")
            .with_many_to_many("tags", "Tag", "tasks")
    }

    #[test]
    fn new_node_seeds_id_and_relationship_slots() {
        let node = Node::new(&task_type(), "t1");
        assert_eq!(node.id(), "t1");
        assert_eq!(node.property("id"), Some(&Value::text("t1")));
        assert_eq!(node.snapshot().get("id"), Some(&Value::text("t1")));
        assert!(node.reference("list").is_none());
        assert!(node.collection("tags").unwrap().is_empty());
        assert!(node.collection("title").is_none());
    }

    #[test]
    fn snapshot_reference_reads_id_maps() {
        let mut node = Node::new(&task_type(), "t1");
        assert_eq!(node.snapshot_reference("list"), None);

        let mut referent = BTreeMap::new();
        referent.insert("id".to_string(), Value::text("l1"));
        node.set_snapshot_field("list", Value::Map(referent));
        assert_eq!(node.snapshot_reference("list"), Some("l1"));
    }

    #[test]
    fn snapshot_reference_treats_empty_id_as_unset() {
        let mut node = Node::new(&task_type(), "t1");
        let mut cleared = BTreeMap::new();
        cleared.insert("id".to_string(), Value::text(""));
        node.set_snapshot_field("list", Value::Map(cleared));
        assert_eq!(node.snapshot_reference("list"), None);

        node.set_snapshot_field("list", Value::Null);
        assert_eq!(node.snapshot_reference("list"), None);
    }
}
