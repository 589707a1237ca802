//! Change diff engine.
//!
//! Compares a node's live state against its last-persisted snapshot and
//! produces the minimal change set: changed fields only, relationship
//! fields in their `{id}` wire form. An empty result means a no-op
//! save — no transaction is created and nothing is pushed.

use crate::node::Node;
use crate::schema::{EntityType, FieldKind};
use offgrid_store::{Row, Value};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// The `{id}` wire form of a many-to-one referent. An empty id encodes
/// the null reference.
pub(crate) fn ref_value(id: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::text(id));
    Value::Map(map)
}

/// The wire form of a many-to-many membership: an array of `{id}` maps.
pub(crate) fn member_list<'a>(ids: impl Iterator<Item = &'a str>) -> Value {
    Value::Array(ids.map(ref_value).collect())
}

/// Ids recorded in a stored membership array.
pub(crate) fn stored_member_ids(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.as_map())
            .filter_map(|map| map.get("id"))
            .filter_map(Value::as_text)
            .map(str::to_string)
            .collect(),
    )
}

/// Computes the change set of `node` against its snapshot.
///
/// - Properties: identity comparison of live value vs snapshot value.
/// - Many-to-one: compared by referenced id, null encoded as `{id: ""}`.
/// - Many-to-many: unordered member-id comparison; skipped entirely if
///   the snapshot never recorded the field (the node was not fully
///   hydrated).
/// - One-to-many, computed, and action fields never contribute.
pub fn diff(node: &Node, schema: &EntityType) -> Row {
    let mut changes = Row::new();

    for (field, kind) in schema.fields() {
        match kind {
            FieldKind::Property => {
                let Some(live) = node.property(field) else {
                    continue;
                };
                if node.snapshot().get(field) != Some(live) {
                    changes.insert(field.to_string(), live.clone());
                }
            }
            FieldKind::ManyToOne { .. } => {
                let live = node.reference(field).map(|key| key.id.as_str());
                let stored = node.snapshot_reference(field);
                match (live, stored) {
                    (None, Some(_)) => {
                        changes.insert(field.to_string(), ref_value(""));
                    }
                    (Some(id), stored) if stored != Some(id) => {
                        changes.insert(field.to_string(), ref_value(id));
                    }
                    _ => {}
                }
            }
            FieldKind::ManyToMany { .. } => {
                // A field the snapshot never recorded is not compared:
                // the node was created before this side was hydrated.
                let Some(stored) = node.snapshot().get(field).and_then(stored_member_ids)
                else {
                    continue;
                };
                let Some(collection) = node.collection(field) else {
                    continue;
                };
                let live_set: BTreeSet<&str> = collection.ids().collect();
                let stored_set: BTreeSet<&str> =
                    stored.iter().map(String::as_str).collect();
                if live_set != stored_set {
                    changes.insert(field.to_string(), member_list(collection.ids()));
                }
            }
            FieldKind::OneToMany { .. } | FieldKind::Computed | FieldKind::Action => {}
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::NodeKey;
    use offgrid_sync::PushConfig;

    fn task_type() -> EntityType {
        EntityType::new("Task", PushConfig::Socket)
            .with_property("title")
            .with_many_to_one("list", "List", "tasks")
            .with_many_to_many("tags", "Tag", "tasks")
            .with_computed("label")
    }

    fn node() -> Node {
        Node::new(&task_type(), "t1")
    }

    #[test]
    fn clean_node_diffs_empty() {
        let node = node();
        assert!(diff(&node, &task_type()).is_empty());
    }

    #[test]
    fn changed_property_is_reported() {
        let mut node = node();
        node.set_property("title", Value::text("Buy milk"));
        node.set_snapshot_field("title", Value::text("Buy milk"));
        assert!(diff(&node, &task_type()).is_empty());

        node.set_property("title", Value::text("Buy bread"));
        let changes = diff(&node, &task_type());
        assert_eq!(changes.get("title"), Some(&Value::text("Buy bread")));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn new_reference_is_reported_as_id_map() {
        let mut node = node();
        node.set_reference("list", Some(NodeKey::new("List", "l1")));
        let changes = diff(&node, &task_type());
        assert_eq!(changes.get("list"), Some(&ref_value("l1")));
    }

    #[test]
    fn cleared_reference_is_reported_as_empty_id() {
        let mut node = node();
        node.set_snapshot_field("list", ref_value("l1"));
        let changes = diff(&node, &task_type());
        assert_eq!(changes.get("list"), Some(&ref_value("")));
    }

    #[test]
    fn repeated_clear_does_not_stay_dirty() {
        // Once the cleared reference is folded back into the snapshot
        // as {id: ""}, the node must diff clean again.
        let mut node = node();
        node.set_snapshot_field("list", ref_value(""));
        assert!(diff(&node, &task_type()).is_empty());
    }

    #[test]
    fn swapped_reference_is_reported() {
        let mut node = node();
        node.set_snapshot_field("list", ref_value("l1"));
        node.set_reference("list", Some(NodeKey::new("List", "l2")));
        let changes = diff(&node, &task_type());
        assert_eq!(changes.get("list"), Some(&ref_value("l2")));
    }

    #[test]
    fn membership_change_is_reported_unordered() {
        let mut node = node();
        node.set_snapshot_field("tags", member_list(["a", "b"].into_iter()));
        {
            let tags = node.collection_mut("tags").unwrap();
            tags.add(NodeKey::new("Tag", "b"));
            tags.add(NodeKey::new("Tag", "a"));
        }
        // Same member set, different order: no change.
        assert!(diff(&node, &task_type()).is_empty());

        node.collection_mut("tags").unwrap().add(NodeKey::new("Tag", "c"));
        let changes = diff(&node, &task_type());
        assert_eq!(
            changes.get("tags"),
            Some(&member_list(["b", "a", "c"].into_iter()))
        );
    }

    #[test]
    fn unhydrated_membership_is_skipped() {
        let mut node = node();
        // Live members but no snapshot record of the field at all:
        // the comparison is skipped, so no change is reported.
        node.collection_mut("tags").unwrap().add(NodeKey::new("Tag", "a"));
        assert!(diff(&node, &task_type()).is_empty());
    }

    #[test]
    fn computed_fields_never_contribute() {
        let mut node = node();
        node.set_property("label", Value::text("derived"));
        assert!(diff(&node, &task_type()).is_empty());
    }
}
