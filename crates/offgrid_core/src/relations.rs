//! Relationship maintainer.
//!
//! All bidirectional consistency lives here: whenever the graph applies
//! a change object or a mutation point touches a relationship field,
//! the maintainer resolves referents in the live index and keeps both
//! sides of the edge in step. Nodes never mutate peer collections
//! themselves.

use crate::collection::NodeKey;
use crate::diff::{member_list, ref_value};
use crate::error::{CoreError, CoreResult};
use crate::events::GraphEvent;
use crate::node::Node;
use crate::schema::{FieldKind, Registry};
use offgrid_store::{Row, Value};
use std::collections::{BTreeSet, HashMap};

/// Which declared fields an apply pass touches.
///
/// Hydration applies properties for every row first and relationships
/// second, so forward references across tables resolve; everything else
/// applies all fields at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldFilter {
    /// Apply every field.
    All,
    /// Apply property fields only.
    PropertiesOnly,
    /// Apply relationship fields only.
    RelationshipsOnly,
}

/// Mutable view over the live index used to enforce relationship
/// invariants.
pub(crate) struct Maintainer<'a> {
    pub nodes: &'a mut HashMap<NodeKey, Node>,
    pub registry: &'a Registry,
}

impl Maintainer<'_> {
    fn node_mut(&mut self, key: &NodeKey) -> CoreResult<&mut Node> {
        self.nodes
            .get_mut(key)
            .ok_or_else(|| CoreError::node_not_found(&key.entity_type, &key.id))
    }

    /// Applies a change object to a live node, maintaining both the
    /// live layer and the per-field snapshot.
    ///
    /// The `type` tag is skipped; fields with no declaration are
    /// ignored. Value shapes must match the declared kind: arrays only
    /// on many-to-many fields, `{id}` maps and nulls only on
    /// many-to-one fields, and nothing on computed/action fields.
    pub fn apply_object(
        &mut self,
        key: &NodeKey,
        object: &Row,
        filter: FieldFilter,
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let schema = self.registry.require(&key.entity_type)?.clone();

        for (field, value) in object {
            if field == "type" {
                continue;
            }
            let Some(kind) = schema.field(field) else {
                tracing::debug!(key = %key, field = %field, "change object field has no declaration");
                continue;
            };

            match kind {
                FieldKind::Property => {
                    if filter == FieldFilter::RelationshipsOnly {
                        continue;
                    }
                    let node = self.node_mut(key)?;
                    node.set_property(field, value.clone());
                    node.set_snapshot_field(field, value.clone());
                    events.push(GraphEvent::PropertySet {
                        key: key.clone(),
                        field: field.clone(),
                    });
                }
                _ if filter == FieldFilter::PropertiesOnly => continue,
                FieldKind::ManyToOne { .. } => match value {
                    Value::Map(map) => {
                        let id = map
                            .get("id")
                            .and_then(Value::as_text)
                            .ok_or_else(|| {
                                CoreError::config(format!(
                                    "field {field:?} of {key}: reference objects must carry an id"
                                ))
                            })?;
                        // An empty id is the wire form of the null
                        // reference.
                        let target = (!id.is_empty()).then_some(id);
                        self.set_reference(key, field, target, events)?;
                        let node = self.node_mut(key)?;
                        let snapshot = if id.is_empty() {
                            Value::Null
                        } else {
                            ref_value(id)
                        };
                        node.set_snapshot_field(field, snapshot);
                    }
                    Value::Null => {
                        self.set_reference(key, field, None, events)?;
                        self.node_mut(key)?.set_snapshot_field(field, Value::Null);
                    }
                    other => {
                        return Err(shape_error(key, field, kind, other));
                    }
                },
                FieldKind::ManyToMany { .. } => match value {
                    Value::Array(items) => {
                        let ids = membership_ids(key, field, items)?;
                        self.reconcile_members(key, field, &ids, events)?;
                        let node = self.node_mut(key)?;
                        node.set_snapshot_field(
                            field,
                            member_list(ids.iter().map(String::as_str)),
                        );
                    }
                    other => {
                        return Err(shape_error(key, field, kind, other));
                    }
                },
                FieldKind::OneToMany { .. } | FieldKind::Computed | FieldKind::Action => {
                    return Err(shape_error(key, field, kind, value));
                }
            }
        }
        Ok(())
    }

    /// Sets a many-to-one reference, detaching from the previous
    /// referent's inverse collection and attaching to the new one.
    /// Passing `None` performs only the detach half. Live state only;
    /// snapshots are the caller's business.
    pub fn set_reference(
        &mut self,
        owner: &NodeKey,
        field: &str,
        target_id: Option<&str>,
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let schema = self.registry.require(&owner.entity_type)?;
        let Some(FieldKind::ManyToOne { target, inverse }) = schema.field(field) else {
            return Err(CoreError::config(format!(
                "field {field:?} of {owner} is not a many-to-one relationship"
            )));
        };
        let (target, inverse) = (target.clone(), inverse.clone());

        let current = self.node_mut(owner)?.reference(field).cloned();
        let new_key = match target_id {
            Some(id) => {
                let key = NodeKey::new(target, id);
                if !self.nodes.contains_key(&key) {
                    return Err(CoreError::node_not_found(&key.entity_type, &key.id));
                }
                Some(key)
            }
            None => None,
        };

        if current == new_key {
            return Ok(());
        }

        if let Some(old) = &current {
            if let Some(collection) = self.node_mut(old)?.collection_mut(&inverse) {
                collection.remove(owner);
            }
            events.push(GraphEvent::CollectionChanged {
                key: old.clone(),
                field: inverse.clone(),
            });
        }

        self.node_mut(owner)?
            .set_reference(field, new_key.clone());

        if let Some(new) = &new_key {
            if let Some(collection) = self.node_mut(new)?.collection_mut(&inverse) {
                collection.add(owner.clone());
            }
            events.push(GraphEvent::CollectionChanged {
                key: new.clone(),
                field: inverse,
            });
        }

        events.push(GraphEvent::ReferenceSet {
            key: owner.clone(),
            field: field.to_string(),
            referent: new_key,
        });
        Ok(())
    }

    /// Reconciles a many-to-many membership against a declared id set:
    /// members not yet present are attached on both sides, members
    /// absent from `ids` are detached on both sides.
    pub fn reconcile_members(
        &mut self,
        owner: &NodeKey,
        field: &str,
        ids: &[String],
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let inverse = self.many_to_many_inverse(owner, field)?;
        let incoming: BTreeSet<&str> = ids.iter().map(String::as_str).collect();

        let current: Vec<String> = self
            .node_mut(owner)?
            .collection(field)
            .map(|c| c.ids().map(str::to_string).collect())
            .unwrap_or_default();

        for id in current.iter().filter(|id| !incoming.contains(id.as_str())) {
            self.detach_members(owner, field, id, &inverse, events)?;
        }
        for id in ids {
            if !current.iter().any(|c| c == id) {
                self.attach_members(owner, field, id, &inverse, events)?;
            }
        }
        Ok(())
    }

    /// Attaches one member symmetrically (the `link` mutation point).
    pub fn link(
        &mut self,
        owner: &NodeKey,
        field: &str,
        peer_id: &str,
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let inverse = self.many_to_many_inverse(owner, field)?;
        self.attach_members(owner, field, peer_id, &inverse, events)
    }

    /// Detaches one member symmetrically (the `unlink` mutation point).
    pub fn unlink(
        &mut self,
        owner: &NodeKey,
        field: &str,
        peer_id: &str,
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let inverse = self.many_to_many_inverse(owner, field)?;
        self.detach_members(owner, field, peer_id, &inverse, events)
    }

    fn many_to_many_inverse(&self, owner: &NodeKey, field: &str) -> CoreResult<(String, String)> {
        let schema = self.registry.require(&owner.entity_type)?;
        match schema.field(field) {
            Some(FieldKind::ManyToMany { target, inverse }) => {
                Ok((target.clone(), inverse.clone()))
            }
            _ => Err(CoreError::config(format!(
                "field {field:?} of {owner} is not a many-to-many relationship"
            ))),
        }
    }

    fn attach_members(
        &mut self,
        owner: &NodeKey,
        field: &str,
        peer_id: &str,
        (target, inverse): &(String, String),
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let peer = NodeKey::new(target.clone(), peer_id);
        if !self.nodes.contains_key(&peer) {
            return Err(CoreError::node_not_found(&peer.entity_type, &peer.id));
        }

        let mut changed = false;
        if let Some(collection) = self.node_mut(owner)?.collection_mut(field) {
            changed |= collection.add(peer.clone());
        }
        if let Some(collection) = self.node_mut(&peer)?.collection_mut(inverse) {
            changed |= collection.add(owner.clone());
        }
        if changed {
            events.push(GraphEvent::CollectionChanged {
                key: owner.clone(),
                field: field.to_string(),
            });
            events.push(GraphEvent::CollectionChanged {
                key: peer,
                field: inverse.clone(),
            });
        }
        Ok(())
    }

    fn detach_members(
        &mut self,
        owner: &NodeKey,
        field: &str,
        peer_id: &str,
        (target, inverse): &(String, String),
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let peer = NodeKey::new(target.clone(), peer_id);

        let mut changed = false;
        if let Some(collection) = self.node_mut(owner)?.collection_mut(field) {
            changed |= collection.remove(&peer);
        }
        if let Some(node) = self.nodes.get_mut(&peer) {
            if let Some(collection) = node.collection_mut(inverse) {
                changed |= collection.remove(owner);
            }
        }
        if changed {
            events.push(GraphEvent::CollectionChanged {
                key: owner.clone(),
                field: field.to_string(),
            });
            events.push(GraphEvent::CollectionChanged {
                key: peer,
                field: inverse.clone(),
            });
        }
        Ok(())
    }

    /// Deletion-time cleanup: walks the node's declared schema fields
    /// and removes it from every peer collection; members of its
    /// one-to-many collections get their owning back-reference nulled
    /// (live state only, so each member's next diff reports the
    /// orphaning).
    pub fn cleanup_for_delete(
        &mut self,
        key: &NodeKey,
        events: &mut Vec<GraphEvent>,
    ) -> CoreResult<()> {
        let schema = self.registry.require(&key.entity_type)?.clone();

        for (field, kind) in schema.fields() {
            match kind {
                FieldKind::ManyToOne { inverse, .. } => {
                    let Some(referent) = self.node_mut(key)?.reference(field).cloned() else {
                        continue;
                    };
                    if let Some(node) = self.nodes.get_mut(&referent) {
                        if let Some(collection) = node.collection_mut(inverse) {
                            collection.remove(key);
                        }
                        events.push(GraphEvent::CollectionChanged {
                            key: referent,
                            field: inverse.clone(),
                        });
                    }
                }
                FieldKind::OneToMany { via, .. } => {
                    let members: Vec<NodeKey> = self
                        .node_mut(key)?
                        .collection(field)
                        .map(|c| c.iter().cloned().collect())
                        .unwrap_or_default();
                    for member in members {
                        if let Some(node) = self.nodes.get_mut(&member) {
                            node.set_reference(via, None);
                        }
                        events.push(GraphEvent::ReferenceSet {
                            key: member,
                            field: via.clone(),
                            referent: None,
                        });
                    }
                }
                FieldKind::ManyToMany { inverse, .. } => {
                    let members: Vec<NodeKey> = self
                        .node_mut(key)?
                        .collection(field)
                        .map(|c| c.iter().cloned().collect())
                        .unwrap_or_default();
                    for member in members {
                        if let Some(node) = self.nodes.get_mut(&member) {
                            if let Some(collection) = node.collection_mut(inverse) {
                                collection.remove(key);
                            }
                        }
                        events.push(GraphEvent::CollectionChanged {
                            key: member,
                            field: inverse.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn shape_error(key: &NodeKey, field: &str, kind: &FieldKind, value: &Value) -> CoreError {
    CoreError::config(format!(
        "field {field:?} of {key}: value {value:?} does not match declared kind {kind:?}"
    ))
}

/// Extracts member ids from an incoming membership array. Every entry
/// must be an `{id}` object.
fn membership_ids(key: &NodeKey, field: &str, items: &[Value]) -> CoreResult<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_map()
                .and_then(|map| map.get("id"))
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or_else(|| {
                    CoreError::config(format!(
                        "field {field:?} of {key}: membership entries must be {{id}} objects"
                    ))
                })
        })
        .collect()
}
