//! The graph orchestrator.
//!
//! Owns the live entity index, the durable store handle, the type
//! registry, and the outbox. All mutation routes through the graph so
//! relationship invariants hold; external callers never touch peer
//! collections directly.

use crate::collection::NodeKey;
use crate::diff::diff;
use crate::error::{CoreError, CoreResult};
use crate::events::{GraphEvent, Listener};
use crate::node::Node;
use crate::relations::{FieldFilter, Maintainer};
use crate::schema::{FieldKind, Registry};
use offgrid_store::{row_key, Row, StoreBackend, Value};
use offgrid_sync::{transactions_schema, PushRouter, Transaction, TRANSACTIONS_TABLE};
use std::collections::HashMap;

/// How the graph root is established at open.
#[derive(Debug, Clone)]
pub enum RootSpec {
    /// Create the root from a full object (`type`, `id`, property
    /// fields) and persist it.
    Object(Row),
    /// Resolve the root from the store by (type, id) after hydration.
    Lookup {
        /// The root's entity type.
        entity_type: String,
        /// The root's id.
        id: String,
    },
}

/// Options for [`Graph::open`].
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Optional root entity.
    pub root: Option<RootSpec>,
    /// Drain the outbox once at startup.
    pub auto_replay: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root: None,
            auto_replay: true,
        }
    }
}

/// Result of one replay pass over the outbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Records delivered and removed from the outbox.
    pub delivered: usize,
    /// Records applied locally after the pass went offline. These stay
    /// queued for a later pass.
    pub applied_locally: usize,
}

/// The top-level orchestrator of a local-first object graph.
///
/// Entities move through exactly two states: absent and live. Creation
/// persists then indexes; deletion cleans up relationships, de-indexes,
/// and removes the stored row. Local writes queue durably before any
/// delivery attempt and replay in FIFO order.
pub struct Graph {
    registry: Registry,
    store: Box<dyn StoreBackend>,
    router: PushRouter,
    nodes: HashMap<NodeKey, Node>,
    root: Option<NodeKey>,
    listeners: Vec<Listener>,
}

impl Graph {
    /// Opens a graph over a store.
    ///
    /// Runs idempotent schema setup for every registered type plus the
    /// outbox table, rehydrates all stored rows into live nodes (two
    /// passes, so forward references across tables resolve), resolves
    /// the root, and — unless disabled — drains the outbox once.
    pub fn open(
        registry: Registry,
        store: Box<dyn StoreBackend>,
        router: PushRouter,
        config: GraphConfig,
    ) -> CoreResult<Self> {
        let mut schemas = registry.table_schemas();
        schemas.push(transactions_schema());
        store.setup(&schemas)?;

        let mut graph = Self {
            registry,
            store,
            router,
            nodes: HashMap::new(),
            root: None,
            listeners: Vec::new(),
        };

        if let Some(RootSpec::Object(object)) = &config.root {
            graph.create_root(object.clone())?;
        }

        graph.hydrate()?;

        if let Some(RootSpec::Lookup { entity_type, id }) = &config.root {
            let key = NodeKey::new(entity_type.clone(), id.clone());
            if !graph.nodes.contains_key(&key) {
                return Err(CoreError::node_not_found(entity_type, id));
            }
            graph.root = Some(key);
        }

        if config.auto_replay {
            graph.replay_queue()?;
        }
        Ok(graph)
    }

    /// The type registry the graph was built from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn StoreBackend {
        self.store.as_ref()
    }

    /// The root entity, if one is set.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref().and_then(|key| self.nodes.get(key))
    }

    /// Reads one live entity.
    pub fn get(&self, entity_type: &str, id: &str) -> Option<&Node> {
        self.nodes.get(&NodeKey::new(entity_type, id))
    }

    /// All live entities of a type, ordered by id.
    pub fn get_all(&self, entity_type: &str) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| node.entity_type() == entity_type)
            .collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    /// Pending outbox records, FIFO by insertion.
    pub fn pending_transactions(&self) -> CoreResult<Vec<Transaction>> {
        self.store
            .get_all(TRANSACTIONS_TABLE)?
            .iter()
            .map(|row| Transaction::from_row(row).map_err(CoreError::from))
            .collect()
    }

    /// Registers a mutation listener, invoked synchronously after each
    /// mutation once state is fully updated.
    pub fn subscribe(&mut self, listener: impl Fn(&GraphEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Creates a live entity from an object carrying `type`, `id`, and
    /// field values. If the entity already exists the call delegates to
    /// [`Graph::update`].
    pub fn add(&mut self, object: Row) -> CoreResult<()> {
        let (entity_type, id) = type_and_id(&object)?;
        let key = NodeKey::new(&entity_type, &id);
        if self.nodes.contains_key(&key) {
            return self.update(object);
        }

        let schema = self.registry.require(&entity_type)?;
        let node = Node::new(schema, &id);

        let mut stored = object.clone();
        stored.remove("type");
        self.store.upsert(&entity_type, stored)?;

        self.nodes.insert(key.clone(), node);
        let mut events = vec![GraphEvent::Added(key.clone())];
        self.maintainer()
            .apply_object(&key, &object, FieldFilter::All, &mut events)?;
        self.emit_all(&events);
        Ok(())
    }

    /// Applies a change object to an existing live entity and persists
    /// its full snapshot. Updating an absent entity is a caller error.
    pub fn update(&mut self, object: Row) -> CoreResult<()> {
        let (entity_type, id) = type_and_id(&object)?;
        let key = NodeKey::new(&entity_type, &id);
        if !self.nodes.contains_key(&key) {
            return Err(CoreError::node_not_found(&entity_type, &id));
        }

        let mut events = vec![GraphEvent::Updated(key.clone())];
        self.maintainer()
            .apply_object(&key, &object, FieldFilter::All, &mut events)?;

        let row = self
            .nodes
            .get(&key)
            .map(Node::snapshot_row)
            .ok_or_else(|| CoreError::node_not_found(&entity_type, &id))?;
        self.store.upsert(&entity_type, row)?;

        self.emit_all(&events);
        Ok(())
    }

    /// Deletes a live entity: relationship cleanup, de-index, store
    /// row removal.
    pub fn delete(&mut self, object: Row) -> CoreResult<()> {
        let (entity_type, id) = type_and_id(&object)?;
        let key = NodeKey::new(&entity_type, &id);
        if !self.nodes.contains_key(&key) {
            return Err(CoreError::node_not_found(&entity_type, &id));
        }

        let mut events = Vec::new();
        self.maintainer().cleanup_for_delete(&key, &mut events)?;
        self.nodes.remove(&key);
        if self.root.as_ref() == Some(&key) {
            self.root = None;
            events.push(GraphEvent::RootChanged(None));
        }
        self.store.delete(&entity_type, &id)?;
        events.push(GraphEvent::Deleted(key));

        self.emit_all(&events);
        Ok(())
    }

    /// Queues a change set durably, then attempts delivery.
    ///
    /// The transaction record is written to the outbox **before** the
    /// push, so a crash in between never loses the intent. On success
    /// the record is removed and a full replay pass drains any older
    /// backlog; on failure the record stays queued. Returns whether
    /// delivery succeeded — a failure is not an error.
    pub fn save(&mut self, entity_type: &str, changes: Row) -> CoreResult<bool> {
        let schema = self.registry.require(entity_type)?;
        let txn = Transaction::new(entity_type, changes);
        tracing::debug!(entity_type, txn_id = %txn.id, "queueing change set");
        self.store.insert(TRANSACTIONS_TABLE, txn.to_row())?;

        let delivered = self
            .router
            .push(schema.push_config(), entity_type, &txn.changes);
        if delivered {
            self.store.delete(TRANSACTIONS_TABLE, &txn.id)?;
            self.replay_queue()?;
        } else {
            tracing::debug!(entity_type, txn_id = %txn.id, "delivery failed; change stays queued");
        }
        Ok(delivered)
    }

    /// Diffs a live entity against its snapshot and saves the result.
    ///
    /// An empty diff is a no-op: no transaction, no push. Otherwise the
    /// change set (with the entity id) goes through [`Graph::save`] and
    /// the changed fields are folded into the snapshot. Returns whether
    /// a change set was produced.
    pub fn save_node(&mut self, entity_type: &str, id: &str) -> CoreResult<bool> {
        let key = NodeKey::new(entity_type, id);
        let schema = self.registry.require(entity_type)?;
        let node = self
            .nodes
            .get(&key)
            .ok_or_else(|| CoreError::node_not_found(entity_type, id))?;

        let changes = diff(node, schema);
        if changes.is_empty() {
            return Ok(false);
        }

        let mut payload = changes.clone();
        payload.insert("id".to_string(), Value::text(id));
        self.save(entity_type, payload)?;

        if let Some(node) = self.nodes.get_mut(&key) {
            for (field, value) in changes {
                node.set_snapshot_field(&field, value);
            }
        }
        Ok(true)
    }

    /// Drains the outbox in FIFO order.
    ///
    /// Each record is pushed in turn until the first failure; from that
    /// point the pass is offline and every remaining record (the failed
    /// one included) is applied locally via [`Graph::update`] without a
    /// delivery attempt, preserving queue order for the next pass.
    /// Replaying an empty outbox is a no-op.
    pub fn replay_queue(&mut self) -> CoreResult<ReplayOutcome> {
        let rows = self.store.get_all(TRANSACTIONS_TABLE)?;
        let mut outcome = ReplayOutcome::default();
        let mut online = true;

        for row in rows {
            let txn = Transaction::from_row(&row)?;
            if online {
                let schema = self.registry.require(&txn.entity_type)?;
                if self
                    .router
                    .push(schema.push_config(), &txn.entity_type, &txn.changes)
                {
                    self.store.delete(TRANSACTIONS_TABLE, &txn.id)?;
                    outcome.delivered += 1;
                    continue;
                }
                online = false;
                tracing::warn!(
                    txn_id = %txn.id,
                    "delivery failed; applying remainder of pass locally"
                );
            }

            let mut object = txn.changes.clone();
            object.insert("type".to_string(), Value::text(&txn.entity_type));
            self.update(object)?;
            outcome.applied_locally += 1;
        }

        if outcome.delivered > 0 || outcome.applied_locally > 0 {
            tracing::debug!(
                delivered = outcome.delivered,
                applied_locally = outcome.applied_locally,
                "replay pass finished"
            );
        }
        Ok(outcome)
    }

    /// Sets a live property value. Live state only: the change reaches
    /// the store and the outbox on the next [`Graph::save_node`].
    pub fn set_property(
        &mut self,
        entity_type: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> CoreResult<()> {
        let key = NodeKey::new(entity_type, id);
        let schema = self.registry.require(entity_type)?;
        if schema.field(field) != Some(&FieldKind::Property) {
            return Err(CoreError::config(format!(
                "field {field:?} of {entity_type} is not a property"
            )));
        }
        let node = self
            .nodes
            .get_mut(&key)
            .ok_or_else(|| CoreError::node_not_found(entity_type, id))?;
        node.set_property(field, value);
        self.emit_all(&[GraphEvent::PropertySet {
            key,
            field: field.to_string(),
        }]);
        Ok(())
    }

    /// Sets or clears a live many-to-one reference, keeping the
    /// inverse collection in step. Live state only.
    pub fn set_reference(
        &mut self,
        entity_type: &str,
        id: &str,
        field: &str,
        target_id: Option<&str>,
    ) -> CoreResult<()> {
        let key = NodeKey::new(entity_type, id);
        if !self.nodes.contains_key(&key) {
            return Err(CoreError::node_not_found(entity_type, id));
        }
        let mut events = Vec::new();
        self.maintainer()
            .set_reference(&key, field, target_id, &mut events)?;
        self.emit_all(&events);
        Ok(())
    }

    /// Adds a member to a many-to-many relationship, symmetrically.
    /// Live state only; adding an existing member is a no-op.
    pub fn link(
        &mut self,
        entity_type: &str,
        id: &str,
        field: &str,
        peer_id: &str,
    ) -> CoreResult<()> {
        let key = NodeKey::new(entity_type, id);
        if !self.nodes.contains_key(&key) {
            return Err(CoreError::node_not_found(entity_type, id));
        }
        let mut events = Vec::new();
        self.maintainer().link(&key, field, peer_id, &mut events)?;
        self.emit_all(&events);
        Ok(())
    }

    /// Removes a member from a many-to-many relationship,
    /// symmetrically. Removing a non-member is a no-op.
    pub fn unlink(
        &mut self,
        entity_type: &str,
        id: &str,
        field: &str,
        peer_id: &str,
    ) -> CoreResult<()> {
        let key = NodeKey::new(entity_type, id);
        if !self.nodes.contains_key(&key) {
            return Err(CoreError::node_not_found(entity_type, id));
        }
        let mut events = Vec::new();
        self.maintainer().unlink(&key, field, peer_id, &mut events)?;
        self.emit_all(&events);
        Ok(())
    }

    /// Sets the root to an existing entity, or creates it from the
    /// object if absent.
    pub fn set_root(&mut self, object: Row) -> CoreResult<()> {
        let (entity_type, id) = type_and_id(&object)?;
        let key = NodeKey::new(&entity_type, &id);
        if self.nodes.contains_key(&key) {
            self.root = Some(key.clone());
            self.emit_all(&[GraphEvent::RootChanged(Some(key))]);
            return Ok(());
        }
        self.create_root(object)
    }

    /// Creates the root entity. Roots carry property fields only.
    fn create_root(&mut self, object: Row) -> CoreResult<()> {
        let (entity_type, id) = type_and_id(&object)?;
        let schema = self.registry.require(&entity_type)?;
        for (field, _) in object.iter().filter(|(field, _)| *field != "type") {
            match schema.field(field) {
                Some(FieldKind::Property) | None => {}
                Some(kind) => {
                    return Err(CoreError::config(format!(
                        "the root entity cannot carry a {kind:?} field ({field:?})"
                    )));
                }
            }
        }

        let node = Node::new(schema, &id);
        let mut stored = object.clone();
        stored.remove("type");
        self.store.upsert(&entity_type, stored)?;

        let key = NodeKey::new(&entity_type, &id);
        self.nodes.insert(key.clone(), node);
        let mut events = vec![GraphEvent::Added(key.clone())];
        self.maintainer()
            .apply_object(&key, &object, FieldFilter::PropertiesOnly, &mut events)?;

        self.root = Some(key.clone());
        events.push(GraphEvent::RootChanged(Some(key)));
        self.emit_all(&events);
        Ok(())
    }

    /// Rehydrates every registered type's table into live nodes.
    ///
    /// Two passes: properties first for every row, then relationship
    /// fields, so a row may reference entities from tables hydrated
    /// after its own.
    fn hydrate(&mut self) -> CoreResult<()> {
        let types: Vec<String> = self
            .registry
            .types()
            .map(|ty| ty.name().to_string())
            .collect();
        let mut events = Vec::new();

        for entity_type in &types {
            let schema = self.registry.require(entity_type)?.clone();
            for row in self.store.get_all(entity_type)? {
                let Some(id) = row_key(&row) else {
                    tracing::warn!(entity_type = %entity_type, "stored row without id skipped");
                    continue;
                };
                let key = NodeKey::new(entity_type.clone(), id);
                self.nodes
                    .entry(key.clone())
                    .or_insert_with(|| Node::new(&schema, id));
                self.maintainer()
                    .apply_object(&key, &row, FieldFilter::PropertiesOnly, &mut events)?;
            }
        }

        for entity_type in &types {
            for row in self.store.get_all(entity_type)? {
                let Some(id) = row_key(&row) else {
                    continue;
                };
                let key = NodeKey::new(entity_type.clone(), id);
                self.maintainer().apply_object(
                    &key,
                    &row,
                    FieldFilter::RelationshipsOnly,
                    &mut events,
                )?;
            }
        }

        tracing::debug!(nodes = self.nodes.len(), "hydration finished");
        Ok(())
    }

    fn maintainer(&mut self) -> Maintainer<'_> {
        Maintainer {
            nodes: &mut self.nodes,
            registry: &self.registry,
        }
    }

    fn emit_all(&self, events: &[GraphEvent]) {
        for event in events {
            for listener in &self.listeners {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Extracts the mandatory `type` and `id` tags from a change object.
fn type_and_id(object: &Row) -> CoreResult<(String, String)> {
    let entity_type = object
        .get("type")
        .and_then(Value::as_text)
        .ok_or_else(|| CoreError::config("cannot apply an object without a type"))?;
    let id = object
        .get("id")
        .and_then(Value::as_text)
        .ok_or_else(|| CoreError::config("cannot apply an object without an id"))?;
    Ok((entity_type.to_string(), id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;
    use offgrid_store::MemoryStore;
    use offgrid_sync::{PushConfig, ScriptedHttp, ScriptedSocket};
    use std::sync::{Arc, Mutex};

    fn registry() -> Registry {
        Registry::new(vec![
            EntityType::new("Task", PushConfig::endpoint("https://example.com/tasks"))
                .with_property("title")
                .with_many_to_one("list", "List", "tasks")
                .with_many_to_many("tags", "Tag", "tasks"),
            EntityType::new("List", PushConfig::endpoint("https://example.com/lists"))
                .with_property("name")
                .with_one_to_many("tasks", "Task", "list"),
            EntityType::new("Tag", PushConfig::endpoint("https://example.com/tags"))
                .with_property("label")
                .with_many_to_many("tasks", "Task", "tags"),
        ])
        .unwrap()
    }

    fn object(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ref_obj(id: &str) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("id".to_string(), Value::text(id));
        Value::Map(map)
    }

    fn graph_with(http: Arc<ScriptedHttp>) -> Graph {
        Graph::open(
            registry(),
            Box::new(MemoryStore::new()),
            PushRouter::new().with_http(http),
            GraphConfig::default(),
        )
        .unwrap()
    }

    fn online_graph() -> Graph {
        graph_with(Arc::new(ScriptedHttp::with_status(200)))
    }

    fn add_list_and_task(graph: &mut Graph) {
        graph
            .add(object(&[
                ("type", Value::text("List")),
                ("id", Value::text("l1")),
                ("name", Value::text("Groceries")),
            ]))
            .unwrap();
        graph
            .add(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("title", Value::text("Buy milk")),
                ("list", ref_obj("l1")),
            ]))
            .unwrap();
    }

    #[test]
    fn add_requires_type_and_id() {
        let mut graph = online_graph();
        let err = graph
            .add(object(&[("id", Value::text("t1"))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));

        let err = graph
            .add(object(&[("type", Value::text("Task"))]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn add_seeds_snapshot_from_input() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);

        let task = graph.get("Task", "t1").unwrap();
        assert_eq!(task.property("title"), Some(&Value::text("Buy milk")));
        assert_eq!(task.snapshot().get("title"), Some(&Value::text("Buy milk")));
        assert_eq!(task.snapshot().get("list"), Some(&ref_obj("l1")));

        // The store row matches the input minus the type tag.
        let row = graph.store().get("Task", "t1").unwrap().unwrap();
        assert_eq!(row.get("title"), Some(&Value::text("Buy milk")));
        assert!(row.get("type").is_none());
    }

    #[test]
    fn many_to_one_assignment_is_bidirectional() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);

        let task = graph.get("Task", "t1").unwrap();
        assert_eq!(task.reference("list"), Some(&NodeKey::new("List", "l1")));
        let list = graph.get("List", "l1").unwrap();
        assert!(list.collection("tasks").unwrap().contains(&NodeKey::new("Task", "t1")));
    }

    #[test]
    fn reassignment_moves_between_inverse_collections() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);
        graph
            .add(object(&[
                ("type", Value::text("List")),
                ("id", Value::text("l2")),
                ("name", Value::text("Errands")),
            ]))
            .unwrap();

        graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("list", ref_obj("l2")),
            ]))
            .unwrap();

        let t1 = NodeKey::new("Task", "t1");
        assert!(!graph.get("List", "l1").unwrap().collection("tasks").unwrap().contains(&t1));
        assert!(graph.get("List", "l2").unwrap().collection("tasks").unwrap().contains(&t1));
    }

    #[test]
    fn empty_id_clears_the_reference() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);

        graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("list", ref_obj("")),
            ]))
            .unwrap();

        let task = graph.get("Task", "t1").unwrap();
        assert!(task.reference("list").is_none());
        assert!(graph
            .get("List", "l1")
            .unwrap()
            .collection("tasks")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn assigning_missing_referent_fails() {
        let mut graph = online_graph();
        let err = graph
            .add(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("list", ref_obj("nope")),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::NodeNotFound { .. }));
    }

    #[test]
    fn array_on_non_many_to_many_field_fails() {
        let mut graph = online_graph();
        let err = graph
            .add(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("list", Value::Array(vec![ref_obj("l1")])),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn id_object_on_property_field_fails() {
        let mut graph = online_graph();
        let err = graph
            .add(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("tags", ref_obj("x")),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn many_to_many_membership_is_symmetric() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);
        graph
            .add(object(&[
                ("type", Value::text("Tag")),
                ("id", Value::text("g1")),
                ("label", Value::text("urgent")),
            ]))
            .unwrap();

        graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("tags", Value::Array(vec![ref_obj("g1")])),
            ]))
            .unwrap();

        let task = graph.get("Task", "t1").unwrap();
        let tag = graph.get("Tag", "g1").unwrap();
        assert!(task.collection("tags").unwrap().contains(&NodeKey::new("Tag", "g1")));
        assert!(tag.collection("tasks").unwrap().contains(&NodeKey::new("Task", "t1")));
    }

    #[test]
    fn many_to_many_update_detaches_absent_members() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);
        for (id, label) in [("g1", "urgent"), ("g2", "home")] {
            graph
                .add(object(&[
                    ("type", Value::text("Tag")),
                    ("id", Value::text(id)),
                    ("label", Value::text(label)),
                ]))
                .unwrap();
        }

        graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("tags", Value::Array(vec![ref_obj("g1"), ref_obj("g2")])),
            ]))
            .unwrap();
        graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
                ("tags", Value::Array(vec![ref_obj("g2")])),
            ]))
            .unwrap();

        let t1 = NodeKey::new("Task", "t1");
        assert!(!graph.get("Tag", "g1").unwrap().collection("tasks").unwrap().contains(&t1));
        assert!(graph.get("Tag", "g2").unwrap().collection("tasks").unwrap().contains(&t1));
        let ids: Vec<_> = graph
            .get("Task", "t1")
            .unwrap()
            .collection("tags")
            .unwrap()
            .ids()
            .collect();
        assert_eq!(ids, ["g2"]);
    }

    #[test]
    fn delete_cleans_up_inverse_collections_and_store() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);

        graph
            .delete(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("t1")),
            ]))
            .unwrap();

        assert!(graph.get("Task", "t1").is_none());
        assert!(graph
            .get("List", "l1")
            .unwrap()
            .collection("tasks")
            .unwrap()
            .is_empty());
        assert!(graph.store().get("Task", "t1").unwrap().is_none());
    }

    #[test]
    fn deleting_a_list_orphans_its_tasks() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http);
        add_list_and_task(&mut graph);

        graph
            .delete(object(&[
                ("type", Value::text("List")),
                ("id", Value::text("l1")),
            ]))
            .unwrap();

        let task = graph.get("Task", "t1").unwrap();
        assert!(task.reference("list").is_none());
        // The orphaning is live-only; the next diff reports it.
        assert_eq!(task.snapshot().get("list"), Some(&ref_obj("l1")));
        assert!(graph.save_node("Task", "t1").unwrap());
        let pending = graph.pending_transactions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].changes.get("list"), Some(&ref_obj("")));
    }

    #[test]
    fn update_of_absent_entity_is_a_caller_error() {
        let mut graph = online_graph();
        let err = graph
            .update(object(&[
                ("type", Value::text("Task")),
                ("id", Value::text("missing")),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::NodeNotFound { .. }));
    }

    #[test]
    fn save_node_with_no_changes_creates_no_transaction() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http.clone());
        add_list_and_task(&mut graph);

        assert!(!graph.save_node("Task", "t1").unwrap());
        assert!(graph.pending_transactions().unwrap().is_empty());
        assert!(http.requests().is_empty());
    }

    #[test]
    fn failed_save_leaves_one_durable_transaction() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http);
        add_list_and_task(&mut graph);

        let changes = object(&[
            ("id", Value::text("t1")),
            ("title", Value::text("Buy bread")),
        ]);
        assert!(!graph.save("Task", changes.clone()).unwrap());

        let pending = graph.pending_transactions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_type, "Task");
        assert_eq!(pending[0].changes, changes);

        // The live entity is untouched until a replay applies locally.
        assert_eq!(
            graph.get("Task", "t1").unwrap().property("title"),
            Some(&Value::text("Buy milk"))
        );
    }

    #[test]
    fn offline_replay_applies_locally_and_keeps_records() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http);
        add_list_and_task(&mut graph);

        graph
            .save(
                "Task",
                object(&[
                    ("id", Value::text("t1")),
                    ("title", Value::text("Buy bread")),
                ]),
            )
            .unwrap();

        let outcome = graph.replay_queue().unwrap();
        assert_eq!(outcome, ReplayOutcome { delivered: 0, applied_locally: 1 });
        assert_eq!(
            graph.get("Task", "t1").unwrap().property("title"),
            Some(&Value::text("Buy bread"))
        );
        // Still queued: local application never removes a record.
        assert_eq!(graph.pending_transactions().unwrap().len(), 1);
    }

    #[test]
    fn replay_is_fifo_and_stops_pushing_after_first_failure() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http.clone());
        add_list_and_task(&mut graph);

        graph
            .save(
                "Task",
                object(&[("id", Value::text("t1")), ("title", Value::text("one"))]),
            )
            .unwrap();
        graph
            .save(
                "Task",
                object(&[("id", Value::text("t1")), ("title", Value::text("two"))]),
            )
            .unwrap();

        let before = http.requests().len();
        let outcome = graph.replay_queue().unwrap();
        // Only the first record got a delivery attempt this pass.
        assert_eq!(http.requests().len(), before + 1);
        assert_eq!(outcome, ReplayOutcome { delivered: 0, applied_locally: 2 });
        // Applied locally in queue order: the newer record wins.
        assert_eq!(
            graph.get("Task", "t1").unwrap().property("title"),
            Some(&Value::text("two"))
        );
        // Neither record was removed.
        assert_eq!(graph.pending_transactions().unwrap().len(), 2);
    }

    #[test]
    fn replay_of_empty_queue_is_a_noop() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);
        assert_eq!(graph.replay_queue().unwrap(), ReplayOutcome::default());
        assert_eq!(graph.replay_queue().unwrap(), ReplayOutcome::default());
    }

    #[test]
    fn successful_save_drains_backlog() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let mut graph = graph_with(http.clone());
        add_list_and_task(&mut graph);

        graph
            .save(
                "Task",
                object(&[("id", Value::text("t1")), ("title", Value::text("queued"))]),
            )
            .unwrap();
        assert_eq!(graph.pending_transactions().unwrap().len(), 1);

        http.set_status(200);
        assert!(graph
            .save(
                "Task",
                object(&[("id", Value::text("t1")), ("title", Value::text("fresh"))]),
            )
            .unwrap());
        // The fresh record delivered and the backlog drained with it.
        assert!(graph.pending_transactions().unwrap().is_empty());
    }

    #[test]
    fn save_node_diffs_and_folds_snapshot() {
        let http = Arc::new(ScriptedHttp::with_status(200));
        let mut graph = graph_with(http.clone());
        add_list_and_task(&mut graph);

        graph
            .set_property("Task", "t1", "title", Value::text("Buy bread"))
            .unwrap();
        assert!(graph.save_node("Task", "t1").unwrap());
        assert_eq!(http.requests().len(), 1);
        assert_eq!(
            graph.get("Task", "t1").unwrap().snapshot().get("title"),
            Some(&Value::text("Buy bread"))
        );

        // Snapshot folded, so the next save is a no-op.
        assert!(!graph.save_node("Task", "t1").unwrap());
        assert_eq!(http.requests().len(), 1);
    }

    #[test]
    fn unknown_type_fails_save() {
        let mut graph = online_graph();
        assert!(matches!(
            graph.save("Nope", Row::new()),
            Err(CoreError::UnknownType(_))
        ));
    }

    #[test]
    fn hydration_restores_relationships() {
        // Prepopulate a store the way a previous run would have left it,
        // then open a graph over it.
        let store = MemoryStore::new();
        let reg = registry();
        store.setup(&reg.table_schemas()).unwrap();
        store
            .upsert(
                "List",
                object(&[("id", Value::text("l1")), ("name", Value::text("Groceries"))]),
            )
            .unwrap();
        store
            .upsert(
                "Task",
                object(&[
                    ("id", Value::text("t1")),
                    ("title", Value::text("Buy milk")),
                    ("list", ref_obj("l1")),
                ]),
            )
            .unwrap();

        let graph = Graph::open(
            reg,
            Box::new(store),
            PushRouter::new(),
            GraphConfig {
                auto_replay: false,
                ..GraphConfig::default()
            },
        )
        .unwrap();

        let task = graph.get("Task", "t1").unwrap();
        assert_eq!(task.reference("list"), Some(&NodeKey::new("List", "l1")));
        assert_eq!(task.snapshot().get("list"), Some(&ref_obj("l1")));
        assert!(graph
            .get("List", "l1")
            .unwrap()
            .collection("tasks")
            .unwrap()
            .contains(&NodeKey::new("Task", "t1")));
    }

    #[test]
    fn hydration_resolves_forward_references() {
        // "Alpha" hydrates before "Zeta" alphabetically, yet its rows
        // reference Zeta entities: pass two resolves them.
        let reg = Registry::new(vec![
            EntityType::new("Alpha", PushConfig::Socket).with_many_to_one(
                "owner", "Zeta", "alphas",
            ),
            EntityType::new("Zeta", PushConfig::Socket).with_one_to_many(
                "alphas", "Alpha", "owner",
            ),
        ])
        .unwrap();

        let store = MemoryStore::new();
        store.setup(&reg.table_schemas()).unwrap();
        store
            .upsert(
                "Alpha",
                object(&[("id", Value::text("a1")), ("owner", ref_obj("z1"))]),
            )
            .unwrap();
        store
            .upsert("Zeta", object(&[("id", Value::text("z1"))]))
            .unwrap();

        let graph = Graph::open(
            reg,
            Box::new(store),
            PushRouter::new(),
            GraphConfig {
                auto_replay: false,
                ..GraphConfig::default()
            },
        )
        .unwrap();

        assert_eq!(
            graph.get("Alpha", "a1").unwrap().reference("owner"),
            Some(&NodeKey::new("Zeta", "z1"))
        );
        assert!(graph
            .get("Zeta", "z1")
            .unwrap()
            .collection("alphas")
            .unwrap()
            .contains(&NodeKey::new("Alpha", "a1")));
    }

    #[test]
    fn mutation_points_reject_wrong_kinds() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);

        assert!(matches!(
            graph.set_property("Task", "t1", "list", Value::text("x")),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            graph.set_reference("Task", "t1", "title", Some("l1")),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            graph.link("Task", "t1", "list", "l1"),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn link_and_unlink_are_symmetric() {
        let mut graph = online_graph();
        add_list_and_task(&mut graph);
        graph
            .add(object(&[
                ("type", Value::text("Tag")),
                ("id", Value::text("g1")),
            ]))
            .unwrap();

        graph.link("Task", "t1", "tags", "g1").unwrap();
        assert!(graph
            .get("Tag", "g1")
            .unwrap()
            .collection("tasks")
            .unwrap()
            .contains(&NodeKey::new("Task", "t1")));

        graph.unlink("Task", "t1", "tags", "g1").unwrap();
        assert!(graph.get("Tag", "g1").unwrap().collection("tasks").unwrap().is_empty());
        assert!(graph.get("Task", "t1").unwrap().collection("tags").unwrap().is_empty());
    }

    #[test]
    fn root_from_object_is_created_and_persisted() {
        let store = MemoryStore::new();
        let graph = Graph::open(
            registry(),
            Box::new(store),
            PushRouter::new(),
            GraphConfig {
                root: Some(RootSpec::Object(object(&[
                    ("type", Value::text("List")),
                    ("id", Value::text("root")),
                    ("name", Value::text("Everything")),
                ]))),
                auto_replay: false,
            },
        )
        .unwrap();

        let root = graph.root().unwrap();
        assert_eq!(root.id(), "root");
        assert!(graph.store().get("List", "root").unwrap().is_some());
    }

    #[test]
    fn root_with_relationship_fields_is_rejected() {
        let err = Graph::open(
            registry(),
            Box::new(MemoryStore::new()),
            PushRouter::new(),
            GraphConfig {
                root: Some(RootSpec::Object(object(&[
                    ("type", Value::text("Task")),
                    ("id", Value::text("root")),
                    ("list", ref_obj("l1")),
                ]))),
                auto_replay: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn root_lookup_of_missing_entity_fails() {
        let err = Graph::open(
            registry(),
            Box::new(MemoryStore::new()),
            PushRouter::new(),
            GraphConfig {
                root: Some(RootSpec::Lookup {
                    entity_type: "List".to_string(),
                    id: "missing".to_string(),
                }),
                auto_replay: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NodeNotFound { .. }));
    }

    #[test]
    fn listeners_observe_mutations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut graph = online_graph();
        graph.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        add_list_and_task(&mut graph);

        let events = seen.lock().unwrap();
        assert!(events.contains(&GraphEvent::Added(NodeKey::new("Task", "t1"))));
        assert!(events.iter().any(|e| matches!(
            e,
            GraphEvent::ReferenceSet { key, field, referent: Some(r) }
                if key == &NodeKey::new("Task", "t1") && field == "list" && r == &NodeKey::new("List", "l1")
        )));
    }

    #[test]
    fn socket_push_goes_through_the_channel() {
        let socket = Arc::new(ScriptedSocket::new());
        let registry = Registry::new(vec![EntityType::new("Note", PushConfig::Socket)
            .with_property("body")])
        .unwrap();
        let mut graph = Graph::open(
            registry,
            Box::new(MemoryStore::new()),
            PushRouter::new().with_socket(socket.clone()),
            GraphConfig::default(),
        )
        .unwrap();

        graph
            .add(object(&[
                ("type", Value::text("Note")),
                ("id", Value::text("n1")),
                ("body", Value::text("hello")),
            ]))
            .unwrap();
        assert!(graph
            .save(
                "Note",
                object(&[("id", Value::text("n1")), ("body", Value::text("hi"))]),
            )
            .unwrap());
        assert_eq!(socket.sent().len(), 1);
        assert!(graph.pending_transactions().unwrap().is_empty());
    }
}
