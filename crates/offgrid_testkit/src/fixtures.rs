//! Test fixtures and graph helpers.
//!
//! Provides a small task/list/tag schema and convenience builders for
//! graphs over memory and file stores with scripted transports.

use offgrid_core::{EntityType, Graph, GraphConfig, Registry};
use offgrid_store::{FileStore, MemoryStore, Row, Value};
use offgrid_sync::{PushConfig, PushRouter, ScriptedHttp, ScriptedSocket};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// The fixture schema: tasks belong to a list and carry tags.
pub fn task_registry() -> Registry {
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
    .expect("fixture registry is valid")
}

/// Builds a change object from field/value pairs.
pub fn obj(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(field, value)| (field.to_string(), value.clone()))
        .collect()
}

/// The `{id}` wire form of a reference.
pub fn ref_obj(id: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::text(id));
    Value::Map(map)
}

/// A graph over a fresh in-memory store, pushing to `http`.
pub fn memory_graph(http: Arc<ScriptedHttp>) -> Graph {
    Graph::open(
        task_registry(),
        Box::new(MemoryStore::new()),
        PushRouter::new().with_http(http),
        GraphConfig::default(),
    )
    .expect("memory graph opens")
}

/// A graph over the file store rooted at `root`, pushing to `http`.
///
/// Reopening the same `root` recovers the previous run's state and —
/// by default — replays the outbox once.
pub fn file_graph(root: &Path, http: Arc<ScriptedHttp>) -> Graph {
    let store = FileStore::open(root, "graph").expect("file store opens");
    Graph::open(
        task_registry(),
        Box::new(store),
        PushRouter::new().with_http(http),
        GraphConfig::default(),
    )
    .expect("file graph opens")
}

/// A graph over a fresh in-memory store pushing over `socket`.
pub fn socket_graph(socket: Arc<ScriptedSocket>) -> Graph {
    let registry = Registry::new(vec![EntityType::new("Note", PushConfig::Socket)
        .with_property("body")])
    .expect("socket registry is valid");
    Graph::open(
        registry,
        Box::new(MemoryStore::new()),
        PushRouter::new().with_socket(socket),
        GraphConfig::default(),
    )
    .expect("socket graph opens")
}

/// Seeds the fixture graph with list `l1` and task `t1` on it.
pub fn seed_list_and_task(graph: &mut Graph) {
    graph
        .add(obj(&[
            ("type", Value::text("List")),
            ("id", Value::text("l1")),
            ("name", Value::text("Groceries")),
        ]))
        .expect("list adds");
    graph
        .add(obj(&[
            ("type", Value::text("Task")),
            ("id", Value::text("t1")),
            ("title", Value::text("Buy milk")),
            ("list", ref_obj("l1")),
        ]))
        .expect("task adds");
}

/// A temporary directory for file-store tests.
pub fn temp_root() -> TempDir {
    TempDir::new().expect("temp dir creates")
}
