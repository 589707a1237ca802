//! In-memory store for testing and ephemeral graphs.

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::schema::TableSchema;
use crate::table::Table;
use crate::value::{Row, Value};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory table store.
///
/// Suitable for unit tests, integration tests, and graphs that do not
/// need to survive the process. Semantics match [`crate::FileStore`]
/// exactly, minus durability.
///
/// # Example
///
/// ```rust
/// use offgrid_store::{MemoryStore, StoreBackend, TableSchema, Value};
/// use std::collections::BTreeMap;
///
/// let store = MemoryStore::new();
/// store.setup(&[TableSchema::new("Task").with_index("title")]).unwrap();
///
/// let mut row = BTreeMap::new();
/// row.insert("id".to_string(), Value::text("t1"));
/// row.insert("title".to_string(), Value::text("Buy milk"));
/// store.insert("Task", row).unwrap();
///
/// assert!(store.get("Task", "t1").unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Creates an empty store with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all created tables.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Table) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        f(t)
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        f(t)
    }
}

impl StoreBackend for MemoryStore {
    fn setup(&self, schemas: &[TableSchema]) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for schema in schemas {
            if tables.contains_key(&schema.name) {
                continue;
            }
            tracing::debug!(table = %schema.name, "creating table");
            tables.insert(schema.name.clone(), Table::new(schema.clone()));
        }
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> StoreResult<Option<Row>> {
        self.with_table(table, |t| Ok(t.get(key)))
    }

    fn get_by_index(&self, table: &str, field: &str, value: &Value) -> StoreResult<Vec<Row>> {
        self.with_table(table, |t| t.get_by_index(field, value))
    }

    fn get_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.with_table(table, |t| Ok(t.get_all()))
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.with_table_mut(table, |t| t.insert(row))
    }

    fn upsert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.with_table_mut(table, |t| t.upsert(row))
    }

    fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.with_table_mut(table, |t| {
            t.delete(key);
            Ok(())
        })
    }

    fn clear(&self, table: &str) -> StoreResult<()> {
        self.with_table_mut(table, |t| {
            t.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PRIMARY_KEY;

    fn row(id: &str, title: &str) -> Row {
        let mut row = Row::new();
        row.insert(PRIMARY_KEY.into(), Value::text(id));
        row.insert("title".into(), Value::text(title));
        row
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .setup(&[TableSchema::new("Task").with_index("title")])
            .unwrap();
        store
    }

    #[test]
    fn unknown_table_fails_every_operation() {
        let store = store();
        assert!(matches!(
            store.get("Nope", "t1"),
            Err(StoreError::TableNotFound { .. })
        ));
        assert!(matches!(
            store.insert("Nope", row("t1", "a")),
            Err(StoreError::TableNotFound { .. })
        ));
        assert!(matches!(
            store.get_all("Nope"),
            Err(StoreError::TableNotFound { .. })
        ));
        assert!(matches!(
            store.clear("Nope"),
            Err(StoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn setup_is_idempotent() {
        let store = store();
        store.insert("Task", row("t1", "a")).unwrap();

        // Re-running setup must not wipe existing tables.
        store
            .setup(&[TableSchema::new("Task").with_index("title")])
            .unwrap();
        assert_eq!(store.get_all("Task").unwrap().len(), 1);
    }

    #[test]
    fn upsert_then_get() {
        let store = store();
        store.upsert("Task", row("t1", "a")).unwrap();
        store.upsert("Task", row("t1", "b")).unwrap();

        let fetched = store.get("Task", "t1").unwrap().unwrap();
        assert_eq!(fetched.get("title"), Some(&Value::text("b")));
        assert_eq!(store.get_all("Task").unwrap().len(), 1);
    }

    #[test]
    fn delete_then_get_none() {
        let store = store();
        store.insert("Task", row("t1", "a")).unwrap();
        store.delete("Task", "t1").unwrap();
        assert!(store.get("Task", "t1").unwrap().is_none());
    }

    #[test]
    fn index_query() {
        let store = store();
        store.insert("Task", row("t1", "a")).unwrap();
        store.insert("Task", row("t2", "a")).unwrap();

        let hits = store
            .get_by_index("Task", "title", &Value::text("a"))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
