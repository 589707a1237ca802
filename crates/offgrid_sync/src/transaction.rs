//! Durable outbox transaction records.

use crate::error::{SyncError, SyncResult};
use offgrid_store::{Row, TableSchema, Value, PRIMARY_KEY};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Reserved table the outbox lives in.
///
/// The double-underscore prefix keeps it out of the entity-type
/// namespace; registering an entity type with this name is rejected.
pub const TRANSACTIONS_TABLE: &str = "__transactions";

const FIELD_TYPE: &str = "type";
const FIELD_DATE: &str = "date";
const FIELD_CHANGES: &str = "changes";

/// Schema of the outbox table.
pub fn transactions_schema() -> TableSchema {
    TableSchema::new(TRANSACTIONS_TABLE)
        .with_index(FIELD_TYPE)
        .with_index(FIELD_DATE)
}

/// One pending outbound change set.
///
/// A transaction is persisted to the outbox table before any delivery
/// attempt and deleted only once the push operation reports success. It
/// survives restarts and connectivity loss until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Unique record id (uuid v4).
    pub id: String,
    /// Entity type the changes belong to.
    pub entity_type: String,
    /// Creation time, unix milliseconds.
    pub date: u64,
    /// The change set: field name to new value.
    pub changes: Row,
}

impl Transaction {
    /// Creates a new record with a fresh id, stamped now.
    pub fn new(entity_type: impl Into<String>, changes: Row) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            date: now_millis(),
            changes,
        }
    }

    /// Converts the record to its stored row form.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(PRIMARY_KEY.to_string(), Value::text(&self.id));
        row.insert(FIELD_TYPE.to_string(), Value::text(&self.entity_type));
        row.insert(FIELD_DATE.to_string(), Value::Integer(self.date as i64));
        row.insert(FIELD_CHANGES.to_string(), Value::Map(self.changes.clone()));
        row
    }

    /// Reads a record back from its stored row form.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedRecord` if any field is missing or has the
    /// wrong shape.
    pub fn from_row(row: &Row) -> SyncResult<Self> {
        let id = row
            .get(PRIMARY_KEY)
            .and_then(Value::as_text)
            .ok_or_else(|| SyncError::malformed("missing id"))?;
        let entity_type = row
            .get(FIELD_TYPE)
            .and_then(Value::as_text)
            .ok_or_else(|| SyncError::malformed("missing type"))?;
        let date = row
            .get(FIELD_DATE)
            .and_then(Value::as_integer)
            .ok_or_else(|| SyncError::malformed("missing date"))?;
        let changes = row
            .get(FIELD_CHANGES)
            .and_then(Value::as_map)
            .ok_or_else(|| SyncError::malformed("missing changes"))?;

        Ok(Self {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            date: date as u64,
            changes: changes.clone(),
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes() -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::text("t1"));
        row.insert("title".into(), Value::text("Buy bread"));
        row
    }

    #[test]
    fn new_assigns_unique_ids() {
        let a = Transaction::new("Task", changes());
        let b = Transaction::new("Task", changes());
        assert_ne!(a.id, b.id);
        assert!(a.date > 0);
    }

    #[test]
    fn roundtrips_through_row_form() {
        let txn = Transaction::new("Task", changes());
        let restored = Transaction::from_row(&txn.to_row()).unwrap();
        assert_eq!(restored, txn);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let txn = Transaction::new("Task", changes());

        let mut no_type = txn.to_row();
        no_type.remove("type");
        assert!(Transaction::from_row(&no_type).is_err());

        let mut bad_changes = txn.to_row();
        bad_changes.insert("changes".into(), Value::text("nope"));
        assert!(Transaction::from_row(&bad_changes).is_err());
    }

    #[test]
    fn outbox_schema_indexes_type_and_date() {
        let schema = transactions_schema();
        assert_eq!(schema.name, TRANSACTIONS_TABLE);
        assert!(schema.index("type").is_some());
        assert!(schema.index("date").is_some());
    }
}
