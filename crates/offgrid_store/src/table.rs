//! Insertion-ordered table with secondary indexes.

use crate::error::{StoreError, StoreResult};
use crate::schema::{IndexSpec, TableSchema};
use crate::value::{encode_value, row_key, Row, Value};
use std::collections::HashMap;

/// One table: rows in insertion order, a primary-key map, and the
/// secondary index buckets declared by the schema.
///
/// # Invariants
///
/// - Every row carries a text `id` primary key, unique in the table.
/// - `rows` preserves insertion order; an upsert keeps the row's
///   position. Scans are the durable FIFO order the sync queue relies
///   on.
/// - Index buckets key on the CBOR encoding of the field value, one
///   entry per array element for multi-entry indexes.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
    positions: HashMap<String, usize>,
    indexes: HashMap<String, HashMap<Vec<u8>, Vec<String>>>,
}

impl Table {
    /// Creates an empty table for the given schema.
    pub(crate) fn new(schema: TableSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|spec| (spec.field.clone(), HashMap::new()))
            .collect();
        Self {
            schema,
            rows: Vec::new(),
            positions: HashMap::new(),
            indexes,
        }
    }

    /// Rebuilds a table from persisted rows, preserving their order.
    pub(crate) fn from_rows(schema: TableSchema, rows: Vec<Row>) -> StoreResult<Self> {
        let mut table = Table::new(schema);
        for row in rows {
            table.insert(row)?;
        }
        Ok(table)
    }

    pub(crate) fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Rows in insertion order, for persistence.
    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn get(&self, key: &str) -> Option<Row> {
        self.positions.get(key).map(|&pos| self.rows[pos].clone())
    }

    pub(crate) fn get_all(&self) -> Vec<Row> {
        self.rows.clone()
    }

    pub(crate) fn get_by_index(&self, field: &str, value: &Value) -> StoreResult<Vec<Row>> {
        let buckets = self
            .indexes
            .get(field)
            .ok_or_else(|| StoreError::IndexNotFound {
                table: self.schema.name.clone(),
                field: field.to_string(),
            })?;

        let encoded = encode_value(value)?;
        let mut hits: Vec<usize> = buckets
            .get(&encoded)
            .map(|keys| keys.iter().filter_map(|k| self.positions.get(k)).copied().collect())
            .unwrap_or_default();
        hits.sort_unstable();
        Ok(hits.into_iter().map(|pos| self.rows[pos].clone()).collect())
    }

    pub(crate) fn insert(&mut self, row: Row) -> StoreResult<()> {
        let key = self.key_of(&row)?;
        if self.positions.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                table: self.schema.name.clone(),
                key,
            });
        }
        self.index_row(&key, &row)?;
        self.positions.insert(key, self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Inserts or replaces by primary key. A replaced row keeps its
    /// position in the scan order.
    pub(crate) fn upsert(&mut self, row: Row) -> StoreResult<()> {
        let key = self.key_of(&row)?;
        match self.positions.get(&key).copied() {
            Some(pos) => {
                let old = std::mem::replace(&mut self.rows[pos], row);
                self.unindex_row(&key, &old);
                let new = self.rows[pos].clone();
                self.index_row(&key, &new)?;
                Ok(())
            }
            None => self.insert(row),
        }
    }

    pub(crate) fn delete(&mut self, key: &str) {
        let Some(pos) = self.positions.remove(key) else {
            return;
        };
        let row = self.rows.remove(pos);
        self.unindex_row(key, &row);
        for slot in self.positions.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.positions.clear();
        for buckets in self.indexes.values_mut() {
            buckets.clear();
        }
    }

    fn key_of(&self, row: &Row) -> StoreResult<String> {
        row_key(row)
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingPrimaryKey {
                table: self.schema.name.clone(),
            })
    }

    fn index_row(&mut self, key: &str, row: &Row) -> StoreResult<()> {
        for spec in &self.schema.indexes {
            let Some(buckets) = self.indexes.get_mut(&spec.field) else {
                continue;
            };
            for encoded in index_entries(spec, row)? {
                buckets.entry(encoded).or_default().push(key.to_string());
            }
        }
        Ok(())
    }

    fn unindex_row(&mut self, key: &str, row: &Row) {
        for spec in &self.schema.indexes {
            let Ok(entries) = index_entries(spec, row) else {
                continue;
            };
            let Some(buckets) = self.indexes.get_mut(&spec.field) else {
                continue;
            };
            for encoded in entries {
                if let Some(bucket) = buckets.get_mut(&encoded) {
                    bucket.retain(|k| k != key);
                    if bucket.is_empty() {
                        buckets.remove(&encoded);
                    }
                }
            }
        }
    }
}

/// Index keys contributed by one row for one index declaration.
///
/// Absent fields contribute nothing. A multi-entry index fans an array
/// out into one entry per element; any other value indexes whole.
fn index_entries(spec: &IndexSpec, row: &Row) -> StoreResult<Vec<Vec<u8>>> {
    let Some(value) = row.get(&spec.field) else {
        return Ok(Vec::new());
    };
    match value {
        Value::Array(items) if spec.multi_entry => {
            items.iter().map(encode_value).collect()
        }
        other => Ok(vec![encode_value(other)?]),
    }
}
