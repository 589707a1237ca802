//! Dynamic row values.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the primary key field every row must carry.
pub const PRIMARY_KEY: &str = "id";

/// A dynamic field value.
///
/// This is the value set rows are built from. Floats and raw byte
/// strings are intentionally not supported: every `Value` has a direct
/// JSON representation, which the sync layer relies on when encoding
/// outbound change sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of string keys to values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the array content, if this is an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map content, if this is a map value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A stored row: field name to value.
///
/// Rows are plain maps; the store interprets only the [`PRIMARY_KEY`]
/// field, which must be present and textual.
pub type Row = BTreeMap<String, Value>;

/// Returns the primary key of a row, if present and textual.
pub fn row_key(row: &Row) -> Option<&str> {
    row.get(PRIMARY_KEY).and_then(Value::as_text)
}

/// Encodes a row to CBOR bytes.
pub fn encode_row(row: &Row) -> StoreResult<Vec<u8>> {
    encode(row)
}

/// Decodes a row from CBOR bytes.
pub fn decode_row(bytes: &[u8]) -> StoreResult<Row> {
    ciborium::from_reader(bytes).map_err(StoreError::codec)
}

/// Encodes a single value to CBOR bytes.
///
/// Used for secondary index keys: two values collide in an index iff
/// their encodings are byte-equal.
pub fn encode_value(value: &Value) -> StoreResult<Vec<u8>> {
    encode(value)
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(StoreError::codec)?;
    Ok(out)
}
