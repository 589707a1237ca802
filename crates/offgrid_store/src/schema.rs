//! Table schema descriptors.

use serde::{Deserialize, Serialize};

/// A single-field secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// The indexed field.
    pub field: String,
    /// Whether array values fan out into one index entry per element.
    ///
    /// Used for many-to-many relationship fields, which store arrays of
    /// `{id}` maps.
    pub multi_entry: bool,
}

/// Layout of one table: name plus its secondary indexes.
///
/// The primary key is always the text `id` field and is not declared
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Secondary indexes.
    pub indexes: Vec<IndexSpec>,
}

impl TableSchema {
    /// Creates a schema with no secondary indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds a single-entry index on `field`.
    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(IndexSpec {
            field: field.into(),
            multi_entry: false,
        });
        self
    }

    /// Adds a multi-entry index on `field`.
    pub fn with_multi_entry_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(IndexSpec {
            field: field.into(),
            multi_entry: true,
        });
        self
    }

    /// Returns the index declaration for `field`, if any.
    pub fn index(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|spec| spec.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_indexes() {
        let schema = TableSchema::new("Task")
            .with_index("title")
            .with_multi_entry_index("tags");

        assert_eq!(schema.name, "Task");
        assert_eq!(schema.indexes.len(), 2);
        assert!(!schema.index("title").unwrap().multi_entry);
        assert!(schema.index("tags").unwrap().multi_entry);
        assert!(schema.index("missing").is_none());
    }
}
