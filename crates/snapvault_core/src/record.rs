//! Record representations: as held by a store and as carried in an archive.

use crate::types::{EntityTypeId, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Field values of a record, keyed by field name in declaration order.
pub type FieldMap = serde_json::Map<String, Value>;

/// A record as held by a store.
///
/// Foreign-key fields contain the referenced record's [`RecordId`] as a JSON
/// number, or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned primary key.
    pub id: RecordId,
    /// Field values.
    pub fields: FieldMap,
}

impl StoredRecord {
    /// Creates a stored record.
    #[must_use]
    pub fn new(id: RecordId, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    /// Returns the id referenced by a foreign-key field, if set.
    #[must_use]
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        self.fields
            .get(field)
            .and_then(Value::as_u64)
            .map(RecordId::new)
    }
}

/// A record as serialized into an archive data entry.
///
/// Cross-references in `fields` use the referenced record's natural key
/// when the referenced type has one, so archives stay valid across stores
/// that assign different primary keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Entity type label.
    #[serde(rename = "type")]
    pub entity_type: EntityTypeId,
    /// Primary key in the originating store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<RecordId>,
    /// Field values.
    pub fields: FieldMap,
}

/// Stable, human-meaningful identity of a record: the ordered values of its
/// natural-key fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(Vec<Value>);

impl NaturalKey {
    /// Creates a natural key from its component values.
    #[must_use]
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    /// Interprets a foreign-key value from an archive as a natural key.
    ///
    /// Arrays are taken component-wise; a lone string is a single-component
    /// key. Numbers are primary keys, not natural keys, and yield `None`.
    #[must_use]
    pub fn from_reference(value: &Value) -> Option<Self> {
        match value {
            Value::Array(parts) => Some(Self(parts.clone())),
            Value::String(_) => Some(Self(vec![value.clone()])),
            _ => None,
        }
    }

    /// Returns the key components.
    #[must_use]
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Converts the key to the JSON value written into archives.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Array(self.0)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Array(self.0.clone()))
    }
}
