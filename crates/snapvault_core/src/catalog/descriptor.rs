//! Entity type descriptors.

use crate::record::{FieldMap, NaturalKey};
use crate::types::EntityTypeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A declared field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Referenced entity type when the field is a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<EntityTypeId>,
}

impl FieldDescriptor {
    /// Creates a plain value field.
    #[must_use]
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: None,
        }
    }

    /// Creates a foreign-key field.
    #[must_use]
    pub fn foreign_key(name: impl Into<String>, target: EntityTypeId) -> Self {
        Self {
            name: name.into(),
            references: Some(target),
        }
    }

    /// Checks whether the field is a foreign key.
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}

/// Describes one persistable entity type: its fields, outgoing foreign keys,
/// and whether records can be identified by a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDescriptor {
    /// Entity type identifier.
    pub id: EntityTypeId,
    /// Declared fields, in serialization order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Fields forming the natural key. Empty when the type has none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub natural_key: Vec<String>,
}

impl EntityTypeDescriptor {
    /// Creates a descriptor with no fields.
    #[must_use]
    pub fn new(id: EntityTypeId) -> Self {
        Self {
            id,
            fields: Vec::new(),
            natural_key: Vec::new(),
        }
    }

    /// Adds a plain value field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor::value(name));
        self
    }

    /// Adds a foreign-key field referencing `target`.
    #[must_use]
    pub fn foreign_key(mut self, name: impl Into<String>, target: EntityTypeId) -> Self {
        self.fields.push(FieldDescriptor::foreign_key(name, target));
        self
    }

    /// Declares the fields forming the natural key.
    #[must_use]
    pub fn natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Checks whether records of this type expose a natural key.
    ///
    /// Types without one can only be referenced by primary key, which is
    /// not portable between stores.
    #[must_use]
    pub fn supports_natural_key(&self) -> bool {
        !self.natural_key.is_empty()
    }

    /// Looks up a declared field.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates over foreign-key fields and their targets.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&FieldDescriptor, &EntityTypeId)> {
        self.fields
            .iter()
            .filter_map(|f| f.references.as_ref().map(|target| (f, target)))
    }

    /// Returns the distinct entity types this type references, excluding itself.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&EntityTypeId> {
        let mut deps: Vec<&EntityTypeId> = Vec::new();
        for (_, target) in self.foreign_keys() {
            if *target != self.id && !deps.contains(&target) {
                deps.push(target);
            }
        }
        deps
    }

    /// Derives a record's natural key from its field values.
    ///
    /// Returns `None` when the type has no natural key or a key field is
    /// absent.
    #[must_use]
    pub fn natural_key_of(&self, fields: &FieldMap) -> Option<NaturalKey> {
        if !self.supports_natural_key() {
            return None;
        }
        self.natural_key
            .iter()
            .map(|name| fields.get(name).cloned())
            .collect::<Option<Vec<Value>>>()
            .map(NaturalKey::new)
    }
}
