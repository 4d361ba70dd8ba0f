//! Core type definitions for SnapVault.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for an entity type, rendered as `namespace.name`.
///
/// The namespace groups entity types owned by one component (for example
/// `auth` or `app`); the name identifies the type inside it. Archives store
/// each entity type's records under `namespace/name.json`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityTypeId {
    namespace: String,
    name: String,
}

impl EntityTypeId {
    /// Creates a new entity type identifier.
    ///
    /// Callers are expected to pass well-formed parts; use [`EntityTypeId::parse`]
    /// for untrusted input.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses a `namespace.name` label.
    pub fn parse(label: &str) -> CoreResult<Self> {
        let (namespace, name) = label
            .split_once('.')
            .ok_or_else(|| CoreError::invalid_entity_type(label))?;
        if !is_valid_part(namespace) || !is_valid_part(name) {
            return Err(CoreError::invalid_entity_type(label));
        }
        Ok(Self::new(namespace, name))
    }

    /// Derives the entity type from an archive entry path (`namespace/name.json`).
    ///
    /// Returns `None` for paths that are not data entries.
    #[must_use]
    pub fn from_entry_path(path: &str) -> Option<Self> {
        let (namespace, file) = path.split_once('/')?;
        let name = file.strip_suffix(".json")?;
        if is_valid_part(namespace) && is_valid_part(name) {
            Some(Self::new(namespace, name))
        } else {
            None
        }
    }

    /// Returns the namespace part.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the name part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the archive entry path for this entity type.
    #[must_use]
    pub fn entry_path(&self) -> String {
        format!("{}/{}.json", self.namespace, self.name)
    }
}

fn is_valid_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for EntityTypeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityTypeId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityTypeId> for String {
    fn from(value: EntityTypeId) -> Self {
        value.to_string()
    }
}

/// Primary key of a record inside one store.
///
/// Record ids are local to the store that assigned them; archives carry
/// natural keys for cross-references so ids may differ between stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next record ID, or `None` past the largest one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
