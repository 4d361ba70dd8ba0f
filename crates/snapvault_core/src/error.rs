//! Error types for SnapVault core.

use crate::restore::RestoreResult;
use crate::types::{EntityTypeId, RecordId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Reasons an uploaded archive is rejected before any data is trusted.
///
/// Messages are user-facing; they are surfaced unchanged to whoever
/// submitted the archive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The archive exceeds the configured size limit.
    #[error("File too large. Maximum size is {max_mib} MB.")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Limit in MiB.
        max_mib: u64,
    },

    /// The upload name does not carry an accepted extension.
    #[error("Invalid file type. Please upload a ZIP file.")]
    InvalidExtension {
        /// Name of the rejected upload.
        name: String,
    },

    /// The container could not be opened as an archive.
    #[error("Invalid ZIP file.")]
    InvalidArchive {
        /// Underlying parser message.
        reason: String,
    },

    /// An entry failed its integrity check.
    #[error("Corrupted ZIP file.")]
    Corrupted {
        /// Name of the first corrupted entry.
        entry: String,
    },

    /// A required entry is absent.
    #[error("Invalid backup file. Missing {name}.")]
    MissingEntry {
        /// Name of the missing entry.
        name: String,
    },

    /// An entry name is absolute or escapes the archive root.
    #[error("Invalid file paths detected in backup.")]
    UnsafePath {
        /// The offending entry name.
        name: String,
    },

    /// The manifest could not be decoded.
    #[error("Invalid metadata format.")]
    InvalidManifest {
        /// Decoder message.
        reason: String,
    },

    /// The manifest lacks a required attribute.
    #[error("Invalid metadata. Missing {field}.")]
    MissingManifestField {
        /// The missing attribute.
        field: String,
    },

    /// A data entry does not have the expected record shape.
    #[error("Invalid data format in {entry}. {reason}")]
    InvalidData {
        /// Entry that failed.
        entry: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors that can occur in SnapVault core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive container error.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The uploaded archive failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An entity type label could not be parsed.
    #[error("invalid entity type label: {label:?}")]
    InvalidEntityType {
        /// The rejected label.
        label: String,
    },

    /// An entity type is not registered in the catalog.
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType {
        /// The unknown entity type.
        entity_type: EntityTypeId,
    },

    /// The same entity type was registered twice.
    #[error("entity type registered twice: {entity_type}")]
    DuplicateEntityType {
        /// The duplicated entity type.
        entity_type: EntityTypeId,
    },

    /// The registered schema is inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the inconsistency.
        message: String,
    },

    /// A timezone name is not a known IANA zone.
    #[error("unknown timezone: {name}")]
    InvalidTimezone {
        /// The rejected name.
        name: String,
    },

    /// An entity type could not be serialized for backup.
    #[error("error serializing {entity_type}: {message}")]
    Serialization {
        /// The entity type being serialized.
        entity_type: EntityTypeId,
        /// Description of the failure.
        message: String,
    },

    /// A record could not be turned back into a stored record.
    #[error("{message}")]
    Deserialization {
        /// Description of the failure.
        message: String,
    },

    /// A field is not declared on the entity type.
    #[error("{entity_type} has no field named {field:?}")]
    UnknownField {
        /// The entity type.
        entity_type: EntityTypeId,
        /// The undeclared field.
        field: String,
    },

    /// A foreign key points at a record that does not exist.
    #[error("{entity_type}.{field} references missing {target} {id}")]
    ForeignKeyViolation {
        /// Entity type holding the reference.
        entity_type: EntityTypeId,
        /// Foreign-key field.
        field: String,
        /// Referenced entity type.
        target: EntityTypeId,
        /// Referenced record id.
        id: RecordId,
    },

    /// Deleting records would orphan references held elsewhere.
    #[error("{entity_type} is still referenced by {referrer}.{field}")]
    RestrictViolation {
        /// Entity type being deleted.
        entity_type: EntityTypeId,
        /// Entity type holding the references.
        referrer: EntityTypeId,
        /// Foreign-key field on the referrer.
        field: String,
    },

    /// Two records of a type share a natural key.
    #[error("duplicate natural key {key} for {entity_type}")]
    UniqueViolation {
        /// The entity type.
        entity_type: EntityTypeId,
        /// Rendered natural key.
        key: String,
    },

    /// No record of the referenced type matches a natural key.
    #[error("{entity_type} matching natural key {key} does not exist")]
    NaturalKeyNotFound {
        /// The referenced entity type.
        entity_type: EntityTypeId,
        /// Rendered natural key.
        key: String,
    },

    /// Clearing existing data failed; the whole restore is rolled back.
    #[error("failed to clear {entity_type}: {source}")]
    Clear {
        /// Entity type being cleared.
        entity_type: EntityTypeId,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A restore was aborted and rolled back.
    #[error("restore aborted: {reason}")]
    RestoreAborted {
        /// Why the restore stopped.
        reason: String,
        /// Counts and messages accumulated before the abort.
        result: Box<RestoreResult>,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid entity type error.
    pub fn invalid_entity_type(label: impl Into<String>) -> Self {
        Self::InvalidEntityType {
            label: label.into(),
        }
    }

    /// Creates an unknown entity type error.
    pub fn unknown_entity_type(entity_type: &EntityTypeId) -> Self {
        Self::UnknownEntityType {
            entity_type: entity_type.clone(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(entity_type: &EntityTypeId, message: impl Into<String>) -> Self {
        Self::Serialization {
            entity_type: entity_type.clone(),
            message: message.into(),
        }
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity_type: &EntityTypeId, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity_type: entity_type.clone(),
            field: field.into(),
        }
    }

    /// Creates a clear error wrapping the underlying failure.
    pub fn clear(entity_type: &EntityTypeId, source: CoreError) -> Self {
        Self::Clear {
            entity_type: entity_type.clone(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the validation failure if this error is one.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_user_facing() {
        let err = CoreError::from(ValidationError::MissingManifestField {
            field: "timestamp".into(),
        });
        assert_eq!(err.to_string(), "Invalid metadata. Missing timestamp.");

        let err = ValidationError::TooLarge {
            size: 200,
            max_mib: 100,
        };
        assert_eq!(err.to_string(), "File too large. Maximum size is 100 MB.");
    }

    #[test]
    fn clear_error_keeps_source() {
        let ty = EntityTypeId::new("app", "parent");
        let err = CoreError::clear(&ty, CoreError::invalid_operation("boom"));
        assert_eq!(
            err.to_string(),
            "failed to clear app.parent: invalid operation: boom"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
