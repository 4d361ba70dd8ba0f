//! Archive manifest (`metadata.json`).

use crate::error::{CoreResult, ValidationError};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the manifest entry inside an archive.
pub const MANIFEST_ENTRY: &str = "metadata.json";

/// Current archive format version.
pub const FORMAT_VERSION: &str = "1.0";

/// Manifest attributes that must be present for an archive to be accepted.
pub const REQUIRED_FIELDS: [&str; 3] = ["version", "timestamp", "database_engine"];

/// Describes an archive: when and by what it was produced, and its shape.
///
/// Counts are informational. Nothing checks them against the archive's
/// actual contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Archive format version.
    pub version: String,
    /// ISO-8601 creation time in the requester's timezone.
    pub timestamp: String,
    /// Storage engine the archive was taken from.
    pub database_engine: String,
    /// Version of the application that produced the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Number of entity types written.
    #[serde(rename = "models_count", default, skip_serializing_if = "Option::is_none")]
    pub entity_types_count: Option<u64>,
    /// Number of records written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
    /// Whether binary media is included. Always false for archives written here.
    #[serde(default)]
    pub includes_media: bool,
    /// User who requested the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Timezone the timestamp is expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Manifest {
    /// Decodes manifest bytes, failing closed on any missing required field.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let value: Value =
            serde_json::from_slice(data).map_err(|e| ValidationError::InvalidManifest {
                reason: e.to_string(),
            })?;
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::InvalidManifest {
                reason: "manifest is not a JSON object".to_string(),
            })?;

        for field in REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(ValidationError::MissingManifestField {
                    field: field.to_string(),
                }
                .into());
            }
        }

        serde_json::from_value(value).map_err(|e| {
            ValidationError::InvalidManifest {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Encodes the manifest as indented JSON.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses the timestamp, if it is valid RFC 3339.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;

    fn sample() -> Manifest {
        Manifest {
            version: FORMAT_VERSION.to_string(),
            timestamp: "2024-01-02T03:04:05.000006-05:00".to_string(),
            database_engine: "snapvault.memory".to_string(),
            app_version: Some("0.3.0".to_string()),
            entity_types_count: Some(2),
            total_records: Some(5),
            includes_media: false,
            created_by: Some("admin".to_string()),
            timezone: Some("America/New_York".to_string()),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let manifest = sample();
        let decoded = Manifest::decode(&manifest.encode().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn wire_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        for field in [
            "version",
            "timestamp",
            "database_engine",
            "models_count",
            "total_records",
            "includes_media",
            "created_by",
            "timezone",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let data = json!({
            "version": "1.0",
            "timestamp": "2024-01-02T03:04:05+00:00",
            "database_engine": "sqlite"
        });
        let manifest = Manifest::decode(data.to_string().as_bytes()).unwrap();
        assert_eq!(manifest.total_records, None);
        assert!(!manifest.includes_media);
        assert!(manifest.created_at().is_some());
    }

    #[test]
    fn each_required_field_is_enforced() {
        for missing in REQUIRED_FIELDS {
            let mut data = json!({
                "version": "1.0",
                "timestamp": "2024-01-02T03:04:05+00:00",
                "database_engine": "sqlite"
            });
            data.as_object_mut().unwrap().remove(missing);

            let err = Manifest::decode(data.to_string().as_bytes()).unwrap_err();
            assert!(
                matches!(
                    err.as_validation(),
                    Some(ValidationError::MissingManifestField { field }) if field == missing
                ),
                "{err}"
            );
        }
    }

    #[test]
    fn malformed_manifest_rejected() {
        for data in [
            &b"not json"[..],
            &b"[1, 2]"[..],
            &br#"{"version": 1, "timestamp": "x", "database_engine": "y"}"#[..],
        ] {
            let err = Manifest::decode(data).unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::InvalidManifest { .. })
            ));
        }
    }
}
