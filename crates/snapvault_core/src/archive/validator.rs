//! Fail-closed checks for uploaded archives.

use super::ArchiveSource;
use crate::config::ArchiveLimits;
use crate::error::{CoreResult, ValidationError};
use crate::manifest::{Manifest, MANIFEST_ENTRY};
use serde_json::Value;
use std::io::{self, Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

const MIB: u64 = 1024 * 1024;

/// Checks an uploaded archive before any of its data is trusted.
#[derive(Debug, Clone, Default)]
pub struct ArchiveValidator {
    limits: ArchiveLimits,
}

impl ArchiveValidator {
    /// Creates a validator enforcing `limits`.
    #[must_use]
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Validates the container and returns its manifest.
    ///
    /// Checks run in a fixed order and stop at the first failure:
    /// 1. size against the limit
    /// 2. upload name extension
    /// 3. the container opens as a zip
    /// 4. no entry name is absolute or climbs out with `..`
    /// 5. every entry decompresses with a matching CRC
    /// 6. `metadata.json` is present
    /// 7. the manifest is a JSON object with every required field
    ///
    /// On success the source is rewound to its start.
    pub fn validate<R: Read + Seek>(&self, source: &mut ArchiveSource<R>) -> CoreResult<Manifest> {
        let size = source.size()?;
        if size > self.limits.max_size {
            return Err(ValidationError::TooLarge {
                size,
                max_mib: self.limits.max_size / MIB,
            }
            .into());
        }

        if !self.limits.accepts_name(source.name()) {
            return Err(ValidationError::InvalidExtension {
                name: source.name().to_string(),
            }
            .into());
        }

        let manifest = {
            let mut zip = open_zip(source.reader_mut())?;
            check_entry_names(&zip)?;
            verify_entries(&mut zip)?;
            read_manifest(&mut zip)?
        };

        source.rewind()?;
        tracing::debug!(
            archive = source.name(),
            size,
            version = %manifest.version,
            "archive passed validation"
        );
        Ok(manifest)
    }

    /// Checks that a data entry holds a list of record objects, each with
    /// `type` and `fields`.
    pub fn validate_records(entry: &str, data: &[u8]) -> Result<Vec<Value>, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidData {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let value: Value = serde_json::from_slice(data).map_err(|e| invalid(&e.to_string()))?;
        let Value::Array(records) = value else {
            return Err(invalid("Expected a list."));
        };

        for record in &records {
            let object = record
                .as_object()
                .ok_or_else(|| invalid("Expected objects."))?;
            if !object.contains_key("type") {
                return Err(invalid("Missing type field."));
            }
            if !object.contains_key("fields") {
                return Err(invalid("Missing fields."));
            }
        }

        Ok(records)
    }
}

/// Checks whether an entry name is absolute or escapes the archive root.
#[must_use]
pub fn is_unsafe_entry_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }

    let mut chars = name.chars();
    if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() {
            return true;
        }
    }

    name.split(['/', '\\']).any(|segment| segment == "..")
}

pub(super) fn open_zip<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>, ValidationError> {
    ZipArchive::new(reader).map_err(|e| ValidationError::InvalidArchive {
        reason: e.to_string(),
    })
}

fn check_entry_names<R: Read + Seek>(zip: &ZipArchive<R>) -> Result<(), ValidationError> {
    match zip.file_names().find(|name| is_unsafe_entry_name(name)) {
        Some(name) => Err(ValidationError::UnsafePath {
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

fn verify_entries<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<(), ValidationError> {
    for index in 0..zip.len() {
        let mut file = zip.by_index(index).map_err(|e| ValidationError::Corrupted {
            entry: format!("#{index}: {e}"),
        })?;
        let name = file.name().to_string();
        io::copy(&mut file, &mut io::sink())
            .map_err(|_| ValidationError::Corrupted { entry: name })?;
    }
    Ok(())
}

pub(super) fn read_manifest<R: Read + Seek>(zip: &mut ZipArchive<R>) -> CoreResult<Manifest> {
    let mut file = match zip.by_name(MANIFEST_ENTRY) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            return Err(ValidationError::MissingEntry {
                name: MANIFEST_ENTRY.to_string(),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Manifest::decode(&data)
}
