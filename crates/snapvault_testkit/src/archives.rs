//! Handcrafted archives.
//!
//! [`ArchiveBuilder`] writes zip files entry by entry so tests can produce
//! archives the writer never would: missing manifests, hostile paths,
//! malformed data entries.

use serde_json::{json, Value};
use snapvault_core::{ArchiveSource, MANIFEST_ENTRY};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A manifest carrying every required and optional attribute.
pub fn valid_manifest() -> Value {
    json!({
        "version": "1.0",
        "timestamp": "2024-06-01T12:00:00.000000+00:00",
        "database_engine": "snapvault.memory",
        "app_version": "0.3.0",
        "models_count": 0,
        "total_records": 0,
        "includes_media": false,
        "created_by": "admin",
        "timezone": "UTC"
    })
}

/// Builds zip archives entry by entry.
///
/// Entries are stored uncompressed so their payload bytes can be located
/// and altered.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl ArchiveBuilder {
    /// Creates a builder with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder whose first entry is [`valid_manifest`].
    pub fn with_manifest() -> Self {
        Self::new().manifest(valid_manifest())
    }

    /// Adds `metadata.json` holding `manifest`.
    pub fn manifest(self, manifest: Value) -> Self {
        self.raw(MANIFEST_ENTRY, manifest.to_string().into_bytes())
    }

    /// Adds the data entry for `label` holding `records`.
    pub fn data(self, label: &str, records: Value) -> Self {
        let path = format!("{}.json", label.replacen('.', "/", 1));
        self.raw(&path, records.to_string().into_bytes())
    }

    /// Adds an entry with arbitrary contents.
    pub fn raw(mut self, name: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), Some(contents.into())));
        self
    }

    /// Adds a directory entry.
    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.to_string(), None));
        self
    }

    /// Writes the archive.
    pub fn build(&self) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in &self.entries {
            match contents {
                Some(contents) => {
                    zip.start_file(name.as_str(), options).expect("entry starts");
                    zip.write_all(contents).expect("entry writes");
                }
                None => {
                    zip.add_directory(name.as_str(), options)
                        .expect("directory adds");
                }
            }
        }
        zip.finish().expect("archive finishes").into_inner()
    }

    /// Writes the archive and wraps it as an upload named `name`.
    pub fn source(&self, name: &str) -> ArchiveSource<Cursor<Vec<u8>>> {
        ArchiveSource::from_bytes(name, self.build())
    }
}

/// Flips one byte of the first occurrence of `needle` in `archive`.
///
/// Used on stored entries to break their CRC without touching the zip
/// structure.
pub fn corrupt(mut archive: Vec<u8>, needle: &[u8]) -> Vec<u8> {
    let position = archive
        .windows(needle.len())
        .position(|window| window == needle)
        .expect("needle present in archive");
    archive[position] ^= 0xff;
    archive
}

/// Builds a record object in archive wire shape.
pub fn record(label: &str, pk: u64, fields: Value) -> Value {
    json!({"type": label, "pk": pk, "fields": fields})
}
