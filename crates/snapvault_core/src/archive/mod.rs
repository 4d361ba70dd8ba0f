//! Archive container handling.
//!
//! An archive is a zip container holding a `metadata.json` manifest and one
//! `{namespace}/{name}.json` entry per non-empty entity type, each a JSON
//! array of [`ArchiveRecord`](crate::record::ArchiveRecord)s.
//!
//! - [`ArchiveWriter`] produces archives from a [`RecordStore`](crate::store::RecordStore)
//! - [`ArchiveValidator`] rejects untrusted uploads before anything is read
//! - [`ArchiveReader`] extracts the manifest and data entries

mod reader;
mod validator;
mod writer;

pub use reader::ArchiveReader;
pub use validator::{is_unsafe_entry_name, ArchiveValidator};
pub use writer::{generate_filename, ArchiveWriter, BackupArchive, Requester, SerializationFailure};

use crate::error::CoreResult;
use crate::manifest::Manifest;
use crate::types::EntityTypeId;
use serde_json::Value;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// An uploaded archive: the name it was submitted under and its bytes.
#[derive(Debug)]
pub struct ArchiveSource<R> {
    name: String,
    reader: R,
}

impl<R: Read + Seek> ArchiveSource<R> {
    /// Pairs an upload name with a reader.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }

    /// Returns the upload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying reader.
    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns the total size in bytes, leaving the reader at its start.
    pub fn size(&mut self) -> CoreResult<u64> {
        let len = self.reader.seek(SeekFrom::End(0))?;
        self.reader.rewind()?;
        Ok(len)
    }

    /// Moves the reader back to its start.
    pub fn rewind(&mut self) -> CoreResult<()> {
        self.reader.rewind()?;
        Ok(())
    }

    /// Consumes the source, returning the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ArchiveSource<Cursor<Vec<u8>>> {
    /// Wraps in-memory archive bytes.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(name, Cursor::new(data))
    }
}

impl ArchiveSource<File> {
    /// Opens an archive on disk, named after its file name.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, File::open(path)?))
    }
}

/// The records of one entity type as found in an archive.
///
/// Records have been checked for shape only (objects with `type` and
/// `fields`); they are decoded per entity type during restore.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    /// Entity type derived from the entry path.
    pub entity_type: EntityTypeId,
    /// Raw records in archive order.
    pub records: Vec<Value>,
}

/// Everything extracted from a validated archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveContents {
    /// The archive's manifest.
    pub manifest: Manifest,
    /// Data entries in archive order.
    pub entries: Vec<DataEntry>,
}

impl ArchiveContents {
    /// Returns the entity types present, in archive order.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeId> {
        self.entries.iter().map(|e| &e.entity_type)
    }

    /// Returns the entry for an entity type.
    #[must_use]
    pub fn entry(&self, entity_type: &EntityTypeId) -> Option<&DataEntry> {
        self.entries.iter().find(|e| &e.entity_type == entity_type)
    }

    /// Returns the number of records across all entries.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.entries.iter().map(|e| e.records.len()).sum()
    }
}
