//! Extraction of validated archives.

use super::validator::{open_zip, read_manifest};
use super::{ArchiveContents, ArchiveSource, ArchiveValidator, DataEntry};
use crate::error::CoreResult;
use crate::manifest::MANIFEST_ENTRY;
use crate::types::EntityTypeId;
use std::io::{Read, Seek};

/// Reads the manifest and data entries out of an archive.
///
/// Callers are expected to have run [`ArchiveValidator::validate`] first;
/// the reader only re-checks record shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveReader;

impl ArchiveReader {
    /// Extracts every data entry in archive order.
    ///
    /// Only `namespace/name.json` entries are data; anything else besides
    /// the manifest is ignored. Fails closed if any data entry does not
    /// have the record shape. On success the source is rewound.
    pub fn read<R: Read + Seek>(source: &mut ArchiveSource<R>) -> CoreResult<ArchiveContents> {
        let contents = {
            let mut zip = open_zip(source.reader_mut())?;
            let manifest = read_manifest(&mut zip)?;

            let mut entries = Vec::new();
            for index in 0..zip.len() {
                let mut file = zip.by_index(index)?;
                if file.is_dir() || file.name() == MANIFEST_ENTRY {
                    continue;
                }
                let name = file.name().to_string();
                let Some(entity_type) = EntityTypeId::from_entry_path(&name) else {
                    tracing::debug!(entry = %name, "ignoring non-data entry");
                    continue;
                };

                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                let records = ArchiveValidator::validate_records(&name, &data)?;
                entries.push(DataEntry {
                    entity_type,
                    records,
                });
            }

            ArchiveContents { manifest, entries }
        };

        source.rewind()?;
        tracing::debug!(
            archive = source.name(),
            entries = contents.entries.len(),
            records = contents.total_records(),
            "extracted archive"
        );
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};
    use serde_json::json;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(entries: &[(&str, String)]) -> ArchiveSource<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let manifest = json!({
            "version": "1.0",
            "timestamp": "2024-01-01T00:00:00+00:00",
            "database_engine": "x"
        });
        zip.start_file(MANIFEST_ENTRY, SimpleFileOptions::default())
            .unwrap();
        zip.write_all(manifest.to_string().as_bytes()).unwrap();
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        ArchiveSource::from_bytes("backup.zip", zip.finish().unwrap().into_inner())
    }

    #[test]
    fn reads_data_entries_in_archive_order() {
        let child = json!([{"type": "app.child", "pk": 1, "fields": {"parent": ["Ada"]}}]);
        let parent = json!([
            {"type": "app.parent", "pk": 1, "fields": {"name": "Ada"}},
            {"type": "app.parent", "pk": 2, "fields": {"name": "Bea"}}
        ]);
        let mut source = archive(&[
            ("app/child.json", child.to_string()),
            ("README.txt", "hello".to_string()),
            ("nested/deeper/x.json", "[]".to_string()),
            ("app/parent.json", parent.to_string()),
        ]);

        let contents = ArchiveReader::read(&mut source).unwrap();
        let types: Vec<String> = contents.entity_types().map(ToString::to_string).collect();
        assert_eq!(types, vec!["app.child", "app.parent"]);
        assert_eq!(contents.total_records(), 3);
        assert_eq!(
            contents
                .entry(&EntityTypeId::new("app", "parent"))
                .map(|e| e.records.len()),
            Some(2)
        );
        assert_eq!(contents.manifest.database_engine, "x");
    }

    #[test]
    fn malformed_entry_fails_whole_archive() {
        let mut source = archive(&[
            ("app/parent.json", "[]".to_string()),
            ("app/child.json", json!({"not": "a list"}).to_string()),
        ]);
        let err = ArchiveReader::read(&mut source).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidData { ref entry, .. })
                if entry == "app/child.json"
        ));
    }
}
