//! Archive creation.
//!
//! ## Layout
//!
//! ```text
//! metadata.json          manifest, always the first entry
//! {namespace}/{name}.json  one JSON array of records per non-empty entity type
//! ```
//!
//! Entries are deflated. Entity types appear in catalog registration order;
//! excluded and empty types are left out.

use crate::catalog::EntityCatalog;
use crate::codec::encode_records;
use crate::config::BackupConfig;
use crate::error::{CoreError, CoreResult};
use crate::manifest::{Manifest, MANIFEST_ENTRY};
use crate::store::RecordStore;
use crate::types::EntityTypeId;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Who asked for a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Recorded in the manifest as `created_by`.
    pub username: String,
    /// Preferred IANA timezone, if the user has one.
    pub timezone: Option<String>,
}

impl Requester {
    /// Creates a requester without a timezone preference.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            timezone: None,
        }
    }

    /// Sets the preferred timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Returns the requester's timezone name, or `default` when unset.
    #[must_use]
    pub fn timezone_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.timezone
            .as_deref()
            .filter(|tz| !tz.is_empty())
            .unwrap_or(default)
    }
}

/// An entity type left out of an archive because it could not be serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationFailure {
    /// The omitted entity type.
    pub entity_type: EntityTypeId,
    /// Why serialization failed.
    pub message: String,
}

/// A finished archive.
#[derive(Debug, Clone)]
pub struct BackupArchive {
    /// Zip bytes.
    pub data: Vec<u8>,
    /// Suggested download name, `backup_MMDDYY_HHMMSS.zip`.
    pub filename: String,
    /// The manifest written into the archive.
    pub manifest: Manifest,
    /// Entity types omitted because they failed to serialize.
    pub diagnostics: Vec<SerializationFailure>,
}

/// Formats the suggested archive name for a local time.
#[must_use]
pub fn generate_filename(local: &DateTime<Tz>) -> String {
    format!("backup_{}.zip", local.format("%m%d%y_%H%M%S"))
}

fn parse_timezone(name: &str) -> CoreResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::InvalidTimezone {
            name: name.to_string(),
        })
}

struct EncodedEntry {
    path: String,
    data: Vec<u8>,
    records: usize,
}

/// Serializes a store's entity types into an archive.
pub struct ArchiveWriter<'a, S> {
    catalog: &'a EntityCatalog,
    store: &'a S,
    config: &'a BackupConfig,
}

impl<'a, S: RecordStore> ArchiveWriter<'a, S> {
    /// Creates a writer over `store`.
    pub fn new(catalog: &'a EntityCatalog, store: &'a S, config: &'a BackupConfig) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    /// Writes an archive of the store's current state.
    pub fn write(&self, requester: &Requester) -> CoreResult<BackupArchive> {
        self.write_at(requester, Utc::now())
    }

    /// Writes an archive as if created at `now`.
    pub fn write_at(&self, requester: &Requester, now: DateTime<Utc>) -> CoreResult<BackupArchive> {
        let tz_name = requester.timezone_or(&self.config.default_timezone);
        let tz = parse_timezone(tz_name)?;
        let local = now.with_timezone(&tz);

        tracing::info!(user = %requester.username, timezone = tz_name, "creating backup");

        let (entries, diagnostics) = self.encode_entries();
        let manifest = Manifest {
            version: self.config.format_version.clone(),
            timestamp: local
                .fixed_offset()
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            database_engine: self.store.engine().to_string(),
            app_version: Some(self.config.app_version.clone()),
            entity_types_count: Some(entries.len() as u64),
            total_records: Some(entries.iter().map(|e| e.records as u64).sum()),
            includes_media: false,
            created_by: Some(requester.username.clone()),
            timezone: Some(tz_name.to_string()),
        };

        let data = self.pack(&manifest, &entries)?;
        tracing::info!(
            entity_types = entries.len(),
            records = manifest.total_records.unwrap_or_default(),
            omitted = diagnostics.len(),
            bytes = data.len(),
            "backup created"
        );

        Ok(BackupArchive {
            data,
            filename: generate_filename(&local),
            manifest,
            diagnostics,
        })
    }

    fn encode_entries(&self) -> (Vec<EncodedEntry>, Vec<SerializationFailure>) {
        let mut entries = Vec::new();
        let mut diagnostics = Vec::new();

        for descriptor in self.catalog.list_entity_types() {
            let encoded = self.store.count(&descriptor.id).and_then(|count| {
                if count == 0 {
                    return Ok(None);
                }
                let records = encode_records(self.catalog, self.store, descriptor)?;
                let data = serde_json::to_vec_pretty(&records)
                    .map_err(|e| CoreError::serialization(&descriptor.id, e.to_string()))?;
                Ok(Some(EncodedEntry {
                    path: descriptor.id.entry_path(),
                    data,
                    records: records.len(),
                }))
            });

            match encoded {
                Ok(Some(entry)) => {
                    tracing::debug!(
                        entity_type = %descriptor.id,
                        records = entry.records,
                        "serialized"
                    );
                    entries.push(entry);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        entity_type = %descriptor.id,
                        error = %err,
                        "omitting entity type from backup"
                    );
                    diagnostics.push(SerializationFailure {
                        entity_type: descriptor.id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        (entries, diagnostics)
    }

    fn pack(&self, manifest: &Manifest, entries: &[EncodedEntry]) -> CoreResult<Vec<u8>> {
        let level = self.config.compression_level.min(9);
        let options = if level == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(level.into()))
        };

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(&manifest.encode()?)?;

        for entry in entries {
            zip.start_file(entry.path.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, EntityTypeDescriptor};
    use crate::config::CatalogConfig;
    use crate::record::{FieldMap, StoredRecord};
    use crate::store::{MemoryStore, StoreTransaction};
    use crate::types::RecordId;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::io::Read;
    use std::sync::Arc;
    use zip::ZipArchive;

    fn id(label: &str) -> EntityTypeId {
        EntityTypeId::parse(label).unwrap()
    }

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store() -> MemoryStore {
        let mut builder = CatalogBuilder::new(CatalogConfig::default());
        builder
            .register(
                EntityTypeDescriptor::new(id("app.parent"))
                    .field("name")
                    .natural_key(["name"]),
            )
            .unwrap()
            .register(
                EntityTypeDescriptor::new(id("app.child"))
                    .field("name")
                    .foreign_key("parent", id("app.parent")),
            )
            .unwrap()
            .register(EntityTypeDescriptor::new(id("app.empty")).field("x"))
            .unwrap()
            .register(EntityTypeDescriptor::new(id("sessions.session")).field("key"))
            .unwrap();
        let store = MemoryStore::new(Arc::new(builder.build().unwrap()));

        let ada = store
            .insert(&id("app.parent"), fields(json!({"name": "Ada"})))
            .unwrap();
        store
            .insert(&id("app.parent"), fields(json!({"name": "Bea"})))
            .unwrap();
        store
            .insert(
                &id("app.child"),
                fields(json!({"name": "Cy", "parent": ada.as_u64()})),
            )
            .unwrap();
        store
            .insert(&id("sessions.session"), fields(json!({"key": "secret"})))
            .unwrap();
        store
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap()
    }

    fn entry_names(data: &[u8]) -> Vec<String> {
        let zip = ZipArchive::new(Cursor::new(data)).unwrap();
        zip.file_names().map(str::to_string).collect()
    }

    #[test]
    fn writes_manifest_first_and_skips_empty_and_excluded() {
        let store = store();
        let config = BackupConfig::default();
        let writer = ArchiveWriter::new(store.catalog(), &store, &config);
        let archive = writer.write_at(&Requester::new("admin"), now()).unwrap();

        assert_eq!(
            entry_names(&archive.data),
            vec!["metadata.json", "app/parent.json", "app/child.json"]
        );
        assert!(archive.diagnostics.is_empty());

        let manifest = &archive.manifest;
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.database_engine, MemoryStore::ENGINE);
        assert_eq!(manifest.entity_types_count, Some(2));
        assert_eq!(manifest.total_records, Some(3));
        assert_eq!(manifest.created_by.as_deref(), Some("admin"));
        assert_eq!(manifest.timezone.as_deref(), Some("UTC"));
        assert!(!manifest.includes_media);
    }

    #[test]
    fn child_references_parent_by_natural_key() {
        let store = store();
        let config = BackupConfig::default();
        let archive = ArchiveWriter::new(store.catalog(), &store, &config)
            .write_at(&Requester::new("admin"), now())
            .unwrap();

        let mut zip = ZipArchive::new(Cursor::new(archive.data)).unwrap();
        let mut data = String::new();
        zip.by_name("app/child.json")
            .unwrap()
            .read_to_string(&mut data)
            .unwrap();
        let records: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(
            records,
            json!([{"type": "app.child", "pk": 1, "fields": {"name": "Cy", "parent": ["Ada"]}}])
        );
        // Indented output.
        assert!(data.contains("\n  "));
    }

    #[test]
    fn timestamp_and_filename_follow_requester_timezone() {
        let store = store();
        let config = BackupConfig::default();
        let writer = ArchiveWriter::new(store.catalog(), &store, &config);

        let archive = writer
            .write_at(
                &Requester::new("admin").with_timezone("America/New_York"),
                now(),
            )
            .unwrap();
        assert_eq!(archive.filename, "backup_010224_100405.zip");
        assert_eq!(archive.manifest.timestamp, "2024-01-02T10:04:05.000000-05:00");
        assert_eq!(archive.manifest.timezone.as_deref(), Some("America/New_York"));

        let archive = writer.write_at(&Requester::new("admin"), now()).unwrap();
        assert_eq!(archive.filename, "backup_010224_150405.zip");
        assert_eq!(archive.manifest.timestamp, "2024-01-02T15:04:05.000000+00:00");
    }

    #[test]
    fn unknown_timezone_is_an_error() {
        let store = store();
        let config = BackupConfig::default().default_timezone("Mars/Olympus");
        let err = ArchiveWriter::new(store.catalog(), &store, &config)
            .write_at(&Requester::new("admin"), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimezone { .. }));
    }

    #[test]
    fn stored_compression_level() {
        let store = store();
        let config = BackupConfig::default().compression_level(0);
        let archive = ArchiveWriter::new(store.catalog(), &store, &config)
            .write_at(&Requester::new("admin"), now())
            .unwrap();
        let mut zip = ZipArchive::new(Cursor::new(archive.data)).unwrap();
        assert_eq!(
            zip.by_name("app/parent.json").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    /// Serves a child whose parent no longer exists.
    struct DanglingStore(MemoryStore);

    impl RecordStore for DanglingStore {
        fn engine(&self) -> &str {
            self.0.engine()
        }

        fn records(&self, entity_type: &EntityTypeId) -> CoreResult<Vec<StoredRecord>> {
            let mut records = self.0.records(entity_type)?;
            if entity_type == &id("app.child") {
                for record in &mut records {
                    record.fields.insert("parent".into(), json!(999));
                }
            }
            Ok(records)
        }

        fn count(&self, entity_type: &EntityTypeId) -> CoreResult<usize> {
            self.0.count(entity_type)
        }

        fn get(
            &self,
            entity_type: &EntityTypeId,
            id: RecordId,
        ) -> CoreResult<Option<StoredRecord>> {
            self.0.get(entity_type, id)
        }

        fn transaction<T, F>(&self, f: F) -> CoreResult<T>
        where
            F: FnOnce(&mut dyn StoreTransaction) -> CoreResult<T>,
        {
            self.0.transaction(f)
        }
    }

    #[test]
    fn serialization_failure_omits_only_that_type() {
        let inner = store();
        let catalog = Arc::clone(inner.catalog());
        let store = DanglingStore(inner);
        let config = BackupConfig::default();
        let archive = ArchiveWriter::new(&catalog, &store, &config)
            .write_at(&Requester::new("admin"), now())
            .unwrap();

        assert_eq!(
            entry_names(&archive.data),
            vec!["metadata.json", "app/parent.json"]
        );
        assert_eq!(archive.diagnostics.len(), 1);
        assert_eq!(archive.diagnostics[0].entity_type, id("app.child"));
        assert_eq!(archive.manifest.entity_types_count, Some(1));
        assert_eq!(archive.manifest.total_records, Some(2));
    }
}
