//! End-to-end backup and restore through the service facade.

use proptest::prelude::*;
use snapvault_core::{
    ArchiveSource, BackupConfig, Config, CoreError, MemoryStore, RecordStore, Requester,
    MANIFEST_ENTRY,
};
use snapvault_testkit::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use zip::{CompressionMethod, ZipArchive};

fn entry_names(data: &[u8]) -> Vec<String> {
    let zip = ZipArchive::new(Cursor::new(data)).unwrap();
    zip.file_names().map(str::to_string).collect()
}

#[test]
fn round_trip_preserves_content_and_counts() {
    let harness = BackupHarness::family();
    let trip = harness.round_trip().unwrap();

    assert!(trip.result.success);
    assert!(trip.result.errors.is_empty());
    assert_eq!(trip.result.records_restored, FAMILY_RECORDS);
    assert_eq!(
        trip.archive.manifest.total_records,
        Some(FAMILY_RECORDS as u64)
    );
    assert_eq!(
        trip.archive.manifest.entity_types_count,
        Some(FAMILY_ENTITY_TYPES as u64)
    );

    for label in [
        "auth.user",
        "auth.group",
        "family.parent",
        "family.child",
        "family.feeding",
        "family.note",
    ] {
        assert_eq!(
            harness.source.count(label),
            harness.destination.count(label),
            "{label}"
        );
    }
    harness.assert_equivalent();
}

#[test]
fn archive_layout_and_manifest() {
    let source = TestStore::populated();
    let archive = source
        .service()
        .create_backup(&Requester::new("ada").with_timezone("Europe/London"))
        .unwrap();

    let names = entry_names(&archive.data);
    assert_eq!(names[0], MANIFEST_ENTRY);
    assert_eq!(
        &names[1..],
        [
            "auth/user.json",
            "auth/group.json",
            "family/feeding.json",
            "family/note.json",
            "family/child.json",
            "family/parent.json",
        ]
    );

    let manifest = &archive.manifest;
    assert_eq!(manifest.version, "1.0");
    assert_eq!(manifest.database_engine, MemoryStore::ENGINE);
    assert_eq!(manifest.app_version.as_deref(), Some(snapvault_core::VERSION));
    assert_eq!(manifest.created_by.as_deref(), Some("ada"));
    assert_eq!(manifest.timezone.as_deref(), Some("Europe/London"));
    assert!(!manifest.includes_media);
    assert!(archive.filename.starts_with("backup_"));
    assert!(archive.filename.ends_with(".zip"));
    assert!(archive.diagnostics.is_empty());
}

#[test]
fn excluded_and_empty_types_are_not_archived() {
    let source = TestStore::empty();
    source.insert("auth.user", serde_json::json!({"username": "admin"}));
    source.insert("sessions.session", serde_json::json!({"session_key": "k"}));

    let archive = source.service().create_backup(&Requester::new("admin")).unwrap();
    assert_eq!(entry_names(&archive.data), [MANIFEST_ENTRY, "auth/user.json"]);
    assert_eq!(archive.manifest.entity_types_count, Some(1));
    assert_eq!(archive.manifest.total_records, Some(1));
}

#[test]
fn empty_store_backs_up_to_manifest_only() {
    let archive = TestStore::empty()
        .service()
        .create_backup(&Requester::new("admin"))
        .unwrap();
    assert_eq!(entry_names(&archive.data), [MANIFEST_ENTRY]);
    assert_eq!(archive.manifest.total_records, Some(0));

    let harness = BackupHarness::new(TestStore::empty());
    let result = harness.restore(&archive, false).unwrap();
    assert!(result.success);
    assert_eq!(result.records_restored, 0);
    assert!(result.load_order.is_empty());
}

#[test]
fn unknown_timezone_is_rejected() {
    let err = TestStore::populated()
        .service()
        .create_backup(&Requester::new("admin").with_timezone("Mars/Olympus_Mons"))
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTimezone { .. }));
}

#[test]
fn uncompressed_archives_round_trip() {
    let config = Config::default().with_backup(BackupConfig::new().compression_level(0));
    let harness = BackupHarness::family().with_config(config);

    let trip = harness.round_trip().unwrap();
    let mut zip = ZipArchive::new(Cursor::new(&trip.archive.data)).unwrap();
    for index in 0..zip.len() {
        assert_eq!(zip.by_index(index).unwrap().compression(), CompressionMethod::Stored);
    }
    assert!(trip.result.success);
    harness.assert_equivalent();
}

#[test]
fn restoring_twice_is_idempotent() {
    let harness = BackupHarness::family();
    let archive = harness.backup().unwrap();

    harness.restore(&archive, false).unwrap();
    let first = harness.destination.content();
    let total = harness.destination.store.total_count();

    let again = harness.restore(&archive, false).unwrap();
    assert!(again.errors.is_empty());
    assert_eq!(harness.destination.content(), first);
    assert_eq!(harness.destination.store.total_count(), total);
}

#[test]
fn clear_existing_replaces_unprotected_data() {
    let harness = BackupHarness::family();
    let archive = harness.backup().unwrap();

    // Records absent from the archive disappear unless their type is protected.
    harness
        .destination
        .insert("auth.user", serde_json::json!({"username": "local"}));
    harness
        .destination
        .insert("family.parent", serde_json::json!({"name": "Stranger"}));

    let result = harness.restore(&archive, true).unwrap();
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.records_restored, FAMILY_RECORDS);
    assert_eq!(result.entity_types_restored, FAMILY_ENTITY_TYPES);
    assert_eq!(harness.destination.count("family.parent"), 2);
    assert_eq!(harness.destination.count("auth.user"), 3);
}

#[test]
fn metadata_read_leaves_upload_restorable() {
    let source = TestStore::populated();
    let archive = source.service().create_backup(&Requester::new("admin")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(&archive.filename);
    std::fs::write(&path, &archive.data).unwrap();

    let destination = TestStore::empty();
    let service = destination.service();
    let mut upload = ArchiveSource::open(&path).unwrap();
    assert_eq!(upload.name(), archive.filename);

    let manifest = service.get_backup_metadata(&mut upload).unwrap();
    assert_eq!(manifest, archive.manifest);
    assert_eq!(destination.store.total_count(), 0);

    let result = service.restore_from_backup(&mut upload, false).unwrap();
    assert_eq!(result.records_restored, FAMILY_RECORDS);
}

#[test]
fn restored_store_survives_snapshot_file() {
    let harness = BackupHarness::family();
    harness.round_trip().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    harness.destination.store.save_snapshot(&path).unwrap();

    let reopened = MemoryStore::open_snapshot(&path, Arc::clone(harness.catalog())).unwrap();
    let reopened = TestStore {
        catalog: Arc::clone(harness.catalog()),
        store: Arc::new(reopened),
    };
    assert_eq!(reopened.content(), harness.source.content());
}

#[test]
fn load_plan_writes_nothing() {
    let harness = BackupHarness::family();
    let archive = harness.backup().unwrap();

    let plan = harness
        .destination
        .service()
        .load_plan(&mut upload(&archive))
        .unwrap();
    assert_eq!(plan.manifest, archive.manifest);
    assert!(plan.order.is_acyclic());
    assert!(plan.skipped.is_empty());
    assert_eq!(
        plan.records.iter().map(|(_, n)| n).sum::<usize>(),
        FAMILY_RECORDS
    );
    assert_eq!(harness.destination.store.total_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn generated_catalogs_round_trip(shape in catalog_shape_strategy(6)) {
        let catalog = shape.catalog().unwrap();
        let source = TestStore::with_catalog(Arc::clone(&catalog));
        shape.populate(&source.store).unwrap();

        let harness = BackupHarness::new(source);
        let trip = harness.round_trip().unwrap();
        prop_assert!(trip.result.errors.is_empty(), "{:?}", trip.result.errors);
        prop_assert_eq!(trip.result.records_restored, shape.records.iter().sum::<usize>());

        for index in 0..shape.len() {
            let entity_type = CatalogShape::entity_type(index);
            prop_assert_eq!(
                harness.destination.store.count(&entity_type).unwrap(),
                shape.records[index]
            );
        }
        prop_assert_eq!(harness.source.content(), harness.destination.content());
    }
}
