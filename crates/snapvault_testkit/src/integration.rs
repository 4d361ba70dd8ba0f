//! Backup-then-restore test harness.
//!
//! Drives a source store through a backup and restores the archive into a
//! fresh store over the same catalog, then compares the two.

use crate::fixtures::TestStore;
use snapvault_core::{
    ArchiveSource, BackupArchive, Config, CoreResult, EntityCatalog, Requester, RestoreResult,
};
use std::io::Cursor;
use std::sync::Arc;

/// Outcome of a round trip.
#[derive(Debug)]
pub struct RoundTrip {
    /// The archive that was written.
    pub archive: BackupArchive,
    /// The restore report.
    pub result: RestoreResult,
}

/// A source store and a destination store sharing one catalog.
pub struct BackupHarness {
    /// Store the backup is taken from.
    pub source: TestStore,
    /// Store the archive is restored into.
    pub destination: TestStore,
    config: Config,
}

impl BackupHarness {
    /// Creates a harness over `source`, with an empty destination.
    pub fn new(source: TestStore) -> Self {
        let destination = TestStore::with_catalog(Arc::clone(&source.catalog));
        Self {
            source,
            destination,
            config: Config::default(),
        }
    }

    /// Creates a harness over the populated family store.
    pub fn family() -> Self {
        Self::new(TestStore::populated())
    }

    /// Replaces the configuration used on both sides.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Returns the shared catalog.
    pub fn catalog(&self) -> &Arc<EntityCatalog> {
        &self.source.catalog
    }

    /// Backs up the source store.
    pub fn backup(&self) -> CoreResult<BackupArchive> {
        self.source
            .service_with(self.config.clone())
            .create_backup(&Requester::new("admin"))
    }

    /// Restores `archive` into the destination store.
    pub fn restore(
        &self,
        archive: &BackupArchive,
        clear_existing: bool,
    ) -> CoreResult<RestoreResult> {
        let mut upload = upload(archive);
        self.destination
            .service_with(self.config.clone())
            .restore_from_backup(&mut upload, clear_existing)
    }

    /// Backs up the source and restores it into the destination.
    pub fn round_trip(&self) -> CoreResult<RoundTrip> {
        let archive = self.backup()?;
        let result = self.restore(&archive, false)?;
        Ok(RoundTrip { archive, result })
    }

    /// Asserts that both stores hold the same records, ignoring ids.
    pub fn assert_equivalent(&self) {
        assert_eq!(
            self.source.content(),
            self.destination.content(),
            "restored store differs from source"
        );
    }
}

/// Wraps a written archive as an upload named after it.
pub fn upload(archive: &BackupArchive) -> ArchiveSource<Cursor<Vec<u8>>> {
    ArchiveSource::from_bytes(archive.filename.clone(), archive.data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FAMILY_ENTITY_TYPES, FAMILY_RECORDS};

    #[test]
    fn family_round_trip() {
        let harness = BackupHarness::family();
        let trip = harness.round_trip().unwrap();
        assert!(trip.result.success);
        assert_eq!(trip.result.records_restored, FAMILY_RECORDS);
        assert_eq!(trip.result.entity_types_restored, FAMILY_ENTITY_TYPES);
        harness.assert_equivalent();
    }
}
