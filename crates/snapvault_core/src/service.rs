//! Backup service facade.
//!
//! ## Usage
//!
//! ```ignore
//! use snapvault_core::{ArchiveSource, BackupService, Config, Requester};
//!
//! let service = BackupService::new(catalog, store, Config::default());
//!
//! let archive = service.create_backup(&Requester::new("admin"))?;
//! std::fs::write(&archive.filename, &archive.data)?;
//!
//! let mut upload = ArchiveSource::open(Path::new(&archive.filename))?;
//! let result = service.restore_from_backup(&mut upload, false)?;
//! ```

use crate::archive::{
    ArchiveReader, ArchiveSource, ArchiveValidator, ArchiveWriter, BackupArchive, Requester,
};
use crate::catalog::EntityCatalog;
use crate::config::Config;
use crate::error::CoreResult;
use crate::graph::{DependencyGraph, LoadOrder};
use crate::manifest::Manifest;
use crate::restore::{RestoreResult, RestoreTransaction};
use crate::store::RecordStore;
use crate::types::EntityTypeId;
use serde::Serialize;
use std::io::{Read, Seek};
use std::sync::Arc;

/// What a restore of an archive would do.
#[derive(Debug, Clone, Serialize)]
pub struct LoadPlan {
    /// The archive's manifest.
    pub manifest: Manifest,
    /// Load order of the known entity types.
    pub order: LoadOrder,
    /// Entity types the catalog does not know.
    pub skipped: Vec<EntityTypeId>,
    /// Record count per data entry, in archive order.
    pub records: Vec<(EntityTypeId, usize)>,
}

/// Entry point for creating, inspecting and restoring archives.
pub struct BackupService<S> {
    catalog: Arc<EntityCatalog>,
    store: Arc<S>,
    config: Config,
}

impl<S: RecordStore> BackupService<S> {
    /// Creates a service over `store`.
    pub fn new(catalog: Arc<EntityCatalog>, store: Arc<S>, config: Config) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<EntityCatalog> {
        &self.catalog
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validator(&self) -> ArchiveValidator {
        ArchiveValidator::new(self.config.limits.clone())
    }

    /// Creates an archive of every included, non-empty entity type.
    pub fn create_backup(&self, requester: &Requester) -> CoreResult<BackupArchive> {
        ArchiveWriter::new(&self.catalog, self.store.as_ref(), &self.config.backup).write(requester)
    }

    /// Validates an upload and returns its manifest without restoring it.
    pub fn get_backup_metadata<R: Read + Seek>(
        &self,
        source: &mut ArchiveSource<R>,
    ) -> CoreResult<Manifest> {
        self.validator().validate(source)
    }

    /// Validates an upload and computes the order its entity types would
    /// load in. Nothing is written.
    pub fn load_plan<R: Read + Seek>(&self, source: &mut ArchiveSource<R>) -> CoreResult<LoadPlan> {
        self.validator().validate(source)?;
        let contents = ArchiveReader::read(source)?;
        let (graph, skipped) = DependencyGraph::build(&self.catalog, contents.entity_types());
        let records = contents
            .entries
            .iter()
            .map(|e| (e.entity_type.clone(), e.records.len()))
            .collect();
        Ok(LoadPlan {
            manifest: contents.manifest,
            order: graph.load_order(),
            skipped,
            records,
        })
    }

    /// Validates an upload and restores it.
    ///
    /// Validation failures are returned before anything is written. See
    /// [`RestoreTransaction::run`] for how failures during the restore are
    /// handled.
    pub fn restore_from_backup<R: Read + Seek>(
        &self,
        source: &mut ArchiveSource<R>,
        clear_existing: bool,
    ) -> CoreResult<RestoreResult> {
        let manifest = self.validator().validate(source)?;
        tracing::info!(
            archive = source.name(),
            version = %manifest.version,
            created_by = manifest.created_by.as_deref().unwrap_or("unknown"),
            "restoring archive"
        );

        let contents = ArchiveReader::read(source)?;
        RestoreTransaction::new(&self.catalog, self.store.as_ref(), &self.config.restore)
            .run(&contents, clear_existing)
    }
}
