//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod plan;
pub mod restore;

use snapvault_core::{BackupService, CatalogConfig, Config, EntityCatalog, MemoryStore};
use std::path::Path;
use std::sync::Arc;

/// Loads the catalog and, if the snapshot exists, the store.
///
/// A missing snapshot yields an empty store.
pub fn open_service(
    schema: &Path,
    store: Option<&Path>,
) -> Result<BackupService<MemoryStore>, Box<dyn std::error::Error>> {
    let catalog = Arc::new(EntityCatalog::load_schema(schema, CatalogConfig::default())?);
    let store = match store {
        Some(path) if path.exists() => MemoryStore::open_snapshot(path, Arc::clone(&catalog))?,
        _ => MemoryStore::new(Arc::clone(&catalog)),
    };
    Ok(BackupService::new(catalog, Arc::new(store), Config::default()))
}
