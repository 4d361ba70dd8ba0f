//! # SnapVault Core
//!
//! Whole-application backup and restore.
//!
//! This crate provides:
//! - An entity catalog describing every persistable entity type
//! - Archive writing (zip + JSON) with a descriptive manifest
//! - Fail-closed validation of uploaded archives
//! - Dependency-aware load ordering of entity types
//! - Transactional restore with per-type failure isolation
//! - A transactional in-memory record store

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod record;
pub mod restore;
pub mod service;
pub mod store;
pub mod types;

pub use archive::{
    generate_filename, ArchiveContents, ArchiveReader, ArchiveSource, ArchiveValidator,
    ArchiveWriter, BackupArchive, DataEntry, Requester, SerializationFailure,
};
pub use catalog::{
    CatalogBuilder, CatalogSchema, Component, EntityCatalog, EntityTypeDescriptor,
    FieldDescriptor,
};
pub use config::{ArchiveLimits, BackupConfig, CatalogConfig, Config, RestoreConfig};
pub use error::{CoreError, CoreResult, ValidationError};
pub use graph::{DependencyGraph, LoadOrder};
pub use manifest::{Manifest, FORMAT_VERSION, MANIFEST_ENTRY};
pub use record::{ArchiveRecord, FieldMap, NaturalKey, StoredRecord};
pub use restore::{
    EntityTypeReport, LoadOutcome, RestorePhase, RestoreResult, RestoreTransaction,
};
pub use service::{BackupService, LoadPlan};
pub use store::{
    MemoryStore, RecordStore, Savepoint, StoreSnapshot, StoreTransaction, TableSnapshot,
};
pub use types::{EntityTypeId, RecordId};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
