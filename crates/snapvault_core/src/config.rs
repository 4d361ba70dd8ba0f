//! Backup and restore configuration.

use crate::types::EntityTypeId;
use std::collections::BTreeSet;

/// Default maximum archive size accepted for restore (100 MiB).
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;

/// Default deflate level for archive entries.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;

fn labels(ids: &[(&str, &str)]) -> BTreeSet<EntityTypeId> {
    ids.iter()
        .map(|(namespace, name)| EntityTypeId::new(*namespace, *name))
        .collect()
}

/// Configuration for building an entity catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Entity types never enumerated for backup (session state, audit logs,
    /// framework bookkeeping).
    pub excluded: BTreeSet<EntityTypeId>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            excluded: labels(&[
                ("contenttypes", "contenttype"),
                ("sessions", "session"),
                ("admin", "logentry"),
                ("axes", "accessattempt"),
                ("axes", "accesslog"),
                ("axes", "accessfailurelog"),
            ]),
        }
    }
}

impl CatalogConfig {
    /// Creates a configuration with the default denylist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that excludes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            excluded: BTreeSet::new(),
        }
    }

    /// Adds an entity type to the denylist.
    #[must_use]
    pub fn exclude(mut self, entity_type: EntityTypeId) -> Self {
        self.excluded.insert(entity_type);
        self
    }
}

/// Configuration for writing archives.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Archive format version written to the manifest.
    pub format_version: String,

    /// Version of the application producing the archive.
    pub app_version: String,

    /// IANA timezone used when the requester has none.
    pub default_timezone: String,

    /// Deflate level (0-9) for archive entries.
    pub compression_level: u8,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            format_version: crate::manifest::FORMAT_VERSION.to_string(),
            app_version: crate::VERSION.to_string(),
            default_timezone: "UTC".to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl BackupConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application version recorded in manifests.
    #[must_use]
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    /// Sets the fallback timezone.
    #[must_use]
    pub fn default_timezone(mut self, tz: impl Into<String>) -> Self {
        self.default_timezone = tz.into();
        self
    }

    /// Sets the deflate level, clamped to 9.
    #[must_use]
    pub const fn compression_level(mut self, level: u8) -> Self {
        self.compression_level = if level > 9 { 9 } else { level };
        self
    }
}

/// Configuration for restoring archives.
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    /// Entity types never cleared, even when clearing is requested.
    pub protected: BTreeSet<EntityTypeId>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            protected: labels(&[
                ("auth", "user"),
                ("auth", "group"),
                ("auth", "permission"),
                ("contenttypes", "contenttype"),
            ]),
        }
    }
}

impl RestoreConfig {
    /// Creates a configuration with the default protected set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the protected set.
    #[must_use]
    pub fn protected<I>(mut self, entity_types: I) -> Self
    where
        I: IntoIterator<Item = EntityTypeId>,
    {
        self.protected = entity_types.into_iter().collect();
        self
    }

    /// Checks whether an entity type must not be cleared.
    #[must_use]
    pub fn is_protected(&self, entity_type: &EntityTypeId) -> bool {
        self.protected.contains(entity_type)
    }
}

/// Limits applied to uploaded archives.
#[derive(Debug, Clone)]
pub struct ArchiveLimits {
    /// Maximum archive size in bytes.
    pub max_size: u64,

    /// Accepted upload name extensions, lowercase with leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_ARCHIVE_SIZE,
            allowed_extensions: vec![".zip".to_string()],
        }
    }
}

impl ArchiveLimits {
    /// Creates limits with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum archive size.
    #[must_use]
    pub fn max_size(mut self, size: u64) -> Self {
        self.max_size = size;
        self
    }

    /// Checks whether an upload name carries an accepted extension.
    #[must_use]
    pub fn accepts_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

/// Aggregated configuration for the backup service.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Archive writing options.
    pub backup: BackupConfig,
    /// Restore options.
    pub restore: RestoreConfig,
    /// Upload limits.
    pub limits: ArchiveLimits,
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backup options.
    #[must_use]
    pub fn with_backup(mut self, backup: BackupConfig) -> Self {
        self.backup = backup;
        self
    }

    /// Sets the restore options.
    #[must_use]
    pub fn with_restore(mut self, restore: RestoreConfig) -> Self {
        self.restore = restore;
        self
    }

    /// Sets the upload limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }
}
