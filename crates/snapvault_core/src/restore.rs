//! Transactional restore of archive contents into a store.
//!
//! A restore runs inside a single store transaction:
//!
//! 1. Optionally clear every entity type present in the archive, children
//!    first, skipping protected types. Any failure here aborts the restore.
//! 2. Load entity types parents first. Each type loads under its own
//!    savepoint; a failure rolls back just that type, is recorded, and the
//!    restore moves on to the next type.
//!
//! If the restore aborts, nothing it did is kept.

use crate::archive::ArchiveContents;
use crate::catalog::{EntityCatalog, EntityTypeDescriptor};
use crate::codec::decode_record;
use crate::config::RestoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::graph::DependencyGraph;
use crate::record::ArchiveRecord;
use crate::store::{RecordStore, StoreTransaction};
use crate::types::EntityTypeId;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Where a restore is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePhase {
    /// Planning the load order.
    Validating,
    /// Deleting existing records.
    Clearing,
    /// Loading the records of one entity type.
    Loading(EntityTypeId),
    /// Finished and committed.
    Completed,
    /// Stopped by a fatal error and rolled back.
    Aborted,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Clearing => write!(f, "clearing"),
            Self::Loading(entity_type) => write!(f, "loading {entity_type}"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What happened to one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Every record was written; holds the record count.
    Restored(usize),
    /// The type was rolled back; holds the reason.
    Failed(String),
}

/// Outcome of one attempted entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeReport {
    /// The entity type.
    pub entity_type: EntityTypeId,
    /// Its outcome.
    pub outcome: LoadOutcome,
}

/// Summary of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    /// False only when the restore aborted.
    pub success: bool,
    /// Number of entity types loaded completely.
    pub entity_types_restored: usize,
    /// Number of records written across those types.
    pub records_restored: usize,
    /// Human-readable failures, in the order they happened.
    pub errors: Vec<String>,
    /// Entity types in the order they were attempted.
    pub load_order: Vec<EntityTypeId>,
    /// Archive entity types unknown to the catalog.
    pub skipped: Vec<EntityTypeId>,
    /// Per-type outcomes, in load order.
    pub reports: Vec<EntityTypeReport>,
}

impl RestoreResult {
    fn record(&mut self, entity_type: &EntityTypeId, outcome: LoadOutcome) {
        match &outcome {
            LoadOutcome::Restored(count) => {
                self.entity_types_restored += 1;
                self.records_restored += count;
            }
            LoadOutcome::Failed(message) => {
                self.errors
                    .push(format!("Error restoring {entity_type}: {message}"));
            }
        }
        self.reports.push(EntityTypeReport {
            entity_type: entity_type.clone(),
            outcome,
        });
    }

    /// Returns the entity types that failed to load.
    pub fn failed(&self) -> impl Iterator<Item = &EntityTypeId> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, LoadOutcome::Failed(_)))
            .map(|r| &r.entity_type)
    }
}

/// Applies archive contents to a store.
pub struct RestoreTransaction<'a, S> {
    catalog: &'a EntityCatalog,
    store: &'a S,
    config: &'a RestoreConfig,
    phase: RestorePhase,
}

impl<'a, S: RecordStore> RestoreTransaction<'a, S> {
    /// Creates a restore over `store`.
    pub fn new(catalog: &'a EntityCatalog, store: &'a S, config: &'a RestoreConfig) -> Self {
        Self {
            catalog,
            store,
            config,
            phase: RestorePhase::Validating,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> &RestorePhase {
        &self.phase
    }

    fn transition(&mut self, phase: RestorePhase) {
        tracing::debug!(from = %self.phase, to = %phase, "restore phase");
        self.phase = phase;
    }

    /// Restores `contents`, clearing existing records first if asked.
    ///
    /// Per-type failures are reported in the result. A fatal failure rolls
    /// everything back and returns [`CoreError::RestoreAborted`].
    pub fn run(
        &mut self,
        contents: &ArchiveContents,
        clear_existing: bool,
    ) -> CoreResult<RestoreResult> {
        let (graph, skipped) = DependencyGraph::build(self.catalog, contents.entity_types());
        for entity_type in &skipped {
            tracing::warn!(entity_type = %entity_type, "skipping unknown entity type");
        }
        let plan = graph.load_order();

        tracing::info!(
            entity_types = plan.order.len(),
            records = contents.total_records(),
            clear_existing,
            "starting restore"
        );

        let mut result = RestoreResult {
            success: true,
            load_order: plan.order.clone(),
            skipped,
            ..RestoreResult::default()
        };

        let store = self.store;
        let applied = store.transaction(|txn| {
            if clear_existing {
                self.transition(RestorePhase::Clearing);
                self.clear(txn, &plan.order)?;
            }

            for entity_type in &plan.order {
                let Some(entry) = contents.entry(entity_type) else {
                    continue;
                };
                self.transition(RestorePhase::Loading(entity_type.clone()));
                let descriptor = self.catalog.require(entity_type)?;
                let outcome = self.load(txn, descriptor, &entry.records)?;
                result.record(entity_type, outcome);
            }
            Ok(())
        });

        match applied {
            Ok(()) => {
                self.transition(RestorePhase::Completed);
                tracing::info!(
                    entity_types = result.entity_types_restored,
                    records = result.records_restored,
                    errors = result.errors.len(),
                    "restore completed"
                );
                Ok(result)
            }
            Err(err) => {
                self.transition(RestorePhase::Aborted);
                let reason = err.to_string();
                tracing::warn!(reason = %reason, "restore aborted");
                result.success = false;
                result.errors.push(format!("Restore failed: {reason}"));
                Err(CoreError::RestoreAborted {
                    reason,
                    result: Box::new(result),
                })
            }
        }
    }

    fn clear(&self, txn: &mut dyn StoreTransaction, order: &[EntityTypeId]) -> CoreResult<()> {
        for entity_type in order.iter().rev() {
            if self.config.is_protected(entity_type) {
                tracing::debug!(entity_type = %entity_type, "protected; not cleared");
                continue;
            }
            let removed = txn
                .clear(entity_type)
                .map_err(|err| CoreError::clear(entity_type, err))?;
            tracing::debug!(entity_type = %entity_type, removed, "cleared");
        }
        Ok(())
    }

    /// Loads one entity type under a savepoint.
    ///
    /// Only savepoint bookkeeping errors escape; record failures become
    /// [`LoadOutcome::Failed`].
    fn load(
        &self,
        txn: &mut dyn StoreTransaction,
        descriptor: &EntityTypeDescriptor,
        records: &[Value],
    ) -> CoreResult<LoadOutcome> {
        let savepoint = txn.savepoint();
        match self.load_records(txn, descriptor, records) {
            Ok(count) => {
                txn.release(savepoint)?;
                tracing::debug!(entity_type = %descriptor.id, records = count, "restored");
                Ok(LoadOutcome::Restored(count))
            }
            Err(err) => {
                txn.rollback_to(savepoint)?;
                tracing::warn!(
                    entity_type = %descriptor.id,
                    error = %err,
                    "entity type rolled back"
                );
                Ok(LoadOutcome::Failed(err.to_string()))
            }
        }
    }

    fn load_records(
        &self,
        txn: &mut dyn StoreTransaction,
        descriptor: &EntityTypeDescriptor,
        records: &[Value],
    ) -> CoreResult<usize> {
        for raw in records {
            let record: ArchiveRecord = serde_json::from_value(raw.clone())
                .map_err(|e| CoreError::deserialization(e.to_string()))?;
            let (id, fields) = decode_record(self.catalog, &*txn, descriptor, record)?;
            txn.put(&descriptor.id, id, fields)?;
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DataEntry;
    use crate::catalog::CatalogBuilder;
    use crate::config::CatalogConfig;
    use crate::manifest::Manifest;
    use crate::record::FieldMap;
    use crate::store::MemoryStore;
    use crate::types::RecordId;
    use serde_json::json;
    use std::sync::Arc;

    fn id(label: &str) -> EntityTypeId {
        EntityTypeId::parse(label).unwrap()
    }

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn catalog() -> Arc<EntityCatalog> {
        let mut builder = CatalogBuilder::new(CatalogConfig::empty());
        builder
            .register(
                EntityTypeDescriptor::new(id("auth.user"))
                    .field("username")
                    .natural_key(["username"]),
            )
            .unwrap()
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
            .register(
                EntityTypeDescriptor::new(id("app.note"))
                    .field("text")
                    .foreign_key("parent", id("app.parent")),
            )
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    fn contents(entries: Vec<(&str, Value)>) -> ArchiveContents {
        ArchiveContents {
            manifest: Manifest {
                version: "1.0".into(),
                timestamp: "2024-01-01T00:00:00+00:00".into(),
                database_engine: "test".into(),
                app_version: None,
                entity_types_count: None,
                total_records: None,
                includes_media: false,
                created_by: None,
                timezone: None,
            },
            entries: entries
                .into_iter()
                .map(|(label, records)| DataEntry {
                    entity_type: id(label),
                    records: records.as_array().cloned().unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn family() -> ArchiveContents {
        contents(vec![
            (
                "app.child",
                json!([
                    {"type": "app.child", "pk": 1, "fields": {"name": "Bo", "parent": ["Ada"]}},
                    {"type": "app.child", "pk": 2, "fields": {"name": "Cy", "parent": ["Ada"]}}
                ]),
            ),
            (
                "app.parent",
                json!([{"type": "app.parent", "pk": 7, "fields": {"name": "Ada"}}]),
            ),
        ])
    }

    #[test]
    fn restores_parents_before_children() {
        let store = MemoryStore::new(catalog());
        let config = RestoreConfig::default();
        let mut restore = RestoreTransaction::new(store.catalog(), &store, &config);
        assert_eq!(restore.phase(), &RestorePhase::Validating);

        let result = restore.run(&family(), false).unwrap();

        assert!(result.success);
        assert_eq!(result.entity_types_restored, 2);
        assert_eq!(result.records_restored, 3);
        assert!(result.errors.is_empty());
        assert_eq!(result.load_order, vec![id("app.parent"), id("app.child")]);
        assert_eq!(restore.phase(), &RestorePhase::Completed);

        let parent = store.records(&id("app.parent")).unwrap();
        assert_eq!(parent.len(), 1);
        for child in store.records(&id("app.child")).unwrap() {
            assert_eq!(child.reference("parent"), Some(parent[0].id));
        }
    }

    #[test]
    fn failing_type_is_rolled_back_and_reported() {
        let store = MemoryStore::new(catalog());
        let config = RestoreConfig::default();
        let archive = contents(vec![
            (
                "app.parent",
                json!([{"type": "app.parent", "pk": 1, "fields": {"name": "Ada"}}]),
            ),
            (
                "app.child",
                json!([
                    {"type": "app.child", "pk": 1, "fields": {"name": "Bo", "parent": ["Ada"]}},
                    {"type": "app.child", "pk": 2, "fields": {"name": "Cy", "parent": ["Nobody"]}}
                ]),
            ),
            (
                "app.note",
                json!([{"type": "app.note", "pk": 1, "fields": {"text": "hi", "parent": ["Ada"]}}]),
            ),
        ]);

        let result = RestoreTransaction::new(store.catalog(), &store, &config)
            .run(&archive, false)
            .unwrap();

        assert!(result.success);
        assert_eq!(result.entity_types_restored, 2);
        assert_eq!(result.records_restored, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Error restoring app.child: "));
        assert_eq!(result.failed().collect::<Vec<_>>(), vec![&id("app.child")]);
        // No half-loaded type: the valid first child was rolled back too.
        assert_eq!(store.count(&id("app.child")).unwrap(), 0);
        assert_eq!(store.count(&id("app.note")).unwrap(), 1);
    }

    #[test]
    fn record_type_mismatch_fails_that_type() {
        let store = MemoryStore::new(catalog());
        let config = RestoreConfig::default();
        let archive = contents(vec![(
            "app.parent",
            json!([{"type": "app.child", "pk": 1, "fields": {"name": "Ada"}}]),
        )]);

        let result = RestoreTransaction::new(store.catalog(), &store, &config)
            .run(&archive, false)
            .unwrap();
        assert_eq!(result.entity_types_restored, 0);
        assert!(matches!(
            result.reports[0].outcome,
            LoadOutcome::Failed(_)
        ));
    }

    #[test]
    fn unknown_types_are_skipped() {
        let store = MemoryStore::new(catalog());
        let config = RestoreConfig::default();
        let archive = contents(vec![
            ("legacy.widget", json!([{"type": "legacy.widget", "pk": 1, "fields": {}}])),
            (
                "app.parent",
                json!([{"type": "app.parent", "pk": 1, "fields": {"name": "Ada"}}]),
            ),
        ]);

        let result = RestoreTransaction::new(store.catalog(), &store, &config)
            .run(&archive, false)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.skipped, vec![id("legacy.widget")]);
        assert_eq!(result.load_order, vec![id("app.parent")]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn clear_replaces_data_but_spares_protected_types() {
        let store = MemoryStore::new(catalog());
        store
            .insert(&id("auth.user"), fields(json!({"username": "admin"})))
            .unwrap();
        let old = store
            .insert(&id("app.parent"), fields(json!({"name": "Old"})))
            .unwrap();
        store
            .insert(
                &id("app.child"),
                fields(json!({"name": "Stale", "parent": old.as_u64()})),
            )
            .unwrap();

        let mut archive = family();
        archive.entries.push(DataEntry {
            entity_type: id("auth.user"),
            records: vec![json!({"type": "auth.user", "pk": 5, "fields": {"username": "eve"}})],
        });

        let config = RestoreConfig::default();
        let result = RestoreTransaction::new(store.catalog(), &store, &config)
            .run(&archive, true)
            .unwrap();

        assert!(result.success, "{:?}", result.errors);
        let names: Vec<Value> = store
            .records(&id("app.parent"))
            .unwrap()
            .into_iter()
            .map(|r| r.fields["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("Ada")]);
        assert_eq!(store.count(&id("app.child")).unwrap(), 2);
        // auth.user is protected: admin survives alongside the restored user.
        assert_eq!(store.count(&id("auth.user")).unwrap(), 2);
    }

    #[test]
    fn clear_failure_aborts_everything() {
        let store = MemoryStore::new(catalog());
        let ada = store
            .insert(&id("app.parent"), fields(json!({"name": "Ada"})))
            .unwrap();
        store
            .insert(
                &id("app.child"),
                fields(json!({"name": "Bo", "parent": ada.as_u64()})),
            )
            .unwrap();
        // A note outside the archive still references the parent.
        store
            .insert(
                &id("app.note"),
                fields(json!({"text": "keep", "parent": ada.as_u64()})),
            )
            .unwrap();

        let config = RestoreConfig::default();
        let mut restore = RestoreTransaction::new(store.catalog(), &store, &config);
        let (reason, result) = match restore.run(&family(), true) {
            Err(CoreError::RestoreAborted { reason, result }) => (reason, result),
            other => panic!("expected abort, got {other:?}"),
        };

        assert!(reason.contains("failed to clear app.parent"), "{reason}");
        assert!(!result.success);
        assert_eq!(
            result.errors.last().map(String::as_str),
            Some(format!("Restore failed: {reason}").as_str())
        );
        assert_eq!(restore.phase(), &RestorePhase::Aborted);

        // The child was cleared before the parent failed; that is undone too.
        assert_eq!(store.count(&id("app.parent")).unwrap(), 1);
        assert_eq!(store.count(&id("app.child")).unwrap(), 1);
        assert_eq!(
            store.get(&id("app.parent"), ada).unwrap().map(|r| r.id),
            Some(RecordId::new(1))
        );
    }

    #[test]
    fn restoring_twice_overwrites_instead_of_duplicating() {
        let store = MemoryStore::new(catalog());
        let config = RestoreConfig::default();
        for _ in 0..2 {
            let result = RestoreTransaction::new(store.catalog(), &store, &config)
                .run(&family(), false)
                .unwrap();
            assert!(result.errors.is_empty(), "{:?}", result.errors);
        }
        assert_eq!(store.count(&id("app.parent")).unwrap(), 1);
        assert_eq!(store.count(&id("app.child")).unwrap(), 2);
    }

    #[test]
    fn result_serializes_for_reporting() {
        let mut result = RestoreResult {
            success: true,
            ..RestoreResult::default()
        };
        result.record(&id("app.parent"), LoadOutcome::Restored(3));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["entity_types_restored"], json!(1));
        assert_eq!(value["reports"][0]["outcome"], json!({"restored": 3}));
    }
}
