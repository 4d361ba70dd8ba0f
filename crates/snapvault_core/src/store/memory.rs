//! In-memory record store with eager constraint enforcement.

use crate::catalog::{EntityCatalog, EntityTypeDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::record::{FieldMap, NaturalKey, StoredRecord};
use crate::store::{RecordStore, Savepoint, StoreTransaction};
use crate::types::{EntityTypeId, RecordId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<RecordId, FieldMap>,
    next_id: u64,
}

impl Table {
    fn allocate(&mut self) -> CoreResult<RecordId> {
        let id = RecordId::new(self.next_id.max(1));
        self.reserve(id)?;
        Ok(id)
    }

    /// Keeps `id` and everything below it from being allocated again.
    ///
    /// The largest `u64` is rejected so the allocator never wraps.
    fn reserve(&mut self, id: RecordId) -> CoreResult<()> {
        let next = id
            .next()
            .ok_or_else(|| CoreError::deserialization(format!("record id {id} out of range")))?;
        self.next_id = self.next_id.max(next.as_u64());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    tables: BTreeMap<EntityTypeId, Table>,
}

impl StoreState {
    fn contains(&self, entity_type: &EntityTypeId, id: RecordId) -> bool {
        self.tables
            .get(entity_type)
            .is_some_and(|t| t.rows.contains_key(&id))
    }

    fn get(&self, entity_type: &EntityTypeId, id: RecordId) -> Option<StoredRecord> {
        self.tables
            .get(entity_type)
            .and_then(|t| t.rows.get(&id))
            .map(|fields| StoredRecord::new(id, fields.clone()))
    }
}

/// Serializable dump of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// One entry per non-empty entity type.
    pub tables: Vec<TableSnapshot>,
}

/// Records of one entity type inside a [`StoreSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Entity type of the records.
    pub entity_type: EntityTypeId,
    /// Records ordered by id.
    pub records: Vec<StoredRecord>,
}

/// A transactional in-memory store.
///
/// Constraints are enforced eagerly on every write:
/// - only registered entity types and declared fields are accepted
/// - foreign keys must point at existing records
/// - natural keys are unique per entity type
/// - clearing a type that other types still reference fails
///
/// ## Single-Writer Guarantee
///
/// Only one transaction runs at a time. Transactions work on a private copy
/// of the committed state which replaces it on commit. Starting a
/// transaction from inside another one deadlocks.
pub struct MemoryStore {
    catalog: Arc<EntityCatalog>,
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Engine name recorded in manifests.
    pub const ENGINE: &'static str = "snapvault.memory";

    /// Creates an empty store for the entity types of `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<EntityCatalog>) -> Self {
        Self {
            catalog,
            state: RwLock::new(StoreState::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the catalog the store validates against.
    #[must_use]
    pub fn catalog(&self) -> &Arc<EntityCatalog> {
        &self.catalog
    }

    /// Inserts a record in its own transaction and returns its id.
    pub fn insert(&self, entity_type: &EntityTypeId, fields: FieldMap) -> CoreResult<RecordId> {
        self.transaction(|txn| txn.put(entity_type, None, fields))
    }

    /// Returns the total number of records across all entity types.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.state.read().tables.values().map(|t| t.rows.len()).sum()
    }

    /// Dumps the committed state.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        let tables = state
            .tables
            .iter()
            .filter(|(_, table)| !table.rows.is_empty())
            .map(|(entity_type, table)| TableSnapshot {
                entity_type: entity_type.clone(),
                records: table
                    .rows
                    .iter()
                    .map(|(id, fields)| StoredRecord::new(*id, fields.clone()))
                    .collect(),
            })
            .collect();
        StoreSnapshot { tables }
    }

    /// Rebuilds a store from a snapshot, checking it against the catalog.
    pub fn from_snapshot(catalog: Arc<EntityCatalog>, snapshot: StoreSnapshot) -> CoreResult<Self> {
        let mut state = StoreState::default();
        for table in snapshot.tables {
            let descriptor = catalog.require(&table.entity_type)?;
            let entry = state.tables.entry(table.entity_type.clone()).or_default();
            for record in table.records {
                check_declared(descriptor, &record.fields)?;
                entry.reserve(record.id)?;
                entry.rows.insert(record.id, record.fields);
            }
        }

        for (entity_type, table) in &state.tables {
            let descriptor = catalog.require(entity_type)?;
            for fields in table.rows.values() {
                check_references(descriptor, fields, &state)?;
            }
        }

        Ok(Self {
            catalog,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    /// Loads a store from a JSON snapshot file.
    pub fn open_snapshot(path: &Path, catalog: Arc<EntityCatalog>) -> CoreResult<Self> {
        let data = std::fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&data)?;
        Self::from_snapshot(catalog, snapshot)
    }

    /// Writes the committed state to a JSON snapshot file.
    pub fn save_snapshot(&self, path: &Path) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(&self.snapshot())?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn engine(&self) -> &str {
        Self::ENGINE
    }

    fn records(&self, entity_type: &EntityTypeId) -> CoreResult<Vec<StoredRecord>> {
        self.catalog.require(entity_type)?;
        let state = self.state.read();
        Ok(state
            .tables
            .get(entity_type)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(id, fields)| StoredRecord::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn count(&self, entity_type: &EntityTypeId) -> CoreResult<usize> {
        self.catalog.require(entity_type)?;
        Ok(self
            .state
            .read()
            .tables
            .get(entity_type)
            .map_or(0, |t| t.rows.len()))
    }

    fn get(&self, entity_type: &EntityTypeId, id: RecordId) -> CoreResult<Option<StoredRecord>> {
        self.catalog.require(entity_type)?;
        Ok(self.state.read().get(entity_type, id))
    }

    fn transaction<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> CoreResult<T>,
    {
        let _write_guard = self.write_lock.lock();
        let mut txn = MemoryTransaction {
            catalog: &self.catalog,
            state: self.state.read().clone(),
            savepoints: Vec::new(),
        };

        match f(&mut txn) {
            Ok(value) => {
                *self.state.write() = txn.state;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entity_types", &self.catalog.len())
            .field("records", &self.total_count())
            .finish_non_exhaustive()
    }
}

struct MemoryTransaction<'a> {
    catalog: &'a EntityCatalog,
    state: StoreState,
    savepoints: Vec<StoreState>,
}

fn check_declared(descriptor: &EntityTypeDescriptor, fields: &FieldMap) -> CoreResult<()> {
    match fields.keys().find(|name| descriptor.get_field(name).is_none()) {
        Some(name) => Err(CoreError::unknown_field(&descriptor.id, name.as_str())),
        None => Ok(()),
    }
}

fn check_references(
    descriptor: &EntityTypeDescriptor,
    fields: &FieldMap,
    state: &StoreState,
) -> CoreResult<()> {
    for (field, target) in descriptor.foreign_keys() {
        let value = match fields.get(&field.name) {
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };
        let id = value.as_u64().map(RecordId::new).ok_or_else(|| {
            CoreError::deserialization(format!(
                "{}.{} must hold a record id, got {}",
                descriptor.id, field.name, value
            ))
        })?;
        if !state.contains(target, id) {
            return Err(CoreError::ForeignKeyViolation {
                entity_type: descriptor.id.clone(),
                field: field.name.clone(),
                target: target.clone(),
                id,
            });
        }
    }
    Ok(())
}

impl MemoryTransaction<'_> {
    fn find_in_state(
        &self,
        descriptor: &EntityTypeDescriptor,
        key: &NaturalKey,
    ) -> Option<RecordId> {
        let table = self.state.tables.get(&descriptor.id)?;
        table
            .rows
            .iter()
            .find(|(_, fields)| descriptor.natural_key_of(fields).as_ref() == Some(key))
            .map(|(id, _)| *id)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get(&self, entity_type: &EntityTypeId, id: RecordId) -> CoreResult<Option<StoredRecord>> {
        self.catalog.require(entity_type)?;
        Ok(self.state.get(entity_type, id))
    }

    fn find_by_natural_key(
        &self,
        entity_type: &EntityTypeId,
        key: &NaturalKey,
    ) -> CoreResult<Option<RecordId>> {
        let descriptor = self.catalog.require(entity_type)?;
        if !descriptor.supports_natural_key() {
            return Ok(None);
        }
        Ok(self.find_in_state(descriptor, key))
    }

    fn put(
        &mut self,
        entity_type: &EntityTypeId,
        id: Option<RecordId>,
        fields: FieldMap,
    ) -> CoreResult<RecordId> {
        let descriptor = self.catalog.require(entity_type)?;
        check_declared(descriptor, &fields)?;

        // Declaration order; declared fields missing from the input become null.
        let mut normalized = FieldMap::new();
        for field in &descriptor.fields {
            let value = fields.get(&field.name).cloned().unwrap_or(Value::Null);
            normalized.insert(field.name.clone(), value);
        }

        let table = self.state.tables.entry(entity_type.clone()).or_default();
        let id = match id {
            Some(id) => {
                table.reserve(id)?;
                id
            }
            None => table.allocate()?,
        };

        // A record may reference itself, so make it visible before checking.
        let previous = table.rows.insert(id, normalized.clone());
        let checked = check_references(descriptor, &normalized, &self.state).and_then(|()| {
            match descriptor.natural_key_of(&normalized) {
                Some(key) => match self.find_duplicate(descriptor, &key, id) {
                    Some(_) => Err(CoreError::UniqueViolation {
                        entity_type: entity_type.clone(),
                        key: key.to_string(),
                    }),
                    None => Ok(()),
                },
                None => Ok(()),
            }
        });

        if let Err(err) = checked {
            if let Some(table) = self.state.tables.get_mut(entity_type) {
                match previous {
                    Some(fields) => table.rows.insert(id, fields),
                    None => table.rows.remove(&id),
                };
            }
            return Err(err);
        }
        Ok(id)
    }

    fn clear(&mut self, entity_type: &EntityTypeId) -> CoreResult<usize> {
        self.catalog.require(entity_type)?;
        let ids: Vec<RecordId> = match self.state.tables.get(entity_type) {
            Some(table) if !table.rows.is_empty() => table.rows.keys().copied().collect(),
            _ => return Ok(0),
        };

        for descriptor in self.catalog.all_entity_types() {
            if descriptor.id == *entity_type {
                continue;
            }
            let Some(referrer) = self.state.tables.get(&descriptor.id) else {
                continue;
            };
            for (field, target) in descriptor.foreign_keys() {
                if target != entity_type {
                    continue;
                }
                let referenced = referrer.rows.values().any(|fields| {
                    fields
                        .get(&field.name)
                        .and_then(Value::as_u64)
                        .is_some_and(|id| ids.contains(&RecordId::new(id)))
                });
                if referenced {
                    return Err(CoreError::RestrictViolation {
                        entity_type: entity_type.clone(),
                        referrer: descriptor.id.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        let removed = ids.len();
        if let Some(table) = self.state.tables.get_mut(entity_type) {
            table.rows.clear();
        }
        Ok(removed)
    }

    fn savepoint(&mut self) -> Savepoint {
        self.savepoints.push(self.state.clone());
        Savepoint(self.savepoints.len() - 1)
    }

    fn rollback_to(&mut self, savepoint: Savepoint) -> CoreResult<()> {
        if savepoint.0 >= self.savepoints.len() {
            return Err(CoreError::invalid_operation("unknown savepoint"));
        }
        let mut discarded = self.savepoints.split_off(savepoint.0);
        self.state = discarded.swap_remove(0);
        Ok(())
    }

    fn release(&mut self, savepoint: Savepoint) -> CoreResult<()> {
        if savepoint.0 >= self.savepoints.len() {
            return Err(CoreError::invalid_operation("unknown savepoint"));
        }
        self.savepoints.truncate(savepoint.0);
        Ok(())
    }
}

impl MemoryTransaction<'_> {
    fn find_duplicate(
        &self,
        descriptor: &EntityTypeDescriptor,
        key: &NaturalKey,
        except: RecordId,
    ) -> Option<RecordId> {
        let table = self.state.tables.get(&descriptor.id)?;
        table
            .rows
            .iter()
            .filter(|(id, _)| **id != except)
            .find(|(_, fields)| descriptor.natural_key_of(fields).as_ref() == Some(key))
            .map(|(id, _)| *id)
    }
}
