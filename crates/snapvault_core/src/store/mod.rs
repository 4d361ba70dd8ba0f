//! Record storage seams.
//!
//! The backup path reads current records through [`RecordStore`]; the
//! restore path writes through a [`StoreTransaction`] obtained from
//! [`RecordStore::transaction`]. A transaction commits when its closure
//! returns `Ok` and rolls back entirely when it returns `Err`.

mod memory;

pub use memory::{MemoryStore, StoreSnapshot, TableSnapshot};

use crate::error::CoreResult;
use crate::record::{FieldMap, NaturalKey, StoredRecord};
use crate::types::{EntityTypeId, RecordId};

/// Marker for a point inside a transaction that can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub(crate) usize);

/// Source of current records and sink of restored ones.
pub trait RecordStore {
    /// Name of the storage engine, recorded in archive manifests.
    fn engine(&self) -> &str;

    /// Returns every committed record of an entity type, ordered by id.
    fn records(&self, entity_type: &EntityTypeId) -> CoreResult<Vec<StoredRecord>>;

    /// Returns the number of committed records of an entity type.
    fn count(&self, entity_type: &EntityTypeId) -> CoreResult<usize>;

    /// Gets a committed record by id.
    fn get(&self, entity_type: &EntityTypeId, id: RecordId) -> CoreResult<Option<StoredRecord>>;

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, every change made inside it is discarded.
    fn transaction<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> CoreResult<T>;
}

/// Mutating view of a store inside a transaction.
pub trait StoreTransaction {
    /// Gets a record by id, seeing this transaction's own writes.
    fn get(&self, entity_type: &EntityTypeId, id: RecordId) -> CoreResult<Option<StoredRecord>>;

    /// Finds the record of an entity type whose natural key equals `key`.
    fn find_by_natural_key(
        &self,
        entity_type: &EntityTypeId,
        key: &NaturalKey,
    ) -> CoreResult<Option<RecordId>>;

    /// Inserts or overwrites a record.
    ///
    /// With `Some(id)` the record at that id is replaced (or created);
    /// with `None` a fresh id is assigned. Returns the id written.
    fn put(
        &mut self,
        entity_type: &EntityTypeId,
        id: Option<RecordId>,
        fields: FieldMap,
    ) -> CoreResult<RecordId>;

    /// Deletes every record of an entity type, returning how many were removed.
    fn clear(&mut self, entity_type: &EntityTypeId) -> CoreResult<usize>;

    /// Marks the current state so later writes can be undone.
    fn savepoint(&mut self) -> Savepoint;

    /// Discards every write made after `savepoint`, and the savepoint itself.
    fn rollback_to(&mut self, savepoint: Savepoint) -> CoreResult<()>;

    /// Forgets `savepoint`, keeping the writes made after it.
    fn release(&mut self, savepoint: Savepoint) -> CoreResult<()>;
}
