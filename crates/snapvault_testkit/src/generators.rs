//! Property-based test generators using proptest.
//!
//! Provides strategies for random catalogs whose foreign keys form a DAG,
//! together with stores populated to match.

use crate::fixtures::fields;
use proptest::prelude::*;
use serde_json::{Map, Value};
use snapvault_core::{
    CatalogBuilder, CatalogConfig, CoreResult, EntityCatalog, EntityTypeDescriptor, EntityTypeId,
    MemoryStore, RecordId,
};
use std::sync::Arc;

/// Strategy for valid `namespace.name` labels.
pub fn entity_type_label_strategy() -> impl Strategy<Value = String> {
    (
        prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex"),
        prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex"),
    )
        .prop_map(|(namespace, name)| format!("{namespace}.{name}"))
}

/// Shape of a generated catalog.
///
/// Type `i` is `gen.t{i}` and may only reference types with a smaller
/// index, so the foreign keys never form a cycle. Every type has a `name`
/// natural key.
#[derive(Debug, Clone)]
pub struct CatalogShape {
    /// Referenced type indices, per type.
    pub parents: Vec<Vec<usize>>,
    /// Order the types are registered in.
    pub registration: Vec<usize>,
    /// Number of records to create, per type.
    pub records: Vec<usize>,
}

impl CatalogShape {
    /// Returns the id of type `index`.
    pub fn entity_type(index: usize) -> EntityTypeId {
        EntityTypeId::new("gen", format!("t{index}"))
    }

    /// Number of entity types.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Checks whether the shape has no entity types.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Builds the catalog, registering types in [`Self::registration`] order.
    pub fn catalog(&self) -> CoreResult<Arc<EntityCatalog>> {
        let mut builder = CatalogBuilder::new(CatalogConfig::empty());
        for &index in &self.registration {
            let mut descriptor = EntityTypeDescriptor::new(Self::entity_type(index))
                .field("name")
                .natural_key(["name"]);
            for &parent in &self.parents[index] {
                descriptor =
                    descriptor.foreign_key(format!("ref_t{parent}"), Self::entity_type(parent));
            }
            builder.register(descriptor)?;
        }
        Ok(Arc::new(builder.build()?))
    }

    /// Inserts [`Self::records`] records per type.
    ///
    /// Record `r` of a type references record `r % n` of each parent with
    /// `n` records, or null when the parent has none.
    pub fn populate(&self, store: &MemoryStore) -> CoreResult<()> {
        let mut ids: Vec<Vec<RecordId>> = vec![Vec::new(); self.len()];
        for index in 0..self.len() {
            let entity_type = Self::entity_type(index);
            for r in 0..self.records[index] {
                let mut map = Map::new();
                map.insert("name".into(), Value::from(format!("t{index}-r{r}")));
                for &parent in &self.parents[index] {
                    let reference = match ids[parent].len() {
                        0 => Value::Null,
                        n => Value::from(ids[parent][r % n].as_u64()),
                    };
                    map.insert(format!("ref_t{parent}"), reference);
                }
                let id = store.insert(&entity_type, fields(Value::Object(map)))?;
                ids[index].push(id);
            }
        }
        Ok(())
    }
}

/// Strategy for catalog shapes with up to `max_types` entity types.
pub fn catalog_shape_strategy(max_types: usize) -> impl Strategy<Value = CatalogShape> {
    (1..=max_types.max(1)).prop_flat_map(|n| {
        let parents = (0..n)
            .map(|i| prop::collection::vec(any::<bool>(), i))
            .collect::<Vec<_>>();
        let registration = Just((0..n).collect::<Vec<usize>>()).prop_shuffle();
        let records = prop::collection::vec(0usize..4, n);
        (parents, registration, records).prop_map(|(parents, registration, records)| {
            let parents = parents
                .into_iter()
                .map(|flags| {
                    flags
                        .into_iter()
                        .enumerate()
                        .filter_map(|(j, keep)| keep.then_some(j))
                        .collect()
                })
                .collect();
            CatalogShape {
                parents,
                registration,
                records,
            }
        })
    })
}
