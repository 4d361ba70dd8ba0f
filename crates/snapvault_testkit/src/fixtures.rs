//! Test fixtures and store helpers.
//!
//! Provides a small family-tracking catalog, a populated store built on it,
//! and helpers to compare store contents independently of record ids.

use serde_json::Value;
use snapvault_core::codec::encode_records;
use snapvault_core::{
    BackupService, CatalogBuilder, CatalogConfig, Component, Config, CoreResult, EntityCatalog,
    EntityTypeDescriptor, EntityTypeId, FieldMap, MemoryStore, RecordId, RecordStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of records [`populate_family`] writes to backed-up entity types.
pub const FAMILY_RECORDS: usize = 14;

/// Number of backed-up entity types [`populate_family`] fills.
pub const FAMILY_ENTITY_TYPES: usize = 6;

/// Parses an entity type label, panicking on malformed input.
pub fn entity_type(label: &str) -> EntityTypeId {
    EntityTypeId::parse(label).expect("valid entity type label")
}

/// Turns a JSON object literal into a field map.
pub fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Users and groups.
pub struct AuthComponent;

impl Component for AuthComponent {
    fn name(&self) -> &str {
        "auth"
    }

    fn register(&self, builder: &mut CatalogBuilder) -> CoreResult<()> {
        builder
            .register(
                EntityTypeDescriptor::new(entity_type("auth.user"))
                    .field("username")
                    .field("email")
                    .natural_key(["username"]),
            )?
            .register(
                EntityTypeDescriptor::new(entity_type("auth.group"))
                    .field("name")
                    .natural_key(["name"]),
            )?;
        Ok(())
    }
}

/// Parents, children and what is tracked about them.
///
/// Registered children-first so that registration order and load order
/// disagree.
pub struct FamilyComponent;

impl Component for FamilyComponent {
    fn name(&self) -> &str {
        "family"
    }

    fn register(&self, builder: &mut CatalogBuilder) -> CoreResult<()> {
        builder
            .register(
                EntityTypeDescriptor::new(entity_type("family.feeding"))
                    .field("start")
                    .field("amount")
                    .foreign_key("child", entity_type("family.child")),
            )?
            .register(
                EntityTypeDescriptor::new(entity_type("family.note"))
                    .field("text")
                    .foreign_key("child", entity_type("family.child"))
                    .foreign_key("author", entity_type("auth.user")),
            )?
            .register(
                EntityTypeDescriptor::new(entity_type("family.child"))
                    .field("first_name")
                    .field("last_name")
                    .field("birth_date")
                    .foreign_key("parent", entity_type("family.parent"))
                    .natural_key(["first_name", "last_name"]),
            )?
            .register(
                EntityTypeDescriptor::new(entity_type("family.parent"))
                    .field("name")
                    .field("email")
                    .natural_key(["name"]),
            )?;
        Ok(())
    }
}

/// Session state; on the default denylist.
pub struct SessionsComponent;

impl Component for SessionsComponent {
    fn name(&self) -> &str {
        "sessions"
    }

    fn register(&self, builder: &mut CatalogBuilder) -> CoreResult<()> {
        builder.register(
            EntityTypeDescriptor::new(entity_type("sessions.session"))
                .field("session_key")
                .field("expire_date")
                .natural_key(["session_key"]),
        )?;
        Ok(())
    }
}

/// Builds the family catalog with the default denylist.
pub fn family_catalog() -> Arc<EntityCatalog> {
    let catalog = CatalogBuilder::new(CatalogConfig::default())
        .register_component(&AuthComponent)
        .and_then(|b| b.register_component(&FamilyComponent))
        .and_then(|b| b.register_component(&SessionsComponent))
        .and_then(|b| b.build())
        .expect("family catalog is consistent");
    Arc::new(catalog)
}

/// Builds a catalog whose authors and books reference each other.
///
/// `cycle.review` hangs off the cycle and is itself acyclic.
pub fn cyclic_catalog() -> Arc<EntityCatalog> {
    let mut builder = CatalogBuilder::new(CatalogConfig::empty());
    builder
        .register(
            EntityTypeDescriptor::new(entity_type("cycle.author"))
                .field("name")
                .foreign_key("favorite_book", entity_type("cycle.book"))
                .natural_key(["name"]),
        )
        .and_then(|b| {
            b.register(
                EntityTypeDescriptor::new(entity_type("cycle.book"))
                    .field("title")
                    .foreign_key("author", entity_type("cycle.author"))
                    .natural_key(["title"]),
            )
        })
        .and_then(|b| {
            b.register(
                EntityTypeDescriptor::new(entity_type("cycle.review"))
                    .field("text")
                    .foreign_key("book", entity_type("cycle.book")),
            )
        })
        .expect("cyclic catalog registers");
    Arc::new(builder.build().expect("cyclic catalog is consistent"))
}

/// Fills a family-catalog store with a small household.
///
/// Writes [`FAMILY_RECORDS`] backed-up records across
/// [`FAMILY_ENTITY_TYPES`] entity types, plus one excluded session.
pub fn populate_family(store: &MemoryStore) -> CoreResult<()> {
    let user = entity_type("auth.user");
    let parent = entity_type("family.parent");
    let child = entity_type("family.child");

    let admin = store.insert(
        &user,
        fields(serde_json::json!({"username": "admin", "email": "admin@example.com"})),
    )?;
    store.insert(
        &user,
        fields(serde_json::json!({"username": "nanny", "email": "nanny@example.com"})),
    )?;
    store.insert(
        &entity_type("auth.group"),
        fields(serde_json::json!({"name": "caregivers"})),
    )?;

    let ada = store.insert(
        &parent,
        fields(serde_json::json!({"name": "Ada", "email": "ada@example.com"})),
    )?;
    let grace = store.insert(
        &parent,
        fields(serde_json::json!({"name": "Grace", "email": null})),
    )?;

    let byron = store.insert(
        &child,
        fields(serde_json::json!({
            "first_name": "Byron", "last_name": "Lovelace",
            "birth_date": "2024-01-02", "parent": ada.as_u64()
        })),
    )?;
    let annabella = store.insert(
        &child,
        fields(serde_json::json!({
            "first_name": "Annabella", "last_name": "King",
            "birth_date": "2024-03-04", "parent": ada.as_u64()
        })),
    )?;
    let howard = store.insert(
        &child,
        fields(serde_json::json!({
            "first_name": "Howard", "last_name": "Hopper",
            "birth_date": "2024-05-06", "parent": grace.as_u64()
        })),
    )?;

    let feeding = entity_type("family.feeding");
    for (kid, start, amount) in [
        (byron, "2024-06-01T07:00:00Z", 120.0),
        (byron, "2024-06-01T10:30:00Z", 90.5),
        (annabella, "2024-06-01T08:15:00Z", 100.0),
        (howard, "2024-06-01T09:45:00Z", 60.0),
    ] {
        store.insert(
            &feeding,
            fields(serde_json::json!({"start": start, "amount": amount, "child": kid.as_u64()})),
        )?;
    }

    let note = entity_type("family.note");
    for (kid, text) in [(byron, "First smile"), (howard, "Slept through the night")] {
        store.insert(
            &note,
            fields(serde_json::json!({
                "text": text,
                "child": kid.as_u64(),
                "author": admin.as_u64()
            })),
        )?;
    }

    store.insert(
        &entity_type("sessions.session"),
        fields(serde_json::json!({"session_key": "abc123", "expire_date": "2024-07-01"})),
    )?;
    Ok(())
}

/// A store with its catalog.
pub struct TestStore {
    /// The catalog the store validates against.
    pub catalog: Arc<EntityCatalog>,
    /// The store itself.
    pub store: Arc<MemoryStore>,
}

impl TestStore {
    /// Creates an empty store over the family catalog.
    pub fn empty() -> Self {
        Self::with_catalog(family_catalog())
    }

    /// Creates an empty store over `catalog`.
    pub fn with_catalog(catalog: Arc<EntityCatalog>) -> Self {
        let store = Arc::new(MemoryStore::new(Arc::clone(&catalog)));
        Self { catalog, store }
    }

    /// Creates a family-catalog store filled by [`populate_family`].
    pub fn populated() -> Self {
        let test_store = Self::empty();
        populate_family(&test_store.store).expect("family fixture inserts");
        test_store
    }

    /// Returns a service with the default configuration.
    pub fn service(&self) -> BackupService<MemoryStore> {
        self.service_with(Config::default())
    }

    /// Returns a service with `config`.
    pub fn service_with(&self, config: Config) -> BackupService<MemoryStore> {
        BackupService::new(Arc::clone(&self.catalog), Arc::clone(&self.store), config)
    }

    /// Inserts one record, panicking on failure.
    pub fn insert(&self, label: &str, value: Value) -> RecordId {
        self.store
            .insert(&entity_type(label), fields(value))
            .expect("fixture record inserts")
    }

    /// Returns the record count of an entity type.
    pub fn count(&self, label: &str) -> usize {
        self.store
            .count(&entity_type(label))
            .expect("known entity type")
    }

    /// Returns every backed-up record with foreign keys replaced by natural
    /// keys, sorted per entity type.
    ///
    /// Two stores holding the same data compare equal even when their
    /// record ids differ, as long as every referenced type has a natural key.
    pub fn content(&self) -> BTreeMap<EntityTypeId, Vec<String>> {
        let mut content = BTreeMap::new();
        for descriptor in self.catalog.list_entity_types() {
            let mut records: Vec<String> =
                encode_records(&self.catalog, self.store.as_ref(), descriptor)
                    .expect("records encode")
                    .into_iter()
                    .map(|record| {
                        serde_json::to_string(&record.fields).expect("fields serialize")
                    })
                    .collect();
            if records.is_empty() {
                continue;
            }
            records.sort();
            content.insert(descriptor.id.clone(), records);
        }
        content
    }
}
