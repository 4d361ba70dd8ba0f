//! Registry of persistable entity types.
//!
//! Components register their entity types into a [`CatalogBuilder`] once at
//! process start. [`CatalogBuilder::build`] checks the registry for
//! consistency and freezes it into an [`EntityCatalog`], which is read-only
//! from then on and may be installed as the process-wide catalog.
//!
//! ```ignore
//! let catalog = CatalogBuilder::new(CatalogConfig::default())
//!     .register_component(&AuthComponent)?
//!     .register_component(&CoreComponent)?
//!     .build()?;
//! ```

mod descriptor;

pub use descriptor::{EntityTypeDescriptor, FieldDescriptor};

use crate::config::CatalogConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::EntityTypeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};

static GLOBAL_CATALOG: OnceLock<Arc<EntityCatalog>> = OnceLock::new();

/// A unit of the application that owns entity types.
pub trait Component {
    /// Component name, used in diagnostics.
    fn name(&self) -> &str;

    /// Registers the component's entity types.
    fn register(&self, builder: &mut CatalogBuilder) -> CoreResult<()>;
}

/// Collects entity type registrations before freezing them into a catalog.
#[derive(Debug)]
pub struct CatalogBuilder {
    config: CatalogConfig,
    types: Vec<EntityTypeDescriptor>,
    index: HashMap<EntityTypeId, usize>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            types: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registers one entity type.
    pub fn register(&mut self, descriptor: EntityTypeDescriptor) -> CoreResult<&mut Self> {
        if self.index.contains_key(&descriptor.id) {
            return Err(CoreError::DuplicateEntityType {
                entity_type: descriptor.id,
            });
        }
        self.index.insert(descriptor.id.clone(), self.types.len());
        self.types.push(descriptor);
        Ok(self)
    }

    /// Lets a component register all of its entity types.
    pub fn register_component(&mut self, component: &dyn Component) -> CoreResult<&mut Self> {
        let before = self.types.len();
        component.register(self)?;
        tracing::debug!(
            component = component.name(),
            entity_types = self.types.len() - before,
            "registered component"
        );
        Ok(self)
    }

    /// Validates the registrations and freezes them into a catalog.
    pub fn build(&mut self) -> CoreResult<EntityCatalog> {
        for descriptor in &self.types {
            let mut seen = BTreeSet::new();
            for field in &descriptor.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(CoreError::invalid_schema(format!(
                        "{} declares field {:?} twice",
                        descriptor.id, field.name
                    )));
                }
                if let Some(target) = &field.references {
                    if !self.index.contains_key(target) {
                        return Err(CoreError::invalid_schema(format!(
                            "{}.{} references unregistered entity type {}",
                            descriptor.id, field.name, target
                        )));
                    }
                }
            }
            for key_field in &descriptor.natural_key {
                match descriptor.get_field(key_field) {
                    None => {
                        return Err(CoreError::invalid_schema(format!(
                            "{} natural key uses undeclared field {:?}",
                            descriptor.id, key_field
                        )))
                    }
                    Some(field) if field.is_foreign_key() => {
                        return Err(CoreError::invalid_schema(format!(
                            "{} natural key field {:?} is a foreign key",
                            descriptor.id, key_field
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(EntityCatalog {
            types: self.types.clone(),
            index: self.index.clone(),
            excluded: self.config.excluded.clone(),
        })
    }
}

/// Serializable form of a catalog, loaded from a schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSchema {
    /// Entity types in registration order.
    pub entity_types: Vec<EntityTypeDescriptor>,
    /// Additional entity types to exclude from backups.
    #[serde(default)]
    pub excluded: Vec<EntityTypeId>,
}

/// Immutable set of known entity types.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    types: Vec<EntityTypeDescriptor>,
    index: HashMap<EntityTypeId, usize>,
    excluded: BTreeSet<EntityTypeId>,
}

impl EntityCatalog {
    /// Starts building a catalog.
    #[must_use]
    pub fn builder(config: CatalogConfig) -> CatalogBuilder {
        CatalogBuilder::new(config)
    }

    /// Builds a catalog from a schema document.
    pub fn from_schema(schema: CatalogSchema, config: CatalogConfig) -> CoreResult<Self> {
        let mut config = config;
        config.excluded.extend(schema.excluded);
        let mut builder = CatalogBuilder::new(config);
        for descriptor in schema.entity_types {
            builder.register(descriptor)?;
        }
        builder.build()
    }

    /// Loads a catalog from a JSON schema file.
    pub fn load_schema(path: &Path, config: CatalogConfig) -> CoreResult<Self> {
        let data = std::fs::read(path)?;
        let schema: CatalogSchema = serde_json::from_slice(&data)?;
        Self::from_schema(schema, config)
    }

    /// Returns the entity types eligible for backup, in registration order.
    ///
    /// Types on the denylist are left out.
    #[must_use]
    pub fn list_entity_types(&self) -> Vec<&EntityTypeDescriptor> {
        self.types
            .iter()
            .filter(|d| !self.excluded.contains(&d.id))
            .collect()
    }

    /// Returns every registered entity type, excluded or not.
    #[must_use]
    pub fn all_entity_types(&self) -> &[EntityTypeDescriptor] {
        &self.types
    }

    /// Looks up a registered entity type.
    #[must_use]
    pub fn get(&self, entity_type: &EntityTypeId) -> Option<&EntityTypeDescriptor> {
        self.index.get(entity_type).and_then(|&i| self.types.get(i))
    }

    /// Looks up a registered entity type, failing if it is unknown.
    pub fn require(&self, entity_type: &EntityTypeId) -> CoreResult<&EntityTypeDescriptor> {
        self.get(entity_type)
            .ok_or_else(|| CoreError::unknown_entity_type(entity_type))
    }

    /// Checks whether an entity type is registered.
    #[must_use]
    pub fn contains(&self, entity_type: &EntityTypeId) -> bool {
        self.index.contains_key(entity_type)
    }

    /// Checks whether an entity type is on the backup denylist.
    #[must_use]
    pub fn is_excluded(&self, entity_type: &EntityTypeId) -> bool {
        self.excluded.contains(entity_type)
    }

    /// Returns the entity types a type holds foreign keys into, excluding itself.
    #[must_use]
    pub fn dependencies_of(&self, entity_type: &EntityTypeId) -> Vec<EntityTypeId> {
        self.get(entity_type)
            .map(|d| d.dependencies().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of registered entity types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Checks whether no entity types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Installs this catalog as the process-wide catalog.
    ///
    /// Fails if a catalog was already installed.
    pub fn install_global(self) -> CoreResult<Arc<EntityCatalog>> {
        let catalog = Arc::new(self);
        GLOBAL_CATALOG
            .set(Arc::clone(&catalog))
            .map_err(|_| CoreError::invalid_operation("global catalog already installed"))?;
        Ok(catalog)
    }

    /// Returns the process-wide catalog, if one was installed.
    #[must_use]
    pub fn global() -> Option<Arc<EntityCatalog>> {
        GLOBAL_CATALOG.get().cloned()
    }
}
