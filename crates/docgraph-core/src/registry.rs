//! Type-name registry.
//!
//! Relationships may name their target type instead of holding it, which
//! lets two entity types point at each other. The names are resolved here,
//! on first use, against the types registered with the database.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::entity::EntityType;
use crate::error::{Error, Result};

/// Entity types by type name.
#[derive(Debug, Default)]
pub struct Registry {
    types: RwLock<FxHashMap<String, Arc<EntityType>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type under its type name, replacing any previous one.
    pub fn register(&self, entity_type: &Arc<EntityType>) {
        let previous = self
            .types
            .write()
            .insert(entity_type.type_name().to_string(), Arc::clone(entity_type));
        if previous.is_some() {
            tracing::debug!(type_name = entity_type.type_name(), "entity type re-registered");
        }
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<EntityType>> {
        self.types.read().get(type_name).cloned()
    }

    /// Looks up a type by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntityType`] if the name is not registered.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<EntityType>> {
        self.get(type_name)
            .ok_or_else(|| Error::UnknownEntityType(type_name.to_string()))
    }

    /// Returns true if the name is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.read().contains_key(type_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
