//! Database facade.
//!
//! [`Database`] is the session object of the mapper: it provisions
//! collections and graphs, dispatches CRUD for entities, hands out query
//! builders and owns the type registry and the event bus. It is cheap to
//! clone; every clone shares the same driver, configuration, registry and
//! listeners.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::OrmConfig;
use crate::driver::Driver;
use crate::entity::{Entity, EntityType, KEY_FIELD};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::graph::Graph;
use crate::query::Query;
use crate::registry::Registry;
use crate::schema::DEFAULT_SCHEMA_CACHE_CAPACITY;
use crate::value::Document;

/// A collection or a graph to provision with [`Database::create_all`].
#[derive(Debug, Clone, Copy)]
pub enum Provision<'a> {
    /// Create the entity type's collection.
    Collection(&'a Arc<EntityType>),
    /// Create the graph with its collections.
    Graph(&'a Graph),
}

impl<'a> From<&'a Arc<EntityType>> for Provision<'a> {
    fn from(entity_type: &'a Arc<EntityType>) -> Self {
        Self::Collection(entity_type)
    }
}

impl<'a> From<&'a Graph> for Provision<'a> {
    fn from(graph: &'a Graph) -> Self {
        Self::Graph(graph)
    }
}

struct Inner {
    driver: Arc<dyn Driver>,
    config: OrmConfig,
    registry: Registry,
    events: EventBus,
}

/// Shared handle over a driver.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Creates a database with the default configuration.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                config: OrmConfig::default(),
                registry: Registry::new(),
                events: EventBus::new(),
            }),
        }
    }

    /// Creates a database with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn with_config(driver: Arc<dyn Driver>, config: OrmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                driver,
                config,
                registry: Registry::new(),
                events: EventBus::new(),
            }),
        })
    }

    /// Returns the driver.
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.inner.driver.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Returns the type registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Registers an entity type for name-based lookups.
    ///
    /// A non-default `schema.cache_capacity` is applied to the type's
    /// schema cache.
    pub fn register(&self, entity_type: &Arc<EntityType>) {
        let capacity = self.inner.config.schema.cache_capacity;
        if capacity != DEFAULT_SCHEMA_CACHE_CAPACITY {
            entity_type.schema_cache().set_capacity(capacity);
        }
        self.inner.registry.register(entity_type);
    }

    /// Executes a parameterized query through the driver.
    ///
    /// # Errors
    ///
    /// Driver errors, verbatim.
    pub fn execute(&self, query: &str, bind_vars: &Document) -> Result<Vec<Json>> {
        if self.inner.config.query.log_queries {
            let binds: Vec<&str> = bind_vars.keys().map(String::as_str).collect();
            tracing::debug!(query, ?binds, "executing query");
        }
        Ok(self.inner.driver.execute_query(query, bind_vars)?)
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    /// Returns true if the type's collection exists.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn has_collection(&self, entity_type: &EntityType) -> Result<bool> {
        Ok(self.inner.driver.has_collection(entity_type.collection())?)
    }

    /// Creates the type's collection with its options and indexes.
    ///
    /// # Errors
    ///
    /// Driver errors, including "already exists".
    pub fn create_collection(&self, entity_type: &EntityType) -> Result<()> {
        let name = entity_type.collection();
        self.inner.driver.create_collection(
            name,
            entity_type.kind().collection_kind(),
            entity_type.collection_options(),
        )?;
        for index in entity_type.indexes() {
            self.inner.driver.add_index(name, index)?;
        }
        tracing::info!(
            collection = name,
            kind = ?entity_type.kind(),
            indexes = entity_type.indexes().len(),
            "collection created"
        );
        Ok(())
    }

    /// Drops the type's collection.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn drop_collection(&self, entity_type: &EntityType) -> Result<()> {
        self.inner.driver.drop_collection(entity_type.collection())?;
        tracing::info!(collection = entity_type.collection(), "collection dropped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Returns true if a document with `key` exists in the type's collection.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn has(&self, entity_type: &EntityType, key: &str) -> Result<bool> {
        Ok(self.inner.driver.has_document(entity_type.collection(), key)?)
    }

    /// Returns true if the entity has a key and it is stored.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn exists(&self, entity: &Entity) -> Result<bool> {
        match entity.key() {
            Some(key) => Ok(self.inner.driver.has_document(entity.collection(), key)?),
            None => Ok(false),
        }
    }

    /// Inserts the entity.
    ///
    /// A server-assigned key is written back, the entity is bound to this
    /// database and its pending changes are cleared.
    ///
    /// # Errors
    ///
    /// Validation errors of the dump and driver errors.
    pub fn add(&self, entity: &mut Entity) -> Result<Document> {
        self.inner.events.dispatch(entity, Event::PreAdd, None);

        let data = entity.dump(None)?;
        let meta = self.inner.driver.insert(entity.collection(), &data)?;
        if entity.key().is_none() {
            if let Some(Json::String(key)) = meta.get(KEY_FIELD) {
                entity.set_key(key.clone());
            }
        }
        entity.bind(self);
        entity.clear_dirty();

        self.inner.events.dispatch(entity, Event::PostAdd, Some(&meta));
        Ok(meta)
    }

    /// Writes the entity back.
    ///
    /// With `only_dirty` only the changed fields are sent.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingIdentifier`] if the entity has no key.
    /// - Validation errors of the dump and driver errors.
    pub fn update(&self, entity: &mut Entity, only_dirty: bool) -> Result<Document> {
        let key = entity
            .key()
            .map(str::to_string)
            .ok_or_else(|| Error::MissingIdentifier(format!("cannot update {entity} without a key")))?;

        self.inner.events.dispatch(entity, Event::PreUpdate, None);

        let mut data = if only_dirty {
            let names: Vec<&str> = entity.dirty().iter().map(String::as_str).collect();
            entity.dump(Some(names.as_slice()))?
        } else {
            entity.dump(None)?
        };
        data.insert(KEY_FIELD.to_string(), key.into());

        let meta = self.inner.driver.update(entity.collection(), &data)?;
        entity.bind(self);
        entity.clear_dirty();

        self.inner.events.dispatch(entity, Event::PostUpdate, Some(&meta));
        Ok(meta)
    }

    /// Deletes the entity's document.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingIdentifier`] if the entity has no key.
    /// - Driver errors.
    pub fn delete(&self, entity: &Entity) -> Result<Document> {
        let key = entity
            .key()
            .ok_or_else(|| Error::MissingIdentifier(format!("cannot delete {entity} without a key")))?;

        self.inner.events.dispatch(entity, Event::PreDelete, None);
        let meta = self.inner.driver.delete(entity.collection(), key)?;
        self.inner.events.dispatch(entity, Event::PostDelete, Some(&meta));
        Ok(meta)
    }

    /// Starts a query over the type's collection.
    pub fn query(&self, entity_type: &Arc<EntityType>) -> Query {
        Query::new(self.clone(), entity_type)
    }

    // ------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------

    /// Creates the graph's collections, then the graph itself.
    ///
    /// # Errors
    ///
    /// Driver errors, including "already exists".
    pub fn create_graph(&self, graph: &Graph) -> Result<()> {
        for entity_type in graph.vertices().values() {
            self.create_collection(entity_type)?;
        }
        for entity_type in graph.edges().values() {
            self.create_collection(entity_type)?;
        }

        let definitions = graph.edge_definitions();
        self.inner.driver.create_graph(graph.name(), &definitions)?;
        tracing::info!(
            graph = graph.name(),
            edge_definitions = definitions.len(),
            "graph created"
        );
        Ok(())
    }

    /// Deletes the graph, and its collections when `drop_collections` is set.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn drop_graph(&self, graph: &Graph, drop_collections: bool) -> Result<()> {
        self.inner.driver.delete_graph(graph.name(), drop_collections)?;
        tracing::info!(graph = graph.name(), drop_collections, "graph dropped");
        Ok(())
    }

    /// Brings a stored graph in line with its declaration.
    ///
    /// Creates the graph if it does not exist. Otherwise creates missing
    /// collections ("already exists" is logged and ignored), adds new edge
    /// definitions, replaces changed ones and removes undeclared ones
    /// without dropping their collections. Running it twice in a row
    /// changes nothing the second time.
    ///
    /// # Errors
    ///
    /// Driver errors other than "already exists" on collections.
    pub fn update_graph(&self, graph: &Graph) -> Result<()> {
        let name = graph.name();
        if !self.inner.driver.list_graphs()?.iter().any(|g| g == name) {
            return self.create_graph(graph);
        }

        for entity_type in graph.vertices().values().chain(graph.edges().values()) {
            if self.has_collection(entity_type)? {
                continue;
            }
            match self.create_collection(entity_type) {
                Ok(()) => {}
                Err(Error::Driver(err)) if err.is_already_exists() => {
                    tracing::warn!(
                        collection = entity_type.collection(),
                        error = %err,
                        "collection probably already exists"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let stored = self.inner.driver.graph_info(name)?;
        let declared = graph.edge_definitions();

        for definition in &declared {
            let existing = stored
                .edge_definitions
                .iter()
                .find(|d| d.edge_collection == definition.edge_collection);
            match existing {
                None => {
                    self.inner.driver.create_edge_definition(name, definition)?;
                    tracing::info!(graph = name, edge = %definition.edge_collection, "edge definition created");
                }
                Some(existing) if !existing.same_shape(definition) => {
                    self.inner.driver.replace_edge_definition(name, definition)?;
                    tracing::info!(graph = name, edge = %definition.edge_collection, "edge definition replaced");
                }
                Some(_) => {}
            }
        }

        for existing in &stored.edge_definitions {
            if declared
                .iter()
                .all(|d| d.edge_collection != existing.edge_collection)
            {
                self.inner
                    .driver
                    .delete_edge_definition(name, &existing.edge_collection, false)?;
                tracing::info!(graph = name, edge = %existing.edge_collection, "edge definition removed");
            }
        }
        Ok(())
    }

    /// Provisions every collection and graph in order.
    ///
    /// # Errors
    ///
    /// The first failure, verbatim.
    pub fn create_all(&self, objects: &[Provision<'_>]) -> Result<()> {
        for object in objects {
            match object {
                Provision::Collection(entity_type) => self.create_collection(entity_type)?,
                Provision::Graph(graph) => self.create_graph(graph)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("registry", &self.inner.registry.type_names())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

