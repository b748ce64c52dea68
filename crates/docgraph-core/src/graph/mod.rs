//! Named graphs and traversal objectification.
//!
//! A [`Graph`] aggregates [`GraphConnection`]s into vertex and edge types
//! keyed by collection name. Bound to a [`Database`], it links entities
//! with edges ([`Graph::relation`]) and turns native traversal results into
//! a [`Traversal`] arena of typed entities ([`Graph::expand`],
//! [`Graph::aql`]).

mod traversal;


pub use traversal::{EdgeRef, Traversal};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::GraphConfig;
use crate::database::Database;
use crate::driver::{Direction, EdgeDefinition, PathRecord, TraversalRequest, VertexFilter};
use crate::entity::{Entity, EntityType};
use crate::error::{Error, Result};
use crate::value::{Document, Value};

/// Picks the entity type of a traversal vertex from its collection and
/// raw document. Returning `None` falls back to the graph's vertex map.
pub type InheritanceResolver =
    Arc<dyn Fn(&str, &Document) -> Option<Arc<EntityType>> + Send + Sync>;

/// One edge definition: an edge type between sets of vertex types.
#[derive(Debug, Clone)]
pub struct GraphConnection {
    from: Vec<Arc<EntityType>>,
    edge: Arc<EntityType>,
    to: Vec<Arc<EntityType>>,
}

impl GraphConnection {
    /// Connects `from` types to `to` types through `edge`.
    #[must_use]
    pub fn new<F, T>(from: F, edge: &Arc<EntityType>, to: T) -> Self
    where
        F: IntoIterator<Item = Arc<EntityType>>,
        T: IntoIterator<Item = Arc<EntityType>>,
    {
        Self {
            from: from.into_iter().collect(),
            edge: Arc::clone(edge),
            to: to.into_iter().collect(),
        }
    }

    /// Source vertex types.
    #[must_use]
    pub fn from_types(&self) -> &[Arc<EntityType>] {
        &self.from
    }

    /// Edge type.
    #[must_use]
    pub fn edge_type(&self) -> &Arc<EntityType> {
        &self.edge
    }

    /// Target vertex types.
    #[must_use]
    pub fn to_types(&self) -> &[Arc<EntityType>] {
        &self.to
    }
}

/// Parameters of [`Graph::expand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Edge direction.
    pub direction: Direction,
    /// Maximum path length in edges.
    pub depth: u32,
    /// Only emit paths ending in these collections.
    pub only: Option<Vec<String>>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

impl ExpandOptions {
    /// Uses the configured default direction and depth.
    #[must_use]
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            direction: config.default_direction,
            depth: config.default_depth,
            only: None,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the depth.
    #[must_use]
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Restricts emitted vertices to these collections.
    #[must_use]
    pub fn only<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(collections.into_iter().map(Into::into).collect());
        self
    }
}

/// A named graph declaration.
#[derive(Clone)]
pub struct Graph {
    name: String,
    connections: Vec<GraphConnection>,
    vertices: IndexMap<String, Arc<EntityType>>,
    edges: IndexMap<String, Arc<EntityType>>,
    resolver: Option<InheritanceResolver>,
    database: Option<Database>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connections: Vec::new(),
            vertices: IndexMap::new(),
            edges: IndexMap::new(),
            resolver: None,
            database: None,
        }
    }

    /// Adds a connection. The first type declared for a collection wins.
    #[must_use]
    pub fn connection(mut self, connection: GraphConnection) -> Self {
        for vertex in connection.from.iter().chain(&connection.to) {
            self.vertices
                .entry(vertex.collection().to_string())
                .or_insert_with(|| Arc::clone(vertex));
        }
        self.edges
            .entry(connection.edge.collection().to_string())
            .or_insert_with(|| Arc::clone(&connection.edge));
        self.connections.push(connection);
        self
    }

    /// Installs a vertex type resolver consulted during objectification.
    #[must_use]
    pub fn inheritance_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str, &Document) -> Option<Arc<EntityType>> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Binds the graph to a database and registers its types.
    pub fn bind(&mut self, database: &Database) {
        for entity_type in self.vertices.values().chain(self.edges.values()) {
            if !database.registry().contains(entity_type.type_name()) {
                database.register(entity_type);
            }
        }
        self.database = Some(database.clone());
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex types by collection.
    #[must_use]
    pub fn vertices(&self) -> &IndexMap<String, Arc<EntityType>> {
        &self.vertices
    }

    /// Edge types by collection.
    #[must_use]
    pub fn edges(&self) -> &IndexMap<String, Arc<EntityType>> {
        &self.edges
    }

    /// Declared connections.
    #[must_use]
    pub fn connections(&self) -> &[GraphConnection] {
        &self.connections
    }

    /// Returns the bound database.
    #[must_use]
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// One edge definition per edge collection.
    ///
    /// Connections sharing an edge collection merge their vertex
    /// collections.
    #[must_use]
    pub fn edge_definitions(&self) -> Vec<EdgeDefinition> {
        let mut definitions: IndexMap<&str, EdgeDefinition> = IndexMap::new();
        for connection in &self.connections {
            let definition = definitions
                .entry(connection.edge.collection())
                .or_insert_with(|| {
                    EdgeDefinition::new(
                        connection.edge.collection(),
                        Vec::<String>::new(),
                        Vec::<String>::new(),
                    )
                });
            merge_names(&mut definition.from_collections, &connection.from);
            merge_names(&mut definition.to_collections, &connection.to);
        }
        definitions.into_values().collect()
    }

    fn bound(&self, action: &str) -> Result<&Database> {
        self.database.as_ref().ok_or_else(|| {
            Error::DetachedInstance(format!(
                "cannot {action} on graph '{}' before it is bound to a database",
                self.name
            ))
        })
    }

    /// Points `edge` from `from` to `to` and returns it, ready to persist.
    ///
    /// # Errors
    ///
    /// - [`Error::Declaration`] if `edge` is not an edge type.
    /// - [`Error::MissingIdentifier`] if either endpoint has no key.
    pub fn relation(&self, from: &Entity, mut edge: Entity, to: &Entity) -> Result<Entity> {
        if !edge.entity_type().is_edge() {
            return Err(Error::Declaration(format!(
                "'{}' is not an edge type",
                edge.entity_type().type_name()
            )));
        }
        let from_id = from
            .id()
            .ok_or_else(|| Error::MissingIdentifier(format!("relation source {from} has no key")))?;
        let to_id = to
            .id()
            .ok_or_else(|| Error::MissingIdentifier(format!("relation target {to} has no key")))?;
        edge.set_endpoints(from_id, to_id);
        Ok(edge)
    }

    /// Walks the graph from `start` and objectifies every path.
    ///
    /// The depth is clamped to `graph.max_depth`. With `only`, paths ending
    /// in other collections are dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::DetachedInstance`] if the graph is not bound.
    /// - [`Error::MissingIdentifier`] if `start` has no key.
    /// - Driver errors and load errors of the traversed documents.
    pub fn expand(&self, start: &Entity, options: &ExpandOptions) -> Result<Traversal> {
        let db = self.bound("expand")?;
        let start_id = start
            .id()
            .ok_or_else(|| Error::MissingIdentifier(format!("cannot expand {start} without a key")))?;

        let max_depth = db.config().graph.max_depth;
        let mut depth = options.depth.max(1);
        if depth > max_depth {
            tracing::warn!(requested = depth, max_depth, "traversal depth clamped");
            depth = max_depth;
        }

        let mut request = TraversalRequest::new(self.name.as_str(), start_id)
            .with_direction(options.direction)
            .with_depth(1, depth);
        if let Some(only) = &options.only {
            request = request.with_vertex_filter(VertexFilter::new(only.iter().cloned()));
        }

        tracing::debug!(
            graph = %self.name,
            start = %request.start_vertex,
            direction = request.direction.as_aql(),
            depth,
            "expanding"
        );
        let paths = db.driver().graph_traverse(&request)?;

        let mut start = start.clone();
        start.bind(db);
        Traversal::objectify(self, db, Some(start), paths)
    }

    /// Runs a path query and objectifies its rows.
    ///
    /// Each row must be a path object (`RETURN p`). The root of the result
    /// is the first vertex of the first path.
    ///
    /// # Errors
    ///
    /// - [`Error::DetachedInstance`] if the graph is not bound.
    /// - Driver errors, including rows that are not paths.
    pub fn aql(&self, query: &str, bind_vars: &Document) -> Result<Traversal> {
        let db = self.bound("run a traversal query")?;
        let rows = db.execute(query, bind_vars)?;
        let paths = rows
            .into_iter()
            .map(PathRecord::from_json)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Traversal::objectify(self, db, None, paths)
    }

    pub(crate) fn resolve_vertex_type(
        &self,
        db: &Database,
        collection: &str,
        document: &Document,
    ) -> Result<Arc<EntityType>> {
        if let Some(resolver) = &self.resolver {
            if let Some(entity_type) = resolver(collection, document) {
                return Ok(entity_type);
            }
        }

        let base = self.vertices.get(collection).ok_or_else(|| {
            Error::UnknownEntityType(format!(
                "no vertex type for collection '{collection}' in graph '{}'",
                self.name
            ))
        })?;

        let Some(inheritance) = base.inheritance() else {
            return Ok(Arc::clone(base));
        };
        let discriminator = document
            .get(inheritance.field())
            .map(Value::from_json)
            .unwrap_or_default();
        match inheritance.type_for(&discriminator) {
            Some(name) if name != base.type_name() => Ok(db
                .registry()
                .get(name)
                .unwrap_or_else(|| Arc::clone(base))),
            _ => Ok(Arc::clone(base)),
        }
    }

    pub(crate) fn edge_type(&self, collection: &str) -> Result<Arc<EntityType>> {
        self.edges.get(collection).cloned().ok_or_else(|| {
            Error::UnknownEntityType(format!(
                "no edge type for collection '{collection}' in graph '{}'",
                self.name
            ))
        })
    }
}

fn merge_names(target: &mut Vec<String>, types: &[Arc<EntityType>]) {
    for entity_type in types {
        let name = entity_type.collection();
        if !target.iter().any(|c| c == name) {
            target.push(name.to_string());
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("vertices", &self.vertices.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("resolver", &self.resolver.is_some())
            .field("bound", &self.database.is_some())
            .finish()
    }
}
