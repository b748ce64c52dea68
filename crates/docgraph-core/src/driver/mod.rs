//! Database driver collaborator.
//!
//! [`Driver`] is the minimum surface the mapper consumes from a graph-capable
//! document database: collection and graph provisioning, point CRUD,
//! parameterized query execution and native graph traversal. The mapper never
//! retries, times out or re-wraps driver failures; [`DriverError`]s reach the
//! caller verbatim inside [`Error::Driver`](crate::Error::Driver).
//!
//! [`MemoryDriver`] is an in-process implementation used by tests and demos.
//! [`ConnectionPool`] spreads calls over several drivers in round-robin order.

mod memory;
mod pool;

#[cfg(test)]
mod pool_tests;

pub use memory::MemoryDriver;
pub use pool::ConnectionPool;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Document;

/// Result type alias for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Failures reported by a database driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// A document with this key already exists.
    #[error("document '{collection}/{key}' already exists")]
    DocumentExists {
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
    },

    /// No document with this key.
    #[error("document '{collection}/{key}' not found")]
    DocumentNotFound {
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
    },

    /// Collection already exists.
    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    /// Collection does not exist.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Graph already exists.
    #[error("graph '{0}' already exists")]
    GraphExists(String),

    /// Graph does not exist.
    #[error("graph '{0}' not found")]
    GraphNotFound(String),

    /// Edge definition already present in the graph.
    #[error("edge definition '{0}' already exists")]
    EdgeDefinitionExists(String),

    /// Edge definition absent from the graph.
    #[error("edge definition '{0}' not found")]
    EdgeDefinitionNotFound(String),

    /// Document rejected by the database (e.g. an edge without endpoints).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Query failed to parse or execute.
    #[error("query error: {message}")]
    Query {
        /// Error message.
        message: String,
        /// Byte offset in the query text, when known.
        position: Option<usize>,
    },

    /// A bind parameter is missing or has the wrong type.
    #[error("bind parameter error: {0}")]
    BindParameter(String),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DriverError {
    /// Returns true for the "already exists" family of errors.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::DocumentExists { .. }
                | Self::CollectionExists(_)
                | Self::GraphExists(_)
                | Self::EdgeDefinitionExists(_)
        )
    }

    /// Returns true for the "not found" family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DocumentNotFound { .. }
                | Self::CollectionNotFound(_)
                | Self::GraphNotFound(_)
                | Self::EdgeDefinitionNotFound(_)
        )
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges both ways.
    #[default]
    Any,
    /// Follow edges pointing at the current vertex.
    Inbound,
    /// Follow edges leaving the current vertex.
    Outbound,
}

impl Direction {
    /// Returns the AQL keyword.
    #[must_use]
    pub const fn as_aql(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }
}

/// Vertex uniqueness mode of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uniqueness {
    /// No vertex repeats within one path.
    #[default]
    Path,
    /// No vertex is visited twice in the whole traversal.
    Global,
    /// No uniqueness check.
    None,
}

impl Uniqueness {
    /// Returns the AQL option value.
    #[must_use]
    pub const fn as_aql(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Global => "global",
            Self::None => "none",
        }
    }
}

/// Kind of collection to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Vertex (document) collection.
    Document,
    /// Edge collection.
    Edge,
}

/// Kind of secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Hash index.
    Hash,
    /// Persistent (sorted) index.
    Persistent,
    /// Skiplist index.
    Skiplist,
    /// Fulltext index.
    Fulltext,
    /// Geo index.
    Geo,
    /// Time-to-live index.
    Ttl,
}

/// A secondary index declared on an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index kind.
    pub kind: IndexKind,
    /// Indexed field paths.
    pub fields: Vec<String>,
    /// Reject duplicate values.
    pub unique: bool,
    /// Skip documents lacking the fields.
    pub sparse: bool,
}

impl IndexSpec {
    /// Creates a non-unique, non-sparse index.
    #[must_use]
    pub fn new<I, S>(kind: IndexKind, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            sparse: false,
        }
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index as sparse.
    #[must_use]
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

/// One edge definition of a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Edge collection name.
    pub edge_collection: String,
    /// Vertex collections edges may start from.
    pub from_collections: Vec<String>,
    /// Vertex collections edges may point to.
    pub to_collections: Vec<String>,
}

impl EdgeDefinition {
    /// Creates an edge definition.
    #[must_use]
    pub fn new<F, T, S>(edge_collection: impl Into<String>, from_collections: F, to_collections: T) -> Self
    where
        F: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            edge_collection: edge_collection.into(),
            from_collections: from_collections.into_iter().map(Into::into).collect(),
            to_collections: to_collections.into_iter().map(Into::into).collect(),
        }
    }

    /// Compares two definitions ignoring collection order.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        fn sorted(v: &[String]) -> Vec<&str> {
            let mut out: Vec<&str> = v.iter().map(String::as_str).collect();
            out.sort_unstable();
            out.dedup();
            out
        }
        self.edge_collection == other.edge_collection
            && sorted(&self.from_collections) == sorted(&other.from_collections)
            && sorted(&self.to_collections) == sorted(&other.to_collections)
    }
}

/// Server-side description of a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphInfo {
    /// Graph name.
    pub name: String,
    /// Edge definitions in creation order.
    pub edge_definitions: Vec<EdgeDefinition>,
    /// Vertex collections not referenced by any edge definition.
    pub orphan_collections: Vec<String>,
}

/// Collection allowlist applied to the vertices a traversal emits.
///
/// Paths ending in a vertex outside the allowlist are dropped, but the
/// traversal still walks through such vertices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VertexFilter {
    collections: Vec<String>,
}

impl VertexFilter {
    /// Creates an allowlist from collection names.
    #[must_use]
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the allowed collection names.
    #[must_use]
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Returns true if the vertex id's collection prefix is allowed.
    #[must_use]
    pub fn allows(&self, vertex_id: &str) -> bool {
        let collection = vertex_id.split_once('/').map_or(vertex_id, |(c, _)| c);
        self.collections.iter().any(|c| c == collection)
    }

    /// Renders the filter as an AQL `FILTER` clause over `var`.
    #[must_use]
    pub fn to_aql(&self, var: &str) -> String {
        let conditions: Vec<String> = self
            .collections
            .iter()
            .map(|c| format!("IS_SAME_COLLECTION('{}', {var})", c.replace('\'', "\\'")))
            .collect();
        format!("FILTER {}", conditions.join(" OR "))
    }
}

/// A multi-hop traversal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalRequest {
    /// Named graph to walk.
    pub graph: String,
    /// Start vertex id (`collection/key`).
    pub start_vertex: String,
    /// Edge direction.
    pub direction: Direction,
    /// Minimum path length in edges.
    pub min_depth: u32,
    /// Maximum path length in edges.
    pub max_depth: u32,
    /// Vertex uniqueness mode.
    pub uniqueness: Uniqueness,
    /// Optional allowlist for emitted vertices.
    pub vertex_filter: Option<VertexFilter>,
}

impl TraversalRequest {
    /// Creates a one-hop, any-direction, path-unique request.
    #[must_use]
    pub fn new(graph: impl Into<String>, start_vertex: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            start_vertex: start_vertex.into(),
            direction: Direction::Any,
            min_depth: 1,
            max_depth: 1,
            uniqueness: Uniqueness::Path,
            vertex_filter: None,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the depth range.
    #[must_use]
    pub fn with_depth(mut self, min_depth: u32, max_depth: u32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Sets the vertex allowlist.
    #[must_use]
    pub fn with_vertex_filter(mut self, filter: VertexFilter) -> Self {
        self.vertex_filter = Some(filter);
        self
    }

    /// Renders the request as an AQL traversal with bind variables.
    #[must_use]
    pub fn to_aql(&self) -> (String, Document) {
        let mut aql = format!(
            "FOR v, e, p IN {}..{} {} @start_vertex GRAPH @graph_name OPTIONS {{uniqueVertices: '{}'}}",
            self.min_depth,
            self.max_depth,
            self.direction.as_aql(),
            self.uniqueness.as_aql(),
        );
        if let Some(filter) = &self.vertex_filter {
            aql.push(' ');
            aql.push_str(&filter.to_aql("v"));
        }
        aql.push_str(" RETURN p");

        let mut bind_vars = Document::new();
        bind_vars.insert("start_vertex".into(), self.start_vertex.clone().into());
        bind_vars.insert("graph_name".into(), self.graph.clone().into());
        (aql, bind_vars)
    }
}

/// One traversal path: `vertices.len() == edges.len() + 1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathRecord {
    /// Vertex documents from the start vertex outwards.
    pub vertices: Vec<Document>,
    /// Edge documents in walk order.
    pub edges: Vec<Document>,
}

impl PathRecord {
    /// Parses a path returned by a traversal query (`RETURN p`).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Query`] if the value is not a path object.
    pub fn from_json(value: serde_json::Value) -> DriverResult<Self> {
        serde_json::from_value(value).map_err(|e| DriverError::Query {
            message: format!("result row is not a traversal path: {e}"),
            position: None,
        })
    }

    /// Number of edges in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true for a path without edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// The database surface consumed by the mapper.
///
/// All calls block until the round-trip completes.
pub trait Driver: Send + Sync {
    /// Returns true if the collection exists.
    fn has_collection(&self, name: &str) -> DriverResult<bool>;

    /// Creates a collection with driver-specific options.
    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        options: &Document,
    ) -> DriverResult<()>;

    /// Drops a collection and its documents.
    fn drop_collection(&self, name: &str) -> DriverResult<()>;

    /// Lists collection names.
    fn list_collections(&self) -> DriverResult<Vec<String>>;

    /// Counts the documents of a collection.
    fn collection_count(&self, name: &str) -> DriverResult<u64>;

    /// Adds a secondary index.
    fn add_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<()>;

    /// Fetches one document by key.
    fn get_document(&self, collection: &str, key: &str) -> DriverResult<Option<Document>>;

    /// Returns true if a document with this key exists.
    fn has_document(&self, collection: &str, key: &str) -> DriverResult<bool>;

    /// Inserts a document, returning its metadata (`_key`, `_id`, `_rev`).
    ///
    /// A server key is assigned when the input has no `_key`.
    fn insert(&self, collection: &str, document: &Document) -> DriverResult<Document>;

    /// Patches the document named by `document["_key"]`.
    fn update(&self, collection: &str, document: &Document) -> DriverResult<Document>;

    /// Deletes a document by key.
    fn delete(&self, collection: &str, key: &str) -> DriverResult<Document>;

    /// Executes a parameterized query.
    ///
    /// `@@name` binds a collection name, `@name` binds a value.
    fn execute_query(&self, query: &str, bind_vars: &Document)
        -> DriverResult<Vec<serde_json::Value>>;

    /// Runs a native multi-hop traversal.
    fn graph_traverse(&self, request: &TraversalRequest) -> DriverResult<Vec<PathRecord>>;

    /// Creates a named graph.
    fn create_graph(&self, name: &str, edge_definitions: &[EdgeDefinition]) -> DriverResult<()>;

    /// Deletes a named graph, optionally dropping its collections.
    fn delete_graph(&self, name: &str, drop_collections: bool) -> DriverResult<()>;

    /// Lists graph names.
    fn list_graphs(&self) -> DriverResult<Vec<String>>;

    /// Describes a named graph.
    fn graph_info(&self, name: &str) -> DriverResult<GraphInfo>;

    /// Adds an edge definition to a graph.
    fn create_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> DriverResult<()>;

    /// Replaces the edge definition with the same edge collection.
    fn replace_edge_definition(&self, graph: &str, definition: &EdgeDefinition)
        -> DriverResult<()>;

    /// Removes an edge definition, optionally dropping the edge collection.
    fn delete_edge_definition(
        &self,
        graph: &str,
        edge_collection: &str,
        purge: bool,
    ) -> DriverResult<()>;
}
