//! Round-robin connection pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    CollectionKind, Driver, DriverResult, EdgeDefinition, GraphInfo, IndexSpec, PathRecord,
    TraversalRequest,
};
use crate::error::{Error, Result};
use crate::value::Document;

/// Dispatches every call to the next driver in round-robin order.
///
/// Intended for clusters where each driver talks to a different
/// coordinator. The cursor is an atomic counter, so the pool can be shared
/// across threads.
pub struct ConnectionPool {
    drivers: Vec<Arc<dyn Driver>>,
    cursor: AtomicUsize,
}

impl ConnectionPool {
    /// Creates a pool over the given drivers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `drivers` is empty.
    pub fn new(drivers: Vec<Arc<dyn Driver>>) -> Result<Self> {
        if drivers.is_empty() {
            return Err(Error::Config(
                "connection pool needs at least one driver".to_string(),
            ));
        }
        Ok(Self {
            drivers,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of pooled drivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Always false: a pool holds at least one driver.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    fn next(&self) -> &dyn Driver {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.drivers.len();
        self.drivers[idx].as_ref()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("drivers", &self.drivers.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}

impl Driver for ConnectionPool {
    fn has_collection(&self, name: &str) -> DriverResult<bool> {
        self.next().has_collection(name)
    }

    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        options: &Document,
    ) -> DriverResult<()> {
        self.next().create_collection(name, kind, options)
    }

    fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.next().drop_collection(name)
    }

    fn list_collections(&self) -> DriverResult<Vec<String>> {
        self.next().list_collections()
    }

    fn collection_count(&self, name: &str) -> DriverResult<u64> {
        self.next().collection_count(name)
    }

    fn add_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<()> {
        self.next().add_index(collection, index)
    }

    fn get_document(&self, collection: &str, key: &str) -> DriverResult<Option<Document>> {
        self.next().get_document(collection, key)
    }

    fn has_document(&self, collection: &str, key: &str) -> DriverResult<bool> {
        self.next().has_document(collection, key)
    }

    fn insert(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        self.next().insert(collection, document)
    }

    fn update(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        self.next().update(collection, document)
    }

    fn delete(&self, collection: &str, key: &str) -> DriverResult<Document> {
        self.next().delete(collection, key)
    }

    fn execute_query(
        &self,
        query: &str,
        bind_vars: &Document,
    ) -> DriverResult<Vec<serde_json::Value>> {
        self.next().execute_query(query, bind_vars)
    }

    fn graph_traverse(&self, request: &TraversalRequest) -> DriverResult<Vec<PathRecord>> {
        self.next().graph_traverse(request)
    }

    fn create_graph(&self, name: &str, edge_definitions: &[EdgeDefinition]) -> DriverResult<()> {
        self.next().create_graph(name, edge_definitions)
    }

    fn delete_graph(&self, name: &str, drop_collections: bool) -> DriverResult<()> {
        self.next().delete_graph(name, drop_collections)
    }

    fn list_graphs(&self) -> DriverResult<Vec<String>> {
        self.next().list_graphs()
    }

    fn graph_info(&self, name: &str) -> DriverResult<GraphInfo> {
        self.next().graph_info(name)
    }

    fn create_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> DriverResult<()> {
        self.next().create_edge_definition(graph, definition)
    }

    fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> DriverResult<()> {
        self.next().replace_edge_definition(graph, definition)
    }

    fn delete_edge_definition(
        &self,
        graph: &str,
        edge_collection: &str,
        purge: bool,
    ) -> DriverResult<()> {
        self.next().delete_edge_definition(graph, edge_collection, purge)
    }
}
