//! Call-recording driver for integration tests.
//!
//! Wraps a [`MemoryDriver`] and counts every call per operation so tests can
//! assert how many round-trips a mapper operation issued.

use std::collections::BTreeMap;
use std::sync::Arc;

use docgraph_core::{
    CollectionKind, Database, Document, Driver, DriverResult, EdgeDefinition, GraphInfo,
    IndexSpec, MemoryDriver, PathRecord, TraversalRequest,
};
use parking_lot::Mutex;

/// Per-operation call counters, shared between the driver and the test.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    counts: Arc<Mutex<BTreeMap<&'static str, usize>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl Calls {
    fn hit(&self, op: &'static str) {
        *self.counts.lock().entry(op).or_default() += 1;
    }

    /// Number of calls to `op` so far.
    pub fn count(&self, op: &str) -> usize {
        self.counts.lock().get(op).copied().unwrap_or(0)
    }

    /// Query texts passed to `execute_query`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        self.counts.lock().clear();
        self.queries.lock().clear();
    }
}

/// A [`MemoryDriver`] that records its calls.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    inner: MemoryDriver,
    calls: Calls,
}

impl RecordingDriver {
    /// Creates the driver with a handle on its counters.
    pub fn new() -> (Self, Calls) {
        let driver = Self::default();
        let calls = driver.calls.clone();
        (driver, calls)
    }
}

/// A database over a fresh recording driver.
pub fn recording_database() -> (Database, Calls) {
    let (driver, calls) = RecordingDriver::new();
    (Database::new(Arc::new(driver)), calls)
}

impl Driver for RecordingDriver {
    fn has_collection(&self, name: &str) -> DriverResult<bool> {
        self.calls.hit("has_collection");
        self.inner.has_collection(name)
    }

    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        options: &Document,
    ) -> DriverResult<()> {
        self.calls.hit("create_collection");
        self.inner.create_collection(name, kind, options)
    }

    fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.calls.hit("drop_collection");
        self.inner.drop_collection(name)
    }

    fn list_collections(&self) -> DriverResult<Vec<String>> {
        self.calls.hit("list_collections");
        self.inner.list_collections()
    }

    fn collection_count(&self, name: &str) -> DriverResult<u64> {
        self.calls.hit("collection_count");
        self.inner.collection_count(name)
    }

    fn add_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<()> {
        self.calls.hit("add_index");
        self.inner.add_index(collection, index)
    }

    fn get_document(&self, collection: &str, key: &str) -> DriverResult<Option<Document>> {
        self.calls.hit("get_document");
        self.inner.get_document(collection, key)
    }

    fn has_document(&self, collection: &str, key: &str) -> DriverResult<bool> {
        self.calls.hit("has_document");
        self.inner.has_document(collection, key)
    }

    fn insert(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        self.calls.hit("insert");
        self.inner.insert(collection, document)
    }

    fn update(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        self.calls.hit("update");
        self.inner.update(collection, document)
    }

    fn delete(&self, collection: &str, key: &str) -> DriverResult<Document> {
        self.calls.hit("delete");
        self.inner.delete(collection, key)
    }

    fn execute_query(
        &self,
        query: &str,
        bind_vars: &Document,
    ) -> DriverResult<Vec<serde_json::Value>> {
        self.calls.hit("execute_query");
        self.calls.queries.lock().push(query.to_string());
        self.inner.execute_query(query, bind_vars)
    }

    fn graph_traverse(&self, request: &TraversalRequest) -> DriverResult<Vec<PathRecord>> {
        self.calls.hit("graph_traverse");
        self.inner.graph_traverse(request)
    }

    fn create_graph(&self, name: &str, edge_definitions: &[EdgeDefinition]) -> DriverResult<()> {
        self.calls.hit("create_graph");
        self.inner.create_graph(name, edge_definitions)
    }

    fn delete_graph(&self, name: &str, drop_collections: bool) -> DriverResult<()> {
        self.calls.hit("delete_graph");
        self.inner.delete_graph(name, drop_collections)
    }

    fn list_graphs(&self) -> DriverResult<Vec<String>> {
        self.calls.hit("list_graphs");
        self.inner.list_graphs()
    }

    fn graph_info(&self, name: &str) -> DriverResult<GraphInfo> {
        self.calls.hit("graph_info");
        self.inner.graph_info(name)
    }

    fn create_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> DriverResult<()> {
        self.calls.hit("create_edge_definition");
        self.inner.create_edge_definition(graph, definition)
    }

    fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> DriverResult<()> {
        self.calls.hit("replace_edge_definition");
        self.inner.replace_edge_definition(graph, definition)
    }

    fn delete_edge_definition(
        &self,
        graph: &str,
        edge_collection: &str,
        purge: bool,
    ) -> DriverResult<()> {
        self.calls.hit("delete_edge_definition");
        self.inner.delete_edge_definition(graph, edge_collection, purge)
    }
}
