//! In-process driver.
//!
//! Keeps collections and named graphs in memory behind a
//! `parking_lot::RwLock`, assigns numeric keys, maintains a bidirectional
//! edge index per edge collection and executes the AQL subset emitted by the
//! query builder and the graph component.

mod aql;
mod eval;
mod store;
mod traversal;

#[cfg(test)]
mod memory_tests;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value as Json};

use self::aql::{Expr, Limit, ScanStatement, Source, Statement, Terminal, TraversalStatement};
use self::eval::{compare, Scope};
use self::store::StoredCollection;
use self::traversal::{enumerate_paths, Walk};
use super::{
    CollectionKind, Driver, DriverError, DriverResult, EdgeDefinition, GraphInfo, IndexSpec,
    PathRecord, TraversalRequest, Uniqueness,
};
use crate::value::Document;

#[derive(Debug, Default)]
struct State {
    collections: IndexMap<String, StoredCollection>,
    graphs: IndexMap<String, GraphInfo>,
}

impl State {
    fn collection(&self, name: &str) -> DriverResult<&StoredCollection> {
        self.collections
            .get(name)
            .ok_or_else(|| DriverError::CollectionNotFound(name.to_string()))
    }

    fn collection_mut(&mut self, name: &str) -> DriverResult<&mut StoredCollection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| DriverError::CollectionNotFound(name.to_string()))
    }

    fn document_by_id(&self, id: &str) -> Option<&Document> {
        let (collection, key) = id.split_once('/')?;
        self.collections.get(collection)?.documents.get(key)
    }

    fn ensure_collection(&mut self, name: &str, kind: CollectionKind) {
        if !self.collections.contains_key(name) {
            tracing::debug!(collection = name, ?kind, "creating collection for graph");
            self.collections
                .insert(name.to_string(), StoredCollection::new(kind, Document::new()));
        }
    }

    fn ensure_definition_collections(&mut self, definition: &EdgeDefinition) {
        self.ensure_collection(&definition.edge_collection, CollectionKind::Edge);
        for name in definition
            .from_collections
            .iter()
            .chain(definition.to_collections.iter())
        {
            self.ensure_collection(name, CollectionKind::Document);
        }
    }

    fn graph_mut(&mut self, name: &str) -> DriverResult<&mut GraphInfo> {
        self.graphs
            .get_mut(name)
            .ok_or_else(|| DriverError::GraphNotFound(name.to_string()))
    }

    fn walk_paths(
        &self,
        graph: &str,
        start_vertex: &str,
        direction: super::Direction,
        depth: (u32, u32),
        uniqueness: Uniqueness,
    ) -> DriverResult<Vec<PathRecord>> {
        let info = self
            .graphs
            .get(graph)
            .ok_or_else(|| DriverError::GraphNotFound(graph.to_string()))?;
        let edge_collections: Vec<String> = info
            .edge_definitions
            .iter()
            .map(|d| d.edge_collection.clone())
            .collect();
        let walk = Walk {
            edge_collections: &edge_collections,
            direction,
            min_depth: depth.0,
            max_depth: depth.1,
            uniqueness,
        };
        Ok(enumerate_paths(self, start_vertex, &walk))
    }
}

/// In-memory [`Driver`] for tests and demos.
///
/// # Example
///
/// ```rust,ignore
/// use docgraph_core::driver::{CollectionKind, Driver, MemoryDriver};
///
/// let driver = MemoryDriver::new();
/// driver.create_collection("cars", CollectionKind::Document, &Default::default())?;
/// let rows = driver.execute_query("FOR c IN cars FILTER c.year == 2005 RETURN c", &Default::default())?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriver {
    state: RwLock<State>,
}

impl MemoryDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the indexes declared on a collection.
    #[must_use]
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    /// Returns the options a collection was created with.
    #[must_use]
    pub fn collection_options(&self, collection: &str) -> Option<Document> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.options.clone())
    }

    /// Returns the kind of a collection.
    #[must_use]
    pub fn collection_kind(&self, collection: &str) -> Option<CollectionKind> {
        self.state.read().collections.get(collection).map(|c| c.kind)
    }
}

// ---------------------------------------------------------------------------
// Query execution
// ---------------------------------------------------------------------------

fn resolve_source(source: &Source, bind_vars: &Document) -> DriverResult<String> {
    match source {
        Source::Name(name) => Ok(name.clone()),
        Source::Bind(name) => match bind_vars.get(&format!("@{name}")) {
            Some(Json::String(collection)) => Ok(collection.clone()),
            Some(_) => Err(DriverError::BindParameter(format!(
                "bind parameter '@@{name}' must be a collection name"
            ))),
            None => Err(DriverError::BindParameter(format!(
                "bind parameter '@@{name}' is not set"
            ))),
        },
    }
}

fn as_count(value: &Json, what: &str) -> DriverResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| DriverError::Query {
            message: format!("{what} must be a non-negative integer, got {value}"),
            position: None,
        })
}

fn apply_limit<T>(rows: Vec<T>, limit: Option<&Limit>, scope: &Scope<'_>) -> DriverResult<Vec<T>> {
    let Some(limit) = limit else {
        return Ok(rows);
    };
    let offset = match &limit.offset {
        Some(expr) => as_count(&scope.eval(expr)?, "LIMIT offset")?,
        None => 0,
    };
    let count = as_count(&scope.eval(&limit.count)?, "LIMIT count")?;
    Ok(rows.into_iter().skip(offset).take(count).collect())
}

/// Rows of a scan after FILTER, SORT and LIMIT.
fn scan_rows(state: &State, stmt: &ScanStatement, bind_vars: &Document) -> DriverResult<Vec<Json>> {
    let name = resolve_source(&stmt.source, bind_vars)?;
    let collection = state.collection(&name)?;

    let mut scope = Scope::new(bind_vars);
    let mut rows = Vec::new();
    for doc in collection.documents.values() {
        let row = Json::Object(doc.clone());
        scope.set(&stmt.var, row.clone());
        if scope.passes(&stmt.filters)? {
            rows.push(row);
        }
    }

    if !stmt.sort.is_empty() {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            scope.set(&stmt.var, row.clone());
            let keys = stmt
                .sort
                .iter()
                .map(|k| scope.eval(&k.expr))
                .collect::<DriverResult<Vec<_>>>()?;
            keyed.push((keys, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, key) in stmt.sort.iter().enumerate() {
                let ord = compare(&a[i], &b[i]);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        rows = keyed.into_iter().map(|(_, row)| row).collect();
    }

    apply_limit(rows, stmt.limit.as_ref(), &scope)
}

fn row_key(row: &Json) -> DriverResult<String> {
    match row {
        Json::String(key) => Ok(key.clone()),
        _ => row
            .get("_key")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::InvalidDocument("row has no _key".to_string())),
    }
}

/// RETURN and COUNT terminals.
fn read_terminal(stmt: &ScanStatement, rows: Vec<Json>, bind_vars: &Document) -> DriverResult<Vec<Json>> {
    let mut scope = Scope::new(bind_vars);
    match &stmt.terminal {
        Terminal::Return(expr) => rows
            .into_iter()
            .map(|row| {
                scope.set(&stmt.var, row);
                scope.eval(expr)
            })
            .collect(),
        Terminal::Count { into, ret } => {
            if into != ret {
                return Err(DriverError::Query {
                    message: format!("variable '{ret}' is not defined"),
                    position: None,
                });
            }
            Ok(vec![Json::from(rows.len())])
        }
        Terminal::Update { .. } | Terminal::Remove { .. } => Err(DriverError::Query {
            message: "modification needs write access".to_string(),
            position: None,
        }),
    }
}

/// UPDATE and REMOVE terminals.
fn write_terminal(
    state: &mut State,
    stmt: &ScanStatement,
    rows: Vec<Json>,
    bind_vars: &Document,
) -> DriverResult<Vec<Json>> {
    let mut scope = Scope::new(bind_vars);
    let mut out = Vec::new();

    match &stmt.terminal {
        Terminal::Update {
            var,
            with,
            target,
            ret,
        } => {
            let target = resolve_source(target, bind_vars)?;
            for row in rows {
                scope.set(&stmt.var, row);
                let key = row_key(&scope.eval(&Expr::Path(vec![var.clone()]))?)?;
                let mut patch = match scope.eval(with)? {
                    Json::Object(patch) => patch,
                    other => {
                        return Err(DriverError::Query {
                            message: format!("UPDATE expects an object, got {other}"),
                            position: None,
                        })
                    }
                };
                patch.insert("_key".into(), key.into());
                let (old, new) = state.collection_mut(&target)?.update(&target, &patch)?;
                if let Some(expr) = ret {
                    scope.set("OLD", Json::Object(old));
                    scope.set("NEW", Json::Object(new));
                    out.push(scope.eval(expr)?);
                }
            }
        }
        Terminal::Remove { var, target, ret } => {
            let target = resolve_source(target, bind_vars)?;
            for row in rows {
                scope.set(&stmt.var, row);
                let key = row_key(&scope.eval(&Expr::Path(vec![var.clone()]))?)?;
                let old = state.collection_mut(&target)?.remove(&target, &key)?;
                if let Some(expr) = ret {
                    scope.set("OLD", Json::Object(old));
                    out.push(scope.eval(expr)?);
                }
            }
        }
        Terminal::Return(_) | Terminal::Count { .. } => return read_terminal(stmt, rows, bind_vars),
    }
    Ok(out)
}

fn execute_traversal(
    state: &State,
    stmt: &TraversalStatement,
    bind_vars: &Document,
) -> DriverResult<Vec<Json>> {
    let mut scope = Scope::new(bind_vars);

    let start = match scope.eval(&stmt.start)? {
        Json::String(id) => id,
        Json::Object(doc) => doc
            .get("_id")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::InvalidDocument("start vertex has no _id".to_string()))?,
        other => {
            return Err(DriverError::Query {
                message: format!("invalid start vertex {other}"),
                position: None,
            })
        }
    };
    let graph = match scope.eval(&stmt.graph)? {
        Json::String(name) => name,
        other => {
            return Err(DriverError::Query {
                message: format!("invalid graph name {other}"),
                position: None,
            })
        }
    };
    let uniqueness = match &stmt.options {
        Some(options) => match scope.eval(options)?.get("uniqueVertices").and_then(Json::as_str) {
            Some("global") => Uniqueness::Global,
            Some("path") => Uniqueness::Path,
            _ => Uniqueness::None,
        },
        None => Uniqueness::None,
    };

    let paths = state.walk_paths(
        &graph,
        &start,
        stmt.direction,
        (stmt.min_depth, stmt.max_depth),
        uniqueness,
    )?;

    let mut rows = Vec::new();
    for path in paths {
        let vertex = path.vertices.last().cloned().map_or(Json::Null, Json::Object);
        let edge = path.edges.last().cloned().map_or(Json::Null, Json::Object);
        let record = json!({ "vertices": path.vertices, "edges": path.edges });
        scope.set(&stmt.vertex_var, vertex);
        scope.set(&stmt.edge_var, edge);
        scope.set(&stmt.path_var, record);
        if scope.passes(&stmt.filters)? {
            rows.push(scope.eval(&stmt.ret)?);
        }
    }

    apply_limit(rows, stmt.limit.as_ref(), &scope)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

impl Driver for MemoryDriver {
    fn has_collection(&self, name: &str) -> DriverResult<bool> {
        Ok(self.state.read().collections.contains_key(name))
    }

    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        options: &Document,
    ) -> DriverResult<()> {
        let mut state = self.state.write();
        if state.collections.contains_key(name) {
            return Err(DriverError::CollectionExists(name.to_string()));
        }
        state
            .collections
            .insert(name.to_string(), StoredCollection::new(kind, options.clone()));
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.state
            .write()
            .collections
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| DriverError::CollectionNotFound(name.to_string()))
    }

    fn list_collections(&self) -> DriverResult<Vec<String>> {
        Ok(self.state.read().collections.keys().cloned().collect())
    }

    fn collection_count(&self, name: &str) -> DriverResult<u64> {
        let state = self.state.read();
        Ok(state.collection(name)?.documents.len() as u64)
    }

    fn add_index(&self, collection: &str, index: &IndexSpec) -> DriverResult<()> {
        let mut state = self.state.write();
        let stored = state.collection_mut(collection)?;
        if !stored.indexes.contains(index) {
            stored.indexes.push(index.clone());
        }
        Ok(())
    }

    fn get_document(&self, collection: &str, key: &str) -> DriverResult<Option<Document>> {
        let state = self.state.read();
        Ok(state.collection(collection)?.documents.get(key).cloned())
    }

    fn has_document(&self, collection: &str, key: &str) -> DriverResult<bool> {
        let state = self.state.read();
        Ok(state.collection(collection)?.documents.contains_key(key))
    }

    fn insert(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        let mut state = self.state.write();
        state.collection_mut(collection)?.insert(collection, document)
    }

    fn update(&self, collection: &str, document: &Document) -> DriverResult<Document> {
        let mut state = self.state.write();
        let (old, new) = state.collection_mut(collection)?.update(collection, document)?;

        let mut out = store::meta(
            new.get("_key").and_then(Json::as_str).unwrap_or_default(),
            new.get("_id").and_then(Json::as_str).unwrap_or_default(),
            new.get("_rev").and_then(Json::as_str).unwrap_or_default(),
        );
        if let Some(old_rev) = old.get("_rev") {
            out.insert("_oldRev".into(), old_rev.clone());
        }
        Ok(out)
    }

    fn delete(&self, collection: &str, key: &str) -> DriverResult<Document> {
        let mut state = self.state.write();
        let old = state.collection_mut(collection)?.remove(collection, key)?;
        Ok(store::meta(
            key,
            old.get("_id").and_then(Json::as_str).unwrap_or_default(),
            old.get("_rev").and_then(Json::as_str).unwrap_or_default(),
        ))
    }

    fn execute_query(
        &self,
        query: &str,
        bind_vars: &Document,
    ) -> DriverResult<Vec<serde_json::Value>> {
        match aql::parse(query)? {
            Statement::Scan(stmt) => match stmt.terminal {
                Terminal::Update { .. } | Terminal::Remove { .. } => {
                    let mut state = self.state.write();
                    let rows = scan_rows(&state, &stmt, bind_vars)?;
                    write_terminal(&mut state, &stmt, rows, bind_vars)
                }
                Terminal::Return(_) | Terminal::Count { .. } => {
                    let rows = scan_rows(&self.state.read(), &stmt, bind_vars)?;
                    read_terminal(&stmt, rows, bind_vars)
                }
            },
            Statement::Traversal(stmt) => execute_traversal(&self.state.read(), &stmt, bind_vars),
        }
    }

    fn graph_traverse(&self, request: &TraversalRequest) -> DriverResult<Vec<PathRecord>> {
        let state = self.state.read();
        let paths = state.walk_paths(
            &request.graph,
            &request.start_vertex,
            request.direction,
            (request.min_depth, request.max_depth),
            request.uniqueness,
        )?;

        let Some(filter) = &request.vertex_filter else {
            return Ok(paths);
        };
        Ok(paths
            .into_iter()
            .filter(|path| {
                path.vertices
                    .last()
                    .and_then(|v| v.get("_id"))
                    .and_then(Json::as_str)
                    .is_some_and(|id| filter.allows(id))
            })
            .collect())
    }

    fn create_graph(&self, name: &str, edge_definitions: &[EdgeDefinition]) -> DriverResult<()> {
        let mut state = self.state.write();
        if state.graphs.contains_key(name) {
            return Err(DriverError::GraphExists(name.to_string()));
        }
        for definition in edge_definitions {
            state.ensure_definition_collections(definition);
        }
        state.graphs.insert(
            name.to_string(),
            GraphInfo {
                name: name.to_string(),
                edge_definitions: edge_definitions.to_vec(),
                orphan_collections: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_graph(&self, name: &str, drop_collections: bool) -> DriverResult<()> {
        let mut state = self.state.write();
        let info = state
            .graphs
            .shift_remove(name)
            .ok_or_else(|| DriverError::GraphNotFound(name.to_string()))?;

        if drop_collections {
            for definition in &info.edge_definitions {
                state.collections.shift_remove(&definition.edge_collection);
                for vertex in definition
                    .from_collections
                    .iter()
                    .chain(definition.to_collections.iter())
                {
                    state.collections.shift_remove(vertex);
                }
            }
            for orphan in &info.orphan_collections {
                state.collections.shift_remove(orphan);
            }
        }
        Ok(())
    }

    fn list_graphs(&self) -> DriverResult<Vec<String>> {
        Ok(self.state.read().graphs.keys().cloned().collect())
    }

    fn graph_info(&self, name: &str) -> DriverResult<GraphInfo> {
        self.state
            .read()
            .graphs
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::GraphNotFound(name.to_string()))
    }

    fn create_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> DriverResult<()> {
        let mut state = self.state.write();
        let info = state.graph_mut(graph)?;
        if info
            .edge_definitions
            .iter()
            .any(|d| d.edge_collection == definition.edge_collection)
        {
            return Err(DriverError::EdgeDefinitionExists(
                definition.edge_collection.clone(),
            ));
        }
        info.edge_definitions.push(definition.clone());
        state.ensure_definition_collections(definition);
        Ok(())
    }

    fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> DriverResult<()> {
        let mut state = self.state.write();
        let info = state.graph_mut(graph)?;
        let slot = info
            .edge_definitions
            .iter_mut()
            .find(|d| d.edge_collection == definition.edge_collection)
            .ok_or_else(|| DriverError::EdgeDefinitionNotFound(definition.edge_collection.clone()))?;
        *slot = definition.clone();
        state.ensure_definition_collections(definition);
        Ok(())
    }

    fn delete_edge_definition(
        &self,
        graph: &str,
        edge_collection: &str,
        purge: bool,
    ) -> DriverResult<()> {
        let mut state = self.state.write();
        let info = state.graph_mut(graph)?;
        let before = info.edge_definitions.len();
        info.edge_definitions
            .retain(|d| d.edge_collection != edge_collection);
        if info.edge_definitions.len() == before {
            return Err(DriverError::EdgeDefinitionNotFound(
                edge_collection.to_string(),
            ));
        }
        if purge {
            state.collections.shift_remove(edge_collection);
        }
        Ok(())
    }
}
