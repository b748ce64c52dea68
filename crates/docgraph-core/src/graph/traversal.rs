//! Traversal arena.
//!
//! Objectified traversal results form a cyclic graph (vertex, edge, vertex).
//! The arena stores each vertex once, keyed by its `_id`, and each edge once
//! per parent context; edges refer to their endpoints by id and [`EdgeRef`]
//! resolves them against the arena on access.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use super::Graph;
use crate::database::Database;
use crate::driver::PathRecord;
use crate::entity::{Entity, LoadOptions};
use crate::error::{Error, Result};
use crate::value::Document;

#[derive(Debug, Clone)]
struct TraversedEdge {
    entity: Entity,
    collection: String,
    origin: String,
    next: String,
}

/// Typed result of a graph traversal.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    root: Option<String>,
    vertices: IndexMap<String, Entity>,
    edges: Vec<TraversedEdge>,
    relations: FxHashMap<String, IndexMap<String, Vec<usize>>>,
}

fn document_id(document: &Document, what: &str) -> Result<String> {
    match document.get("_id") {
        Some(Json::String(id)) => Ok(id.clone()),
        _ => Err(Error::MissingIdentifier(format!(
            "traversal {what} has no '_id'"
        ))),
    }
}

fn endpoint(document: &Document, name: &str, edge_id: &str) -> Result<String> {
    match document.get(name) {
        Some(Json::String(id)) => Ok(id.clone()),
        _ => Err(Error::MissingIdentifier(format!(
            "traversal edge '{edge_id}' has no '{name}'"
        ))),
    }
}

fn collection_of(id: &str) -> &str {
    id.split_once('/').map_or(id, |(collection, _)| collection)
}

/// Vertex documents drop null fields before loading.
fn strip_nulls(document: &Document) -> Document {
    document
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Traversal {
    /// Builds the arena from traversal paths.
    ///
    /// `root` seeds the vertex map; without one the first vertex of the
    /// first path becomes the root. An edge is created once per
    /// `parent_id->edge_id` pair and attached to the endpoint it was
    /// reached from.
    pub(super) fn objectify(
        graph: &Graph,
        db: &Database,
        root: Option<Entity>,
        paths: Vec<PathRecord>,
    ) -> Result<Self> {
        let mut traversal = Self::default();
        if let Some(root) = root {
            if let Some(id) = root.id() {
                traversal.root = Some(id.clone());
                traversal.vertices.insert(id, root);
            }
        }

        let mut added: FxHashMap<String, usize> = FxHashMap::default();

        for path in &paths {
            for raw in &path.vertices {
                let id = document_id(raw, "vertex")?;
                if traversal.vertices.contains_key(&id) {
                    continue;
                }
                let document = strip_nulls(raw);
                let entity_type = graph.resolve_vertex_type(db, collection_of(&id), &document)?;
                let entity = Entity::load(&entity_type, &document, LoadOptions::from_database(db))?;
                traversal.vertices.insert(id, entity);
            }

            let Some(first) = path.vertices.first() else {
                continue;
            };
            let mut parent = document_id(first, "vertex")?;
            if traversal.root.is_none() {
                traversal.root = Some(parent.clone());
            }

            for raw in &path.edges {
                let edge_id = document_id(raw, "edge")?;
                let from = endpoint(raw, "_from", &edge_id)?;
                let to = endpoint(raw, "_to", &edge_id)?;
                let (origin, next) = if from == parent { (from, to) } else { (to, from) };
                let collection = collection_of(&edge_id).to_string();

                let composite = format!("{parent}->{edge_id}");
                let index = match added.get(&composite) {
                    Some(index) => *index,
                    None => {
                        let entity_type = graph.edge_type(&collection)?;
                        let entity = Entity::load(&entity_type, raw, LoadOptions::from_database(db))?;
                        traversal.edges.push(TraversedEdge {
                            entity,
                            collection: collection.clone(),
                            origin: origin.clone(),
                            next: next.clone(),
                        });
                        let index = traversal.edges.len() - 1;
                        added.insert(composite, index);
                        index
                    }
                };

                let attached = traversal
                    .relations
                    .entry(origin)
                    .or_default()
                    .entry(collection)
                    .or_default();
                if !attached.contains(&index) {
                    attached.push(index);
                }
                parent = next;
            }
        }

        tracing::debug!(
            paths = paths.len(),
            vertices = traversal.vertices.len(),
            edges = traversal.edges.len(),
            "traversal objectified"
        );
        Ok(traversal)
    }

    /// The start vertex.
    #[must_use]
    pub fn root(&self) -> Option<&Entity> {
        self.root.as_deref().and_then(|id| self.vertices.get(id))
    }

    /// A vertex by `_id`.
    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&Entity> {
        self.vertices.get(id)
    }

    /// Every vertex, in discovery order.
    pub fn vertices(&self) -> impl Iterator<Item = &Entity> {
        self.vertices.values()
    }

    /// Number of distinct vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Every edge instance, in creation order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'_>> {
        (0..self.edges.len()).map(move |index| EdgeRef {
            traversal: self,
            index,
        })
    }

    /// Number of edge instances.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges of `edge_collection` reached from vertex `vertex_id`.
    #[must_use]
    pub fn relations(&self, vertex_id: &str, edge_collection: &str) -> Vec<EdgeRef<'_>> {
        self.relations
            .get(vertex_id)
            .and_then(|by_collection| by_collection.get(edge_collection))
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| EdgeRef {
                        traversal: self,
                        index,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Edge collections with relations attached to `vertex_id`.
    #[must_use]
    pub fn relation_collections(&self, vertex_id: &str) -> Vec<&str> {
        self.relations
            .get(vertex_id)
            .map(|by_collection| by_collection.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Relations of the root vertex.
    #[must_use]
    pub fn root_relations(&self, edge_collection: &str) -> Vec<EdgeRef<'_>> {
        match &self.root {
            Some(root) => self.relations(root, edge_collection),
            None => Vec::new(),
        }
    }
}

/// An edge of a [`Traversal`] with arena lookups for its endpoints.
#[derive(Clone, Copy)]
pub struct EdgeRef<'a> {
    traversal: &'a Traversal,
    index: usize,
}

impl<'a> EdgeRef<'a> {
    fn slot(&self) -> &'a TraversedEdge {
        &self.traversal.edges[self.index]
    }

    /// The edge entity.
    #[must_use]
    pub fn edge(&self) -> &'a Entity {
        &self.slot().entity
    }

    /// Edge collection name.
    #[must_use]
    pub fn collection(&self) -> &'a str {
        &self.slot().collection
    }

    /// The `_from` vertex.
    #[must_use]
    pub fn object_from(&self) -> Option<&'a Entity> {
        self.edge()
            .from_id()
            .and_then(|id| self.traversal.vertex(id))
    }

    /// The `_to` vertex.
    #[must_use]
    pub fn object_to(&self) -> Option<&'a Entity> {
        self.edge().to_id().and_then(|id| self.traversal.vertex(id))
    }

    /// The vertex the walk came from.
    #[must_use]
    pub fn origin(&self) -> Option<&'a Entity> {
        self.traversal.vertex(&self.slot().origin)
    }

    /// The vertex on the far side of the walk.
    #[must_use]
    pub fn next(&self) -> Option<&'a Entity> {
        self.traversal.vertex(&self.slot().next)
    }

    /// Id of the far-side vertex.
    #[must_use]
    pub fn next_id(&self) -> &'a str {
        &self.slot().next
    }

    /// Relations of the far-side vertex.
    #[must_use]
    pub fn next_relations(&self, edge_collection: &str) -> Vec<EdgeRef<'a>> {
        self.traversal.relations(&self.slot().next, edge_collection)
    }

    /// Returns true if both refer to the same edge instance.
    #[must_use]
    pub fn same_instance(&self, other: &EdgeRef<'_>) -> bool {
        std::ptr::eq(self.traversal, other.traversal) && self.index == other.index
    }
}

impl fmt::Debug for EdgeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot();
        f.debug_struct("EdgeRef")
            .field("edge", &slot.entity)
            .field("origin", &slot.origin)
            .field("next", &slot.next)
            .finish()
    }
}
