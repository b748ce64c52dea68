//! Depth-first path enumeration over stored edge collections.

use rustc_hash::FxHashSet;

use super::State;
use crate::driver::{Direction, PathRecord, Uniqueness};
use crate::value::Document;

/// Safety cap on traversal depth.
pub(super) const SAFETY_MAX_DEPTH: u32 = 100;

/// Parameters of one walk.
#[derive(Debug, Clone)]
pub(super) struct Walk<'a> {
    pub edge_collections: &'a [String],
    pub direction: Direction,
    pub min_depth: u32,
    pub max_depth: u32,
    pub uniqueness: Uniqueness,
}

struct Walker<'s, 'w> {
    state: &'s State,
    walk: &'w Walk<'w>,
    visited: FxHashSet<String>,
    vertices: Vec<&'s Document>,
    vertex_ids: Vec<String>,
    edges: Vec<&'s Document>,
    edge_ids: Vec<String>,
    out: Vec<PathRecord>,
}

/// Enumerates every path from `start_id` within the depth range.
///
/// Paths come out in depth-first order, following edge collections in the
/// order given and edges in insertion order. A missing start vertex yields
/// no paths.
pub(super) fn enumerate_paths(state: &State, start_id: &str, walk: &Walk<'_>) -> Vec<PathRecord> {
    let Some(start) = state.document_by_id(start_id) else {
        return Vec::new();
    };

    let mut walker = Walker {
        state,
        walk,
        visited: FxHashSet::default(),
        vertices: vec![start],
        vertex_ids: vec![start_id.to_string()],
        edges: Vec::new(),
        edge_ids: Vec::new(),
        out: Vec::new(),
    };
    walker.visited.insert(start_id.to_string());
    walker.descend(start_id.to_string(), 0);
    walker.out
}

impl<'s> Walker<'s, '_> {
    fn emit(&mut self) {
        self.out.push(PathRecord {
            vertices: self.vertices.iter().map(|d| (*d).clone()).collect(),
            edges: self.edges.iter().map(|d| (*d).clone()).collect(),
        });
    }

    fn descend(&mut self, vertex_id: String, depth: u32) {
        if depth >= self.walk.min_depth {
            self.emit();
        }
        if depth >= self.walk.max_depth.min(SAFETY_MAX_DEPTH) {
            return;
        }

        for (edge_id, edge, next_id) in self.neighbours(&vertex_id) {
            if self.edge_ids.contains(&edge_id) {
                continue;
            }
            match self.walk.uniqueness {
                Uniqueness::Path if self.vertex_ids.contains(&next_id) => continue,
                Uniqueness::Global if self.visited.contains(&next_id) => continue,
                _ => {}
            }
            let Some(next) = self.state.document_by_id(&next_id) else {
                continue;
            };

            self.visited.insert(next_id.clone());
            self.edges.push(edge);
            self.edge_ids.push(edge_id);
            self.vertices.push(next);
            self.vertex_ids.push(next_id.clone());

            self.descend(next_id, depth + 1);

            self.vertices.pop();
            self.vertex_ids.pop();
            self.edges.pop();
            self.edge_ids.pop();
        }
    }

    /// Edges touching `vertex_id` in the walk direction, with the vertex
    /// on the other side.
    fn neighbours(&self, vertex_id: &str) -> Vec<(String, &'s Document, String)> {
        let mut out = Vec::new();
        for name in self.walk.edge_collections {
            let Some(collection) = self.state.collections.get(name) else {
                continue;
            };

            let mut push = |keys: &[String], endpoint: &str| {
                for key in keys {
                    let Some(edge) = collection.documents.get(key) else {
                        continue;
                    };
                    let Some(other) = edge.get(endpoint).and_then(serde_json::Value::as_str) else {
                        continue;
                    };
                    out.push((format!("{name}/{key}"), edge, other.to_string()));
                }
            };

            if matches!(self.walk.direction, Direction::Outbound | Direction::Any) {
                push(collection.edges.outgoing(vertex_id), "_to");
            }
            if matches!(self.walk.direction, Direction::Inbound | Direction::Any) {
                push(collection.edges.incoming(vertex_id), "_from");
            }
        }
        out
    }
}
