//! Collection storage with a bidirectional edge index.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::driver::{CollectionKind, DriverError, DriverResult, IndexSpec};
use crate::value::Document;

/// Edge index: vertex id -> edge keys, in insertion order.
///
/// Provides O(degree) access to outgoing and incoming edges of any vertex.
#[derive(Debug, Default)]
pub(super) struct EdgeIndex {
    /// Outgoing edges: `_from` -> edge keys
    outgoing: FxHashMap<String, Vec<String>>,
    /// Incoming edges: `_to` -> edge keys
    incoming: FxHashMap<String, Vec<String>>,
}

impl EdgeIndex {
    fn add(&mut self, key: &str, from: &str, to: &str) {
        self.outgoing
            .entry(from.to_string())
            .or_default()
            .push(key.to_string());
        self.incoming
            .entry(to.to_string())
            .or_default()
            .push(key.to_string());
    }

    fn remove(&mut self, key: &str, from: &str, to: &str) {
        if let Some(keys) = self.outgoing.get_mut(from) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.outgoing.remove(from);
            }
        }
        if let Some(keys) = self.incoming.get_mut(to) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.incoming.remove(to);
            }
        }
    }

    /// Keys of edges leaving `vertex_id`.
    pub(super) fn outgoing(&self, vertex_id: &str) -> &[String] {
        self.outgoing.get(vertex_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys of edges pointing at `vertex_id`.
    pub(super) fn incoming(&self, vertex_id: &str) -> &[String] {
        self.incoming.get(vertex_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One stored collection.
#[derive(Debug)]
pub(super) struct StoredCollection {
    pub(super) kind: CollectionKind,
    pub(super) documents: IndexMap<String, Document>,
    pub(super) indexes: Vec<IndexSpec>,
    pub(super) options: Document,
    pub(super) edges: EdgeIndex,
    next_key: u64,
    next_rev: u64,
}

impl StoredCollection {
    pub(super) fn new(kind: CollectionKind, options: Document) -> Self {
        Self {
            kind,
            documents: IndexMap::new(),
            indexes: Vec::new(),
            options,
            edges: EdgeIndex::default(),
            next_key: 1,
            next_rev: 1,
        }
    }

    fn next_rev(&mut self) -> String {
        let rev = format!("_r{}", self.next_rev);
        self.next_rev += 1;
        rev
    }

    fn assign_key(&mut self) -> String {
        loop {
            let key = self.next_key.to_string();
            self.next_key += 1;
            if !self.documents.contains_key(&key) {
                return key;
            }
        }
    }

    /// Inserts a document, returning `{_key, _id, _rev}`.
    pub(super) fn insert(&mut self, name: &str, document: &Document) -> DriverResult<Document> {
        let key = match document.get("_key") {
            None | Some(serde_json::Value::Null) => self.assign_key(),
            Some(serde_json::Value::String(k)) if !k.is_empty() && !k.contains('/') => {
                if self.documents.contains_key(k) {
                    return Err(DriverError::DocumentExists {
                        collection: name.to_string(),
                        key: k.clone(),
                    });
                }
                k.clone()
            }
            Some(other) => {
                return Err(DriverError::InvalidDocument(format!(
                    "illegal document key {other}"
                )))
            }
        };

        let endpoints = if self.kind == CollectionKind::Edge {
            Some(edge_endpoints(document)?)
        } else {
            None
        };

        let id = format!("{name}/{key}");
        let rev = self.next_rev();

        let mut stored = document.clone();
        stored.insert("_key".into(), key.clone().into());
        stored.insert("_id".into(), id.clone().into());
        stored.insert("_rev".into(), rev.clone().into());

        if let Some((from, to)) = endpoints {
            self.edges.add(&key, &from, &to);
        }
        self.documents.insert(key.clone(), stored);

        Ok(meta(&key, &id, &rev))
    }

    /// Patches the document named by `patch["_key"]`, returning (old, new).
    pub(super) fn update(
        &mut self,
        name: &str,
        patch: &Document,
    ) -> DriverResult<(Document, Document)> {
        let key = match patch.get("_key") {
            Some(serde_json::Value::String(k)) => k.clone(),
            _ => {
                return Err(DriverError::InvalidDocument(
                    "update requires a string _key".to_string(),
                ))
            }
        };

        let old = self
            .documents
            .get(&key)
            .cloned()
            .ok_or_else(|| DriverError::DocumentNotFound {
                collection: name.to_string(),
                key: key.clone(),
            })?;

        let mut new = old.clone();
        for (k, v) in patch {
            if matches!(k.as_str(), "_key" | "_id" | "_rev") {
                continue;
            }
            new.insert(k.clone(), v.clone());
        }

        if self.kind == CollectionKind::Edge {
            let (old_from, old_to) = edge_endpoints(&old)?;
            let (new_from, new_to) = edge_endpoints(&new)?;
            if old_from != new_from || old_to != new_to {
                self.edges.remove(&key, &old_from, &old_to);
                self.edges.add(&key, &new_from, &new_to);
            }
        }

        let rev = self.next_rev();
        new.insert("_rev".into(), rev.into());
        self.documents.insert(key, new.clone());
        Ok((old, new))
    }

    /// Removes a document, returning it.
    pub(super) fn remove(&mut self, name: &str, key: &str) -> DriverResult<Document> {
        let old = self
            .documents
            .shift_remove(key)
            .ok_or_else(|| DriverError::DocumentNotFound {
                collection: name.to_string(),
                key: key.to_string(),
            })?;

        if self.kind == CollectionKind::Edge {
            if let Ok((from, to)) = edge_endpoints(&old) {
                self.edges.remove(key, &from, &to);
            }
        }
        Ok(old)
    }
}

/// Builds the `{_key, _id, _rev}` metadata document.
pub(super) fn meta(key: &str, id: &str, rev: &str) -> Document {
    let mut out = Document::new();
    out.insert("_key".into(), key.into());
    out.insert("_id".into(), id.into());
    out.insert("_rev".into(), rev.into());
    out
}

fn edge_endpoints(document: &Document) -> DriverResult<(String, String)> {
    let endpoint = |name: &str| match document.get(name) {
        Some(serde_json::Value::String(id)) if id.contains('/') => Ok(id.clone()),
        _ => Err(DriverError::InvalidDocument(format!(
            "edge attribute {name} must be a document id"
        ))),
    };
    Ok((endpoint("_from")?, endpoint("_to")?))
}
