//! Entity type declarations.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::Entity;
use crate::driver::{CollectionKind, IndexSpec};
use crate::error::{Error, Result};
use crate::relationship::Relationship;
use crate::schema::{Field, Schema, SchemaCache, DEFAULT_SCHEMA_CACHE_CAPACITY};
use crate::value::{Document, Value};

/// Member names owned by the mapper; they cannot be declared.
pub const RESERVED_MEMBERS: [&str; 5] = ["_id", "_rev", "_from", "_to", "_relations"];

/// Name of the identifier field every entity type carries.
pub const KEY_FIELD: &str = "_key";

/// Hook run while loading an entity.
pub type Hook = Arc<dyn Fn(&mut Entity) -> Result<()> + Send + Sync>;

/// Vertex or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Document collection member.
    Vertex,
    /// Edge collection member with `_from` / `_to` endpoints.
    Edge,
}

impl EntityKind {
    /// Collection kind to create for this entity kind.
    #[must_use]
    pub const fn collection_kind(self) -> CollectionKind {
        match self {
            Self::Vertex => CollectionKind::Document,
            Self::Edge => CollectionKind::Edge,
        }
    }
}

/// Discriminator field plus the value each subtype stores in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inheritance {
    field: String,
    mapping: IndexMap<String, Value>,
}

impl Inheritance {
    /// Returns the discriminator field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the discriminator value declared for a type name.
    #[must_use]
    pub fn value_for(&self, type_name: &str) -> Option<&Value> {
        self.mapping.get(type_name)
    }

    /// Returns the type name whose discriminator value equals `value`.
    #[must_use]
    pub fn type_for(&self, value: &Value) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// A declared entity type: collection, schema, relationships and hooks.
///
/// Built once with [`EntityType::vertex`] or [`EntityType::edge`] and shared
/// behind an `Arc`. Immutable after [`EntityTypeBuilder::build`], except for
/// the capacity of its restricted-schema cache.
pub struct EntityType {
    type_name: String,
    collection: String,
    kind: EntityKind,
    schema: Arc<Schema>,
    key_field: Option<String>,
    allow_extra_fields: bool,
    relationships: IndexMap<String, Relationship>,
    inheritance: Option<Inheritance>,
    pre_process: Option<Hook>,
    post_process: Option<Hook>,
    indexes: Vec<IndexSpec>,
    collection_options: Document,
    ancestors: Vec<String>,
    schema_cache: SchemaCache,
}

impl EntityType {
    /// Starts declaring a vertex type stored in `collection`.
    #[must_use]
    pub fn vertex(type_name: impl Into<String>, collection: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(type_name.into(), collection.into(), EntityKind::Vertex)
    }

    /// Starts declaring an edge type stored in `collection`.
    #[must_use]
    pub fn edge(type_name: impl Into<String>, collection: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(type_name.into(), collection.into(), EntityKind::Edge)
    }

    /// The schema-less edge type for a plain edge collection.
    #[must_use]
    pub fn relation(collection: impl Into<String>) -> Arc<Self> {
        let builder = Self::edge("Relation", collection);
        Arc::new(builder.assemble(key_schema("Relation")))
    }

    /// Returns the type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns true for edge types.
    #[must_use]
    pub fn is_edge(&self) -> bool {
        self.kind == EntityKind::Edge
    }

    /// Returns the full schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the schema restricted to `only`, or the full schema.
    ///
    /// Restricted schemas come from a per-type cache keyed by the
    /// order-independent set of names.
    #[must_use]
    pub fn schema_for<S: AsRef<str>>(&self, only: Option<&[S]>) -> Arc<Schema> {
        match only {
            Some(only) => self.schema_cache.restricted(&self.schema, only),
            None => Arc::clone(&self.schema),
        }
    }

    /// Returns the restricted-schema cache.
    #[must_use]
    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }

    /// Returns the field aliasing `_key`, if any.
    #[must_use]
    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    /// Returns true if `name` reads and writes the key slot.
    #[must_use]
    pub fn is_key_name(&self, name: &str) -> bool {
        name == KEY_FIELD || self.key_field.as_deref() == Some(name)
    }

    /// Returns true if unknown fields are kept on load and dump.
    #[must_use]
    pub fn allows_extra_fields(&self) -> bool {
        self.allow_extra_fields
    }

    /// Returns the declared relationships.
    #[must_use]
    pub fn relationships(&self) -> &IndexMap<String, Relationship> {
        &self.relationships
    }

    /// Looks up a relationship by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Returns the discriminator declaration.
    #[must_use]
    pub fn inheritance(&self) -> Option<&Inheritance> {
        self.inheritance.as_ref()
    }

    pub(crate) fn pre_process(&self) -> Option<&Hook> {
        self.pre_process.as_ref()
    }

    pub(crate) fn post_process(&self) -> Option<&Hook> {
        self.post_process.as_ref()
    }

    /// Returns the declared indexes.
    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Returns the collection creation options.
    #[must_use]
    pub fn collection_options(&self) -> &Document {
        &self.collection_options
    }

    /// Ancestor type names, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Own type name followed by the ancestors, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.type_name.as_str()).chain(self.ancestors.iter().map(String::as_str))
    }

    /// Returns true if this type is `type_name` or derives from it.
    #[must_use]
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage().any(|name| name == type_name)
    }

    /// Builds a new instance from field values. See [`Entity::construct`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberExists`] if a value targets a reserved name
    /// or a relationship.
    pub fn construct<I, K>(self: &Arc<Self>, values: I) -> Result<Entity>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Entity::construct(self, values)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("type_name", &self.type_name)
            .field("collection", &self.collection)
            .field("kind", &self.kind)
            .field("fields", &self.schema.fields().keys().collect::<Vec<_>>())
            .field("key_field", &self.key_field)
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .field("ancestors", &self.ancestors)
            .finish_non_exhaustive()
    }
}

fn key_schema(type_name: &str) -> Schema {
    Schema::new(type_name)
        .field(Field::string(KEY_FIELD))
        .with_identifier(KEY_FIELD)
}

/// Builder for [`EntityType`].
///
/// Field precedence, lowest first: the parent's fields, mixins in the order
/// given, own fields.
#[must_use]
pub struct EntityTypeBuilder {
    type_name: String,
    collection: String,
    kind: EntityKind,
    parent: Option<Arc<EntityType>>,
    mixins: Vec<Schema>,
    fields: Vec<Field>,
    key_field: Option<String>,
    allow_extra_fields: Option<bool>,
    relationships: Vec<Relationship>,
    inheritance: Option<Inheritance>,
    pre_process: Option<Hook>,
    post_process: Option<Hook>,
    indexes: Vec<IndexSpec>,
    collection_options: Document,
    cache_capacity: usize,
}

impl EntityTypeBuilder {
    fn new(type_name: String, collection: String, kind: EntityKind) -> Self {
        Self {
            type_name,
            collection,
            kind,
            parent: None,
            mixins: Vec::new(),
            fields: Vec::new(),
            key_field: None,
            allow_extra_fields: None,
            relationships: Vec::new(),
            inheritance: None,
            pre_process: None,
            post_process: None,
            indexes: Vec::new(),
            collection_options: Document::new(),
            cache_capacity: DEFAULT_SCHEMA_CACHE_CAPACITY,
        }
    }

    /// Declares a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Merges the fields of a shared field set.
    pub fn mixin(mut self, fields: &Schema) -> Self {
        self.mixins.push(fields.clone());
        self
    }

    /// Inherits fields, relationships, hooks, key alias, discriminator and
    /// extra-field policy from `parent`.
    pub fn extends(mut self, parent: &Arc<EntityType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Aliases `_key` to a declared field.
    pub fn key_field(mut self, name: impl Into<String>) -> Self {
        self.key_field = Some(name.into());
        self
    }

    /// Keeps undeclared fields on load and dump.
    pub fn allow_extra_fields(mut self, allow: bool) -> Self {
        self.allow_extra_fields = Some(allow);
        self
    }

    /// Declares a relationship.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Declares a discriminator field and the value stored for each type
    /// name.
    pub fn inheritance<I, K, V>(mut self, field: impl Into<String>, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.inheritance = Some(Inheritance {
            field: field.into(),
            mapping: mapping
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    /// Runs before the key back-fill of every load.
    pub fn pre_process<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Entity) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_process = Some(Arc::new(hook));
        self
    }

    /// Runs at the end of every load.
    pub fn post_process<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Entity) -> Result<()> + Send + Sync + 'static,
    {
        self.post_process = Some(Arc::new(hook));
        self
    }

    /// Declares an index created with the collection.
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets a collection creation option.
    pub fn collection_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.collection_options.insert(key.into(), value);
        self
    }

    /// Sets the capacity of the restricted-schema cache.
    pub fn schema_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// - [`Error::Declaration`] for an empty collection name, or a key alias
    ///   or discriminator naming an undeclared field.
    /// - [`Error::MemberExists`] for a field or relationship using a
    ///   reserved name, or a relationship sharing a field's name.
    pub fn build(self) -> Result<Arc<EntityType>> {
        if self.collection.is_empty() {
            return Err(Error::Declaration(format!(
                "entity type '{}' has no collection name",
                self.type_name
            )));
        }

        let mut schema = match &self.parent {
            Some(parent) => parent.schema().renamed(&self.type_name),
            None => key_schema(&self.type_name),
        };
        for mixin in &self.mixins {
            for field in mixin.fields().values() {
                schema.insert(field.clone());
            }
        }
        for field in &self.fields {
            schema.insert(field.clone());
        }

        for name in schema.fields().keys() {
            if RESERVED_MEMBERS.contains(&name.as_str()) {
                return Err(Error::MemberExists {
                    member: name.clone(),
                    entity: self.type_name.clone(),
                });
            }
        }

        let mut own: Vec<&str> = Vec::new();
        for rel in &self.relationships {
            if own.contains(&rel.name()) {
                return Err(Error::MemberExists {
                    member: rel.name().to_string(),
                    entity: self.type_name.clone(),
                });
            }
            own.push(rel.name());
        }
        let inherited = self
            .parent
            .iter()
            .flat_map(|p| p.relationships().keys().map(String::as_str));
        for name in inherited.chain(own.iter().copied()) {
            if schema.contains(name) || RESERVED_MEMBERS.contains(&name) {
                return Err(Error::MemberExists {
                    member: name.to_string(),
                    entity: self.type_name.clone(),
                });
            }
        }

        let key_field = self
            .key_field
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.key_field.clone()));
        if let Some(alias) = &key_field {
            if !schema.contains(alias) {
                return Err(Error::Declaration(format!(
                    "key field '{alias}' is not a field of '{}'",
                    self.type_name
                )));
            }
        }

        let inheritance = self
            .inheritance
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.inheritance.clone()));
        if let Some(inheritance) = &inheritance {
            if !schema.contains(&inheritance.field) {
                return Err(Error::Declaration(format!(
                    "discriminator '{}' is not a field of '{}'",
                    inheritance.field, self.type_name
                )));
            }
        }

        let mut built = self.assemble(schema);
        built.key_field = key_field;
        built.inheritance = inheritance;
        Ok(Arc::new(built))
    }

    /// Final assembly; inherited relationships precede own ones.
    fn assemble(self, schema: Schema) -> EntityType {
        let parent = self.parent;

        let mut relationships: IndexMap<String, Relationship> = parent
            .as_ref()
            .map(|p| p.relationships.clone())
            .unwrap_or_default();
        for rel in self.relationships {
            relationships.insert(rel.name().to_string(), rel);
        }

        let ancestors = parent
            .as_ref()
            .map(|p| p.lineage().map(str::to_string).collect())
            .unwrap_or_default();

        let mut collection_options = parent
            .as_ref()
            .map(|p| p.collection_options.clone())
            .unwrap_or_default();
        collection_options.extend(self.collection_options);

        let mut indexes = parent.as_ref().map(|p| p.indexes.clone()).unwrap_or_default();
        indexes.extend(self.indexes);

        EntityType {
            type_name: self.type_name,
            collection: self.collection,
            kind: self.kind,
            schema: Arc::new(schema),
            key_field: self.key_field,
            allow_extra_fields: self
                .allow_extra_fields
                .or_else(|| parent.as_ref().map(|p| p.allow_extra_fields))
                .unwrap_or(false),
            relationships,
            inheritance: self.inheritance,
            pre_process: self
                .pre_process
                .or_else(|| parent.as_ref().and_then(|p| p.pre_process.clone())),
            post_process: self
                .post_process
                .or_else(|| parent.as_ref().and_then(|p| p.post_process.clone())),
            indexes,
            collection_options,
            ancestors,
            schema_cache: SchemaCache::new(self.cache_capacity),
        }
    }
}
