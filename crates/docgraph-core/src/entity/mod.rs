//! Entity model.
//!
//! An [`Entity`] is one vertex or edge instance of an [`EntityType`]. It
//! holds native field values, tracks which fields changed, keeps undeclared
//! fields when its type allows them, and resolves declared relationships
//! lazily through the database it is bound to.
//!
//! Instances are plain owned values: mutation needs `&mut`, so sharing one
//! instance across threads requires the caller's own synchronization.

mod entity_type;


pub use entity_type::{
    EntityKind, EntityType, EntityTypeBuilder, Hook, Inheritance, KEY_FIELD, RESERVED_MEMBERS,
};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::relationship::Related;
use crate::schema::{FieldSource, Schema, UnknownPolicy};
use crate::value::{Document, Value};

/// Options for [`Entity::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions<'a> {
    /// Restrict loading (and later dumps) to these fields.
    pub only: Option<Vec<String>>,
    /// Existing instance whose dump is patched with the new data.
    pub instance: Option<&'a Entity>,
    /// Database the data came from; marks the result clean.
    pub database: Option<Database>,
}

impl<'a> LoadOptions<'a> {
    /// Loads from storage through `database`.
    #[must_use]
    pub fn from_database(database: &Database) -> Self {
        Self {
            database: Some(database.clone()),
            ..Self::default()
        }
    }

    /// Restricts the load to `fields`.
    #[must_use]
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Patches `instance` with the new data.
    #[must_use]
    pub fn patching(mut self, instance: &'a Entity) -> Self {
        self.instance = Some(instance);
        self
    }
}

/// One vertex or edge instance.
#[derive(Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    collection: String,
    key: Option<String>,
    values: IndexMap<String, Value>,
    extra: IndexMap<String, serde_json::Value>,
    dirty: BTreeSet<String>,
    refs: FxHashMap<String, Related>,
    database: Option<Database>,
    instance_schema: Option<Arc<Schema>>,
    from_id: Option<String>,
    to_id: Option<String>,
}

impl Entity {
    fn blank(entity_type: &Arc<EntityType>) -> Self {
        Self {
            entity_type: Arc::clone(entity_type),
            collection: entity_type.collection().to_string(),
            key: None,
            values: IndexMap::new(),
            extra: IndexMap::new(),
            dirty: BTreeSet::new(),
            refs: FxHashMap::default(),
            database: None,
            instance_schema: None,
            from_id: None,
            to_id: None,
        }
    }

    /// Creates an instance with every field at its default.
    ///
    /// # Errors
    ///
    /// Only fails if a declared default targets a reserved member, which
    /// the builder already rules out.
    pub fn new(entity_type: &Arc<EntityType>) -> Result<Self> {
        Self::construct(entity_type, std::iter::empty::<(String, Value)>())
    }

    /// Creates an instance from field values.
    ///
    /// Each declared field takes the supplied value, else its default, else
    /// null, and is marked dirty. The key and its alias are left unset when
    /// neither a value nor a default exists. Remaining values are kept as
    /// extra fields; whether they are persisted is decided at dump time.
    /// An unset discriminator is filled from the type's inheritance map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberExists`] if a value targets `_id`, `_rev`,
    /// `_relations` or a relationship name, or targets `_from` / `_to` on a
    /// vertex.
    pub fn construct<I, K>(entity_type: &Arc<EntityType>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut supplied: IndexMap<String, Value> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut entity = Self::blank(entity_type);

        for (name, field) in entity_type.schema().fields() {
            let value = match supplied.shift_remove(name) {
                Some(value) => value,
                None => match field.default_value() {
                    Some(default) => default.produce(),
                    None if entity_type.is_key_name(name) => continue,
                    None => Value::Null,
                },
            };
            entity.set(name, value)?;
        }

        for (name, value) in supplied {
            entity.set(&name, value)?;
        }

        if let Some(inheritance) = entity_type.inheritance() {
            if entity.get(inheritance.field()).is_null() {
                if let Some(value) = inheritance.value_for(entity_type.type_name()) {
                    entity.set(inheritance.field(), value.clone())?;
                }
            }
        }

        Ok(entity)
    }

    /// Overrides the collection this instance is stored in.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Deserializes a raw document.
    ///
    /// With [`LoadOptions::instance`] the instance's dump is patched with
    /// `raw` first (`raw` wins). Unknown fields are kept only if the type
    /// allows extra fields. The key is back-filled from `_key`, the
    /// collection from `_id`, and edge endpoints from `_from` / `_to`.
    /// With a database the result is clean; without one every populated
    /// field stays dirty.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] with every failing field.
    /// - Errors returned by the type's pre/post-process hooks.
    pub fn load(entity_type: &Arc<EntityType>, raw: &Document, options: LoadOptions<'_>) -> Result<Self> {
        let merged;
        let input = match options.instance {
            Some(instance) => {
                let mut patched = instance.dump(None)?;
                for (k, v) in raw {
                    patched.insert(k.clone(), v.clone());
                }
                merged = patched;
                &merged
            }
            None => raw,
        };

        let schema = entity_type.schema_for(options.only.as_deref());
        let unknown = if entity_type.allows_extra_fields() {
            UnknownPolicy::Include
        } else {
            UnknownPolicy::Exclude
        };
        let loaded = schema.load(input, unknown)?;

        let trusted = options.database.is_some();
        let mut entity = Self::construct(entity_type, loaded.values)?;
        entity.extra.extend(loaded.extra);
        entity.instance_schema = Some(schema);
        entity.database = options
            .database
            .or_else(|| options.instance.and_then(|i| i.database.clone()));

        if let Some(hook) = entity_type.pre_process() {
            hook(&mut entity)?;
        }

        if entity.key.is_none() {
            if let Some(serde_json::Value::String(key)) = input.get(KEY_FIELD) {
                entity.key = Some(key.clone());
            }
        }
        if let Some(serde_json::Value::String(id)) = input.get("_id") {
            if let Some((collection, _)) = id.split_once('/') {
                entity.collection = collection.to_string();
            }
        }
        if entity_type.is_edge() {
            if let Some(serde_json::Value::String(from)) = input.get("_from") {
                entity.from_id = Some(from.clone());
            }
            if let Some(serde_json::Value::String(to)) = input.get("_to") {
                entity.to_id = Some(to.clone());
            }
        }

        if let Some(hook) = entity_type.post_process() {
            hook(&mut entity)?;
        }

        if trusted {
            entity.dirty.clear();
        }
        Ok(entity)
    }

    /// Serializes to a wire document.
    ///
    /// Uses `only` if given, else the schema the instance was loaded with,
    /// else the full schema. A null key is omitted. Extra fields are
    /// appended verbatim when the type allows them. Edges add their
    /// endpoints when set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the document does not re-validate.
    pub fn dump(&self, only: Option<&[&str]>) -> Result<Document> {
        let schema = match (only, &self.instance_schema) {
            (Some(only), _) => self.entity_type.schema_for(Some(only)),
            (None, Some(schema)) => Arc::clone(schema),
            (None, None) => Arc::clone(self.entity_type.schema()),
        };

        let mut data = schema.serialize(self);
        match &self.key {
            Some(key) => {
                data.insert(KEY_FIELD.to_string(), key.clone().into());
            }
            None => {
                data.remove(KEY_FIELD);
            }
        }

        if self.entity_type.allows_extra_fields() {
            for (name, value) in &self.extra {
                if !data.contains_key(name) && !name.starts_with('_') {
                    data.insert(name.clone(), value.clone());
                }
            }
        }

        schema.validate(&data).into_result()?;

        if self.entity_type.is_edge() {
            if let Some(from) = &self.from_id {
                data.insert("_from".to_string(), from.clone().into());
            }
            if let Some(to) = &self.to_id {
                data.insert("_to".to_string(), to.clone().into());
            }
        }
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------

    /// Reads a field, the key (directly or through its alias) or an extra
    /// field. Unknown names read as null.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        if self.entity_type.is_key_name(name) {
            return self.key.clone().map_or(Value::Null, Value::String);
        }
        match name {
            "_id" => return self.id().map_or(Value::Null, Value::String),
            "_from" => return self.from_id.clone().map_or(Value::Null, Value::String),
            "_to" => return self.to_id.clone().map_or(Value::Null, Value::String),
            _ => {}
        }
        if let Some(value) = self.values.get(name) {
            return value.clone();
        }
        self.extra.get(name).map(Value::from_json).unwrap_or_default()
    }

    /// Writes a field.
    ///
    /// Writing the key alias writes the key and marks `_key` dirty. Values
    /// of declared fields are coerced to the field's kind. Every write to
    /// a declared field marks it dirty, even when the value is unchanged.
    /// Undeclared names become extra fields and are never dirty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberExists`] for reserved members and
    /// relationship names.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let ty = Arc::clone(&self.entity_type);

        if ty.relationship(name).is_some() || matches!(name, "_id" | "_rev" | "_relations") {
            return Err(self.member_exists(name));
        }
        if matches!(name, "_from" | "_to") {
            if !ty.is_edge() {
                return Err(self.member_exists(name));
            }
            let endpoint = endpoint_string(&value);
            if name == "_from" {
                self.from_id = endpoint;
            } else {
                self.to_id = endpoint;
            }
            return Ok(());
        }

        if ty.is_key_name(name) {
            self.key = endpoint_string(&value);
            self.dirty.insert(KEY_FIELD.to_string());
        } else if let Some(field) = ty.schema().get(name) {
            self.values.insert(name.to_string(), field.coerce_native(value));
            self.dirty.insert(name.to_string());
        } else {
            self.extra.insert(name.to_string(), value.to_json());
        }
        Ok(())
    }

    fn member_exists(&self, name: &str) -> Error {
        Error::MemberExists {
            member: name.to_string(),
            entity: self.entity_type.type_name().to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns `collection/key` once a key is set.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.key
            .as_ref()
            .map(|key| format!("{}/{key}", self.collection))
    }

    pub(crate) fn set_key(&mut self, key: impl Into<String>) {
        self.key = Some(key.into());
    }

    /// Returns the `_from` endpoint of an edge.
    #[must_use]
    pub fn from_id(&self) -> Option<&str> {
        self.from_id.as_deref()
    }

    /// Returns the `_to` endpoint of an edge.
    #[must_use]
    pub fn to_id(&self) -> Option<&str> {
        self.to_id.as_deref()
    }

    pub(crate) fn set_endpoints(&mut self, from: String, to: String) {
        self.from_id = Some(from);
        self.to_id = Some(to);
    }

    // ------------------------------------------------------------------
    // Dirty tracking and extras
    // ------------------------------------------------------------------

    /// Declared fields written since load or the last clear.
    #[must_use]
    pub fn dirty(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Returns true if any declared field was written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forgets all pending changes.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Undeclared fields held by the instance.
    #[must_use]
    pub fn extra_fields(&self) -> &IndexMap<String, serde_json::Value> {
        &self.extra
    }

    // ------------------------------------------------------------------
    // Database binding and relationships
    // ------------------------------------------------------------------

    /// Returns the bound database.
    #[must_use]
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Binds the instance to a database.
    pub fn bind(&mut self, database: &Database) {
        self.database = Some(database.clone());
    }

    /// Resolves relationship `name`.
    ///
    /// Cacheable relationships query at most once per instance; the others
    /// query on every call.
    ///
    /// # Errors
    ///
    /// - [`Error::Declaration`] if `name` is not a relationship.
    /// - [`Error::DetachedInstance`] if the instance is not bound.
    /// - Query and driver errors from the lookup.
    pub fn related(&mut self, name: &str) -> Result<Related> {
        let ty = Arc::clone(&self.entity_type);
        let relationship = ty.relationship(name).ok_or_else(|| {
            Error::Declaration(format!(
                "'{name}' is not a relationship of '{}'",
                ty.type_name()
            ))
        })?;

        let db = self.database.clone().ok_or_else(|| {
            Error::DetachedInstance(format!(
                "cannot resolve '{name}' on an unbound '{}'",
                ty.type_name()
            ))
        })?;

        if let Some(cached) = self.refs.get(name) {
            tracing::trace!(relationship = name, "relationship cache hit");
            return Ok(cached.clone());
        }

        tracing::trace!(relationship = name, "resolving relationship");
        let resolved = relationship.resolve(self, &db)?;
        if relationship.is_cacheable() {
            self.refs.insert(name.to_string(), resolved.clone());
        }
        Ok(resolved)
    }

    /// Returns true if relationship `name` has a cached value.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }
}

fn endpoint_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_json().to_string()),
    }
}

impl FieldSource for Entity {
    fn field_value(&self, name: &str) -> Value {
        if self.entity_type.is_key_name(name) {
            return self.key.clone().map_or(Value::Null, Value::String);
        }
        self.values.get(name).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.entity_type.type_name());
        s.field("_key", &self.key);
        if self.entity_type.is_edge() {
            s.field("_from", &self.from_id).field("_to", &self.to_id);
        }
        s.field("values", &self.values)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}(_key={}", self.entity_type.type_name(), self.key.as_deref().unwrap_or("None"))?;
        if self.entity_type.is_edge() {
            write!(
                f,
                ", _from={}, _to={}",
                self.from_id.as_deref().unwrap_or("None"),
                self.to_id.as_deref().unwrap_or("None")
            )?;
        }
        write!(f, ")>")
    }
}
