//! Field/schema layer.
//!
//! A [`Schema`] is a named, ordered set of [`Field`]s. It validates and
//! coerces raw wire documents into native [`Value`]s on load, and renders
//! native values back into wire documents on dump. Every failing field is
//! reported; nothing fails fast.

mod cache;
mod field;

#[cfg(test)]
mod cache_tests;

pub use cache::{CacheStats, SchemaCache, DEFAULT_SCHEMA_CACHE_CAPACITY};
pub use field::{Field, FieldDefault, FieldKind, ValueType};

use indexmap::IndexMap;

use crate::error::ValidationError;
use crate::value::{Document, Value};

/// Structural wire keys owned by the database, never treated as data.
pub const STRUCTURAL_KEYS: [&str; 5] = ["_key", "_id", "_rev", "_from", "_to"];

/// What to do with input keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPolicy {
    /// Drop unknown keys silently.
    #[default]
    Exclude,
    /// Keep unknown keys verbatim, unvalidated.
    Include,
}

/// Result of a successful [`Schema::load`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedDocument {
    /// Coerced values of the declared fields present in the input.
    pub values: IndexMap<String, Value>,
    /// Unknown, non-structural keys kept under [`UnknownPolicy::Include`].
    pub extra: IndexMap<String, serde_json::Value>,
}

/// Read access to native field values, used by [`Schema::dump`].
pub trait FieldSource {
    /// Returns the current value of a declared field (null if unset).
    fn field_value(&self, name: &str) -> Value;
}

impl FieldSource for IndexMap<String, Value> {
    fn field_value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }
}

/// A named, ordered set of field descriptors.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: IndexMap<String, Field>,
    identifier: Option<String>,
    excluded: Vec<String>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            identifier: None,
            excluded: Vec::new(),
        }
    }

    /// Adds a field. A later field with the same name replaces the earlier
    /// one in place.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.insert(field);
        self
    }

    /// Names the field holding the document identifier.
    ///
    /// The identifier is kept by [`Schema::restrict`] and is not required
    /// when validating a dump, since the server may still assign it.
    #[must_use]
    pub fn with_identifier(mut self, field: impl Into<String>) -> Self {
        self.identifier = Some(field.into());
        self
    }

    /// Copy of this schema under another name.
    pub(crate) fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub(crate) fn insert(&mut self, field: Field) {
        self.fields.insert(field.name().to_string(), field);
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Returns true if the field is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Returns the identifier field name, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a schema restricted to `only`, keeping declaration order.
    ///
    /// Unknown names are ignored. The identifier field is always kept.
    #[must_use]
    pub fn restrict<S: AsRef<str>>(&self, only: &[S]) -> Self {
        let wanted: Vec<&str> = only.iter().map(AsRef::as_ref).collect();
        let mut restricted = Self {
            name: self.name.clone(),
            fields: IndexMap::new(),
            identifier: self.identifier.clone(),
            excluded: self.excluded.clone(),
        };
        for (name, field) in &self.fields {
            let keep = wanted.contains(&name.as_str()) || self.identifier.as_deref() == Some(name);
            if keep {
                restricted.fields.insert(name.clone(), field.clone());
            } else {
                restricted.excluded.push(name.clone());
            }
        }
        restricted
    }

    /// Validates and coerces a raw document.
    ///
    /// # Errors
    ///
    /// Returns every per-field failure: missing required fields, disallowed
    /// nulls, coercion and choice failures.
    pub fn load(
        &self,
        raw: &Document,
        unknown: UnknownPolicy,
    ) -> Result<LoadedDocument, ValidationError> {
        let (loaded, errors) = self.check(raw, unknown, false);
        errors.into_result().map(|()| loaded)
    }

    /// Validates a document produced by a dump.
    ///
    /// Same rules as [`Schema::load`] except that a missing identifier is
    /// accepted.
    #[must_use]
    pub fn validate(&self, raw: &Document) -> ValidationError {
        self.check(raw, UnknownPolicy::Include, true).1
    }

    /// Renders the declared fields of `source` without validating.
    ///
    /// Unset fields are rendered as null.
    #[must_use]
    pub fn serialize(&self, source: &dyn FieldSource) -> Document {
        let mut out = Document::new();
        for name in self.fields.keys() {
            out.insert(name.clone(), source.field_value(name).to_json());
        }
        out
    }

    /// Renders the declared fields of `source` and re-validates the result.
    ///
    /// # Errors
    ///
    /// Returns the validation failures of the rendered document.
    pub fn dump(&self, source: &dyn FieldSource) -> Result<Document, ValidationError> {
        let out = self.serialize(source);
        self.validate(&out).into_result().map(|()| out)
    }

    fn check(
        &self,
        raw: &Document,
        unknown: UnknownPolicy,
        lenient_identifier: bool,
    ) -> (LoadedDocument, ValidationError) {
        let mut errors = ValidationError::new();
        let mut loaded = LoadedDocument::default();

        for (name, field) in &self.fields {
            match raw.get(name) {
                Some(value) => {
                    if let Some(v) = field.load_value(value, &mut errors) {
                        loaded.values.insert(name.clone(), v);
                    }
                }
                None => {
                    let skip = lenient_identifier && self.identifier.as_deref() == Some(name);
                    if field.is_required() && !skip {
                        errors.add(name, "Missing data for required field.");
                    }
                }
            }
        }

        if unknown == UnknownPolicy::Include {
            for (name, value) in raw {
                if self.fields.contains_key(name)
                    || self.excluded.contains(name)
                    || name.starts_with('_')
                {
                    continue;
                }
                loaded.extra.insert(name.clone(), value.clone());
            }
        }

        (loaded, errors)
    }
}
