//! Lazy single-hop relationships.
//!
//! A [`Relationship`] links a local field of one entity type to a field of
//! another type. It is resolved on the first call to
//! [`Entity::related`](crate::Entity::related) and, when cacheable, stored
//! on the instance for its lifetime.

use std::fmt;
use std::sync::Arc;

use crate::database::Database;
use crate::entity::{Entity, EntityType, KEY_FIELD};
use crate::error::Result;
use crate::value::Value;

/// Target type of a relationship: a type handle or a registered type name.
///
/// Names are resolved through the database registry on first use, which
/// lets two types reference each other.
#[derive(Clone)]
pub enum Target {
    /// Direct handle.
    Type(Arc<EntityType>),
    /// Type name looked up in the registry.
    Name(String),
}

impl Target {
    /// Type name of the target.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Type(ty) => ty.type_name(),
            Self::Name(name) => name,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => f.debug_tuple("Type").field(&ty.type_name()).finish(),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
        }
    }
}

impl From<&Arc<EntityType>> for Target {
    fn from(ty: &Arc<EntityType>) -> Self {
        Self::Type(Arc::clone(ty))
    }
}

impl From<Arc<EntityType>> for Target {
    fn from(ty: Arc<EntityType>) -> Self {
        Self::Type(ty)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Declarative field-to-field reference.
///
/// # Example
///
/// ```rust,ignore
/// let person = EntityType::vertex("Person", "persons")
///     .field(Field::string("name"))
///     .relationship(Relationship::new("cars", "Car", "_key").target_field("owner_key"))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Relationship {
    name: String,
    target: Target,
    local_field: String,
    target_field: String,
    many: Option<bool>,
    order_by: Option<String>,
    cacheable: bool,
}

impl Relationship {
    /// Declares relationship `name` from `local_field` to the target's key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: impl Into<Target>,
        local_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_field: local_field.into(),
            target_field: KEY_FIELD.to_string(),
            many: None,
            order_by: None,
            cacheable: true,
        }
    }

    /// Matches `local_field` against this target field instead of the key.
    #[must_use]
    pub fn target_field(mut self, field: impl Into<String>) -> Self {
        self.target_field = field.into();
        self
    }

    /// Forces a list (`true`) or single (`false`) result.
    ///
    /// Defaults to single for key targets and list otherwise.
    #[must_use]
    pub fn many(mut self, many: bool) -> Self {
        self.many = Some(many);
        self
    }

    /// Records an ordering; accepted but not applied to results.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Enables or disables per-instance caching (default: enabled).
    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Returns the relationship name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the local field name.
    #[must_use]
    pub fn local_field(&self) -> &str {
        &self.local_field
    }

    /// Returns the target field name.
    #[must_use]
    pub fn target_field_name(&self) -> &str {
        &self.target_field
    }

    /// Returns true if the relationship resolves to a list.
    #[must_use]
    pub fn is_many(&self) -> bool {
        self.many.unwrap_or(self.target_field != KEY_FIELD)
    }

    /// Returns the recorded ordering.
    #[must_use]
    pub fn ordering(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Returns true if resolved values are cached on the instance.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    fn target_type(&self, db: &Database) -> Result<Arc<EntityType>> {
        match &self.target {
            Target::Type(ty) => Ok(Arc::clone(ty)),
            Target::Name(name) => db.registry().resolve(name),
        }
    }

    /// Runs the single-hop lookup for `entity`.
    ///
    /// A null local value resolves to nothing without querying.
    pub(crate) fn resolve(&self, entity: &Entity, db: &Database) -> Result<Related> {
        let target = self.target_type(db)?;
        let local = entity.get(&self.local_field);
        if local.is_null() {
            return Ok(Related::empty(self.is_many()));
        }

        if target.is_key_name(&self.target_field) {
            let key = match &local {
                Value::String(key) => key.clone(),
                other => other.to_json().to_string(),
            };
            let found = db.query(&target).get(&key)?;
            return Ok(if self.is_many() {
                Related::Many(found.into_iter().collect())
            } else {
                Related::One(found)
            });
        }

        let query = db
            .query(&target)
            .filter(format!("{} == @val", self.target_field), false)
            .bind("val", local.to_json());
        if self.is_many() {
            query.all().map(Related::Many)
        } else {
            query.first().map(Related::One)
        }
    }
}

/// Resolved value of a relationship.
#[derive(Debug, Clone)]
pub enum Related {
    /// Single-valued relationship.
    One(Option<Entity>),
    /// List-valued relationship.
    Many(Vec<Entity>),
}

impl Related {
    fn empty(many: bool) -> Self {
        if many {
            Self::Many(Vec::new())
        } else {
            Self::One(None)
        }
    }

    /// Returns the single entity, or the first of a list.
    #[must_use]
    pub fn first(&self) -> Option<&Entity> {
        match self {
            Self::One(one) => one.as_ref(),
            Self::Many(many) => many.first(),
        }
    }

    /// Consumes into a single entity (first of a list).
    #[must_use]
    pub fn into_one(self) -> Option<Entity> {
        match self {
            Self::One(one) => one,
            Self::Many(many) => many.into_iter().next(),
        }
    }

    /// Consumes into a list.
    #[must_use]
    pub fn into_many(self) -> Vec<Entity> {
        match self {
            Self::One(one) => one.into_iter().collect(),
            Self::Many(many) => many,
        }
    }

    /// Number of resolved entities.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(one) => usize::from(one.is_some()),
            Self::Many(many) => many.len(),
        }
    }

    /// Returns true if nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
