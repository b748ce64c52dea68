//! Fluent query builder.
//!
//! A [`Query`] accumulates filter conditions, sort columns, a limit and an
//! optional projection, renders them into one AQL statement over the bound
//! collection (`@@collection`) and loads the result rows as entities.
//!
//! Conditions are written against the record without its alias:
//! `filter("year == 2005", false)` renders `FILTER rec.year == 2005`.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::database::Database;
use crate::entity::{Entity, EntityType, LoadOptions, KEY_FIELD};
use crate::error::{Error, Result, ValidationError};
use crate::value::{Document, Value};

/// Record alias used in rendered queries.
pub const RECORD_ALIAS: &str = "rec";

/// Largest count accepted by the in-process driver for an open-ended LIMIT.
const OPEN_LIMIT: u64 = i64::MAX as u64;

#[derive(Debug, Clone)]
struct Condition {
    text: String,
    or: bool,
}

/// Query builder over one entity type.
#[derive(Debug, Clone)]
#[must_use]
pub struct Query {
    db: Database,
    entity_type: Arc<EntityType>,
    conditions: Vec<Condition>,
    bind_vars: Document,
    sort: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    returns: Option<Vec<String>>,
}

impl Query {
    pub(crate) fn new(db: Database, entity_type: &Arc<EntityType>) -> Self {
        let mut bind_vars = Document::new();
        bind_vars.insert(
            "@collection".to_string(),
            entity_type.collection().to_string().into(),
        );
        Self {
            db,
            entity_type: Arc::clone(entity_type),
            conditions: Vec::new(),
            bind_vars,
            sort: Vec::new(),
            limit: None,
            offset: None,
            returns: None,
        }
    }

    /// Returns the queried entity type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Adds a condition, joined with OR when `or` is set, else AND.
    ///
    /// Bind values the condition references with [`Query::bind`].
    pub fn filter(mut self, condition: impl AsRef<str>, or: bool) -> Self {
        self.conditions.push(Condition {
            text: format!("{RECORD_ALIAS}.{}", condition.as_ref().trim()),
            or,
        });
        self
    }

    /// Adds an equality condition per pair; list values render as `IN`.
    ///
    /// Each condition gets its own bind variable, so the same field can be
    /// matched against several values.
    pub fn filter_by<I, K, V>(mut self, pairs: I, or: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (field, value) in pairs {
            let field = field.as_ref();
            let value = value.into();
            let param = format!(
                "filter_by_{}_{}",
                field.replace('.', "_"),
                self.conditions.len()
            );
            let op = if matches!(value, Value::List(_)) { "IN" } else { "==" };
            self = self
                .filter(format!("{field} {op} @{param}"), or)
                .bind(param, value.to_json());
        }
        self
    }

    /// Sets a bind variable.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.bind_vars.insert(name.into(), value.into());
        self
    }

    /// Adds a sort column, e.g. `"year DESC"`. Columns apply in call order.
    pub fn sort(mut self, column: impl AsRef<str>) -> Self {
        self.sort.push(format!("{RECORD_ALIAS}.{}", column.as_ref().trim()));
        self
    }

    /// Limits the number of rows.
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Skips the first `start` rows.
    pub fn offset(mut self, start: u64) -> Self {
        self.offset = Some(start);
        self
    }

    /// Returns only these fields (plus the key).
    pub fn returns<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn filter_clause(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let mut out = String::from(" FILTER");
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                out.push_str(if condition.or { " OR" } else { " AND" });
            }
            out.push(' ');
            out.push_str(&condition.text);
        }
        out
    }

    fn effective_limit(&self) -> Option<u64> {
        let default = self.db.config().query.default_batch_limit;
        self.limit
            .or_else(|| (default > 0).then_some(default))
            .or_else(|| self.offset.map(|_| OPEN_LIMIT))
    }

    fn projection(&self) -> Option<Vec<String>> {
        self.returns.as_ref().map(|fields| {
            let mut fields = fields.clone();
            if !fields.iter().any(|f| f == KEY_FIELD) {
                fields.insert(0, KEY_FIELD.to_string());
            }
            fields
        })
    }

    /// Renders the query and its bind variables.
    #[must_use]
    pub fn build(&self) -> (String, Document) {
        let mut aql = format!("FOR {RECORD_ALIAS} IN @@collection");
        aql.push_str(&self.filter_clause());

        if !self.sort.is_empty() {
            aql.push_str(" SORT ");
            aql.push_str(&self.sort.join(", "));
        }

        if let Some(count) = self.effective_limit() {
            match self.offset {
                Some(start) => aql.push_str(&format!(" LIMIT {start}, {count}")),
                None => aql.push_str(&format!(" LIMIT {count}")),
            }
        }

        let mut bind_vars = self.bind_vars.clone();
        match self.projection() {
            Some(fields) => {
                aql.push_str(&format!(" RETURN KEEP({RECORD_ALIAS}, @return_fields)"));
                bind_vars.insert("return_fields".to_string(), fields.into());
            }
            None => aql.push_str(&format!(" RETURN {RECORD_ALIAS}")),
        }
        (aql, bind_vars)
    }

    fn load_rows(&self, rows: Vec<Json>, only: Option<Vec<String>>) -> Result<Vec<Entity>> {
        rows.into_iter()
            .map(|row| {
                let Json::Object(doc) = row else {
                    let mut err = ValidationError::new();
                    err.add("_schema", format!("expected a document row, got {row}"));
                    return Err(err.into());
                };
                let mut options = LoadOptions::from_database(&self.db);
                options.only.clone_from(&only);
                Entity::load(&self.entity_type, &doc, options)
            })
            .collect()
    }

    /// Runs the query and loads every row.
    ///
    /// # Errors
    ///
    /// Driver errors, and validation errors of rows that do not load.
    pub fn all(&self) -> Result<Vec<Entity>> {
        let (aql, bind_vars) = self.build();
        let rows = self.db.execute(&aql, &bind_vars)?;
        self.load_rows(rows, self.projection())
    }

    /// First row, or `None`.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`].
    pub fn first(&self) -> Result<Option<Entity>> {
        Ok(self.clone().limit(1).all()?.into_iter().next())
    }

    /// The single matching row.
    ///
    /// # Errors
    ///
    /// [`Error::NoResult`] or [`Error::MultipleResults`] unless exactly one
    /// row matches.
    pub fn one(&self) -> Result<Entity> {
        let collection = self.entity_type.collection().to_string();
        match self.count()? {
            0 => Err(Error::NoResult { collection }),
            1 => self.first()?.ok_or(Error::NoResult { collection }),
            count => Err(Error::MultipleResults { collection, count }),
        }
    }

    /// Number of matching rows; sort, limit and projection are ignored.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn count(&self) -> Result<u64> {
        if self.conditions.is_empty() {
            return Ok(self.db.driver().collection_count(self.entity_type.collection())?);
        }
        let aql = format!(
            "FOR {RECORD_ALIAS} IN @@collection{} COLLECT WITH COUNT INTO length RETURN length",
            self.filter_clause()
        );
        let rows = self.db.execute(&aql, &self.bind_vars)?;
        Ok(rows.first().and_then(Json::as_u64).unwrap_or(0))
    }

    /// Applies `values` to every matching record; returns the updated rows.
    ///
    /// Values are coerced through a throwaway instance's dump restricted to
    /// the given fields.
    ///
    /// # Errors
    ///
    /// Validation errors of the values, and driver errors.
    pub fn update<I, K>(&self, values: I) -> Result<Vec<Json>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: Vec<(String, Value)> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let names: Vec<&str> = values.iter().map(|(k, _)| k.as_str()).collect();
        let scratch = Entity::construct(&self.entity_type, values.clone())?;
        let mut patch = scratch.dump(Some(names.as_slice()))?;
        if !names.contains(&KEY_FIELD) {
            patch.remove(KEY_FIELD);
        }

        let aql = format!(
            "FOR {RECORD_ALIAS} IN @@collection{} UPDATE {RECORD_ALIAS} WITH @orm_update IN @@collection RETURN NEW",
            self.filter_clause()
        );
        let mut bind_vars = self.bind_vars.clone();
        bind_vars.insert("orm_update".to_string(), Json::Object(patch));
        self.db.execute(&aql, &bind_vars)
    }

    /// Removes every matching record; returns the removed rows.
    ///
    /// # Errors
    ///
    /// Driver errors.
    pub fn delete(&self) -> Result<Vec<Json>> {
        let aql = format!(
            "FOR {RECORD_ALIAS} IN @@collection{} REMOVE {RECORD_ALIAS} IN @@collection RETURN OLD",
            self.filter_clause()
        );
        self.db.execute(&aql, &self.bind_vars)
    }

    /// Point lookup by key, bypassing filters.
    ///
    /// # Errors
    ///
    /// [`Error::DocumentNotFound`] if no document has this key.
    pub fn by_key(&self, key: &str) -> Result<Entity> {
        self.get(key)?.ok_or_else(|| Error::DocumentNotFound {
            collection: self.entity_type.collection().to_string(),
            key: key.to_string(),
        })
    }

    /// Point lookup by key; `None` if absent.
    ///
    /// # Errors
    ///
    /// Driver and validation errors.
    pub fn get(&self, key: &str) -> Result<Option<Entity>> {
        let collection = self.entity_type.collection();
        match self.db.driver().get_document(collection, key)? {
            Some(doc) => Entity::load(&self.entity_type, &doc, LoadOptions::from_database(&self.db)).map(Some),
            None => Ok(None),
        }
    }

    /// Runs an arbitrary query with `@@collection` bound to this type's
    /// collection and loads the rows as this type.
    ///
    /// # Errors
    ///
    /// Driver and validation errors.
    pub fn aql(&self, query: &str, bind_vars: Document) -> Result<Vec<Entity>> {
        let mut binds = bind_vars;
        for (k, v) in &self.bind_vars {
            binds.entry(k.clone()).or_insert_with(|| v.clone());
        }
        let rows = self.db.execute(query, &binds)?;
        self.load_rows(rows, None)
    }
}
