//! Typed field descriptors and wire coercion.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Schema, UnknownPolicy};
use crate::error::ValidationError;
use crate::value::Value;

/// Scalar kinds, used where a kind has to be named without a sub-schema
/// (configuration, diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// String value.
    String,
    /// Integer value (i64).
    Integer,
    /// Floating-point value (f64).
    Float,
    /// Boolean value.
    Boolean,
    /// Calendar date.
    Date,
    /// UTC timestamp.
    DateTime,
    /// Any JSON, kept verbatim.
    Raw,
    /// Nested record.
    Nested,
    /// List of values.
    List,
}

/// The kind of a field, including nested and list shapes.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// String value.
    String,
    /// Integer value.
    Integer,
    /// Floating-point value.
    Float,
    /// Boolean value.
    Boolean,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// UTC timestamp (RFC 3339).
    DateTime,
    /// Any JSON value, converted without validation.
    Raw,
    /// Nested record validated by a sub-schema.
    Nested(Arc<Schema>),
    /// List whose items share one kind.
    List(Box<FieldKind>),
}

impl FieldKind {
    /// Returns the scalar tag of this kind.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String => ValueType::String,
            Self::Integer => ValueType::Integer,
            Self::Float => ValueType::Float,
            Self::Boolean => ValueType::Boolean,
            Self::Date => ValueType::Date,
            Self::DateTime => ValueType::DateTime,
            Self::Raw => ValueType::Raw,
            Self::Nested(_) => ValueType::Nested,
            Self::List(_) => ValueType::List,
        }
    }

    /// Coerces a non-null wire value, recording failures under `path`.
    pub(crate) fn coerce(
        &self,
        raw: &serde_json::Value,
        path: &str,
        errors: &mut ValidationError,
    ) -> Option<Value> {
        use serde_json::Value as Json;

        match (self, raw) {
            (Self::String, Json::String(s)) => Some(Value::String(s.clone())),
            (Self::String, _) => {
                errors.add(path, "Not a valid string.");
                None
            }
            (Self::Integer, Json::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Integer(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.is_finite() => Some(Value::Integer(f as i64)),
                        _ => {
                            errors.add(path, "Not a valid integer.");
                            None
                        }
                    }
                }
            }
            (Self::Integer, Json::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Some(Value::Integer(i)),
                Err(_) => {
                    errors.add(path, "Not a valid integer.");
                    None
                }
            },
            (Self::Integer, _) => {
                errors.add(path, "Not a valid integer.");
                None
            }
            (Self::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (Self::Float, Json::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Some(Value::Float(f)),
                Err(_) => {
                    errors.add(path, "Not a valid number.");
                    None
                }
            },
            (Self::Float, _) => {
                errors.add(path, "Not a valid number.");
                None
            }
            (Self::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
            (Self::Boolean, Json::Number(n)) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => {
                    errors.add(path, "Not a valid boolean.");
                    None
                }
            },
            (Self::Boolean, Json::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Some(Value::Bool(true)),
                "false" | "no" | "0" | "off" => Some(Value::Bool(false)),
                _ => {
                    errors.add(path, "Not a valid boolean.");
                    None
                }
            },
            (Self::Boolean, _) => {
                errors.add(path, "Not a valid boolean.");
                None
            }
            (Self::Date, Json::String(s)) => match parse_date(s) {
                Some(d) => Some(Value::Date(d)),
                None => {
                    errors.add(path, "Not a valid date.");
                    None
                }
            },
            (Self::Date, _) => {
                errors.add(path, "Not a valid date.");
                None
            }
            (Self::DateTime, Json::String(s)) => match parse_datetime(s) {
                Some(dt) => Some(Value::DateTime(dt)),
                None => {
                    errors.add(path, "Not a valid datetime.");
                    None
                }
            },
            (Self::DateTime, _) => {
                errors.add(path, "Not a valid datetime.");
                None
            }
            (Self::Raw, other) => Some(Value::from_json(other)),
            (Self::Nested(schema), Json::Object(map)) => {
                match schema.load(map, UnknownPolicy::Exclude) {
                    Ok(loaded) => Some(Value::Object(loaded.values)),
                    Err(nested) => {
                        errors.merge_prefixed(path, nested);
                        None
                    }
                }
            }
            (Self::Nested(_), _) => {
                errors.add(path, "Invalid input type.");
                None
            }
            (Self::List(item_kind), Json::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                let mut ok = true;
                for (idx, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{idx}");
                    if item.is_null() {
                        out.push(Value::Null);
                        continue;
                    }
                    match item_kind.coerce(item, &item_path, errors) {
                        Some(v) => out.push(v),
                        None => ok = false,
                    }
                }
                ok.then_some(Value::List(out))
            }
            (Self::List(_), _) => {
                errors.add(path, "Not a valid list.");
                None
            }
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// A default value for a field.
#[derive(Debug, Clone)]
pub enum FieldDefault {
    /// A fixed value.
    Value(Value),
    /// A producer invoked each time a default is needed.
    Producer(fn() -> Value),
}

impl FieldDefault {
    /// Produces the default value.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Producer(f) => f(),
        }
    }
}

/// A typed field descriptor.
///
/// # Example
///
/// ```rust,ignore
/// use docgraph_core::schema::Field;
///
/// let name = Field::string("name").required();
/// let staff = Field::boolean("is_staff").default(false);
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    allow_none: Option<bool>,
    default: Option<FieldDefault>,
    choices: Option<Vec<Value>>,
}

impl Field {
    /// Creates a field of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            allow_none: None,
            default: None,
            choices: None,
        }
    }

    /// Creates a string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Creates an integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Creates a float field.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    /// Creates a boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Creates a date field.
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Creates a datetime field.
    #[must_use]
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    /// Creates a raw (unvalidated JSON) field.
    #[must_use]
    pub fn raw(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Raw)
    }

    /// Creates a nested-record field.
    #[must_use]
    pub fn nested(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self::new(name, FieldKind::Nested(schema))
    }

    /// Creates a list field.
    #[must_use]
    pub fn list(name: impl Into<String>, item: FieldKind) -> Self {
        Self::new(name, FieldKind::List(Box::new(item)))
    }

    /// Marks the field as required on load.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Overrides whether null is accepted.
    #[must_use]
    pub fn nullable(mut self, allow: bool) -> Self {
        self.allow_none = Some(allow);
        self
    }

    /// Sets a fixed default.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Sets a default producer, called for every new instance.
    #[must_use]
    pub fn default_with(mut self, producer: fn() -> Value) -> Self {
        self.default = Some(FieldDefault::Producer(producer));
        self
    }

    /// Restricts values to a fixed set.
    #[must_use]
    pub fn one_of(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field kind.
    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Returns whether the field is required.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns whether null is accepted: explicit setting, else nullable
    /// unless required.
    #[must_use]
    pub fn allows_none(&self) -> bool {
        self.allow_none.unwrap_or(!self.required)
    }

    /// Returns the declared default.
    #[must_use]
    pub fn default_value(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Coerces a native value to this field's kind.
    ///
    /// Null and values that fail coercion are returned unchanged so that
    /// validation at dump time reports them.
    pub(crate) fn coerce_native(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        let mut ignored = ValidationError::new();
        self.kind
            .coerce(&value.to_json(), &self.name, &mut ignored)
            .unwrap_or(value)
    }

    /// Coerces a present wire value (null included).
    pub(crate) fn load_value(
        &self,
        raw: &serde_json::Value,
        errors: &mut ValidationError,
    ) -> Option<Value> {
        if raw.is_null() {
            if self.allows_none() {
                return Some(Value::Null);
            }
            errors.add(&self.name, "Field may not be null.");
            return None;
        }

        let value = self.kind.coerce(raw, &self.name, errors)?;

        if let Some(choices) = &self.choices {
            if !choices.contains(&value) {
                let allowed: Vec<String> = choices.iter().map(|c| c.to_json().to_string()).collect();
                errors.add(
                    &self.name,
                    format!("Must be one of: {}.", allowed.join(", ")),
                );
                return None;
            }
        }

        Some(value)
    }
}
