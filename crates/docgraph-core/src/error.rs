//! Error types for `docgraph`.
//!
//! A single error enum covers the mapping layer. Transport failures raised
//! by a [`Driver`](crate::driver::Driver) are carried verbatim in
//! [`Error::Driver`]; this crate never retries or re-wraps them.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias for `docgraph` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregated schema validation failure.
///
/// Every failing field contributes its messages; loading and dumping never
/// stop at the first bad field. Nested and list failures use dotted paths
/// such as `address.city` or `tags.2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    messages: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates an empty error collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for a field path.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Merges another collector, prefixing its paths with `prefix.`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationError) {
        for (path, messages) in other.messages {
            let full = format!("{prefix}.{path}");
            self.messages.entry(full).or_default().extend(messages);
        }
    }

    /// Returns true if no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of failing field paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Messages recorded for one field path.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&[String]> {
        self.messages.get(path).map(Vec::as_slice)
    }

    /// All failing field paths with their messages.
    #[must_use]
    pub fn messages(&self) -> &BTreeMap<String, Vec<String>> {
        &self.messages
    }

    /// Converts the collector into a result.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, messages) in &self.messages {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{path}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors that can occur in `docgraph` operations.
///
/// Error codes follow the pattern `DG-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Schema load or dump failed (DG-001).
    #[error("[DG-001] Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Entity is not bound to a database (DG-002).
    #[error("[DG-002] Instance is not bound to a database: {0}")]
    DetachedInstance(String),

    /// Point lookup found nothing (DG-003).
    #[error("[DG-003] Document '{key}' not found in collection '{collection}'")]
    DocumentNotFound {
        /// Collection searched.
        collection: String,
        /// Key looked up.
        key: String,
    },

    /// Member name collides with a reserved or relationship name (DG-004).
    #[error("[DG-004] Member '{member}' already exists on '{entity}'")]
    MemberExists {
        /// Colliding member name.
        member: String,
        /// Entity type name.
        entity: String,
    },

    /// Failure reported by the database driver (DG-005).
    #[error("[DG-005] Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Type name not known to the registry or graph (DG-006).
    #[error("[DG-006] Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Invalid entity or graph declaration (DG-007).
    #[error("[DG-007] Invalid declaration: {0}")]
    Declaration(String),

    /// `one()` matched more than one document (DG-008).
    #[error("[DG-008] Expected one result in '{collection}', found {count}")]
    MultipleResults {
        /// Collection queried.
        collection: String,
        /// Number of matches.
        count: u64,
    },

    /// `one()` matched nothing (DG-009).
    #[error("[DG-009] Expected one result in '{collection}', found none")]
    NoResult {
        /// Collection queried.
        collection: String,
    },

    /// Entity has no key where one is needed (DG-010).
    #[error("[DG-010] Missing identifier: {0}")]
    MissingIdentifier(String),

    /// Configuration error (DG-011).
    #[error("[DG-011] Configuration error: {0}")]
    Config(String),

    /// JSON serialization error (DG-012).
    #[error("[DG-012] Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code (e.g., "DG-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "DG-001",
            Self::DetachedInstance(_) => "DG-002",
            Self::DocumentNotFound { .. } => "DG-003",
            Self::MemberExists { .. } => "DG-004",
            Self::Driver(_) => "DG-005",
            Self::UnknownEntityType(_) => "DG-006",
            Self::Declaration(_) => "DG-007",
            Self::MultipleResults { .. } => "DG-008",
            Self::NoResult { .. } => "DG-009",
            Self::MissingIdentifier(_) => "DG-010",
            Self::Config(_) => "DG-011",
            Self::Serialization(_) => "DG-012",
        }
    }

    /// Returns true if the caller can act on this error and retry.
    ///
    /// Contract violations (detached instances, bad declarations, member
    /// collisions) are not recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::DetachedInstance(_)
                | Self::MemberExists { .. }
                | Self::Declaration(_)
                | Self::UnknownEntityType(_)
        )
    }

    /// Returns the validation details if this is a validation error.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
