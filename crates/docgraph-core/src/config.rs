//! `docgraph` Configuration Module
//!
//! Provides configuration file support via `docgraph.toml`, environment
//! variables, and programmatic construction.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`DOCGRAPH_*`, sections separated by `__`,
//!    e.g. `DOCGRAPH_GRAPH__DEFAULT_DEPTH=3`)
//! 2. Configuration file (`docgraph.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::driver::Direction;
use crate::schema::DEFAULT_SCHEMA_CACHE_CAPACITY;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Schema configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Restricted schemas cached per entity type.
    pub cache_capacity: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_SCHEMA_CACHE_CAPACITY,
        }
    }
}

/// Query configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Limit applied to queries that set none (0 = unlimited).
    pub default_batch_limit: u64,
    /// Emit each rendered query as a `debug` event.
    pub log_queries: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_batch_limit: 0,
            log_queries: true,
        }
    }
}

/// Graph traversal configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Depth used by `expand` when none is given.
    pub default_depth: u32,
    /// Direction used by `expand` when none is given.
    pub default_direction: Direction,
    /// Upper bound on any requested traversal depth.
    pub max_depth: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: 1,
            default_direction: Direction::Any,
            max_depth: 10,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `docgraph` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrmConfig {
    /// Schema configuration.
    pub schema: SchemaConfig,
    /// Query configuration.
    pub query: QueryConfig,
    /// Graph traversal configuration.
    pub graph: GraphConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl OrmConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("docgraph.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DOCGRAPH_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.cache_capacity == 0 || self.schema.cache_capacity > 4096 {
            return Err(ConfigError::InvalidValue {
                key: "schema.cache_capacity".to_string(),
                message: format!(
                    "value {} is out of range [1, 4096]",
                    self.schema.cache_capacity
                ),
            });
        }

        if !(1..=100).contains(&self.graph.max_depth) {
            return Err(ConfigError::InvalidValue {
                key: "graph.max_depth".to_string(),
                message: format!("value {} is out of range [1, 100]", self.graph.max_depth),
            });
        }

        if self.graph.default_depth == 0 || self.graph.default_depth > self.graph.max_depth {
            return Err(ConfigError::InvalidValue {
                key: "graph.default_depth".to_string(),
                message: format!(
                    "value {} is out of range [1, {}]",
                    self.graph.default_depth, self.graph.max_depth
                ),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
