//! # `docgraph` Core
//!
//! Object-document mapping for graph-capable document databases.
//!
//! `docgraph` maps typed entities onto the untyped documents of a
//! document database with named graphs (`ArangoDB`-style), and turns native
//! multi-hop traversals back into a connected set of typed entities.
//!
//! ## Features
//!
//! - **Schemas**: typed fields with defaults, coercion and aggregated
//!   validation errors
//! - **Entities**: vertex and edge types with dirty tracking, key aliasing,
//!   extra-field policies, inheritance and processing hooks
//! - **Relationships**: lazy single-hop lookups cached per instance
//! - **Queries**: a fluent builder rendering parameterized AQL
//! - **Graphs**: provisioning, relation building and traversal
//!   objectification into an arena of entities
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docgraph_core::{Database, EntityType, Field, MemoryDriver};
//!
//! let db = Database::new(Arc::new(MemoryDriver::new()));
//! let car = EntityType::vertex("Car", "cars")
//!     .field(Field::string("make").required())
//!     .field(Field::integer("year"))
//!     .build()?;
//! db.create_collection(&car)?;
//!
//! let mut civic = car.construct([("make", "Honda".into()), ("year", 1984.into())])?;
//! db.add(&mut civic)?;
//!
//! let old = db.query(&car).filter("year < 2000", false).all()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod database;
#[cfg(test)]
mod database_tests;
pub mod driver;
pub mod entity;
pub mod error;
pub mod events;
#[cfg(test)]
mod events_tests;
pub mod graph;
pub mod logging;
pub mod query;
pub mod registry;
pub mod relationship;
pub mod schema;
pub mod value;

pub use config::{ConfigError, GraphConfig, LoggingConfig, OrmConfig, QueryConfig, SchemaConfig};
pub use database::{Database, Provision};
pub use driver::{
    CollectionKind, ConnectionPool, Direction, Driver, DriverError, DriverResult, EdgeDefinition,
    GraphInfo, IndexKind, IndexSpec, MemoryDriver, PathRecord, TraversalRequest, Uniqueness,
    VertexFilter,
};
pub use entity::{
    Entity, EntityKind, EntityType, EntityTypeBuilder, Hook, Inheritance, LoadOptions, KEY_FIELD,
    RESERVED_MEMBERS,
};
pub use error::{Error, Result, ValidationError};
pub use events::{Event, EventBus, Listener};
pub use graph::{EdgeRef, ExpandOptions, Graph, GraphConnection, InheritanceResolver, Traversal};
pub use logging::init_tracing;
pub use query::Query;
pub use registry::Registry;
pub use relationship::{Related, Relationship, Target};
pub use schema::{Field, FieldDefault, FieldKind, Schema, SchemaCache, UnknownPolicy, ValueType};
pub use value::{Document, Value};
