//! Tests for the database facade.

use std::sync::Arc;

use serde_json::json;

use crate::config::OrmConfig;
use crate::database::{Database, Provision};
use crate::driver::{CollectionKind, Driver, EdgeDefinition, IndexKind, IndexSpec, MemoryDriver};
use crate::entity::EntityType;
use crate::error::Error;
use crate::graph::{Graph, GraphConnection};
use crate::schema::Field;
use crate::value::Value;

fn setup() -> (Arc<MemoryDriver>, Database) {
    let driver = Arc::new(MemoryDriver::new());
    let db = Database::new(Arc::clone(&driver) as Arc<dyn Driver>);
    (driver, db)
}

fn person() -> Arc<EntityType> {
    EntityType::vertex("Person", "persons")
        .field(Field::string("name").required())
        .field(Field::integer("age"))
        .index(IndexSpec::new(IndexKind::Persistent, ["name"]))
        .collection_option("wait_for_sync", json!(true))
        .build()
        .unwrap()
}

fn school() -> (Arc<EntityType>, Arc<EntityType>, Arc<EntityType>, Graph) {
    let student = EntityType::vertex("Student", "students")
        .field(Field::string("name"))
        .build()
        .unwrap();
    let subject = EntityType::vertex("Subject", "subjects")
        .field(Field::string("title"))
        .build()
        .unwrap();
    let studies = EntityType::edge("Studies", "studies")
        .field(Field::string("grade"))
        .build()
        .unwrap();
    let graph = Graph::new("university").connection(GraphConnection::new(
        [Arc::clone(&student)],
        &studies,
        [Arc::clone(&subject)],
    ));
    (student, subject, studies, graph)
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_with_config_rejects_invalid_config() {
    let mut config = OrmConfig::default();
    config.graph.max_depth = 0;

    let err = Database::with_config(Arc::new(MemoryDriver::new()), config).unwrap_err();

    assert_eq!(err.code(), "DG-011");
}

#[test]
fn test_register_applies_configured_cache_capacity() {
    let mut config = OrmConfig::default();
    config.schema.cache_capacity = 4;
    let db = Database::with_config(Arc::new(MemoryDriver::new()), config).unwrap();
    let person = person();

    db.register(&person);

    assert_eq!(person.schema_cache().capacity(), 4);
    assert!(db.registry().contains("Person"));
}

// =========================================================================
// Collections
// =========================================================================

#[test]
fn test_create_collection_passes_kind_options_and_indexes() {
    // Arrange
    let (driver, db) = setup();
    let person = person();
    let knows = EntityType::relation("knows");

    // Act
    db.create_collection(&person).unwrap();
    db.create_collection(&knows).unwrap();

    // Assert
    assert!(db.has_collection(&person).unwrap());
    assert_eq!(driver.collection_kind("persons"), Some(CollectionKind::Document));
    assert_eq!(driver.collection_kind("knows"), Some(CollectionKind::Edge));
    assert_eq!(driver.collection_options("persons").unwrap()["wait_for_sync"], json!(true));
    assert_eq!(driver.indexes("persons"), person.indexes());
}

#[test]
fn test_create_collection_twice_surfaces_driver_error() {
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();

    let err = db.create_collection(&person).unwrap_err();

    assert!(matches!(err, Error::Driver(ref e) if e.is_already_exists()));
}

#[test]
fn test_drop_collection() {
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();

    db.drop_collection(&person).unwrap();

    assert!(!db.has_collection(&person).unwrap());
}

// =========================================================================
// Documents
// =========================================================================

#[test]
fn test_add_back_fills_key_and_binds() {
    // Arrange
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut ann = person.construct([("name", Value::from("Ann"))]).unwrap();
    assert!(ann.key().is_none());

    // Act
    let meta = db.add(&mut ann).unwrap();

    // Assert
    assert_eq!(meta["_key"], json!("1"));
    assert_eq!(meta["_id"], json!("persons/1"));
    assert_eq!(ann.key(), Some("1"));
    assert!(!ann.is_dirty());
    assert!(ann.database().is_some());
    assert!(db.exists(&ann).unwrap());
    assert!(db.has(&person, "1").unwrap());
}

#[test]
fn test_add_keeps_caller_key() {
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut bob = person
        .construct([("_key", Value::from("bob")), ("name", Value::from("Bob"))])
        .unwrap();

    db.add(&mut bob).unwrap();

    assert_eq!(bob.id().as_deref(), Some("persons/bob"));
}

#[test]
fn test_add_rejects_invalid_entity() {
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut nameless = person.construct([("age", Value::from(3))]).unwrap();

    let err = db.add(&mut nameless).unwrap_err();

    assert_eq!(err.code(), "DG-001");
    assert_eq!(db.query(&person).count().unwrap(), 0);
}

#[test]
fn test_update_sends_only_dirty_fields() {
    // Arrange
    let (driver, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut ann = person
        .construct([("name", Value::from("Ann")), ("age", Value::from(30))])
        .unwrap();
    db.add(&mut ann).unwrap();

    // Another writer changes the name behind our back.
    let mut patch = crate::value::Document::new();
    patch.insert("_key".to_string(), json!("1"));
    patch.insert("name".to_string(), json!("Annie"));
    driver.update("persons", &patch).unwrap();

    // Act
    ann.set("age", 31).unwrap();
    db.update(&mut ann, true).unwrap();

    // Assert
    let stored = driver.get_document("persons", "1").unwrap().unwrap();
    assert_eq!(stored["age"], json!(31));
    assert_eq!(stored["name"], json!("Annie"));
    assert!(!ann.is_dirty());
}

#[test]
fn test_full_update_overwrites_every_field() {
    let (driver, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut ann = person.construct([("name", Value::from("Ann"))]).unwrap();
    db.add(&mut ann).unwrap();
    ann.set("name", "Anna").unwrap();

    let meta = db.update(&mut ann, false).unwrap();

    let stored = driver.get_document("persons", "1").unwrap().unwrap();
    assert_eq!(stored["name"], json!("Anna"));
    assert_eq!(stored["age"], json!(null));
    assert!(meta.contains_key("_oldRev"));
}

#[test]
fn test_update_and_delete_need_a_key() {
    let (_, db) = setup();
    let person = person();
    let mut ann = person.construct([("name", Value::from("Ann"))]).unwrap();

    let update = db.update(&mut ann, true).unwrap_err();
    let delete = db.delete(&ann).unwrap_err();

    assert_eq!(update.code(), "DG-010");
    assert_eq!(delete.code(), "DG-010");
    assert!(!db.exists(&ann).unwrap());
}

#[test]
fn test_delete_removes_document() {
    let (_, db) = setup();
    let person = person();
    db.create_collection(&person).unwrap();
    let mut ann = person.construct([("name", Value::from("Ann"))]).unwrap();
    db.add(&mut ann).unwrap();

    let meta = db.delete(&ann).unwrap();

    assert_eq!(meta["_key"], json!("1"));
    assert!(!db.exists(&ann).unwrap());
}

// =========================================================================
// Graphs
// =========================================================================

#[test]
fn test_create_graph_creates_collections_then_graph() {
    // Arrange
    let (driver, db) = setup();
    let (_, _, _, graph) = school();

    // Act
    db.create_graph(&graph).unwrap();

    // Assert
    assert_eq!(driver.collection_kind("students"), Some(CollectionKind::Document));
    assert_eq!(driver.collection_kind("subjects"), Some(CollectionKind::Document));
    assert_eq!(driver.collection_kind("studies"), Some(CollectionKind::Edge));
    let info = driver.graph_info("university").unwrap();
    assert_eq!(
        info.edge_definitions,
        [EdgeDefinition::new("studies", ["students"], ["subjects"])]
    );
}

#[test]
fn test_drop_graph_can_keep_collections() {
    let (driver, db) = setup();
    let (_, _, _, graph) = school();
    db.create_graph(&graph).unwrap();

    db.drop_graph(&graph, false).unwrap();

    assert!(driver.list_graphs().unwrap().is_empty());
    assert!(driver.has_collection("students").unwrap());
}

#[test]
fn test_update_graph_creates_missing_graph() {
    let (driver, db) = setup();
    let (_, _, _, graph) = school();

    db.update_graph(&graph).unwrap();

    assert_eq!(driver.list_graphs().unwrap(), ["university"]);
}

#[test]
fn test_update_graph_reconciles_edge_definitions() {
    // Arrange
    let (driver, db) = setup();
    let (student, subject, studies, _) = school();
    let teacher = EntityType::vertex("Teacher", "teachers").build().unwrap();
    let stale = EntityType::relation("stale");
    let stored = Graph::new("university")
        .connection(GraphConnection::new([Arc::clone(&student)], &studies, [Arc::clone(&student)]))
        .connection(GraphConnection::new([Arc::clone(&student)], &stale, [Arc::clone(&student)]));
    db.create_graph(&stored).unwrap();

    let teaches = EntityType::relation("teaches");
    let declared = Graph::new("university")
        .connection(GraphConnection::new([Arc::clone(&student)], &studies, [Arc::clone(&subject)]))
        .connection(GraphConnection::new([Arc::clone(&teacher)], &teaches, [Arc::clone(&subject)]));

    // Act
    db.update_graph(&declared).unwrap();

    // Assert
    let info = driver.graph_info("university").unwrap();
    let names: Vec<&str> = info
        .edge_definitions
        .iter()
        .map(|d| d.edge_collection.as_str())
        .collect();
    assert_eq!(names, ["studies", "teaches"]);
    assert_eq!(info.edge_definitions[0].to_collections, ["subjects"]);
    assert!(driver.has_collection("teachers").unwrap());
    assert!(driver.has_collection("stale").unwrap());
}

#[test]
fn test_update_graph_is_idempotent() {
    let (driver, db) = setup();
    let (_, _, _, graph) = school();
    db.update_graph(&graph).unwrap();
    let before = driver.graph_info("university").unwrap();

    db.update_graph(&graph).unwrap();

    assert_eq!(driver.graph_info("university").unwrap(), before);
}

#[test]
fn test_create_all_provisions_in_order() {
    let (driver, db) = setup();
    let person = person();
    let (_, _, _, graph) = school();

    db.create_all(&[Provision::from(&person), Provision::from(&graph)])
        .unwrap();

    assert!(driver.has_collection("persons").unwrap());
    assert_eq!(driver.list_graphs().unwrap(), ["university"]);
}

#[test]
fn test_create_all_stops_at_first_failure() {
    let (driver, db) = setup();
    let person = person();
    let (_, _, _, graph) = school();
    db.create_collection(&person).unwrap();

    let err = db
        .create_all(&[Provision::Collection(&person), Provision::Graph(&graph)])
        .unwrap_err();

    assert!(matches!(err, Error::Driver(_)));
    assert!(driver.list_graphs().unwrap().is_empty());
}
