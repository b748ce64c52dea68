//! Driver round-trip tests.
//!
//! Runs mapper operations against a recording driver and checks how many
//! driver calls each one issues.

mod recording;

use std::sync::Arc;

use docgraph_core::{
    Database, Direction, Entity, EntityType, ExpandOptions, Field, Graph, GraphConnection,
    Related, Relationship, Value,
};
use recording::{recording_database, Calls};

// =========================================================================
// Fixtures
// =========================================================================

fn owner_types() -> (Arc<EntityType>, Arc<EntityType>) {
    let car = EntityType::vertex("Car", "cars")
        .field(Field::string("model"))
        .field(Field::string("owner_key"))
        .relationship(Relationship::new("owner", "Person", "owner_key"))
        .build()
        .unwrap();
    let person = EntityType::vertex("Person", "persons")
        .field(Field::string("name"))
        .relationship(Relationship::new("cars", &car, "_key").target_field("owner_key"))
        .build()
        .unwrap();
    (car, person)
}

fn add(db: &Database, entity_type: &Arc<EntityType>, values: &[(&str, &str)]) -> Entity {
    let mut entity = entity_type
        .construct(values.iter().map(|(k, v)| (*k, Value::from(*v))))
        .unwrap();
    db.add(&mut entity).unwrap();
    entity
}

fn garage() -> (Database, Calls, Arc<EntityType>, Arc<EntityType>) {
    let (db, calls) = recording_database();
    let (car, person) = owner_types();
    db.register(&car);
    db.register(&person);
    db.create_collection(&car).unwrap();
    db.create_collection(&person).unwrap();
    add(&db, &person, &[("_key", "ann"), ("name", "Ann")]);
    add(&db, &car, &[("model", "Civic"), ("owner_key", "ann")]);
    add(&db, &car, &[("model", "Accord"), ("owner_key", "ann")]);
    calls.reset();
    (db, calls, car, person)
}

fn university(db: &Database) -> (Graph, Arc<EntityType>, Arc<EntityType>, Arc<EntityType>) {
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
    let mut graph = Graph::new("university").connection(GraphConnection::new(
        [Arc::clone(&student)],
        &studies,
        [Arc::clone(&subject)],
    ));
    graph.bind(db);
    (graph, student, subject, studies)
}

// =========================================================================
// Relationships
// =========================================================================

#[test]
fn test_cached_relationship_issues_one_query() {
    // Arrange
    let (db, calls, _, person) = garage();
    let mut ann = db.query(&person).by_key("ann").unwrap();
    calls.reset();

    // Act
    let first = ann.related("cars").unwrap();
    let second = ann.related("cars").unwrap();

    // Assert
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(calls.count("execute_query"), 1);
    assert!(calls.queries()[0].contains("FILTER rec.owner_key == @val"));
}

#[test]
fn test_key_relationship_uses_point_lookup() {
    let (db, calls, car, _) = garage();
    let mut civic = db
        .query(&car)
        .filter_by([("model", "Civic")], false)
        .one()
        .unwrap();
    calls.reset();

    let owner = civic.related("owner").unwrap();

    assert_eq!(owner.first().unwrap().get("name"), Value::from("Ann"));
    assert_eq!(calls.count("get_document"), 1);
    assert_eq!(calls.count("execute_query"), 0);
}

#[test]
fn test_null_local_value_issues_no_driver_calls() {
    let (db, calls, car, _) = garage();
    let mut orphan = car.construct([("model", Value::from("Trabant"))]).unwrap();
    orphan.bind(&db);

    let owner = orphan.related("owner").unwrap();

    assert!(matches!(owner, Related::One(None)));
    assert_eq!(calls.count("get_document"), 0);
    assert_eq!(calls.count("execute_query"), 0);
}

// =========================================================================
// Queries
// =========================================================================

#[test]
fn test_unfiltered_count_uses_collection_count() {
    let (db, calls, car, _) = garage();

    let total = db.query(&car).count().unwrap();
    let filtered = db.query(&car).filter("model == 'Civic'", false).count().unwrap();

    assert_eq!((total, filtered), (2, 1));
    assert_eq!(calls.count("collection_count"), 1);
    assert_eq!(calls.count("execute_query"), 1);
    assert!(calls.queries()[0].contains("COLLECT WITH COUNT INTO length"));
}

#[test]
fn test_dirty_update_sends_a_single_write() {
    let (db, calls, car, _) = garage();
    let mut civic = db
        .query(&car)
        .filter_by([("model", "Civic")], false)
        .one()
        .unwrap();
    calls.reset();

    civic.set("model", "Civic Type R").unwrap();
    db.update(&mut civic, true).unwrap();

    assert_eq!(calls.count("update"), 1);
    assert_eq!(calls.count("get_document"), 0);
    assert!(!civic.is_dirty());
    let stored = db.query(&car).by_key(civic.key().unwrap()).unwrap();
    assert_eq!(stored.get("model"), Value::from("Civic Type R"));
    assert_eq!(stored.get("owner_key"), Value::from("ann"));
}

// =========================================================================
// Graph provisioning
// =========================================================================

#[test]
fn test_update_graph_is_idempotent() {
    // Arrange
    let (db, calls) = recording_database();
    let (graph, ..) = university(&db);
    db.update_graph(&graph).unwrap();
    assert_eq!(calls.count("create_graph"), 1);
    calls.reset();

    // Act
    db.update_graph(&graph).unwrap();

    // Assert
    assert_eq!(calls.count("create_graph"), 0);
    assert_eq!(calls.count("create_collection"), 0);
    assert_eq!(calls.count("create_edge_definition"), 0);
    assert_eq!(calls.count("replace_edge_definition"), 0);
    assert_eq!(calls.count("delete_edge_definition"), 0);
    assert_eq!(calls.count("graph_info"), 1);
}

#[test]
fn test_update_graph_adds_new_connection() {
    // Arrange
    let (db, calls) = recording_database();
    let (graph, student, _, _) = university(&db);
    db.create_graph(&graph).unwrap();
    let teacher = EntityType::vertex("Teacher", "teachers").build().unwrap();
    let teaches = EntityType::edge("Teaches", "teaches").build().unwrap();
    let mut extended = graph.connection(GraphConnection::new([teacher], &teaches, [student]));
    extended.bind(&db);
    calls.reset();

    // Act
    db.update_graph(&extended).unwrap();

    // Assert
    assert_eq!(calls.count("create_collection"), 2);
    assert_eq!(calls.count("create_edge_definition"), 1);
    assert_eq!(calls.count("replace_edge_definition"), 0);
    let info = db.driver().graph_info("university").unwrap();
    let edges: Vec<&str> = info
        .edge_definitions
        .iter()
        .map(|d| d.edge_collection.as_str())
        .collect();
    assert_eq!(edges, ["studies", "teaches"]);
}

// =========================================================================
// Traversal
// =========================================================================

#[test]
fn test_expand_issues_one_traversal() {
    // Arrange
    let (db, calls) = recording_database();
    let (graph, student, subject, studies) = university(&db);
    db.create_graph(&graph).unwrap();
    let alice = add(&db, &student, &[("_key", "alice"), ("name", "Alice")]);
    let math = add(&db, &subject, &[("_key", "math"), ("title", "Math")]);
    let edge = studies.construct([("grade", Value::from("A"))]).unwrap();
    let mut edge = graph.relation(&alice, edge, &math).unwrap();
    db.add(&mut edge).unwrap();
    calls.reset();

    // Act
    let traversal = graph
        .expand(&alice, &ExpandOptions::default().direction(Direction::Outbound))
        .unwrap();

    // Assert
    assert_eq!(calls.count("graph_traverse"), 1);
    assert_eq!(calls.count("get_document"), 0);
    assert_eq!(traversal.vertex_count(), 2);
    assert_eq!(traversal.edge_count(), 1);
    let root = traversal.root().unwrap();
    assert_eq!(root.key(), Some("alice"));
    let studied = traversal.root_relations("studies");
    assert_eq!(studied.len(), 1);
    assert_eq!(studied[0].next().unwrap().get("title"), Value::from("Math"));
}
