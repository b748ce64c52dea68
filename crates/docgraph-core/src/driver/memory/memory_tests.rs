//! Tests for the in-memory driver

use serde_json::{json, Value as Json};

use super::*;
use crate::driver::{Direction, IndexKind, VertexFilter};

fn doc(value: Json) -> Document {
    match value {
        Json::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn binds(value: Json) -> Document {
    doc(value)
}

fn cars_driver() -> MemoryDriver {
    let driver = MemoryDriver::new();
    driver
        .create_collection("cars", CollectionKind::Document, &Document::new())
        .unwrap();
    for (make, model, year) in [
        ("Honda", "Civic", 1984),
        ("Honda", "Civic", 1990),
        ("Honda", "Accord", 1992),
        ("Toyota", "Corolla", 2005),
        ("Toyota", "Camry", 2010),
    ] {
        driver
            .insert("cars", &doc(json!({"make": make, "model": model, "year": year})))
            .unwrap();
    }
    driver
}

/// students/1 -[enrolled]-> subjects/a, subjects/b ; students/2 -> subjects/b
fn university_driver() -> MemoryDriver {
    let driver = MemoryDriver::new();
    driver
        .create_graph(
            "university",
            &[EdgeDefinition::new("enrolled", ["students"], ["subjects"])],
        )
        .unwrap();
    for key in ["1", "2"] {
        driver
            .insert("students", &doc(json!({"_key": key, "name": format!("s{key}")})))
            .unwrap();
    }
    for key in ["a", "b"] {
        driver
            .insert("subjects", &doc(json!({"_key": key, "title": key})))
            .unwrap();
    }
    for (from, to) in [("students/1", "subjects/a"), ("students/1", "subjects/b"), ("students/2", "subjects/b")] {
        driver
            .insert("enrolled", &doc(json!({"_from": from, "_to": to})))
            .unwrap();
    }
    driver
}

// ============================================================================
// Collections and documents
// ============================================================================

#[test]
fn test_create_collection_twice_fails() {
    let driver = MemoryDriver::new();
    driver
        .create_collection("cars", CollectionKind::Document, &Document::new())
        .unwrap();

    let err = driver
        .create_collection("cars", CollectionKind::Document, &Document::new())
        .unwrap_err();

    assert_eq!(err, DriverError::CollectionExists("cars".to_string()));
    assert!(err.is_already_exists());
}

#[test]
fn test_collection_options_and_indexes_are_recorded() {
    // Arrange
    let driver = MemoryDriver::new();
    let options = doc(json!({"waitForSync": true}));
    let index = IndexSpec::new(IndexKind::Hash, ["name"]).unique();

    // Act
    driver
        .create_collection("people", CollectionKind::Document, &options)
        .unwrap();
    driver.add_index("people", &index).unwrap();
    driver.add_index("people", &index).unwrap();

    // Assert
    assert_eq!(driver.collection_options("people"), Some(options));
    assert_eq!(driver.indexes("people"), vec![index]);
    assert_eq!(driver.collection_kind("people"), Some(CollectionKind::Document));
}

#[test]
fn test_insert_assigns_sequential_keys() {
    let driver = cars_driver();

    let meta = driver.insert("cars", &doc(json!({"make": "Ford"}))).unwrap();

    assert_eq!(meta["_key"], json!("6"));
    assert_eq!(meta["_id"], json!("cars/6"));
    assert_eq!(driver.collection_count("cars").unwrap(), 6);
}

#[test]
fn test_insert_duplicate_key_fails() {
    let driver = cars_driver();

    let err = driver
        .insert("cars", &doc(json!({"_key": "1", "make": "Ford"})))
        .unwrap_err();

    assert!(matches!(err, DriverError::DocumentExists { .. }));
}

#[test]
fn test_insert_into_missing_collection_fails() {
    let driver = MemoryDriver::new();

    let err = driver.insert("nope", &Document::new()).unwrap_err();

    assert!(err.is_not_found());
}

#[test]
fn test_edge_insert_requires_endpoints() {
    let driver = MemoryDriver::new();
    driver
        .create_collection("links", CollectionKind::Edge, &Document::new())
        .unwrap();

    let err = driver.insert("links", &doc(json!({"_from": "a/1"}))).unwrap_err();

    assert!(matches!(err, DriverError::InvalidDocument(_)));
}

#[test]
fn test_update_merges_and_bumps_revision() {
    // Arrange
    let driver = cars_driver();
    let before = driver.get_document("cars", "1").unwrap().unwrap();

    // Act
    let meta = driver
        .update("cars", &doc(json!({"_key": "1", "year": 1985, "_id": "ignored"})))
        .unwrap();

    // Assert
    let after = driver.get_document("cars", "1").unwrap().unwrap();
    assert_eq!(after["year"], json!(1985));
    assert_eq!(after["make"], json!("Honda"));
    assert_eq!(after["_id"], json!("cars/1"));
    assert_ne!(after["_rev"], before["_rev"]);
    assert_eq!(meta["_oldRev"], before["_rev"]);
}

#[test]
fn test_update_missing_document_fails() {
    let driver = cars_driver();

    let err = driver
        .update("cars", &doc(json!({"_key": "99", "year": 1})))
        .unwrap_err();

    assert_eq!(
        err,
        DriverError::DocumentNotFound {
            collection: "cars".to_string(),
            key: "99".to_string()
        }
    );
}

#[test]
fn test_delete_removes_document() {
    let driver = cars_driver();

    let meta = driver.delete("cars", "2").unwrap();

    assert_eq!(meta["_id"], json!("cars/2"));
    assert!(!driver.has_document("cars", "2").unwrap());
    assert!(driver.delete("cars", "2").unwrap_err().is_not_found());
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_query_filter_with_bind_vars() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR rec IN @@collection FILTER rec.make == @make AND rec.year > @year RETURN rec",
            &binds(json!({"@collection": "cars", "make": "Honda", "year": 1985})),
        )
        .unwrap();

    let years: Vec<&Json> = rows.iter().map(|r| &r["year"]).collect();
    assert_eq!(years, vec![&json!(1990), &json!(1992)]);
}

#[test]
fn test_query_sort_is_stable_and_limit_applies() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR c IN cars SORT c.make DESC LIMIT 1, 2 RETURN c.model",
            &Document::new(),
        )
        .unwrap();

    // Toyota rows first in insertion order, then Honda
    assert_eq!(rows, vec![json!("Camry"), json!("Civic")]);
}

#[test]
fn test_query_keep_projection() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR c IN cars FILTER c.year == 2005 RETURN KEEP(c, @fields)",
            &binds(json!({"fields": ["_key", "model"]})),
        )
        .unwrap();

    assert_eq!(rows, vec![json!({"_key": "4", "model": "Corolla"})]);
}

#[test]
fn test_query_count() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR rec IN @@collection FILTER rec.make == 'Toyota' COLLECT WITH COUNT INTO length RETURN length",
            &binds(json!({"@collection": "cars"})),
        )
        .unwrap();

    assert_eq!(rows, vec![json!(2)]);
}

#[test]
fn test_query_update_returns_new_documents() {
    // Arrange
    let driver = cars_driver();

    // Act
    let rows = driver
        .execute_query(
            "FOR rec IN @@collection FILTER rec.make == 'Honda' UPDATE rec WITH @orm_update IN @@collection RETURN NEW",
            &binds(json!({"@collection": "cars", "orm_update": {"checked": true}})),
        )
        .unwrap();

    // Assert
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["checked"] == json!(true)));
    let toyota = driver.get_document("cars", "4").unwrap().unwrap();
    assert!(!toyota.contains_key("checked"));
}

#[test]
fn test_query_remove_returns_old_documents() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR rec IN @@collection FILTER rec.year < 1991 REMOVE rec IN @@collection RETURN OLD",
            &binds(json!({"@collection": "cars"})),
        )
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(driver.collection_count("cars").unwrap(), 3);
}

#[test]
fn test_query_in_operator_and_missing_attribute() {
    let driver = cars_driver();

    let rows = driver
        .execute_query(
            "FOR c IN cars FILTER c.model IN ['Civic', 'Camry'] FILTER c.color == null RETURN c._key",
            &Document::new(),
        )
        .unwrap();

    assert_eq!(rows, vec![json!("1"), json!("2"), json!("5")]);
}

#[test]
fn test_query_missing_bind_var_fails() {
    let driver = cars_driver();

    let err = driver
        .execute_query("FOR c IN cars FILTER c.year == @year RETURN c", &Document::new())
        .unwrap_err();

    assert!(matches!(err, DriverError::BindParameter(_)));
}

#[test]
fn test_query_unknown_collection_fails() {
    let driver = MemoryDriver::new();

    let err = driver
        .execute_query("FOR c IN ghosts RETURN c", &Document::new())
        .unwrap_err();

    assert_eq!(err, DriverError::CollectionNotFound("ghosts".to_string()));
}

#[test]
fn test_query_syntax_error() {
    let driver = cars_driver();

    let err = driver
        .execute_query("FOR c IN cars RETURN", &Document::new())
        .unwrap_err();

    assert!(matches!(err, DriverError::Query { .. }));
}

// ============================================================================
// Graphs
// ============================================================================

#[test]
fn test_create_graph_creates_collections() {
    let driver = university_driver();

    let mut names = driver.list_collections().unwrap();
    names.sort();

    assert_eq!(names, vec!["enrolled", "students", "subjects"]);
    assert_eq!(driver.collection_kind("enrolled"), Some(CollectionKind::Edge));
    assert_eq!(driver.list_graphs().unwrap(), vec!["university"]);
}

#[test]
fn test_create_graph_twice_fails() {
    let driver = university_driver();

    let err = driver.create_graph("university", &[]).unwrap_err();

    assert_eq!(err, DriverError::GraphExists("university".to_string()));
}

#[test]
fn test_traverse_outbound_depth_one() {
    // Arrange
    let driver = university_driver();
    let request = TraversalRequest::new("university", "students/1")
        .with_direction(Direction::Outbound);

    // Act
    let paths = driver.graph_traverse(&request).unwrap();

    // Assert
    let ends: Vec<&Json> = paths.iter().map(|p| &p.vertices[1]["_id"]).collect();
    assert_eq!(ends, vec![&json!("subjects/a"), &json!("subjects/b")]);
    assert!(paths.iter().all(|p| p.len() == 1));
}

#[test]
fn test_traverse_any_depth_two_with_path_uniqueness() {
    let driver = university_driver();
    let request = TraversalRequest::new("university", "students/1").with_depth(1, 2);

    let paths = driver.graph_traverse(&request).unwrap();

    // s1->a, s1->b, s1->b<-s2
    assert_eq!(paths.len(), 3);
    let last = paths.last().unwrap();
    assert_eq!(last.vertices[2]["_id"], json!("students/2"));
    assert_eq!(last.edges.len(), 2);
}

#[test]
fn test_traverse_inbound() {
    let driver = university_driver();
    let request =
        TraversalRequest::new("university", "subjects/b").with_direction(Direction::Inbound);

    let paths = driver.graph_traverse(&request).unwrap();

    assert_eq!(paths.len(), 2);
}

#[test]
fn test_traverse_vertex_filter() {
    let driver = university_driver();
    let request = TraversalRequest::new("university", "subjects/b")
        .with_depth(1, 2)
        .with_vertex_filter(VertexFilter::new(["subjects"]));

    let paths = driver.graph_traverse(&request).unwrap();

    // b<-s1->a is the only path ending on a subject
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].vertices[2]["_id"], json!("subjects/a"));
}

#[test]
fn test_traverse_missing_start_vertex_yields_nothing() {
    let driver = university_driver();
    let request = TraversalRequest::new("university", "students/404");

    assert!(driver.graph_traverse(&request).unwrap().is_empty());
}

#[test]
fn test_traverse_unknown_graph_fails() {
    let driver = MemoryDriver::new();
    let request = TraversalRequest::new("nope", "a/1");

    let err = driver.graph_traverse(&request).unwrap_err();

    assert_eq!(err, DriverError::GraphNotFound("nope".to_string()));
}

#[test]
fn test_traversal_query_matches_graph_traverse() {
    // Arrange
    let driver = university_driver();
    let request = TraversalRequest::new("university", "students/1")
        .with_depth(1, 2)
        .with_vertex_filter(VertexFilter::new(["students"]));
    let (query, bind_vars) = request.to_aql();

    // Act
    let rows = driver.execute_query(&query, &bind_vars).unwrap();

    // Assert
    assert_eq!(rows.len(), 1);
    let path = PathRecord::from_json(rows[0].clone()).unwrap();
    assert_eq!(path.vertices[2]["_id"], json!("students/2"));
}

#[test]
fn test_traversal_query_returns_vertices_and_edges() {
    let driver = university_driver();

    let rows = driver
        .execute_query(
            "FOR v, e, p IN 1..1 OUTBOUND 'students/2' GRAPH 'university' RETURN {v: v._id, e: e._from}",
            &Document::new(),
        )
        .unwrap();

    assert_eq!(rows, vec![json!({"v": "subjects/b", "e": "students/2"})]);
}

#[test]
fn test_edge_definition_lifecycle() {
    // Arrange
    let driver = university_driver();
    let teaches = EdgeDefinition::new("teaches", ["teachers"], ["subjects"]);

    // Act & Assert
    driver.create_edge_definition("university", &teaches).unwrap();
    assert!(matches!(
        driver.create_edge_definition("university", &teaches),
        Err(DriverError::EdgeDefinitionExists(_))
    ));
    assert!(driver.has_collection("teachers").unwrap());

    let widened = EdgeDefinition::new("teaches", ["teachers", "students"], ["subjects"]);
    driver.replace_edge_definition("university", &widened).unwrap();
    let info = driver.graph_info("university").unwrap();
    assert!(info.edge_definitions.contains(&widened));

    driver
        .delete_edge_definition("university", "teaches", true)
        .unwrap();
    assert!(!driver.has_collection("teaches").unwrap());
    assert_eq!(driver.graph_info("university").unwrap().edge_definitions.len(), 1);
}

#[test]
fn test_delete_graph_drop_collections() {
    let driver = university_driver();

    driver.delete_graph("university", true).unwrap();

    assert!(driver.list_graphs().unwrap().is_empty());
    assert!(driver.list_collections().unwrap().is_empty());
}

#[test]
fn test_delete_graph_keeps_collections() {
    let driver = university_driver();

    driver.delete_graph("university", false).unwrap();

    assert_eq!(driver.list_collections().unwrap().len(), 3);
}
