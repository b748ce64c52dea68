//! Tests for `pool` module

use std::sync::Arc;

use super::*;

fn two_node_pool() -> (Arc<MemoryDriver>, Arc<MemoryDriver>, ConnectionPool) {
    let a = Arc::new(MemoryDriver::new());
    let b = Arc::new(MemoryDriver::new());
    let pool = ConnectionPool::new(vec![
        Arc::clone(&a) as Arc<dyn Driver>,
        Arc::clone(&b) as Arc<dyn Driver>,
    ])
    .unwrap();
    (a, b, pool)
}

#[test]
fn test_pool_rejects_empty_driver_list() {
    let err = ConnectionPool::new(Vec::new()).unwrap_err();

    assert_eq!(err.code(), "DG-011");
}

#[test]
fn test_pool_dispatches_round_robin() {
    // Arrange
    let (a, b, pool) = two_node_pool();

    // Act
    pool.create_collection("first", CollectionKind::Document, &Document::new())
        .unwrap();
    pool.create_collection("second", CollectionKind::Document, &Document::new())
        .unwrap();
    pool.create_collection("third", CollectionKind::Document, &Document::new())
        .unwrap();

    // Assert
    assert_eq!(a.list_collections().unwrap(), vec!["first", "third"]);
    assert_eq!(b.list_collections().unwrap(), vec!["second"]);
    assert_eq!(pool.len(), 2);
    assert!(!pool.is_empty());
}

#[test]
fn test_pool_passes_driver_errors_through() {
    let (_a, _b, pool) = two_node_pool();

    let err = pool.get_document("missing", "1").unwrap_err();

    assert_eq!(err, DriverError::CollectionNotFound("missing".to_string()));
}
