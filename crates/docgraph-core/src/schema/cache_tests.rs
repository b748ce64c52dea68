//! Tests for `cache` module

use std::sync::Arc;

use super::*;

fn person_schema() -> Schema {
    Schema::new("Person")
        .field(Field::string("name").required())
        .field(Field::integer("age"))
        .field(Field::string("city"))
        .field(Field::date("dob"))
        .with_identifier("name")
}

#[test]
fn test_cache_new() {
    // Arrange & Act
    let cache = SchemaCache::new(8);

    // Assert
    assert!(cache.is_empty());
    assert_eq!(cache.capacity(), 8);
    assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn test_cache_zero_capacity_is_clamped() {
    let cache = SchemaCache::new(0);
    assert_eq!(cache.capacity(), 1);
}

#[test]
fn test_cache_miss_then_hit() {
    // Arrange
    let cache = SchemaCache::new(8);
    let full = person_schema();

    // Act
    let first = cache.restricted(&full, &["age"]);
    let second = cache.restricted(&full, &["age"]);

    // Assert
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_key_is_order_independent() {
    let cache = SchemaCache::new(8);
    let full = person_schema();

    let a = cache.restricted(&full, &["age", "city"]);
    let b = cache.restricted(&full, &["city", "age"]);

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_restricted_keeps_identifier() {
    let cache = SchemaCache::new(8);
    let full = person_schema();

    let schema = cache.restricted(&full, &["city"]);

    let names: Vec<&str> = schema.fields().keys().map(String::as_str).collect();
    assert_eq!(names, vec!["name", "city"]);
}

#[test]
fn test_cache_evicts_oldest() {
    // Arrange
    let cache = SchemaCache::new(2);
    let full = person_schema();

    // Act
    let _ = cache.restricted(&full, &["age"]);
    let _ = cache.restricted(&full, &["city"]);
    let _ = cache.restricted(&full, &["dob"]);

    // Assert
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 1);

    // "age" was evicted, so asking again is a miss
    let _ = cache.restricted(&full, &["age"]);
    assert_eq!(cache.stats().misses, 4);
}

#[test]
fn test_cache_shrinking_capacity_evicts() {
    let cache = SchemaCache::new(4);
    let full = person_schema();
    let _ = cache.restricted(&full, &["age"]);
    let _ = cache.restricted(&full, &["city"]);
    let _ = cache.restricted(&full, &["dob"]);

    cache.set_capacity(1);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn test_cache_clear_resets_stats() {
    let cache = SchemaCache::new(4);
    let full = person_schema();
    let _ = cache.restricted(&full, &["age"]);
    let _ = cache.restricted(&full, &["age"]);

    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn test_cache_hit_rate() {
    let cache = SchemaCache::new(4);
    let full = person_schema();

    // 1 miss, 3 hits
    for _ in 0..4 {
        let _ = cache.restricted(&full, &["age"]);
    }

    let rate = cache.stats().hit_rate();
    assert!((rate - 75.0).abs() < f64::EPSILON);
}
