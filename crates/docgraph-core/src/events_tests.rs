//! Tests for persistence events.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::Database;
use crate::driver::MemoryDriver;
use crate::entity::{Entity, EntityType};
use crate::events::{Event, EventBus};
use crate::schema::Field;
use crate::value::{Document, Value};

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(
    log: &Log,
    tag: &'static str,
) -> impl Fn(&Entity, Event, Option<&Document>) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |entity, event, result| {
        let suffix = result
            .and_then(|r| r.get("_key"))
            .and_then(serde_json::Value::as_str)
            .map(|k| format!(" {k}"))
            .unwrap_or_default();
        log.lock().push(format!("{tag}:{event}:{}{suffix}", entity.entity_type().type_name()));
    }
}

fn animals() -> (Arc<EntityType>, Arc<EntityType>) {
    let animal = EntityType::vertex("Animal", "animals")
        .field(Field::string("name"))
        .build()
        .unwrap();
    let dog = EntityType::vertex("Dog", "animals")
        .extends(&animal)
        .build()
        .unwrap();
    (animal, dog)
}

#[test]
fn test_event_names() {
    let names: Vec<&str> = Event::ALL.iter().map(|e| e.as_str()).collect();

    assert_eq!(
        names,
        ["pre_add", "post_add", "pre_update", "post_update", "pre_delete", "post_delete"]
    );
    assert_eq!(Event::PostUpdate.to_string(), "post_update");
}

#[test]
fn test_listen_registers_per_event() {
    let bus = EventBus::new();

    bus.listen("Dog", &[Event::PreAdd, Event::PostAdd], |_, _, _| {});
    bus.listen("Dog", &[Event::PreAdd], |_, _, _| {});

    assert_eq!(bus.listener_count("Dog", Event::PreAdd), 2);
    assert_eq!(bus.listener_count("Dog", Event::PostAdd), 1);
    assert_eq!(bus.listener_count("Animal", Event::PreAdd), 0);
    bus.clear();
    assert_eq!(bus.listener_count("Dog", Event::PreAdd), 0);
}

#[test]
fn test_dispatch_walks_lineage_most_derived_first() {
    // Arrange
    let (_, dog) = animals();
    let bus = EventBus::new();
    let log: Log = Arc::default();
    bus.listen("Animal", &[Event::PreAdd], recorder(&log, "base"));
    bus.listen("Dog", &[Event::PreAdd], recorder(&log, "own"));
    bus.listen("Cat", &[Event::PreAdd], recorder(&log, "other"));
    let rex = dog.construct([("name", Value::from("Rex"))]).unwrap();

    // Act
    bus.dispatch(&rex, Event::PreAdd, None);
    bus.dispatch(&rex, Event::PostAdd, None);

    // Assert
    assert_eq!(*log.lock(), ["own:pre_add:Dog", "base:pre_add:Dog"]);
}

#[test]
fn test_base_listener_does_not_see_sibling_types() {
    let (animal, _) = animals();
    let bus = EventBus::new();
    let log: Log = Arc::default();
    bus.listen("Dog", &Event::ALL, recorder(&log, "dog"));
    let generic = animal.construct([("name", Value::from("Blob"))]).unwrap();

    bus.dispatch(&generic, Event::PreDelete, None);

    assert!(log.lock().is_empty());
}

#[test]
fn test_database_fires_lifecycle_events() {
    // Arrange
    let db = Database::new(Arc::new(MemoryDriver::new()));
    let (animal, dog) = animals();
    db.create_collection(&animal).unwrap();
    let log: Log = Arc::default();
    db.events().listen("Animal", &Event::ALL, recorder(&log, "db"));
    let mut rex = dog.construct([("name", Value::from("Rex"))]).unwrap();

    // Act
    db.add(&mut rex).unwrap();
    rex.set("name", "Rex II").unwrap();
    db.update(&mut rex, true).unwrap();
    db.delete(&rex).unwrap();

    // Assert
    assert_eq!(
        *log.lock(),
        [
            "db:pre_add:Dog",
            "db:post_add:Dog 1",
            "db:pre_update:Dog",
            "db:post_update:Dog 1",
            "db:pre_delete:Dog",
            "db:post_delete:Dog 1",
        ]
    );
}
