//! Property tests for entity loading, dumping and dirty tracking.
//!
//! Includes the round-trip property: loading a dump and dumping it again
//! yields the same document.

use std::collections::BTreeSet;
use std::sync::Arc;

use docgraph_core::{
    Database, Entity, EntityType, Field, FieldKind, LoadOptions, MemoryDriver, Schema, Value,
};
use serde_json::json;

const FIELDS: [&str; 3] = ["name", "nickname", "age"];

fn person(allow_extra: bool) -> Arc<EntityType> {
    EntityType::vertex("Person", "persons")
        .field(Field::string("name"))
        .field(Field::string("nickname"))
        .field(Field::integer("age"))
        .allow_extra_fields(allow_extra)
        .build()
        .unwrap()
}

fn profile() -> Arc<EntityType> {
    let address = Schema::new("Address")
        .field(Field::string("city").required())
        .field(Field::string("street"));
    EntityType::vertex("Profile", "profiles")
        .field(Field::string("name"))
        .field(Field::integer("age"))
        .field(Field::float("score"))
        .field(Field::float("ratio"))
        .field(Field::boolean("active"))
        .field(Field::date("born"))
        .field(Field::nested("address", Arc::new(address)))
        .field(Field::list("tags", FieldKind::String))
        .build()
        .unwrap()
}

fn database() -> Database {
    Database::new(Arc::new(MemoryDriver::new()))
}

fn stored(ty: &Arc<EntityType>, db: &Database, raw: serde_json::Value) -> Entity {
    let serde_json::Value::Object(doc) = raw else {
        panic!("fixture must be an object");
    };
    Entity::load(ty, &doc, LoadOptions::from_database(db)).unwrap()
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_dirty_set_is_exactly_the_written_fields(
            writes in prop::collection::vec((0..FIELDS.len(), any::<i32>()), 0..8)
        ) {
            // Arrange
            let ty = person(false);
            let db = database();
            let mut entity = stored(&ty, &db, json!({"_key": "p1", "name": "Ann", "age": 40}));
            prop_assert!(!entity.is_dirty());

            // Act
            for (idx, n) in &writes {
                let name = FIELDS[*idx];
                let value = if name == "age" { Value::from(*n) } else { Value::from(n.to_string()) };
                entity.set(name, value).unwrap();
            }

            // Assert
            let expected: BTreeSet<String> =
                writes.iter().map(|(idx, _)| FIELDS[*idx].to_string()).collect();
            prop_assert_eq!(entity.dirty(), &expected);

            let names: Vec<&str> = expected.iter().map(String::as_str).collect();
            let patch = entity.dump(Some(names.as_slice())).unwrap();
            for key in patch.keys() {
                prop_assert!(key == "_key" || expected.contains(key), "unexpected {}", key);
            }
        }

        #[test]
        fn prop_integer_strings_coerce_on_load(n in any::<i64>()) {
            let ty = person(false);
            let db = database();

            let entity = stored(&ty, &db, json!({"_key": "p1", "age": n.to_string()}));

            prop_assert_eq!(entity.get("age"), Value::Integer(n));
        }

        #[test]
        fn prop_unknown_fields_follow_extra_policy(
            extras in prop::collection::btree_map("x_[a-z]{1,8}", "[a-zA-Z ]{0,12}", 1..5)
        ) {
            // Arrange
            let mut raw = json!({"_key": "p1", "name": "Ann"});
            for (k, v) in &extras {
                raw[k] = json!(v);
            }
            let db = database();

            // Act
            let strict = stored(&person(false), &db, raw.clone()).dump(None).unwrap();
            let open = stored(&person(true), &db, raw).dump(None).unwrap();

            // Assert
            for (k, v) in &extras {
                prop_assert!(!strict.contains_key(k));
                prop_assert_eq!(open.get(k), Some(&json!(v)));
            }
            prop_assert_eq!(strict.get("name"), Some(&json!("Ann")));
        }

        #[test]
        fn prop_key_alias_shares_the_key_slot(key in "[a-z0-9]{1,12}") {
            let ty = EntityType::vertex("Account", "accounts")
                .field(Field::string("login"))
                .key_field("login")
                .build()
                .unwrap();
            let mut entity = Entity::new(&ty).unwrap();

            entity.set("login", key.as_str()).unwrap();

            prop_assert_eq!(entity.key(), Some(key.as_str()));
            prop_assert_eq!(entity.get("_key"), Value::from(key.as_str()));
            let dumped = entity.dump(None).unwrap();
            prop_assert_eq!(dumped.get("_key"), Some(&json!(key)));
        }

        #[test]
        fn prop_load_of_dump_round_trips(
            name in "[a-zA-Z ]{0,16}",
            age in any::<i64>(),
            score in any::<i32>(),
            ratio in -1.0e9f64..1.0e9,
            active in any::<bool>(),
            (year, month, day) in (1900i32..2100, 1u32..=12, 1u32..=28),
            city in "[a-zA-Z]{1,12}",
            tags in prop::collection::vec("[a-z]{1,6}", 0..4)
        ) {
            // Arrange: integers into float fields and dates as strings
            let ty = profile();
            let entity = ty
                .construct([
                    ("_key", Value::from("p1")),
                    ("name", Value::from(name)),
                    ("age", Value::from(age)),
                    ("score", Value::from(score)),
                    ("ratio", Value::from(ratio)),
                    ("active", Value::from(active)),
                    ("born", Value::from(format!("{year:04}-{month:02}-{day:02}"))),
                    ("address", Value::from(json!({"city": city}))),
                    ("tags", Value::from(json!(tags))),
                ])
                .unwrap();

            // Act
            let first = entity.dump(None).unwrap();
            let reloaded = Entity::load(&ty, &first, LoadOptions::default()).unwrap();
            let second = reloaded.dump(None).unwrap();

            // Assert
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.get("score"), Some(&json!(f64::from(score))));
        }
    }
}
