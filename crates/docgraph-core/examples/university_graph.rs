//! Builds a small university graph in memory and walks it.
//!
//! Run with `cargo run --example university_graph`. Set `RUST_LOG=debug`
//! to see the traversal requests.

use std::sync::Arc;

use docgraph_core::{
    init_tracing, Database, Direction, Entity, EntityType, ExpandOptions, Field, Graph,
    GraphConnection, MemoryDriver, OrmConfig, Result, Value,
};

fn main() -> Result<()> {
    let config = OrmConfig::default();
    init_tracing(&config.logging)?;
    let db = Database::with_config(Arc::new(MemoryDriver::new()), config)?;

    let student = EntityType::vertex("Student", "students")
        .field(Field::string("name").required())
        .field(Field::integer("age"))
        .build()?;
    let subject = EntityType::vertex("Subject", "subjects")
        .field(Field::string("title").required())
        .build()?;
    let teacher = EntityType::vertex("Teacher", "teachers")
        .field(Field::string("name").required())
        .build()?;
    let studies = EntityType::edge("Studies", "studies")
        .field(Field::string("grade"))
        .build()?;
    let teaches = EntityType::edge("Teaches", "teaches").build()?;

    let mut graph = Graph::new("university")
        .connection(GraphConnection::new(
            [Arc::clone(&student)],
            &studies,
            [Arc::clone(&subject)],
        ))
        .connection(GraphConnection::new(
            [Arc::clone(&teacher)],
            &teaches,
            [Arc::clone(&subject)],
        ));
    graph.bind(&db);
    db.create_graph(&graph)?;

    let mut alice = student.construct([("name", "Alice".into()), ("age", 21.into())])?;
    let mut bob = student.construct([("name", "Bob".into()), ("age", 23.into())])?;
    let mut curie = teacher.construct([("name", "Marie Curie".into())])?;
    let mut physics = subject.construct([("title", "Physics".into())])?;
    let mut chemistry = subject.construct([("title", "Chemistry".into())])?;
    for entity in [&mut alice, &mut bob, &mut curie, &mut physics, &mut chemistry] {
        db.add(entity)?;
    }

    let enrolments = [(&alice, &physics, "A"), (&alice, &chemistry, "B+"), (&bob, &physics, "B")];
    for (who, what, grade) in enrolments {
        let edge = studies.construct([("grade", Value::from(grade))])?;
        db.add(&mut graph.relation(who, edge, what)?)?;
    }
    for what in [&physics, &chemistry] {
        db.add(&mut graph.relation(&curie, Entity::new(&teaches)?, what)?)?;
    }

    let outbound = ExpandOptions::default().direction(Direction::Outbound).depth(1);
    let traversal = graph.expand(&alice, &outbound)?;
    println!("{} studies:", alice.get("name").as_str().unwrap_or("?"));
    for relation in traversal.root_relations("studies") {
        if let Some(subject) = relation.next() {
            println!(
                "  {} ({})",
                subject.get("title").as_str().unwrap_or("?"),
                relation.edge().get("grade").as_str().unwrap_or("-")
            );
        }
    }

    let classmates = graph.expand(&alice, &ExpandOptions::default().depth(2))?;
    println!("within two hops of {}:", alice.get("name").as_str().unwrap_or("?"));
    for vertex in classmates.vertices() {
        println!("  {vertex}");
    }

    let seniors = db.query(&student).filter("age > @min", false).bind("min", 22).all()?;
    println!("students over 22: {}", seniors.len());
    Ok(())
}
