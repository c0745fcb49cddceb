//! Change tracking, write filtering, validation and cascading saves against
//! the in-memory backend.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rstest::rstest;
use strata_orm::memory::{MemoryDatabase, Operation};
use strata_orm::types::DateTime;
use strata_orm::{
    Criteria, Entity, EntityError, EntityOptions, FieldDecl, IntoRow, Model, PersistenceError, Row,
    TypeTag, ValidationError, Validator, Value,
};

struct User;

impl Model for User {
    fn name() -> &'static str {
        "user"
    }

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("name", TypeTag::String),
            FieldDecl::new("age", TypeTag::Int),
            FieldDecl::new("role", TypeTag::String),
            FieldDecl::new("legacy", TypeTag::String),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::table("users")
            .readonly(["role"])
            .disuse(["legacy"])
            .without_timestamps()
    }
}

struct Profile;

impl Model for Profile {
    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("owner_id", TypeTag::Int),
            FieldDecl::new("bio", TypeTag::String),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::table("profiles").without_timestamps()
    }
}

struct Owner;

impl Model for Owner {
    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("name", TypeTag::String),
            FieldDecl::new("profile", TypeTag::entity::<Profile>()),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::table("owners")
            .relation_key("profile", "owner_id")
            .without_timestamps()
    }
}

struct Host;

impl Model for Host {
    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("name", TypeTag::String),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::table("hosts").without_timestamps()
    }
}

struct Draft;

impl Model for Draft {
    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("body", TypeTag::String),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::virtual_source()
    }
}

struct Report;

impl Model for Report {
    fn options() -> EntityOptions {
        EntityOptions::view()
    }
}

struct Stamped;

impl Model for Stamped {
    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("id", TypeTag::Int),
            FieldDecl::new("title", TypeTag::String),
            FieldDecl::new("create_time", TypeTag::DateTime),
            FieldDecl::new("update_time", TypeTag::DateTime),
        ]
    }

    fn options() -> EntityOptions {
        EntityOptions::table("stamped")
    }
}

fn owner(memory: &MemoryDatabase) -> Entity {
    Entity::new::<Owner>(
        memory.database(),
        [("name", "ann"), ("profile__bio", "hi")],
    )
}

fn tables(memory: &MemoryDatabase) -> Vec<String> {
    memory
        .operations()
        .iter()
        .map(|op| op.table().to_string())
        .collect()
}

fn only_save(memory: &MemoryDatabase) -> strata_orm::RowWrite {
    match memory.operations().as_slice() {
        [Operation::Save { write, .. }] => write.clone(),
        other => panic!("expected a single save, got {other:?}"),
    }
}

#[test]
fn unchanged_entity_writes_nothing() {
    let memory = MemoryDatabase::new();
    memory.insert_row(
        "users",
        [("id", Value::Int(1)), ("name", Value::from("a")), ("age", Value::Int(3))].into_row(),
    );
    let mut user = Entity::new::<User>(
        memory.database(),
        [("id", Value::Int(1)), ("name", Value::from("a")), ("age", Value::Int(3))],
    );

    assert!(!user.save().unwrap());
    assert!(memory.operations().is_empty());

    user.set("age", 4);
    assert!(user.save().unwrap());
    let write = only_save(&memory);
    assert!(write.is_update());
    assert_eq!(write.row, [("age", 4)].into_row());
    assert_eq!(memory.rows("users")[0].get("age"), Some(&Value::Int(4)));
}

#[test]
fn fields_missing_from_origin_are_written_on_update() {
    let memory = MemoryDatabase::new();
    memory.insert_row(
        "users",
        [("id", Value::Int(1)), ("name", Value::from("a"))].into_row(),
    );
    let mut user = Entity::new::<User>(
        memory.database(),
        [("id", Value::Int(1)), ("name", Value::from("a"))],
    );
    assert_eq!(user.origin_of("age"), None);

    user.set("age", 7);
    assert!(user.save().unwrap());
    let write = only_save(&memory);
    assert!(write.is_update());
    assert_eq!(write.row, [("age", 7)].into_row());
}

#[rstest]
#[case::default_allow(&[], vec!["name", "age"])]
#[case::explicit_allow(&["name", "role", "legacy"], vec!["name"])]
fn writable_fields_exclude_readonly_and_disused(
    #[case] allow: &[&str],
    #[case] written: Vec<&str>,
) {
    let memory = MemoryDatabase::new();
    let mut user = Entity::new::<User>(
        memory.database(),
        [
            ("name", Value::from("a")),
            ("age", Value::Int(5)),
            ("role", Value::from("admin")),
            ("legacy", Value::from("x")),
        ],
    );
    assert!(!user.isset("legacy"));

    user.set("legacy", "y");
    if !allow.is_empty() {
        user.allow_field(allow.iter().copied());
    }
    assert!(user.save().unwrap());

    let write = only_save(&memory);
    let keys: Vec<&str> = write.row.keys().map(String::as_str).collect();
    assert_eq!(keys, written);
    assert!(!write.allow.iter().any(|f| f == "role" || f == "legacy"));
}

#[test]
fn validation_failure_blocks_the_write() {
    let validator: Arc<dyn Validator> = Arc::new(|data: &Row, _allow: &[String]| {
        if data.get("name").is_some_and(|name| !name.is_null()) {
            Ok(())
        } else {
            Err(ValidationError::single("name is required"))
        }
    });
    let memory = MemoryDatabase::new().with_validator("user", validator);

    let mut user = Entity::new::<User>(memory.database(), [("age", 3)]);
    let err = user.save().unwrap_err();
    match err {
        EntityError::Validation(e) => assert_eq!(e.errors, vec!["name is required".to_string()]),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(memory.operations().is_empty());

    assert!(user.save_with([("name", "bo")]).unwrap());
    assert_eq!(tables(&memory), vec!["users"]);
}

#[test]
fn persistence_failures_surface_as_errors() {
    let memory = MemoryDatabase::new();
    memory.fail_table("users");
    let mut user = Entity::new::<User>(memory.database(), [("name", "a")]);
    assert!(matches!(
        user.save(),
        Err(EntityError::Persistence(PersistenceError::Query(_)))
    ));
}

#[test]
fn virtual_entities_never_reach_persistence() {
    let memory = MemoryDatabase::new();
    let db = memory.database();
    let mut draft = Entity::new::<Draft>(Arc::clone(&db), [("id", Value::Int(1)), ("body", Value::from("x"))]);

    assert!(draft.is_virtual());
    assert!(draft.save().unwrap());
    assert!(draft.save_with([("body", "y")]).unwrap());
    assert_eq!(draft.data().get("body"), Some(&Value::from("y")));
    assert!(draft.delete().unwrap());
    assert!(Entity::destroy::<Draft>(db, &Criteria::key(1), false).unwrap());
    assert!(memory.operations().is_empty());
}

#[test]
fn views_keep_any_column_and_never_write() {
    let memory = MemoryDatabase::new();
    let data = [("region", Value::from("north")), ("total", Value::Int(12))].into_row();
    let mut report = Entity::new::<Report>(memory.database(), data.clone());

    assert!(report.is_view());
    assert_eq!(report.data(), data);
    assert_eq!(report.key(), &Value::Null);
    assert!(report.save().unwrap());
    assert!(report.delete().unwrap());
    assert!(memory.operations().is_empty());
}

#[test]
fn together_relations_save_after_owner_with_foreign_key() {
    let memory = MemoryDatabase::new();
    let mut owner = owner(&memory);
    owner.together(["profile"]);

    assert!(owner.save().unwrap());
    assert_eq!(tables(&memory), vec!["owners", "profiles"]);

    let ops = memory.operations();
    let Operation::Save { write, .. } = &ops[1] else {
        panic!("expected relation save, got {:?}", ops[1]);
    };
    assert_eq!(write.row.get("owner_id"), Some(&Value::Int(1)));
    assert_eq!(write.row.get("bio"), Some(&Value::from("hi")));

    let data = owner.data();
    let profile = data.get("profile").and_then(Value::as_entity).unwrap();
    assert_eq!(profile.key(), &Value::Int(1));
}

#[test]
fn undeclared_relation_keeps_its_key_across_saves() {
    let memory = MemoryDatabase::new();
    let mut host = Entity::new::<Host>(memory.database(), [("name", "a")]);
    host.set(
        "profile",
        Entity::new::<Profile>(memory.database(), [("bio", "hi")]),
    );
    host.together(["profile"]);

    assert!(host.save().unwrap());
    let data = host.data();
    let profile = data.get("profile").and_then(Value::as_entity).unwrap();
    assert_eq!(profile.key(), &Value::Int(1));

    host.set("name", "b");
    assert!(host.save().unwrap());
    assert_eq!(memory.rows("hosts").len(), 1);
    assert_eq!(memory.rows("profiles").len(), 1);
}

#[test]
fn relations_outside_together_are_left_alone() {
    let memory = MemoryDatabase::new();
    let mut owner = owner(&memory);
    assert!(owner.save().unwrap());
    assert_eq!(tables(&memory), vec!["owners"]);
}

#[test]
fn failing_relation_save_does_not_fail_owner() {
    let memory = MemoryDatabase::new();
    memory.fail_table("profiles");
    let mut owner = owner(&memory);
    owner.together(["profile"]);

    assert!(owner.save().unwrap());
    assert_eq!(tables(&memory), vec!["owners"]);
    assert_eq!(memory.rows("owners").len(), 1);
}

#[test]
fn delete_cascades_to_together_relations() {
    let memory = MemoryDatabase::new();
    let mut owner = owner(&memory);
    owner.together(["profile"]);
    assert!(owner.save().unwrap());
    memory.clear_operations();

    assert!(owner.delete().unwrap());
    assert_eq!(tables(&memory), vec!["owners", "profiles"]);
    assert!(memory.rows("owners").is_empty());
    assert!(memory.rows("profiles").is_empty());
}

#[test]
fn timestamps_follow_insert_and_update() {
    let memory = MemoryDatabase::new();
    let mut entry = Entity::create::<Stamped>(memory.database(), [("title", "a")], &[], false).unwrap();

    let write = only_save(&memory);
    for field in ["create_time", "update_time"] {
        assert!(
            matches!(write.row.get(field), Some(Value::Text(s)) if s.len() == 19),
            "{field} not stamped: {:?}",
            write.row
        );
        assert!(write.allow.iter().any(|f| f == field));
    }
    assert!(entry.data().get("create_time").and_then(Value::as_rich::<DateTime>).is_some());

    memory.clear_operations();
    entry.set("title", "b");
    assert!(entry.save().unwrap());
    let write = only_save(&memory);
    assert!(write.row.contains_key("update_time"));
    assert!(!write.row.contains_key("create_time"));
}
