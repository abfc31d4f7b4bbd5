use docdir_core::{
    open_db_in_memory, DirectoryConfig, DirectoryError, DirectoryHooks, EnsureIndexes, Fields,
    ModelBinding, ModelRegistry, Query, RecordDirectory, RemoveOptions, SortSpec,
    SqliteDocumentStore, UpdateOptions,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        other => panic!("fixture must be an object: {other}"),
    }
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn create_merges_defaults_without_touching_store() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let record = foos.create(fields(json!({ "bar": "baz", "n": 3 }))).unwrap();

    assert_eq!(record.id(), None);
    assert!(record.serial().is_some());
    assert_eq!(record.get("bar"), Some(&json!("baz")));
    assert_eq!(record.get("n"), Some(&json!(3)));
    assert!(record.get("creationDate").and_then(Value::as_i64).is_some());
    assert_eq!(record.fields().len(), 3);
    assert_eq!(record.desc(), "{Anonymous FooModel}");
    assert_eq!(foos.count(&Query::all()).unwrap(), 0);
}

#[test]
fn create_without_defaults_keeps_exact_fields() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let config = DirectoryConfig {
        add_creation_timestamp: false,
        use_serial: false,
        ..DirectoryConfig::default()
    };
    let foos = RecordDirectory::new(&store, "FooDirectory", config);

    let input = fields(json!({ "bar": "baz" }));
    let record = foos.create(input.clone()).unwrap();

    assert_eq!(record.fields(), &input);
    assert_eq!(record.serial(), None);
}

#[test]
fn create_rejects_reserved_and_malformed_fields() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    assert!(matches!(
        foos.create(fields(json!({ "a.b": 1 }))),
        Err(DirectoryError::InvalidField(_))
    ));
    assert!(matches!(
        foos.create(fields(json!({ "serial": 12 }))),
        Err(DirectoryError::InvalidField(_))
    ));
    assert!(matches!(
        foos.create(fields(json!({ "_id": "nope" }))),
        Err(DirectoryError::InvalidIdentifier(_))
    ));
}

#[test]
fn save_then_reload_round_trips_fields() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let saved = foos
        .create_and_save(fields(json!({ "bar": "baz", "tags": ["a", "b"] })))
        .unwrap();
    let id = saved.id().unwrap();

    let reloaded = foos.reload(&saved).unwrap().unwrap();
    assert_eq!(reloaded.id(), Some(id));
    assert_eq!(reloaded, saved);
    assert_eq!(reloaded.to_string(), format!("{{FooModel {id}}}"));

    let by_text = foos.find_by_id(id.to_string().as_str()).unwrap().unwrap();
    assert_eq!(by_text.fields(), saved.fields());
}

#[test]
fn save_replaces_whole_body_of_existing_record() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let mut record = foos
        .create_and_save(fields(json!({ "bar": "baz", "gone": true })))
        .unwrap();
    record.set("bar", "qux").unwrap();
    record.remove("gone");
    let record = foos.save(record).unwrap();

    let reloaded = foos.reload(&record).unwrap().unwrap();
    assert_eq!(reloaded.get("bar"), Some(&json!("qux")));
    assert_eq!(reloaded.get("gone"), None);
    assert_eq!(foos.count(&Query::all()).unwrap(), 1);
}

#[test]
fn in_memory_edits_stay_local_until_saved() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let mut record = foos.create_and_save(fields(json!({ "bar": "baz" }))).unwrap();
    record.set("bar", "local").unwrap();

    let stored = foos.reload(&record).unwrap().unwrap();
    assert_eq!(stored.get("bar"), Some(&json!("baz")));
}

#[test]
fn reload_of_missing_document_is_none() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let record = foos.create_and_save(fields(json!({ "bar": 1 }))).unwrap();
    assert_eq!(foos.delete(&record, &RemoveOptions::default()).unwrap(), 1);
    assert!(foos.reload(&record).unwrap().is_none());
}

#[test]
fn delete_all_empties_collection_and_is_idempotent() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());
    let bars = RecordDirectory::new(&store, "BarDirectory", DirectoryConfig::default());

    for n in 0..5 {
        foos.create_and_save(fields(json!({ "n": n }))).unwrap();
    }
    bars.create_and_save(fields(json!({ "n": 0 }))).unwrap();

    assert_eq!(foos.delete_all().unwrap(), 5);
    assert_eq!(foos.count(&Query::all()).unwrap(), 0);
    assert_eq!(foos.delete_all().unwrap(), 0);
    assert_eq!(foos.count(&Query::all()).unwrap(), 0);
    assert_eq!(bars.count(&Query::all()).unwrap(), 1);
}

#[test]
fn find_with_limit_yields_exactly_limit_records_from_independent_cursors() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    for n in 0..150 {
        foos.create_and_save(fields(json!({ "n": n, "kind": "item" })))
            .unwrap();
    }

    let query = Query::all().eq("kind", "item");
    let mut first = foos.find(&query, Some(SortSpec::new().asc("n")), Some(70)).unwrap();
    assert_eq!(first.total_count().unwrap(), 70);

    let head = first.by_ref().take(3).collect::<Result<Vec<_>, _>>().unwrap();
    let second = foos
        .find(&query, Some(SortSpec::new().asc("n")), Some(70))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let rest = first.collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(head.len() + rest.len(), 70);
    assert_eq!(second.len(), 70);
    assert_eq!(head[0].get("n"), Some(&json!(0)));
    assert_eq!(second[0].get("n"), Some(&json!(0)));
    assert_eq!(rest.last().unwrap().get("n"), Some(&json!(69)));
}

#[test]
fn find_sorts_and_filters_by_exact_value() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    foos.create_and_save(fields(json!({ "n": 1, "color": "red" })))
        .unwrap();
    foos.create_and_save(fields(json!({ "n": 2, "color": "blue" })))
        .unwrap();
    foos.create_and_save(fields(json!({ "n": 3, "color": "red" })))
        .unwrap();
    foos.create_and_save(fields(json!({ "n": "3" }))).unwrap();

    let reds = foos
        .find(
            &Query::all().eq("color", "red"),
            Some(SortSpec::new().desc("n")),
            None,
        )
        .unwrap()
        .map(|record| record.unwrap().get("n").cloned())
        .collect::<Vec<_>>();
    assert_eq!(reds, vec![Some(json!(3)), Some(json!(1))]);

    assert_eq!(foos.count(&Query::all().eq("n", 3)).unwrap(), 1);
    assert_eq!(foos.count(&Query::all().eq("color", Value::Null)).unwrap(), 1);

    let first = foos.find_one(&Query::all().eq("color", "blue")).unwrap();
    assert_eq!(first.unwrap().get("n"), Some(&json!(2)));
    assert!(foos
        .find_one(&Query::all().eq("color", "green"))
        .unwrap()
        .is_none());
}

#[test]
fn update_sets_fields_and_refreshes_serial() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let record = foos
        .create_and_save(fields(json!({ "bar": "baz", "keep": 1 })))
        .unwrap();
    let matched = foos
        .update(&record, fields(json!({ "bar": "qux" })), &UpdateOptions::default())
        .unwrap();
    assert_eq!(matched, 1);

    let reloaded = foos.reload(&record).unwrap().unwrap();
    assert_eq!(reloaded.get("bar"), Some(&json!("qux")));
    assert_eq!(reloaded.get("keep"), Some(&json!(1)));
    assert_ne!(reloaded.serial(), record.serial());
}

#[test]
fn update_where_targets_one_or_many() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    for n in 0..3 {
        foos.create_and_save(fields(json!({ "n": n, "group": "g" })))
            .unwrap();
    }
    let query = Query::all().eq("group", "g");

    let single = foos
        .update_where(fields(json!({ "flag": 1 })), &query, &UpdateOptions::default())
        .unwrap();
    assert_eq!(single, 1);
    assert_eq!(foos.count(&Query::all().eq("flag", 1)).unwrap(), 1);

    let multi = foos
        .update_where(fields(json!({ "flag": 2 })), &query, &UpdateOptions::multi())
        .unwrap();
    assert_eq!(multi, 3);
    assert_eq!(foos.count(&Query::all().eq("flag", 2)).unwrap(), 3);

    let none = foos
        .update_where(
            fields(json!({ "flag": 3 })),
            &Query::all().eq("group", "missing"),
            &UpdateOptions::multi(),
        )
        .unwrap();
    assert_eq!(none, 0);
}

#[test]
fn delete_just_one_removes_single_match() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let record = foos.create_and_save(fields(json!({ "n": 1 }))).unwrap();
    foos.create_and_save(fields(json!({ "n": 2 }))).unwrap();

    let removed = foos
        .delete(record.id().unwrap(), &RemoveOptions { just_one: true })
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(foos.count(&Query::all()).unwrap(), 1);
}

#[test]
fn records_from_other_collections_are_rejected() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());
    let bars = RecordDirectory::new(&store, "BarDirectory", DirectoryConfig::default());

    let foo = foos.create_and_save(fields(json!({ "n": 1 }))).unwrap();

    assert!(matches!(
        bars.save(foo.clone()),
        Err(DirectoryError::DirectoryMismatch { expected, actual })
            if expected == "BarModel" && actual == "FooModel"
    ));
    assert!(matches!(
        bars.update(&foo, fields(json!({ "n": 2 })), &UpdateOptions::default()),
        Err(DirectoryError::DirectoryMismatch { .. })
    ));
    assert_eq!(bars.count(&Query::all()).unwrap(), 0);
}

#[test]
fn collection_and_model_follow_registry_and_config() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let mut registry = ModelRegistry::new();
    registry
        .register("PeopleDirectory", ModelBinding::new("PersonModel"))
        .unwrap();

    let people =
        RecordDirectory::with_registry(&store, &registry, "PeopleDirectory", Default::default());
    assert_eq!(people.collection(), "PersonModel");

    let config = DirectoryConfig::from_json(r#"{ "collectionName": "persons" }"#).unwrap();
    let persons = RecordDirectory::with_registry(&store, &registry, "PeopleDirectory", config);
    assert_eq!(persons.collection(), "persons");
    assert_eq!(persons.identity().model_name, "PersonModel");

    let person = persons.create_and_save(fields(json!({ "name": "ada" }))).unwrap();
    assert_eq!(person.collection(), "persons");
    assert_eq!(person.desc(), format!("{{PersonModel {}}}", person.id().unwrap()));
    assert_eq!(people.count(&Query::all()).unwrap(), 0);
}

struct StampHooks;

impl DirectoryHooks for StampHooks {
    fn on_create_or_update_pre(&self, mut fields: Fields) -> Fields {
        fields.insert("touched".to_string(), json!(true));
        fields
    }

    fn on_create_pre(&self, fields: Fields) -> Fields {
        let mut fields = self.on_create_or_update_pre(fields);
        fields.insert("created".to_string(), json!(true));
        fields
    }
}

#[test]
fn hooks_transform_create_and_update_fields() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos =
        RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default()).with_hooks(StampHooks);

    let record = foos.create(fields(json!({ "n": 1 }))).unwrap();
    assert_eq!(record.get("touched"), Some(&json!(true)));
    assert_eq!(record.get("created"), Some(&json!(true)));

    let plain = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());
    let saved = plain.create_and_save(fields(json!({ "n": 2 }))).unwrap();
    foos.update(&saved, fields(json!({ "n": 3 })), &UpdateOptions::default())
        .unwrap();

    let reloaded = plain.reload(&saved).unwrap().unwrap();
    assert_eq!(reloaded.get("touched"), Some(&json!(true)));
    assert_eq!(reloaded.get("created"), None);
}

#[test]
fn bring_up_to_date_creates_indexes_idempotently() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default())
        .with_hooks(EnsureIndexes::new(["serial", "email"]));

    foos.bring_up_to_date().unwrap();
    foos.bring_up_to_date().unwrap();

    assert_eq!(
        store.indexed_fields("FooModel").unwrap(),
        vec!["email".to_string(), "serial".to_string()]
    );
    assert!(store.indexed_fields("BarModel").unwrap().is_empty());

    let default_hooks = RecordDirectory::new(&store, "BarDirectory", DirectoryConfig::default());
    default_hooks.bring_up_to_date().unwrap();
}

#[test]
fn caller_supplied_id_survives_save() {
    let conn = setup();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let foos = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

    let id = uuid::Uuid::new_v4();
    let record = foos
        .create(fields(json!({ "_id": id.to_string(), "n": 1 })))
        .unwrap();
    assert_eq!(record.id(), Some(id));
    assert!(!record.fields().contains_key("_id"));

    let saved = foos.save(record).unwrap();
    assert_eq!(saved.id(), Some(id));
    assert_eq!(foos.find_by_id(id).unwrap().unwrap().get("n"), Some(&json!(1)));
}
