use crate::data::query_index::{extract_entities, resolve};
use crate::test::{people_data, people_query, person_data, person_query};
use crate::*;

fn apply(store: &mut EntityStore, descriptor: &QueryDescriptor, data: &Value, config: &CacheConfig) -> Result<()> {
    for fragment in extract_entities(descriptor, data, config)? {
        store.put(fragment.key, fragment.fields);
    }
    Ok(())
}

#[test]
fn test_extract_splits_identified_objects() -> Result<()> {
    let config = CacheConfig::default();
    let fragments = extract_entities(&person_query(2), &person_data(2, "Bob"), &config)?;

    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].key, EntityKey::from("Person:2"));
    assert_eq!(fragments[1].key, EntityKey::root_query());
    assert_eq!(
        fragments[1].fields,
        vec![(
            r#"person({"id":2})"#.to_string(),
            Value::Reference(EntityKey::from("Person:2"))
        )]
    );
    Ok(())
}

#[test]
fn test_extract_keeps_unidentified_objects_inline() -> Result<()> {
    let config = CacheConfig::default();
    let descriptor = QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("settings").select(Selection::leaves(&["theme"])),
        ),
    );

    let fragments = extract_entities(&descriptor, &sobj! { "settings" => sobj! { "theme" => "dark" } }, &config)?;
    assert_eq!(fragments.len(), 1);
    assert_eq!(
        fragments[0].fields,
        vec![("settings".to_string(), sobj! { "theme" => "dark" })]
    );
    Ok(())
}

#[test]
fn test_extract_uses_typename_from_data() -> Result<()> {
    let config = CacheConfig::default();
    let descriptor = QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("me").select(Selection::leaves(&["__typename", "id"])),
        ),
    );

    let data = sobj! { "me" => sobj! { "__typename" => "User", "id" => "u1" } };
    let fragments = extract_entities(&descriptor, &data, &config)?;
    assert_eq!(fragments[0].key, EntityKey::from("User:u1"));
    Ok(())
}

#[test]
fn test_extract_normalizes_lists() -> Result<()> {
    let config = CacheConfig::default();
    let fragments = extract_entities(&people_query(), &people_data(&[(1, "Ann"), (2, "Bob")]), &config)?;

    assert_eq!(fragments.len(), 3);
    let root = fragments.last().unwrap();
    assert_eq!(
        root.fields[0].1,
        slist![EntityKey::from("Person:1"), EntityKey::from("Person:2")]
    );
    Ok(())
}

#[test]
fn test_extract_missing_field_is_shape_mismatch() {
    let config = CacheConfig::default();
    let data = sobj! { "person" => sobj! { "id" => 2 } };

    match extract_entities(&person_query(2), &data, &config) {
        Err(Error::ShapeMismatch { path, .. }) => assert_eq!(path, "person.name"),
        other => panic!("Expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn test_extract_scalar_for_object_is_shape_mismatch() {
    let config = CacheConfig::default();
    let data = sobj! { "person" => 42 };

    match extract_entities(&person_query(2), &data, &config) {
        Err(Error::ShapeMismatch { path, reason }) => {
            assert_eq!(path, "person");
            assert!(reason.contains("int"));
        }
        other => panic!("Expected ShapeMismatch, got {:?}", other),
    }

    assert!(matches!(
        extract_entities(&person_query(2), &Value::from("nope"), &config),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_resolve_round_trip() -> Result<()> {
    let config = CacheConfig::default();
    let mut store = EntityStore::new();
    apply(&mut store, &person_query(2), &person_data(2, "Bob"), &config)?;

    let resolution = resolve(&store, &person_query(2), &config);
    assert_eq!(resolution.result, Some(person_data(2, "Bob")));
    assert!(resolution.dependencies.contains(&EntityKey::root_query()));
    assert!(resolution.dependencies.contains(&EntityKey::from("Person:2")));
    Ok(())
}

#[test]
fn test_resolve_miss_records_missing_dependency() -> Result<()> {
    let config = CacheConfig::default();
    let mut store = EntityStore::new();

    let resolution = resolve(&store, &person_query(2), &config);
    assert!(resolution.is_miss());
    assert!(resolution.dependencies.contains(&EntityKey::root_query()));

    apply(&mut store, &person_query(2), &person_data(2, "Bob"), &config)?;
    store.evict(&EntityKey::from("Person:2"));

    let resolution = resolve(&store, &person_query(2), &config);
    assert!(resolution.is_miss());
    assert!(resolution.dependencies.contains(&EntityKey::from("Person:2")));

    // A different id was never written
    assert!(resolve(&store, &person_query(3), &config).is_miss());
    Ok(())
}

#[test]
fn test_resolve_missing_field_is_miss() -> Result<()> {
    let config = CacheConfig::default();
    let mut store = EntityStore::new();
    apply(&mut store, &person_query(2), &person_data(2, "Bob"), &config)?;

    let wider = QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("person")
                .arg("id", Argument::literal(2))
                .select(Selection::leaves(&["id", "name", "email"])),
        ),
    );
    assert!(resolve(&store, &wider, &config).is_miss());
    Ok(())
}

#[test]
fn test_aliases_share_storage() -> Result<()> {
    let config = CacheConfig::default();
    let mut store = EntityStore::new();
    apply(&mut store, &person_query(2), &person_data(2, "Bob"), &config)?;

    let aliased = QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("person")
                .alias("bob")
                .arg("id", Argument::literal(2))
                .select(Selection::new().field(FieldSelection::new("name").alias("displayName"))),
        ),
    );

    let result = resolve(&store, &aliased, &config).result.expect("aliased read should hit");
    assert_eq!(result, sobj! { "bob" => sobj! { "displayName" => "Bob" } });
    Ok(())
}

#[test]
fn test_store_name_with_arguments() {
    let field = FieldSelection::new("people")
        .arg("limit", Argument::literal(10))
        .arg("after", Argument::variable("cursor"));

    let mut variables = Variables::new();
    assert_eq!(field.store_name(&variables), r#"people({"limit":10})"#);

    variables.insert("cursor".to_string(), Value::from("abc"));
    assert_eq!(field.store_name(&variables), r#"people({"after":"abc","limit":10})"#);

    assert_eq!(FieldSelection::new("people").store_name(&variables), "people");
}

#[test]
fn test_leaf_object_holding_reference_is_miss() -> Result<()> {
    let config = CacheConfig::default();
    let descriptor = QueryDescriptor::new(Selection::leaves(&["settings"]));

    let mut store = EntityStore::new();
    store.put(
        EntityKey::root_query(),
        vec![("settings".to_string(), sobj! { "theme" => "dark", "tags" => slist!["a"] })],
    );
    assert_eq!(
        resolve(&store, &descriptor, &config).result,
        Some(sobj! { "settings" => sobj! { "theme" => "dark", "tags" => slist!["a"] } })
    );

    // A reference hidden in a scalar object, as loaded from a JSON snapshot
    let snapshot = Snapshot::from_json_str(
        r#"{ "ROOT_QUERY": { "settings": { "theme": "dark", "owner": { "__ref": "Person:1" } } } }"#,
    )?;
    let cache = Cache::new();
    cache.restore(snapshot)?;
    assert_eq!(cache.read(&descriptor), None);
    Ok(())
}
