use std::cell::{Cell, RefCell};
use std::rc::Rc;

use qcache_rs::{sobj, Client, Document, FetchPolicy, FnLink, Operation, Value, Variables};

const ALL_PEOPLE: &str = r#"
  query AllPeople {
    people {
      id
      name
    }
  }
"#;

const SINGLE_PERSON: &str = r#"
  query SinglePerson($id: ID!) {
    person(id: $id) {
      id
      name
    }
  }
"#;

const ADD_PERSON: &str = r#"
  mutation AddPerson($name: String) {
    addPerson(name: $name) {
      id
      name
    }
  }
"#;

fn person(id: i64, name: &str) -> Value {
    sobj! { "__typename" => "Person", "id" => id, "name" => name }
}

fn id_variables(id: i64) -> Variables {
    Variables::from([("id".to_string(), Value::from(id))])
}

fn print_people(data: &Value) {
    println!("Names:");
    for person in data.get("people").and_then(Value::as_list).into_iter().flatten() {
        println!("  - {}", person.get("name").and_then(Value::as_str).unwrap_or("?"));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A small in-memory server standing in for the network
    let people = Rc::new(RefCell::new(vec![
        (1, "John Smith".to_string()),
        (2, "Sara Smith".to_string()),
        (3, "Budd Deey".to_string()),
    ]));
    let server = people.clone();
    let link = FnLink(move |operation: &Operation| -> qcache_rs::Result<Value> {
        match operation.name.as_deref() {
            Some("AllPeople") => Ok(sobj! {
                "people" => Value::List(server.borrow().iter().map(|(id, name)| person(*id, name)).collect())
            }),
            Some("SinglePerson") => {
                let id = operation.variables().get("id").and_then(Value::as_int);
                let found = server
                    .borrow()
                    .iter()
                    .find(|(person_id, _)| Some(*person_id) == id)
                    .map(|(id, name)| person(*id, name))
                    .unwrap_or(Value::Null);
                Ok(sobj! { "person" => found })
            }
            Some("AddPerson") => {
                let name = operation
                    .variables()
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let mut people = server.borrow_mut();
                let id = people.len() as i64 + 1;
                people.push((id, name.clone()));
                Ok(sobj! { "addPerson" => person(id, &name) })
            }
            other => Err(qcache_rs::Error::Link(format!("Unknown operation {:?}", other))),
        }
    });

    let client = Client::new(Default::default(), link);
    let all_people = Document::parse(ALL_PEOPLE)?;
    let single_person = Document::parse(SINGLE_PERSON)?;
    let add_person = Document::parse(ADD_PERSON)?;

    let people_watch = client.watch_query(
        &all_people,
        Variables::new(),
        FetchPolicy::CacheFirst,
        |_, data| {
            print_people(data);
            Ok(())
        },
    )?;

    let completed_count = Rc::new(Cell::new(0));
    let count = completed_count.clone();
    let person_watch = client.watch_query(
        &single_person,
        id_variables(2),
        FetchPolicy::CacheFirst,
        move |_, _| {
            count.set(count.get() + 1);
            println!("onCompleted count: {}", count.get());
            Ok(())
        },
    )?;

    // "Update person's name via writeQuery", clicked three times
    for _ in 0..3 {
        let Some(mut result) = client.read_query(&single_person, id_variables(2))? else {
            break;
        };
        if let Some(person) = result
            .as_object_mut()
            .and_then(|root| root.get_mut("person"))
            .and_then(Value::as_object_mut)
        {
            let name = person.get("name").and_then(Value::as_str).unwrap_or_default();
            let renamed = format!("{}1", name);
            person.insert("name".to_string(), Value::from(renamed));
        }
        client.write_query(&single_person, id_variables(2), &result)?;
    }

    // "Add person"
    let people_query = all_people.descriptor(Variables::new())?;
    client.mutate(
        &add_person,
        Variables::from([("name".to_string(), Value::from("Haskell Curry"))]),
        |cache, data| {
            let Some(mut people_result) = cache.read(&people_query) else {
                return Ok(());
            };
            if let (Some(Value::List(people)), Some(added)) = (
                people_result.as_object_mut().and_then(|root| root.get_mut("people")),
                data.get("addPerson"),
            ) {
                people.push(added.clone());
            }
            cache.write(&people_query, &people_result)
        },
    )?;

    println!("Final onCompleted count: {}", completed_count.get());
    println!("Cache contents: {}", client.cache().extract().to_json_string()?);

    person_watch.stop();
    people_watch.stop();
    Ok(())
}
