mod notifications;
mod query_index;

use crate::*;

/// `person(id: <id>) { id name }`, normalized as `Person`
pub(crate) fn person_query(id: i64) -> QueryDescriptor {
    QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("person")
                .arg("id", Argument::variable("id"))
                .of_type("Person")
                .select(Selection::leaves(&["id", "name"])),
        ),
    )
    .variable("id", id)
}

pub(crate) fn person_data(id: i64, name: &str) -> Value {
    sobj! { "person" => sobj! { "id" => id, "name" => name } }
}

/// `people { id name }`, normalized as `Person`
pub(crate) fn people_query() -> QueryDescriptor {
    QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("people")
                .of_type("Person")
                .select(Selection::leaves(&["id", "name"])),
        ),
    )
}

pub(crate) fn people_data(people: &[(i64, &str)]) -> Value {
    sobj! {
        "people" => Value::List(
            people
                .iter()
                .map(|(id, name)| sobj! { "id" => *id, "name" => *name })
                .collect(),
        )
    }
}

pub(crate) fn name_of(result: &Value, root: &str) -> Option<String> {
    result
        .get(root)
        .and_then(|person| person.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
