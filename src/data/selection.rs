use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::Value;

/// Variable name to value bindings of a query
pub type Variables = BTreeMap<String, Value>;

/// Argument passed to a field, either inline or through a variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Argument {
    Literal(Value),
    Variable(String),
    List(Vec<Argument>),
    Object(BTreeMap<String, Argument>),
}

impl Argument {
    pub fn literal(value: impl Into<Value>) -> Self {
        Argument::Literal(value.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Argument::Variable(name.into())
    }

    /// Substitute variables. `None` means the argument is bound to a variable
    /// that has no value, in which case the argument is left out entirely.
    pub fn resolve(&self, variables: &Variables) -> Option<Value> {
        match self {
            Argument::Literal(value) => Some(value.clone()),
            Argument::Variable(name) => variables.get(name).cloned(),
            Argument::List(items) => Some(Value::List(
                items
                    .iter()
                    .map(|item| item.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Argument::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(name, arg)| arg.resolve(variables).map(|v| (name.clone(), v)))
                    .collect(),
            )),
        }
    }
}

/// One field of a selection set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: BTreeMap<String, Argument>,
    pub selection: Option<Selection>,
    /// Type name to normalize objects under when the data carries none
    pub type_name: Option<String>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: BTreeMap::new(),
            selection: None,
            type_name: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.arguments.insert(name.into(), argument);
        self
    }

    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Key the field appears under in data and results
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Key the field is stored under on its entity.
    ///
    /// Fields with arguments get the resolved arguments appended as JSON with
    /// sorted keys, e.g. `person({"id":2})`.
    pub fn store_name(&self, variables: &Variables) -> String {
        let arguments: serde_json::Map<String, JsonValue> = self
            .arguments
            .iter()
            .filter_map(|(name, arg)| arg.resolve(variables).map(|v| (name.clone(), v.to_json())))
            .collect();

        if arguments.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, JsonValue::Object(arguments))
        }
    }
}

/// An ordered set of fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub fields: Vec<FieldSelection>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selection of scalar fields only
    pub fn leaves(names: &[&str]) -> Self {
        Self {
            fields: names.iter().map(|name| FieldSelection::new(*name)).collect(),
        }
    }

    pub fn field(mut self, field: FieldSelection) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Shape plus variables. Two descriptors are equivalent iff both are deeply equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    selection: Arc<Selection>,
    variables: Variables,
}

impl QueryDescriptor {
    pub fn new(selection: impl Into<Arc<Selection>>) -> Self {
        Self {
            selection: selection.into(),
            variables: Variables::new(),
        }
    }

    pub fn with_variables(selection: impl Into<Arc<Selection>>, variables: Variables) -> Self {
        Self {
            selection: selection.into(),
            variables,
        }
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}
