use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::EntityKey;

/// Key under which a reference is spelled out in JSON form
pub const REF_KEY: &str = "__ref";

/// Ordered field map used by object values
pub type Fields = BTreeMap<String, Value>;

/// Wrapper around Arc<str> that implements Serialize/Deserialize
#[derive(Debug, Clone)]
pub struct ArcString(Arc<str>);

impl ArcString {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        ArcString(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> Arc<str> {
        self.0
    }
}

impl PartialEq for ArcString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ArcString {}

impl PartialOrd for ArcString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArcString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl std::fmt::Display for ArcString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArcString {
    fn from(s: String) -> Self {
        ArcString::new(s)
    }
}

impl From<&str> for ArcString {
    fn from(s: &str) -> Self {
        ArcString::new(s)
    }
}

impl Serialize for ArcString {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArcString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ArcString::new(s))
    }
}

impl Hash for ArcString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

/// A node of a query result or of a normalized entity.
///
/// `Reference` only ever appears inside the normalized store; results handed
/// back by a read are fully denormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(ArcString),
    Reference(EntityKey),
    List(Vec<Value>),
    Object(Fields),
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => {
                b.hash(state);
            }
            Value::Int(i) => {
                i.hash(state);
            }
            Value::Float(f) => {
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                s.hash(state);
            }
            Value::Reference(key) => {
                key.hash(state);
            }
            Value::List(items) => {
                items.hash(state);
            }
            Value::Object(fields) => {
                fields.hash(state);
            }
        }
    }
}

impl Eq for Value {}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_reference(&self) -> Option<&EntityKey> {
        if let Value::Reference(key) = self {
            Some(key)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        if let Value::Object(fields) = self {
            Some(fields)
        } else {
            None
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Fields> {
        if let Value::Object(fields) = self {
            Some(fields)
        } else {
            None
        }
    }

    /// Look up a field of an object value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(field))
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Reference(_) => "reference",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    /// Convert to JSON. References are written as `{"__ref": "<key>"}`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.to_string()),
            Value::Reference(key) => {
                let mut map = serde_json::Map::new();
                map.insert(REF_KEY.to_string(), JsonValue::String(key.to_string()));
                JsonValue::Object(map)
            }
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from JSON. An object whose only key is `__ref` becomes a reference.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            JsonValue::String(s) => Value::String(ArcString::new(s.as_str())),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some(JsonValue::String(key)) = map.get(REF_KEY) {
                        return Value::Reference(EntityKey::new(key.as_str()));
                    }
                }
                Value::Object(
                    map.iter()
                        .map(|(name, value)| (name.clone(), Value::from_json(value)))
                        .collect(),
                )
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(ArcString::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(ArcString::new(s))
    }
}

impl From<ArcString> for Value {
    fn from(s: ArcString) -> Self {
        Value::String(s)
    }
}

impl From<EntityKey> for Value {
    fn from(key: EntityKey) -> Self {
        Value::Reference(key)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Object(fields)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
