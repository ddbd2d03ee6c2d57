use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::{ArcString, CacheConfig, Fields, Value};

/// Key of the entity holding root query fields
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Key of the entity holding root mutation fields
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";

const KEY_DELIMITER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(ArcString);

impl EntityKey {
    pub fn new(key: impl Into<ArcString>) -> Self {
        EntityKey(key.into())
    }

    pub fn root_query() -> Self {
        EntityKey::new(ROOT_QUERY)
    }

    pub fn root_mutation() -> Self {
        EntityKey::new(ROOT_MUTATION)
    }

    /// Build the key of an entity from its type name and identifier value.
    ///
    /// String identifiers are used verbatim, anything else is rendered as JSON,
    /// so `("Person", 2)` and `("Person", "2")` both give `Person:2`.
    pub fn compute(type_name: &str, id: &Value) -> Self {
        match id {
            Value::String(s) => EntityKey::new(format!("{}{}{}", type_name, KEY_DELIMITER, s)),
            other => EntityKey::new(format!("{}{}{}", type_name, KEY_DELIMITER, other.to_json())),
        }
    }

    /// Work out the key of a data object, if it is meant to be its own entity.
    ///
    /// Objects without a known type name, or without their identifier field(s),
    /// are not identifiable and get stored inline on their parent.
    pub fn identify(type_name: Option<&str>, object: &Fields, config: &CacheConfig) -> Option<Self> {
        let type_name = type_name?;

        match config.key_fields.get(type_name) {
            Some(key_fields) => {
                let mut parts = serde_json::Map::new();
                for field in key_fields {
                    let value = object.get(field).filter(|v| !v.is_null())?;
                    parts.insert(field.clone(), value.to_json());
                }
                Some(EntityKey::new(format!(
                    "{}{}{}",
                    type_name,
                    KEY_DELIMITER,
                    JsonValue::Object(parts)
                )))
            }
            None => object
                .get(&config.id_field)
                .filter(|id| !id.is_null())
                .map(|id| EntityKey::compute(type_name, id)),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The type name part of the key, if the key was built by `compute`
    pub fn type_name(&self) -> Option<&str> {
        self.as_str().split_once(KEY_DELIMITER).map(|(type_name, _)| type_name)
    }

    pub fn is_root(&self) -> bool {
        matches!(self.as_str(), ROOT_QUERY | ROOT_MUTATION)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        EntityKey::new(key)
    }
}

impl From<String> for EntityKey {
    fn from(key: String) -> Self {
        EntityKey::new(key)
    }
}
