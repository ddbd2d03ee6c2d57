use ahash::AHashMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{EntityKey, Error, Result, Value};

/// Represents a complete dump of the normalized store at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: AHashMap<EntityKey, AHashMap<String, Value>>,
}

impl Snapshot {
    /// Convert from FxHashMap-based store data to AHashMap for serialization
    pub fn from_fx_hashmaps(entities: FxHashMap<EntityKey, FxHashMap<String, Value>>) -> Self {
        let entities = entities
            .into_iter()
            .map(|(key, fields)| (key, fields.into_iter().collect()))
            .collect();

        Self { entities }
    }

    /// Convert to FxHashMap-based store data from AHashMap serialization
    pub fn to_fx_hashmaps(self) -> FxHashMap<EntityKey, FxHashMap<String, Value>> {
        self.entities
            .into_iter()
            .map(|(key, fields)| (key, fields.into_iter().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, key: &EntityKey, field: &str) -> Option<&Value> {
        self.entities.get(key).and_then(|fields| fields.get(field))
    }

    /// Render as a JSON object keyed by entity key, with references written
    /// as `{"__ref": "<key>"}`
    pub fn to_json(&self) -> JsonValue {
        let mut keys: Vec<&EntityKey> = self.entities.keys().collect();
        keys.sort();

        let mut root = serde_json::Map::new();
        for key in keys {
            let fields = &self.entities[key];
            let entity = fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            root.insert(key.to_string(), JsonValue::Object(entity));
        }
        JsonValue::Object(root)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let root = json.as_object().ok_or_else(|| {
            Error::Serialization("snapshot root must be a JSON object".to_string())
        })?;

        let mut entities = AHashMap::new();
        for (key, entity) in root {
            let fields = entity.as_object().ok_or_else(|| {
                Error::Serialization(format!("entity '{}' must be a JSON object", key))
            })?;
            entities.insert(
                EntityKey::new(key.as_str()),
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from_json(value)))
                    .collect(),
            );
        }

        Ok(Self { entities })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(json)?;
        Self::from_json(&json)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
