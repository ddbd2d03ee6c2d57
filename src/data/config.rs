use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::ROOT_QUERY;
use crate::Result;

/// Tunables for a cache instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Field holding the identifier of an entity
    pub id_field: String,
    /// Field holding the type name of an object in written data
    pub typename_field: String,
    /// Key of the entity that root query fields are stored on
    pub root_query_key: String,
    /// Maximum nesting of writes issued from inside subscriber callbacks
    pub max_dispatch_depth: usize,
    /// Per-type identifier fields, replacing `id_field` for that type
    pub key_fields: FxHashMap<String, Vec<String>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            typename_field: "__typename".to_string(),
            root_query_key: ROOT_QUERY.to_string(),
            max_dispatch_depth: 16,
            key_fields: FxHashMap::default(),
        }
    }
}

impl CacheConfig {
    /// Load a config from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_key_fields(mut self, type_name: impl Into<String>, fields: &[&str]) -> Self {
        self.key_fields.insert(
            type_name.into(),
            fields.iter().map(|field| field.to_string()).collect(),
        );
        self
    }

    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }
}
