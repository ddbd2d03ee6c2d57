use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::{EntityKey, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    pub fields: FxHashMap<String, Value>,
}

impl Entity {
    pub fn new(key: impl Into<EntityKey>) -> Self {
        Self {
            key: key.into(),
            fields: FxHashMap::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Overwrite the given fields, keeping every other field as it was.
    /// Returns true if any stored value changed.
    pub fn merge(&mut self, fields: impl IntoIterator<Item = (String, Value)>) -> bool {
        let mut changed = false;
        for (name, value) in fields {
            match self.fields.get(&name) {
                Some(existing) if *existing == value => {}
                _ => {
                    self.fields.insert(name, value);
                    changed = true;
                }
            }
        }
        changed
    }
}
