use rustc_hash::{FxHashMap, FxHashSet};

use crate::data::{Entity, EntityKey, Snapshot, Value};

/// Flat mapping from entity key to entity, with dirty tracking for the
/// write transaction in progress.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: FxHashMap<EntityKey, Entity>,
    dirty: FxHashSet<EntityKey>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_key(type_name: &str, id: &Value) -> EntityKey {
        EntityKey::compute(type_name, id)
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> + '_ {
        self.entities.keys()
    }

    /// Merge fields into the entity at `key`, creating it if absent.
    ///
    /// The key is marked dirty only when the entity is created or one of its
    /// stored values actually changes.
    pub fn put(&mut self, key: EntityKey, fields: impl IntoIterator<Item = (String, Value)>) {
        let (changed, created) = match self.entities.get_mut(&key) {
            Some(entity) => (entity.merge(fields), false),
            None => {
                let mut entity = Entity::new(key.clone());
                entity.merge(fields);
                self.entities.insert(key.clone(), entity);
                (true, true)
            }
        };

        if changed {
            log::trace!(
                "{} entity {}",
                if created { "Created" } else { "Updated" },
                key
            );
            self.dirty.insert(key);
        }
    }

    /// Remove an entity. Returns false if it was not present.
    pub fn evict(&mut self, key: &EntityKey) -> bool {
        if self.entities.remove(key).is_some() {
            self.dirty.insert(key.clone());
            true
        } else {
            false
        }
    }

    /// Drain the keys touched since the last call
    pub fn take_dirty(&mut self) -> FxHashSet<EntityKey> {
        std::mem::take(&mut self.dirty)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.dirty.clear();
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::from_fx_hashmaps(
            self.entities
                .iter()
                .map(|(key, entity)| (key.clone(), entity.fields.clone()))
                .collect(),
        )
    }

    /// Replace the whole content with a snapshot. Every key present before or
    /// after the swap is marked dirty.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let mut dirty: FxHashSet<EntityKey> = self.entities.keys().cloned().collect();
        self.entities = snapshot
            .to_fx_hashmaps()
            .into_iter()
            .map(|(key, fields)| {
                dirty.insert(key.clone());
                (key.clone(), Entity { key, fields })
            })
            .collect();
        self.dirty.extend(dirty);
    }
}
