//! Pure functions mapping a query descriptor onto the entity store.
//!
//! `resolve` rebuilds a result tree from normalized entities and reports which
//! entities it visited. `extract_entities` goes the other way, splitting a
//! result tree into entity fragments ready to be merged into the store.

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::data::{CacheConfig, EntityKey, EntityStore, Fields, Selection, Value, Variables};
use crate::{Error, QueryDescriptor, Result};

type Path<'a> = SmallVec<[&'a str; 8]>;

/// Outcome of resolving a descriptor against the store
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The denormalized result, or `None` on a miss
    pub result: Option<Value>,
    /// Every entity key visited while resolving, including the one whose
    /// absence caused a miss
    pub dependencies: FxHashSet<EntityKey>,
}

impl Resolution {
    pub fn is_miss(&self) -> bool {
        self.result.is_none()
    }
}

/// A set of fields to merge into one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub key: EntityKey,
    pub fields: Vec<(String, Value)>,
}

enum Source<'a> {
    Entity(&'a FxHashMap<String, Value>),
    Inline(&'a Fields),
}

impl<'a> Source<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        match self {
            Source::Entity(fields) => fields.get(name),
            Source::Inline(fields) => fields.get(name),
        }
    }
}

pub fn resolve(store: &EntityStore, descriptor: &QueryDescriptor, config: &CacheConfig) -> Resolution {
    resolve_from(store, &EntityKey::new(config.root_query_key.as_str()), descriptor)
}

/// Resolve a descriptor starting at an arbitrary root entity
pub fn resolve_from(store: &EntityStore, root: &EntityKey, descriptor: &QueryDescriptor) -> Resolution {
    let mut dependencies = FxHashSet::default();
    let result = resolve_entity(
        store,
        root,
        descriptor.selection(),
        descriptor.variables(),
        &mut dependencies,
    );

    Resolution {
        result,
        dependencies,
    }
}

fn resolve_entity(
    store: &EntityStore,
    key: &EntityKey,
    selection: &Selection,
    variables: &Variables,
    dependencies: &mut FxHashSet<EntityKey>,
) -> Option<Value> {
    dependencies.insert(key.clone());
    let entity = store.get(key)?;
    resolve_selection(store, Source::Entity(&entity.fields), selection, variables, dependencies)
}

fn resolve_selection(
    store: &EntityStore,
    source: Source<'_>,
    selection: &Selection,
    variables: &Variables,
    dependencies: &mut FxHashSet<EntityKey>,
) -> Option<Value> {
    let mut result = Fields::new();

    for field in &selection.fields {
        let stored = source.get(&field.store_name(variables))?;
        let value = match &field.selection {
            Some(nested) => resolve_nested(store, stored, nested, variables, dependencies)?,
            None => resolve_leaf(stored)?,
        };
        result.insert(field.response_key().to_string(), value);
    }

    Some(Value::Object(result))
}

fn resolve_nested(
    store: &EntityStore,
    stored: &Value,
    selection: &Selection,
    variables: &Variables,
    dependencies: &mut FxHashSet<EntityKey>,
) -> Option<Value> {
    match stored {
        Value::Null => Some(Value::Null),
        Value::Reference(key) => resolve_entity(store, key, selection, variables, dependencies),
        Value::Object(fields) => {
            resolve_selection(store, Source::Inline(fields), selection, variables, dependencies)
        }
        Value::List(items) => items
            .iter()
            .map(|item| resolve_nested(store, item, selection, variables, dependencies))
            .collect::<Option<Vec<Value>>>()
            .map(Value::List),
        _ => None,
    }
}

// A leaf must not leak references out of the store.
fn resolve_leaf(stored: &Value) -> Option<Value> {
    match stored {
        Value::Reference(_) => None,
        Value::List(items) => items
            .iter()
            .map(resolve_leaf)
            .collect::<Option<Vec<Value>>>()
            .map(Value::List),
        Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| resolve_leaf(value).map(|value| (name.clone(), value)))
            .collect::<Option<Fields>>()
            .map(Value::Object),
        other => Some(other.clone()),
    }
}

pub fn extract_entities(
    descriptor: &QueryDescriptor,
    data: &Value,
    config: &CacheConfig,
) -> Result<Vec<Fragment>> {
    extract_entities_at(&EntityKey::new(config.root_query_key.as_str()), descriptor, data, config)
}

/// Normalize a result tree whose root belongs to `root`.
///
/// Fragments come out children first with the root fragment last. Nothing
/// is written anywhere, so a shape error leaves every store untouched.
pub fn extract_entities_at(
    root: &EntityKey,
    descriptor: &QueryDescriptor,
    data: &Value,
    config: &CacheConfig,
) -> Result<Vec<Fragment>> {
    let object = data.as_object().ok_or_else(|| Error::ShapeMismatch {
        path: String::new(),
        reason: format!("expected object, got {}", data.kind()),
    })?;

    let mut extractor = Extractor {
        variables: descriptor.variables(),
        config,
        fragments: Vec::new(),
    };

    let mut path = Path::new();
    let fields = extractor.extract_selection(object, descriptor.selection(), &mut path)?;
    extractor.fragments.push(Fragment {
        key: root.clone(),
        fields,
    });

    Ok(extractor.fragments)
}

struct Extractor<'a> {
    variables: &'a Variables,
    config: &'a CacheConfig,
    fragments: Vec<Fragment>,
}

impl<'a> Extractor<'a> {
    fn extract_selection<'d>(
        &mut self,
        object: &'d Fields,
        selection: &'d Selection,
        path: &mut Path<'d>,
    ) -> Result<Vec<(String, Value)>> {
        let mut fields = Vec::with_capacity(selection.fields.len());

        for field in &selection.fields {
            path.push(field.response_key());
            let value = object.get(field.response_key()).ok_or_else(|| Error::ShapeMismatch {
                path: path.iter().join("."),
                reason: "missing field".to_string(),
            })?;

            let stored = match &field.selection {
                Some(nested) => self.extract_nested(value, nested, field.type_name.as_deref(), path)?,
                None => value.clone(),
            };

            fields.push((field.store_name(self.variables), stored));
            path.pop();
        }

        Ok(fields)
    }

    fn extract_nested<'d>(
        &mut self,
        value: &'d Value,
        selection: &'d Selection,
        declared_type: Option<&'d str>,
        path: &mut Path<'d>,
    ) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::List(items) => items
                .iter()
                .map(|item| self.extract_nested(item, selection, declared_type, path))
                .collect::<Result<Vec<Value>>>()
                .map(Value::List),
            Value::Object(object) => {
                let type_name = object
                    .get(&self.config.typename_field)
                    .and_then(Value::as_str)
                    .or(declared_type);
                let key = EntityKey::identify(type_name, object, self.config);
                let fields = self.extract_selection(object, selection, path)?;

                match key {
                    Some(key) => {
                        self.fragments.push(Fragment { key: key.clone(), fields });
                        Ok(Value::Reference(key))
                    }
                    None => Ok(Value::Object(fields.into_iter().collect())),
                }
            }
            other => Err(Error::ShapeMismatch {
                path: path.iter().join("."),
                reason: format!("expected object with a selection, got {}", other.kind()),
            }),
        }
    }
}
