mod cache;
mod config;
mod entity;
mod entity_key;
mod entity_store;
mod notifications;
pub mod query_index;
mod selection;
mod snapshots;
mod value;

pub use cache::Cache;
pub use config::CacheConfig;
pub use entity::Entity;
pub use entity_key::{EntityKey, ROOT_MUTATION, ROOT_QUERY};
pub use entity_store::EntityStore;
pub use notifications::{Callback, SubscriptionHandle, WatchId};
pub use query_index::{Fragment, Resolution};
pub use selection::{Argument, FieldSelection, QueryDescriptor, Selection, Variables};
pub use snapshots::Snapshot;
pub use value::{ArcString, Fields, Value};
