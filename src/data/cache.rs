use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::data::notifications::{self, Registry};
use crate::data::query_index;
use crate::{
    CacheConfig, EntityKey, EntityStore, Error, QueryDescriptor, Result, Snapshot,
    SubscriptionHandle, Value,
};

pub(crate) struct Inner {
    pub(crate) store: EntityStore,
    pub(crate) registry: Registry,
    pub(crate) config: CacheConfig,
    depth: usize,
}

/// Handle to a normalized query cache.
///
/// Cloning the handle is cheap and every clone refers to the same store.
/// Construct one per application and pass it to whatever needs it.
///
/// # Example
///
/// ```
/// use qcache_rs::{sobj, Cache, FieldSelection, QueryDescriptor, Selection};
///
/// let cache = Cache::new();
/// let person = QueryDescriptor::new(Selection::new().field(
///     FieldSelection::new("person")
///         .arg("id", qcache_rs::Argument::literal(2))
///         .of_type("Person")
///         .select(Selection::leaves(&["id", "name"])),
/// ));
///
/// cache.write(&person, &sobj! { "person" => sobj! { "id" => 2, "name" => "Bob" } }).unwrap();
/// assert!(cache.read(&person).is_some());
/// ```
#[derive(Clone)]
pub struct Cache {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Cache")
            .field("entities", &inner.store.len())
            .field("watches", &inner.registry.watch_count())
            .field("config", &inner.config)
            .finish()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                store: EntityStore::new(),
                registry: Registry::default(),
                config,
                depth: 0,
            })),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.with_inner(|inner| inner.config.clone())
    }

    pub(crate) fn with_inner<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        f(&self.inner.borrow())
    }

    pub(crate) fn with_inner_mut<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        f(&mut self.inner.borrow_mut())
    }

    /// Read a query from the cache. `None` means some entity or field the
    /// query needs is not cached.
    pub fn read(&self, descriptor: &QueryDescriptor) -> Option<Value> {
        self.with_inner(|inner| query_index::resolve(&inner.store, descriptor, &inner.config).result)
    }

    /// Write data for a query and notify affected subscribers before returning.
    pub fn write(&self, descriptor: &QueryDescriptor, data: &Value) -> Result<()> {
        let root = EntityKey::new(self.with_inner(|inner| inner.config.root_query_key.clone()));
        self.write_at(&root, descriptor, data)
    }

    /// Write data whose root fields belong to the entity at `root`
    pub fn write_at(&self, root: &EntityKey, descriptor: &QueryDescriptor, data: &Value) -> Result<()> {
        self.transaction(|inner| {
            let fragments = query_index::extract_entities_at(root, descriptor, data, &inner.config)?;
            for fragment in fragments {
                inner.store.put(fragment.key, fragment.fields);
            }
            Ok(())
        })
    }

    /// Read a query rooted at `root` instead of the root query entity
    pub fn read_at(&self, root: &EntityKey, descriptor: &QueryDescriptor) -> Option<Value> {
        self.with_inner(|inner| query_index::resolve_from(&inner.store, root, descriptor).result)
    }

    /// Remove one entity and notify the watches that depended on it.
    /// Returns false if the entity was not cached.
    pub fn evict(&self, key: &EntityKey) -> Result<bool> {
        let mut evicted = false;
        self.transaction(|inner| {
            evicted = inner.store.evict(key);
            Ok(())
        })?;
        Ok(evicted)
    }

    /// Drop every entity and forget the last results of all watches.
    /// Subscriptions stay registered and nobody is notified.
    pub fn reset(&self) {
        self.with_inner_mut(|inner| {
            inner.store.clear();
            inner.registry.forget_results();
        });
        log::debug!("Cache reset");
    }

    pub fn extract(&self) -> Snapshot {
        self.with_inner(|inner| inner.store.to_snapshot())
    }

    /// Replace the store content and notify every watch whose result changed
    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.transaction(|inner| {
            inner.store.restore(snapshot);
            Ok(())
        })
    }

    /// Start observing a query. The callback is not called for the current
    /// result, only for later changes to it.
    pub fn subscribe<F>(&self, descriptor: QueryDescriptor, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Cache, &Value) -> Result<()> + 'static,
    {
        self.with_inner_mut(|inner| {
            let store = &inner.store;
            let config = &inner.config;
            inner.registry.subscribe(descriptor, Rc::new(callback), |descriptor| {
                query_index::resolve(store, descriptor, config)
            })
        })
    }

    /// Returns false if the handle was already unsubscribed
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.with_inner_mut(|inner| inner.registry.unsubscribe(handle))
    }

    /// Subscribe with a channel. Every changed result is sent into it; once
    /// the receiver is dropped the callback reports an error on each change
    /// until unsubscribed.
    pub fn watch_channel(
        &self,
        descriptor: QueryDescriptor,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Value>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = self.subscribe(descriptor, move |_, result| {
            sender
                .send(result.clone())
                .map_err(|_| Error::Subscriber("watch channel receiver dropped".to_string()))
        });
        (handle, receiver)
    }

    pub fn watch_count(&self) -> usize {
        self.with_inner(|inner| inner.registry.watch_count())
    }

    pub fn subscription_count(&self) -> usize {
        self.with_inner(|inner| inner.registry.subscription_count())
    }

    /// Apply a store mutation as one unit and dispatch its notifications.
    ///
    /// The mutation runs under a single borrow, so a reader can only ever
    /// observe the store before or after it. If it fails, nothing is
    /// dispatched and the dirty set is dropped.
    fn transaction(&self, apply: impl FnOnce(&mut Inner) -> Result<()>) -> Result<()> {
        let touched: FxHashSet<EntityKey> = self.with_inner_mut(|inner| {
            if inner.depth >= inner.config.max_dispatch_depth {
                log::warn!(
                    "Refusing nested write at dispatch depth {}",
                    inner.depth
                );
                return Err(Error::DispatchDepthExceeded(inner.config.max_dispatch_depth));
            }

            match apply(inner) {
                Ok(()) => Ok(inner.store.take_dirty()),
                Err(e) => {
                    inner.store.take_dirty();
                    Err(e)
                }
            }
        })?;

        log::debug!(
            "Write touched {} entit{}",
            touched.len(),
            if touched.len() == 1 { "y" } else { "ies" }
        );

        self.with_inner_mut(|inner| inner.depth += 1);
        notifications::dispatch(self, &touched);
        self.with_inner_mut(|inner| inner.depth -= 1);

        Ok(())
    }
}
