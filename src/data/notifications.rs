use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::query_index::{self, Resolution};
use crate::{Cache, EntityKey, QueryDescriptor, Result, Value};

/// Subscriber callback. It gets the cache so it may read and write from
/// inside a notification.
pub type Callback = Rc<dyn Fn(&Cache, &Value) -> Result<()>>;

/// Identity shared by every subscription on an equivalent descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchId(pub u64);

/// A unique token for one subscription.
/// This allows callers to unsubscribe a specific callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle {
    watch_id: WatchId,
    token: Uuid,
}

impl SubscriptionHandle {
    pub fn watch_id(&self) -> WatchId {
        self.watch_id
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.token
    }
}

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.watch_id.0, self.token)
    }
}

struct Observer {
    token: Uuid,
    callback: Callback,
    /// Result this observer was last handed, or seeded with on subscribe
    last: Option<Value>,
}

struct Watch {
    descriptor: QueryDescriptor,
    last: Option<Value>,
    dependencies: FxHashSet<EntityKey>,
    observers: Vec<Observer>,
}

/// Registry of active watches, iterated in creation order
#[derive(Default)]
pub(crate) struct Registry {
    watches: BTreeMap<WatchId, Watch>,
    by_descriptor: FxHashMap<QueryDescriptor, WatchId>,
    next_id: u64,
}

impl Registry {
    /// Add an observer, creating the watch on first use. `resolve` is only
    /// called for a new watch; an existing watch keeps its state.
    pub fn subscribe(
        &mut self,
        descriptor: QueryDescriptor,
        callback: Callback,
        resolve: impl FnOnce(&QueryDescriptor) -> Resolution,
    ) -> SubscriptionHandle {
        let watch_id = match self.by_descriptor.get(&descriptor) {
            Some(id) => *id,
            None => {
                let id = WatchId(self.next_id);
                self.next_id += 1;

                let resolution = resolve(&descriptor);
                self.by_descriptor.insert(descriptor.clone(), id);
                self.watches.insert(
                    id,
                    Watch {
                        descriptor,
                        last: resolution.result,
                        dependencies: resolution.dependencies,
                        observers: Vec::new(),
                    },
                );
                id
            }
        };

        let token = Uuid::new_v4();
        if let Some(watch) = self.watches.get_mut(&watch_id) {
            let last = watch.last.clone();
            watch.observers.push(Observer { token, callback, last });
        }

        SubscriptionHandle { watch_id, token }
    }

    /// Returns false if the handle was already unsubscribed
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(watch) = self.watches.get_mut(&handle.watch_id) else {
            return false;
        };

        let before = watch.observers.len();
        watch.observers.retain(|observer| observer.token != handle.token);
        let removed = watch.observers.len() != before;

        if watch.observers.is_empty() {
            if let Some(watch) = self.watches.remove(&handle.watch_id) {
                self.by_descriptor.remove(&watch.descriptor);
            }
        }

        removed
    }

    /// Watches depending on any touched key, plus those never resolved
    pub fn affected(&self, touched: &FxHashSet<EntityKey>) -> Vec<WatchId> {
        self.watches
            .iter()
            .filter(|(_, watch)| {
                watch.last.is_none() || !watch.dependencies.is_disjoint(touched)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.watches.values().map(|watch| watch.observers.len()).sum()
    }

    pub fn forget_results(&mut self) {
        for watch in self.watches.values_mut() {
            watch.last = None;
            watch.dependencies.clear();
            for observer in &mut watch.observers {
                observer.last = None;
            }
        }
    }

    /// Re-resolve a watch and record the outcome. Returns the result to
    /// deliver along with the observers to deliver it to, or `None` when
    /// nothing changed.
    fn refresh(
        &mut self,
        watch_id: WatchId,
        resolve: impl FnOnce(&QueryDescriptor) -> Resolution,
    ) -> Option<(Value, Vec<Uuid>)> {
        let watch = self.watches.get_mut(&watch_id)?;
        let resolution = resolve(&watch.descriptor);
        watch.dependencies = resolution.dependencies;

        match resolution.result {
            Some(result) if watch.last.as_ref() != Some(&result) => {
                watch.last = Some(result.clone());
                Some((result, watch.observers.iter().map(|o| o.token).collect()))
            }
            Some(_) => None,
            None => {
                watch.last = None;
                for observer in &mut watch.observers {
                    observer.last = None;
                }
                None
            }
        }
    }

    /// Claim delivery of `result` to one observer. Gives its callback only
    /// if the observer is still subscribed, `result` has not been superseded
    /// by a nested write, and the observer was not already handed `result`.
    /// The observer's last result is updated before the callback runs.
    fn claim_delivery(&mut self, watch_id: WatchId, token: &Uuid, result: &Value) -> Option<Callback> {
        let watch = self.watches.get_mut(&watch_id)?;
        if watch.last.as_ref() != Some(result) {
            return None;
        }
        let observer = watch
            .observers
            .iter_mut()
            .find(|observer| observer.token == *token)?;
        if observer.last.as_ref() == Some(result) {
            return None;
        }
        observer.last = Some(result.clone());
        Some(observer.callback.clone())
    }
}

/// Re-evaluate every watch affected by `touched` and notify observers whose
/// result changed. Runs with no borrow of the cache held while a callback is
/// executing, so callbacks may read and write freely; a nested write is
/// dispatched to completion before this loop moves on.
pub(crate) fn dispatch(cache: &Cache, touched: &FxHashSet<EntityKey>) {
    let affected = cache.with_inner(|inner| inner.registry.affected(touched));

    for watch_id in affected {
        let delivery = cache.with_inner_mut(|inner| {
            let store = &inner.store;
            let config = &inner.config;
            inner
                .registry
                .refresh(watch_id, |descriptor| query_index::resolve(store, descriptor, config))
        });

        let Some((result, tokens)) = delivery else {
            continue;
        };

        log::debug!(
            "Watch {} changed, notifying {} subscriber(s)",
            watch_id.0,
            tokens.len()
        );

        for token in tokens {
            let callback = cache
                .with_inner_mut(|inner| inner.registry.claim_delivery(watch_id, &token, &result));
            let Some(callback) = callback else {
                continue;
            };

            notify(cache, watch_id, &token, &callback, &result);
        }
    }
}

fn notify(cache: &Cache, watch_id: WatchId, token: &Uuid, callback: &Callback, result: &Value) {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(cache, result))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("Subscriber {}#{} failed: {}", watch_id.0, token, e);
        }
        Err(_) => {
            log::error!("Subscriber {}#{} panicked", watch_id.0, token);
        }
    }
}
