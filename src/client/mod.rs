use std::rc::Rc;

use crate::{
    Cache, Document, EntityKey, Error, OperationKind, QueryDescriptor, Result, SubscriptionHandle,
    Value, Variables,
};

/// An operation ready to be sent over a link
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub descriptor: QueryDescriptor,
}

impl Operation {
    pub fn variables(&self) -> &Variables {
        self.descriptor.variables()
    }
}

/// Transport executing operations against a data source.
/// The returned value is the `data` tree of the response.
pub trait Link {
    fn execute(&self, operation: &Operation) -> Result<Value>;
}

/// Link backed by a closure
pub struct FnLink<F>(pub F);

impl<F> Link for FnLink<F>
where
    F: Fn(&Operation) -> Result<Value>,
{
    fn execute(&self, operation: &Operation) -> Result<Value> {
        (self.0)(operation)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve from the cache, fetching only on a miss
    #[default]
    CacheFirst,
    /// Never fetch
    CacheOnly,
    /// Always fetch, then serve what was written
    NetworkOnly,
}

/// Pairs a cache with a link, the way an application talks to both
#[derive(Clone)]
pub struct Client {
    cache: Cache,
    link: Rc<dyn Link>,
}

impl Client {
    pub fn new(cache: Cache, link: impl Link + 'static) -> Self {
        Self {
            cache,
            link: Rc::new(link),
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn read_query(&self, document: &Document, variables: Variables) -> Result<Option<Value>> {
        let descriptor = document.descriptor(variables)?;
        Ok(self.cache.read(&descriptor))
    }

    pub fn write_query(&self, document: &Document, variables: Variables, data: &Value) -> Result<()> {
        let descriptor = document.descriptor(variables)?;
        self.cache.write(&descriptor, data)
    }

    /// Run a query once. A miss under `CacheOnly` gives `Ok(None)`.
    pub fn query(
        &self,
        document: &Document,
        variables: Variables,
        policy: FetchPolicy,
    ) -> Result<Option<Value>> {
        let descriptor = query_descriptor(document, variables)?;

        if policy != FetchPolicy::NetworkOnly {
            if let Some(result) = self.cache.read(&descriptor) {
                return Ok(Some(result));
            }
            if policy == FetchPolicy::CacheOnly {
                return Ok(None);
            }
        }

        self.fetch(document, &descriptor)?;
        Ok(self.cache.read(&descriptor))
    }

    /// Observe a query, calling `on_completed` every time its result changes.
    ///
    /// The callback is subscribed before any fetch, so a response written
    /// from the link notifies it the same way a later direct cache write
    /// does. A result already in the cache is returned on the watch rather
    /// than delivered to the callback.
    pub fn watch_query<F>(
        &self,
        document: &Document,
        variables: Variables,
        policy: FetchPolicy,
        on_completed: F,
    ) -> Result<QueryWatch>
    where
        F: Fn(&Cache, &Value) -> Result<()> + 'static,
    {
        let descriptor = query_descriptor(document, variables)?;
        let handle = self.cache.subscribe(descriptor.clone(), on_completed);
        let watch = QueryWatch {
            client: self.clone(),
            document: document.clone(),
            descriptor,
            handle,
        };

        let needs_fetch = match policy {
            FetchPolicy::CacheFirst => watch.current().is_none(),
            FetchPolicy::CacheOnly => false,
            FetchPolicy::NetworkOnly => true,
        };

        if needs_fetch {
            if let Err(e) = self.fetch(document, &watch.descriptor) {
                watch.stop();
                return Err(e);
            }
        }

        Ok(watch)
    }

    /// Execute a mutation, normalize its result into the cache, then let
    /// `update` rewrite whatever cached queries the mutation affects.
    pub fn mutate<F>(&self, document: &Document, variables: Variables, update: F) -> Result<Value>
    where
        F: FnOnce(&Cache, &Value) -> Result<()>,
    {
        if document.kind != OperationKind::Mutation {
            return Err(Error::InvalidOperation(format!(
                "{} is not a mutation",
                document.display_name()
            )));
        }

        let descriptor = document.descriptor(variables)?;
        let operation = Operation {
            kind: document.kind,
            name: document.name.clone(),
            descriptor,
        };

        log::debug!("Executing mutation {}", document.display_name());
        let data = self.link.execute(&operation)?;
        self.cache
            .write_at(&EntityKey::root_mutation(), &operation.descriptor, &data)?;
        update(&self.cache, &data)?;
        Ok(data)
    }

    fn fetch(&self, document: &Document, descriptor: &QueryDescriptor) -> Result<()> {
        let operation = Operation {
            kind: document.kind,
            name: document.name.clone(),
            descriptor: descriptor.clone(),
        };

        log::debug!("Fetching {} over link", document.display_name());
        let data = self.link.execute(&operation)?;
        self.cache.write(descriptor, &data)
    }
}

fn query_descriptor(document: &Document, variables: Variables) -> Result<QueryDescriptor> {
    if document.kind != OperationKind::Query {
        return Err(Error::InvalidOperation(format!(
            "{} is not a query",
            document.display_name()
        )));
    }
    document.descriptor(variables)
}

/// A live query started by `Client::watch_query`
pub struct QueryWatch {
    client: Client,
    document: Document,
    descriptor: QueryDescriptor,
    handle: SubscriptionHandle,
}

impl QueryWatch {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Current cached result of the query
    pub fn current(&self) -> Option<Value> {
        self.client.cache.read(&self.descriptor)
    }

    /// Fetch again over the link and write the response into the cache
    pub fn refetch(&self) -> Result<()> {
        self.client.fetch(&self.document, &self.descriptor)
    }

    /// Stop observing. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        self.client.cache.unsubscribe(&self.handle)
    }
}
