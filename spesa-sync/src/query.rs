//! Cached read endpoints.
//!
//! A [`QueryEndpoint`] binds a resource kind to a request builder, an
//! optional response transform and the tags the cached value provides.
//! Reading through it serves from the cache when the entry is valid and
//! otherwise starts (or joins) exactly one fetch per key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use spesa_core::Timestamp;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::Subscription;
use crate::client::{SyncClient, Transform};
use crate::entry::{CacheEntry, EntryStatus};
use crate::error::{SyncError, SyncResult};
use crate::key::ResourceKey;
use crate::store::SharedFetch;
use crate::tag::Tag;
use crate::transport::Request;

type RequestFn<A> = Arc<dyn Fn(&A) -> Request + Send + Sync>;
type ProvidesFn<A> = Arc<dyn Fn(&A, Option<&Value>) -> Vec<Tag> + Send + Sync>;

/// What a component sees when it reads a query.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Last known value, possibly stale or optimistically patched.
    pub value: Option<T>,
    pub status: EntryStatus,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<SyncError>,
    pub updated_at: Option<Timestamp>,
}

impl<T: DeserializeOwned> QueryState<T> {
    fn from_entry(kind: &str, entry: Option<CacheEntry>) -> Self {
        let Some(entry) = entry else {
            return Self {
                value: None,
                status: EntryStatus::Uninitialized,
                is_loading: false,
                is_error: false,
                error: None,
                updated_at: None,
            };
        };
        let mut error = entry.error;
        let value = match entry.value.map(serde_json::from_value::<T>) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                error = Some(SyncError::decode(kind, err));
                None
            }
            None => None,
        };
        let decode_failed = matches!(error, Some(SyncError::Decode { .. }));
        Self {
            value,
            status: entry.status,
            is_loading: entry.status == EntryStatus::Loading,
            is_error: entry.status == EntryStatus::Error || decode_failed,
            error,
            updated_at: entry.updated_at,
        }
    }
}

struct QueryDef<A> {
    kind: String,
    request: RequestFn<A>,
    transform: Transform,
    provides: ProvidesFn<A>,
}

impl<A> Clone for QueryDef<A> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            request: Arc::clone(&self.request),
            transform: Arc::clone(&self.transform),
            provides: Arc::clone(&self.provides),
        }
    }
}

impl<A> QueryDef<A>
where
    A: Serialize + Clone + Send + Sync + 'static,
{
    fn launch(self: &Arc<Self>, client: &SyncClient, key: &ResourceKey, args: &A) -> SharedFetch {
        let request = (self.request)(args);
        let def = Arc::clone(self);
        let store = client.store().downgrade();
        let owned_key = key.clone();
        let args = args.clone();
        let transform: Transform = Arc::new(move |body: Value| -> SyncResult<Value> {
            let value = (def.transform)(body)?;
            // A cleared or evicted entry has no fetch on record; leave its tags gone.
            if let Some(store) = store.upgrade().filter(|store| store.is_fetching(&owned_key)) {
                store.register_tags(&owned_key, (def.provides)(&args, Some(&value)));
            }
            Ok(value)
        });
        client.fetch(key, request, transform)
    }

    /// Register the tags known before any response, and the refetcher
    /// invalidation uses to bring this key back.
    fn prepare(self: &Arc<Self>, client: &SyncClient, key: &ResourceKey, args: &A) {
        let store = client.store();
        store.extend_tags(key, (self.provides)(args, None));
        if store.has_refetcher(key) {
            return;
        }
        let def = Arc::clone(self);
        let weak = client.downgrade();
        let owned_key = key.clone();
        let args = args.clone();
        store.register_refetcher(
            key,
            Arc::new(move || {
                if let Some(client) = weak.upgrade() {
                    drive(&owned_key, def.launch(&client, &owned_key, &args));
                }
            }),
        );
    }
}

/// Poll a fetch to completion in the background.
fn drive(key: &ResourceKey, fetch: SharedFetch) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let _ = fetch.await;
            });
        }
        Err(_) => warn!(key = %key, "no async runtime; fetch not started"),
    }
}

/// A cached, deduplicated read of one resource kind.
pub struct QueryEndpoint<A, T> {
    client: SyncClient,
    def: Arc<QueryDef<A>>,
    _marker: PhantomData<fn() -> T>,
}

impl<A, T> Clone for QueryEndpoint<A, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<A, T> QueryEndpoint<A, T>
where
    A: Serialize + Clone + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
{
    pub fn new(
        client: SyncClient,
        kind: &str,
        request: impl Fn(&A) -> Request + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            def: Arc::new(QueryDef {
                kind: kind.to_string(),
                request: Arc::new(request),
                transform: Arc::new(|body: Value| -> SyncResult<Value> { Ok(body) }),
                provides: Arc::new(|_: &A, _: Option<&Value>| Vec::<Tag>::new()),
            }),
            _marker: PhantomData,
        }
    }

    /// Reshape the response body before it is cached.
    pub fn transform_response(
        mut self,
        transform: impl Fn(Value) -> SyncResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Arc::make_mut(&mut self.def).transform = Arc::new(transform);
        self
    }

    /// Cache the array found under `field` of a paged envelope such as
    /// `{"offers": [...], "totalPages": 3, "currentPage": 1}`. Bare arrays
    /// pass through unchanged.
    pub fn unwrap_envelope(self, field: &'static str) -> Self {
        let kind = self.def.kind.clone();
        self.transform_response(move |body| match body {
            Value::Object(mut map) => map.remove(field).ok_or_else(|| {
                SyncError::decode(kind.as_str(), format!("response has no `{}` field", field))
            }),
            Value::Array(items) => Ok(Value::Array(items)),
            other => Err(SyncError::decode(
                kind.as_str(),
                format!("expected an envelope, got {}", other),
            )),
        })
    }

    /// Tags this query provides, computed from its arguments and (once
    /// loaded) its value.
    pub fn provides(
        mut self,
        provides: impl Fn(&A, Option<&Value>) -> Vec<Tag> + Send + Sync + 'static,
    ) -> Self {
        Arc::make_mut(&mut self.def).provides = Arc::new(provides);
        self
    }

    /// Tags that do not depend on arguments or value.
    pub fn provides_tags(self, tags: Vec<Tag>) -> Self {
        self.provides(move |_, _| tags.clone())
    }

    pub fn kind(&self) -> &str {
        &self.def.kind
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    pub fn key(&self, args: &A) -> SyncResult<ResourceKey> {
        ResourceKey::new(&self.def.kind, args)
    }

    /// Read the current state, starting a background fetch when the entry is
    /// missing, stale or failed. Returns immediately.
    pub fn query(&self, args: &A) -> SyncResult<QueryState<T>> {
        let key = self.key(args)?;
        self.def.prepare(&self.client, &key, args);
        let store = self.client.store();
        if store.status(&key).needs_fetch() {
            store.record_lookup(false);
            drive(&key, self.def.launch(&self.client, &key, args));
        } else {
            store.record_lookup(true);
        }
        Ok(self.snapshot(&key))
    }

    /// Resolve the value, fetching only if the cache cannot answer.
    ///
    /// Concurrent callers for the same key share one transport call.
    pub async fn fetch(&self, args: &A) -> SyncResult<T> {
        let key = self.key(args)?;
        self.def.prepare(&self.client, &key, args);
        let store = self.client.store();
        if let Some(CacheEntry {
            status: EntryStatus::Valid,
            value: Some(value),
            ..
        }) = store.get(&key)
        {
            store.record_lookup(true);
            return self.decode(value);
        }
        store.record_lookup(false);
        let fetched = self.def.launch(&self.client, &key, args).await?;
        self.decode(store.value(&key).unwrap_or(fetched))
    }

    /// Go to the network even if the cached value is valid.
    pub async fn refetch(&self, args: &A) -> SyncResult<T> {
        let key = self.key(args)?;
        self.def.prepare(&self.client, &key, args);
        debug!(key = %key, "explicit refetch");
        let fetched = self.def.launch(&self.client, &key, args).await?;
        self.decode(self.client.store().value(&key).unwrap_or(fetched))
    }

    /// Current state without triggering a fetch.
    pub fn state(&self, args: &A) -> SyncResult<QueryState<T>> {
        let key = self.key(args)?;
        Ok(self.snapshot(&key))
    }

    /// Mount: subscribe to changes of this query's entry and start loading
    /// it if needed. `on_change` gets the fresh state on every change.
    pub fn subscribe(
        &self,
        args: &A,
        on_change: impl Fn(QueryState<T>) + Send + Sync + 'static,
    ) -> SyncResult<Subscription> {
        let key = self.key(args)?;
        let store = self.client.store().downgrade();
        let kind = self.def.kind.clone();
        let subscription = self.client.store().subscribe(&key, move |event| {
            if let Some(store) = store.upgrade() {
                on_change(QueryState::from_entry(&kind, store.get(&event.key)));
            }
        });
        self.query(args)?;
        Ok(subscription)
    }

    fn snapshot(&self, key: &ResourceKey) -> QueryState<T> {
        QueryState::from_entry(&self.def.kind, self.client.store().get(key))
    }

    fn decode(&self, value: Value) -> SyncResult<T> {
        serde_json::from_value(value).map_err(|err| SyncError::decode(self.def.kind.as_str(), err))
    }
}

/// Tags for a list value: one per element id under `id_field`, plus the
/// collection tag.
pub fn list_tags(kind: &str, value: Option<&Value>, id_field: &str) -> Vec<Tag> {
    let mut tags = vec![Tag::list(kind)];
    if let Some(Value::Array(items)) = value {
        tags.extend(
            items
                .iter()
                .filter_map(|item| item.get(id_field).and_then(Value::as_str))
                .map(|id| Tag::id(kind, id)),
        );
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_tags_include_each_id_and_the_collection() {
        let value = json!([{"_id": "1"}, {"_id": "2"}, {"name": "no id"}]);
        let tags = list_tags("ShoppingList", Some(&value), "_id");
        assert_eq!(
            tags,
            vec![
                Tag::list("ShoppingList"),
                Tag::id("ShoppingList", "1"),
                Tag::id("ShoppingList", "2"),
            ]
        );
        assert_eq!(list_tags("ShoppingList", None, "_id"), vec![Tag::list("ShoppingList")]);
    }

    #[test]
    fn state_of_missing_entry_is_uninitialized() {
        let state = QueryState::<Vec<String>>::from_entry("aisles", None);
        assert_eq!(state.status, EntryStatus::Uninitialized);
        assert!(!state.is_loading);
        assert!(state.value.is_none());
    }

    #[test]
    fn undecodable_value_surfaces_as_error() {
        let entry = CacheEntry {
            key: ResourceKey::unit("aisles"),
            value: Some(json!({"unexpected": true})),
            status: EntryStatus::Valid,
            error: None,
            subscriber_count: 0,
            pending_patches: 0,
            updated_at: None,
        };
        let state = QueryState::<Vec<String>>::from_entry("aisles", Some(entry));
        assert!(state.is_error);
        assert!(matches!(state.error, Some(SyncError::Decode { .. })));
    }
}
