//! The sync client: transport, credentials and cache wired together.

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::credentials::CredentialSource;
use crate::error::{SyncError, SyncResult};
use crate::key::ResourceKey;
use crate::mutation::MutationEndpoint;
use crate::query::QueryEndpoint;
use crate::store::{CacheStore, FetchOutcome, SharedFetch, WeakCacheStore};
use crate::tag::Tag;
use crate::transport::{Request, Transport};

/// Turns a raw response body into the value that gets cached.
pub type Transform = Arc<dyn Fn(Value) -> SyncResult<Value> + Send + Sync>;

/// Entry point for defining endpoints and executing requests.
///
/// Cheap to clone; every clone shares the same store, transport and
/// credential source.
#[derive(Clone)]
pub struct SyncClient {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
}

/// Non-owning client handle for closures that live inside the cache.
#[derive(Clone)]
pub(crate) struct WeakSyncClient {
    store: WeakCacheStore,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
}

impl WeakSyncClient {
    pub(crate) fn upgrade(&self) -> Option<SyncClient> {
        Some(SyncClient {
            store: self.store.upgrade()?,
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
        })
    }
}

impl SyncClient {
    pub fn new(
        store: CacheStore,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            store,
            transport,
            credentials,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    pub(crate) fn downgrade(&self) -> WeakSyncClient {
        WeakSyncClient {
            store: self.store.downgrade(),
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
        }
    }

    /// Define a cached query endpoint.
    pub fn query<A, T>(
        &self,
        kind: &str,
        request: impl Fn(&A) -> Request + Send + Sync + 'static,
    ) -> QueryEndpoint<A, T>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
    {
        QueryEndpoint::new(self.clone(), kind, request)
    }

    /// Define a mutation endpoint.
    pub fn mutation<A, R>(
        &self,
        kind: &str,
        request: impl Fn(&A) -> SyncResult<Request> + Send + Sync + 'static,
    ) -> MutationEndpoint<A, R>
    where
        A: Send + Sync + 'static,
        R: DeserializeOwned + 'static,
    {
        MutationEndpoint::new(self.clone(), kind, request)
    }

    /// Send one request, attaching the current token unless the request is
    /// anonymous. Failures come back normalized.
    pub async fn execute(&self, mut request: Request) -> SyncResult<Value> {
        request.auth_token = if request.anonymous {
            None
        } else {
            self.credentials.token().filter(|token| !token.is_empty())
        };
        let method = request.method;
        let target = request.target();
        debug!(method = %method, target = %target, "sending request");

        match self.transport.send(request).await {
            Ok(response) => {
                debug!(method = %method, target = %target, status = response.status, "request succeeded");
                Ok(response.body)
            }
            Err(err) => {
                let err = SyncError::from(err);
                warn!(method = %method, target = %target, error = %err, "request failed");
                Err(err)
            }
        }
    }

    /// Start (or join) the fetch for `key`. The result lands in the store
    /// before any awaiting caller sees it.
    pub(crate) fn fetch(&self, key: &ResourceKey, request: Request, transform: Transform) -> SharedFetch {
        let client = self.clone();
        let owned_key = key.clone();
        let (fetch, joined) = self.store.begin_fetch(key, move |ticket| {
            async move {
                let result = match client.execute(request).await {
                    Ok(body) => transform(body),
                    Err(err) => Err(err),
                };
                let outcome = client.store.complete_fetch(&owned_key, ticket, &result);
                if outcome == FetchOutcome::Superseded {
                    debug!(key = %owned_key, "fetch superseded by invalidation");
                    client.refetch_active(std::slice::from_ref(&owned_key));
                }
                result
            }
            .boxed()
            .shared()
        });
        if joined {
            debug!(key = %key, "joined in-flight fetch");
        }
        fetch
    }

    /// Invalidate every entry reached by `tags` and refetch the ones that
    /// are currently subscribed.
    pub fn invalidate(&self, tags: &[Tag]) -> Vec<ResourceKey> {
        let keys = self.store.invalidate_tags(tags);
        self.refetch_active(&keys);
        keys
    }

    pub fn invalidate_key(&self, key: &ResourceKey) -> bool {
        let affected = self.store.invalidate_key(key);
        if affected {
            self.refetch_active(std::slice::from_ref(key));
        }
        affected
    }

    /// Invalidate the whole cache, e.g. after the signed-in user changes.
    pub fn invalidate_all(&self) -> Vec<ResourceKey> {
        let keys = self.store.invalidate_all();
        self.refetch_active(&keys);
        keys
    }

    /// Re-run the query behind each key that has at least one subscriber.
    pub fn refetch_active(&self, keys: &[ResourceKey]) {
        for key in keys {
            if self.store.subscriber_count(key) == 0 {
                continue;
            }
            if let Some(refetch) = self.store.refetcher(key) {
                debug!(key = %key, "refetching subscribed entry");
                refetch();
            }
        }
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
