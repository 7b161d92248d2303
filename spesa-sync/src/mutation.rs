//! Write endpoints with optimistic updates.
//!
//! A mutation runs in three steps: apply the optimistic patches (all of them,
//! coalesced into one notification per key), send the request, then either
//! commit the patches and invalidate the declared tags, or roll the patches
//! back and surface the error. The caller always gets the server's outcome.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

use crate::client::SyncClient;
use crate::error::{SyncError, SyncResult};
use crate::patch::{Optimistic, PatchSet};
use crate::tag::Tag;
use crate::transport::Request;

type MutationRequestFn<A> = Arc<dyn Fn(&A) -> SyncResult<Request> + Send + Sync>;
type OptimisticFn<A> = Arc<dyn Fn(&A, &mut Optimistic<'_>) + Send + Sync>;
type InvalidatesFn<A> = Arc<dyn Fn(&A, Option<&Value>) -> Vec<Tag> + Send + Sync>;

/// When a mutation's tags are invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidatePolicy {
    /// Only after the server accepted the change.
    #[default]
    OnSuccess,
    /// After every settlement, so a failure also brings the cache back in
    /// line with the server.
    Always,
}

struct MutationDef<A> {
    kind: String,
    request: MutationRequestFn<A>,
    optimistic: Option<OptimisticFn<A>>,
    invalidates: InvalidatesFn<A>,
    policy: InvalidatePolicy,
}

impl<A> Clone for MutationDef<A> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            request: Arc::clone(&self.request),
            optimistic: self.optimistic.clone(),
            invalidates: Arc::clone(&self.invalidates),
            policy: self.policy,
        }
    }
}

/// A server write with optional optimistic cache patches.
pub struct MutationEndpoint<A, R> {
    client: SyncClient,
    def: Arc<MutationDef<A>>,
    _marker: PhantomData<fn() -> R>,
}

impl<A, R> Clone for MutationEndpoint<A, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<A, R> MutationEndpoint<A, R>
where
    A: Send + Sync + 'static,
    R: DeserializeOwned + 'static,
{
    pub fn new(
        client: SyncClient,
        kind: &str,
        request: impl Fn(&A) -> SyncResult<Request> + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            def: Arc::new(MutationDef {
                kind: kind.to_string(),
                request: Arc::new(request),
                optimistic: None,
                invalidates: Arc::new(|_: &A, _: Option<&Value>| Vec::<Tag>::new()),
                policy: InvalidatePolicy::default(),
            }),
            _marker: PhantomData,
        }
    }

    /// Patches to apply before the request goes out.
    pub fn optimistic(
        mut self,
        hook: impl Fn(&A, &mut Optimistic<'_>) + Send + Sync + 'static,
    ) -> Self {
        Arc::make_mut(&mut self.def).optimistic = Some(Arc::new(hook));
        self
    }

    /// Tags to invalidate once the mutation settles. The response body is
    /// passed on success.
    pub fn invalidates(
        mut self,
        invalidates: impl Fn(&A, Option<&Value>) -> Vec<Tag> + Send + Sync + 'static,
    ) -> Self {
        Arc::make_mut(&mut self.def).invalidates = Arc::new(invalidates);
        self
    }

    pub fn invalidates_tags(self, tags: Vec<Tag>) -> Self {
        self.invalidates(move |_, _| tags.clone())
    }

    pub fn invalidate_policy(mut self, policy: InvalidatePolicy) -> Self {
        Arc::make_mut(&mut self.def).policy = policy;
        self
    }

    pub fn kind(&self) -> &str {
        &self.def.kind
    }

    /// Run the mutation. Resolves with the server's response or the error
    /// that caused the rollback.
    pub async fn mutate(&self, args: &A) -> SyncResult<R> {
        let def = &self.def;
        let request = (def.request)(args)?;
        let store = self.client.store();

        let patches = match &def.optimistic {
            Some(hook) => store.batch(|store| {
                let mut optimistic = Optimistic::new(store);
                hook(args, &mut optimistic);
                optimistic.into_patches()
            }),
            None => PatchSet::new(),
        };
        if !patches.is_empty() {
            debug!(mutation = %def.kind, patches = patches.len(), "applied optimistic update");
        }

        match self.client.execute(request).await {
            Ok(body) => {
                patches.commit(store);
                let tags = (def.invalidates)(args, Some(&body));
                self.client.invalidate(&tags);
                serde_json::from_value(body).map_err(|err| SyncError::decode(def.kind.as_str(), err))
            }
            Err(err) => {
                if !patches.is_empty() {
                    debug!(mutation = %def.kind, error = %err, "rolling back optimistic update");
                }
                if let Err(rollback) = patches.rollback(store) {
                    error!(mutation = %def.kind, error = %rollback, "optimistic rollback failed");
                }
                if def.policy == InvalidatePolicy::Always {
                    let tags = (def.invalidates)(args, None);
                    self.client.invalidate(&tags);
                }
                Err(err)
            }
        }
    }
}
