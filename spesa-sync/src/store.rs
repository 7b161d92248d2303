//! The cache store.
//!
//! One [`CacheStore`] is created at startup and shared (by cloning the
//! handle) with every endpoint. It is the only owner of cache entries: all
//! reads return snapshots and all writes go through its methods, each of
//! which runs to completion under one lock. Listener notification happens
//! after the lock is released.
//!
//! # Entry model
//!
//! Each entry keeps the last server-confirmed value (`base`) plus a stack of
//! optimistic patch layers. The visible value is `base` with every layer
//! replayed in order:
//!
//! ```text
//! visible = layers.fold(base, |value, layer| layer(value))
//! ```
//!
//! Rolling back a patch removes its layer and replays the rest. A server
//! value replaces `base` and drops committed layers (the server already
//! reflects them) while pending layers are replayed on top.

use chrono::Utc;
use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use spesa_core::Timestamp;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::bus::{ChangeEvent, ListenerId, Release, Subscription, SubscriptionBus};
use crate::entry::{CacheEntry, EntryStatus};
use crate::error::{SyncError, SyncResult};
use crate::key::ResourceKey;
use crate::patch::{OptimisticPatch, PatchId, PatchLayer, Updater};
use crate::tag::{Tag, TagIndex};

/// A fetch shared by every caller interested in the same key.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, SyncResult<Value>>>;

/// Re-runs the query that owns a key. Registered by query endpoints.
pub type Refetcher = Arc<dyn Fn() + Send + Sync>;

/// Configuration for the cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Drop an entry once its last subscriber leaves and nothing is pending on it.
    pub evict_unused: bool,
    /// Panic on cache consistency violations instead of only reporting them.
    pub strict_consistency: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            evict_unused: false,
            strict_consistency: cfg!(debug_assertions),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_eviction(mut self, enabled: bool) -> Self {
        self.evict_unused = enabled;
        self
    }

    pub fn with_strict_consistency(mut self, enabled: bool) -> Self {
        self.strict_consistency = enabled;
        self
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Queries answered from a valid entry.
    pub hits: u64,
    /// Queries that had to go to the network.
    pub misses: u64,
    /// Transport calls started by queries.
    pub fetches: u64,
    /// Queries that joined a fetch already in flight.
    pub deduplicated: u64,
    /// Entries marked stale.
    pub invalidations: u64,
    /// Optimistic patches undone.
    pub rollbacks: u64,
    /// Entries dropped after losing their last subscriber.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Identifies one started fetch and the entry generation it was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FetchTicket {
    id: u64,
    generation: u64,
}

/// What happened when a fetch result reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result is now the entry's authoritative value (or error).
    Applied,
    /// The entry was invalidated while the fetch was in flight; the result
    /// was stored but the entry stays stale.
    Superseded,
    /// The entry was cleared or evicted while the fetch was in flight; the
    /// result was dropped.
    Discarded,
}

struct Slot {
    base: Option<Value>,
    visible: Option<Value>,
    layers: Vec<PatchLayer>,
    status: EntryStatus,
    error: Option<SyncError>,
    updated_at: Option<Timestamp>,
    generation: u64,
}

impl Slot {
    fn new() -> Self {
        Self {
            base: None,
            visible: None,
            layers: Vec::new(),
            status: EntryStatus::Uninitialized,
            error: None,
            updated_at: None,
            generation: 0,
        }
    }

    fn recompute(&mut self) {
        self.visible = self.base.clone().map(|mut value| {
            for layer in &self.layers {
                layer.apply(&mut value);
            }
            value
        });
    }

    fn accept(&mut self, value: Value, drop_committed: bool) {
        self.base = Some(value);
        if drop_committed {
            self.layers.retain(|layer| !layer.committed);
        }
        self.recompute();
        self.updated_at = Some(Utc::now());
        self.error = None;
    }
}

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<ResourceKey, Slot>,
    tags: TagIndex,
    inflight: HashMap<ResourceKey, InFlight>,
    refetchers: HashMap<ResourceKey, Refetcher>,
    stats: CacheStats,
    next_patch: u64,
    next_fetch: u64,
    batch_depth: usize,
    queued: Vec<ResourceKey>,
}

impl StoreState {
    fn queue(&mut self, key: &ResourceKey) {
        if !self.queued.contains(key) {
            self.queued.push(key.clone());
        }
    }

    fn slot(&mut self, key: &ResourceKey) -> &mut Slot {
        self.entries.entry(key.clone()).or_insert_with(Slot::new)
    }

    fn mark_stale(&mut self, key: &ResourceKey) -> bool {
        let Some(slot) = self.entries.get_mut(key) else {
            return false;
        };
        slot.generation += 1;
        let affected = match slot.status {
            EntryStatus::Uninitialized => false,
            EntryStatus::Valid | EntryStatus::Error => {
                slot.status = EntryStatus::Stale;
                true
            }
            EntryStatus::Stale | EntryStatus::Loading => true,
        };
        if affected {
            self.stats.invalidations += 1;
            self.queue(key);
        }
        affected
    }

    fn remove_key(&mut self, key: &ResourceKey) {
        self.entries.remove(key);
        self.tags.remove_key(key);
        self.refetchers.remove(key);
        self.inflight.remove(key);
    }
}

struct StoreInner {
    config: CacheConfig,
    state: Mutex<StoreState>,
    bus: Mutex<SubscriptionBus>,
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bus(&self) -> MutexGuard<'_, SubscriptionBus> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush queued notifications unless a batch is open.
    fn finish(&self, mut state: MutexGuard<'_, StoreState>) {
        if state.batch_depth > 0 || state.queued.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut state.queued);
        let events = keys
            .into_iter()
            .map(|key| {
                let status = state
                    .entries
                    .get(&key)
                    .map(|slot| slot.status)
                    .unwrap_or(EntryStatus::Uninitialized);
                ChangeEvent { key, status }
            })
            .collect::<Vec<_>>();
        drop(state);

        let deliveries = self.bus().collect(events);
        SubscriptionBus::deliver(deliveries);
    }

    fn evict_if_unused(&self, key: &ResourceKey) {
        let mut state = self.state();
        let unused = match state.entries.get(key) {
            Some(slot) => {
                slot.layers.iter().all(|layer| layer.committed) && !state.inflight.contains_key(key)
            }
            None => false,
        };
        if unused {
            state.remove_key(key);
            state.stats.evictions += 1;
            tracing::debug!(key = %key, "evicted unused cache entry");
        }
    }

    fn consistency_error(&self, key: &ResourceKey, reason: &str) -> SyncError {
        tracing::error!(key = %key, reason, "cache consistency violated");
        if self.config.strict_consistency {
            panic!("cache consistency violated for {}: {}", key, reason);
        }
        SyncError::CacheConsistency {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Release for StoreInner {
    fn release(&self, key: &ResourceKey, id: ListenerId) {
        let remaining = self.bus().remove(key, id);
        if remaining == 0 && self.config.evict_unused {
            self.evict_if_unused(key);
        }
    }
}

/// Shared handle to the process-wide cache.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

/// Non-owning handle, used by listeners and refetchers stored inside the cache.
#[derive(Clone)]
pub struct WeakCacheStore {
    inner: Weak<StoreInner>,
}

impl WeakCacheStore {
    pub fn upgrade(&self) -> Option<CacheStore> {
        self.inner.upgrade().map(|inner| CacheStore { inner })
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: Mutex::new(StoreState::default()),
                bus: Mutex::new(SubscriptionBus::default()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakCacheStore {
        WeakCacheStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Snapshot of the entry at `key`, if one exists. No side effects.
    pub fn get(&self, key: &ResourceKey) -> Option<CacheEntry> {
        let entry = {
            let state = self.inner.state();
            let slot = state.entries.get(key)?;
            CacheEntry {
                key: key.clone(),
                value: slot.visible.clone(),
                status: slot.status,
                error: slot.error.clone(),
                subscriber_count: 0,
                pending_patches: slot.layers.iter().filter(|l| !l.committed).count(),
                updated_at: slot.updated_at,
            }
        };
        Some(CacheEntry {
            subscriber_count: self.subscriber_count(key),
            ..entry
        })
    }

    /// Visible value at `key`, if any.
    pub fn value(&self, key: &ResourceKey) -> Option<Value> {
        self.inner
            .state()
            .entries
            .get(key)
            .and_then(|slot| slot.visible.clone())
    }

    pub fn status(&self, key: &ResourceKey) -> EntryStatus {
        self.inner
            .state()
            .entries
            .get(key)
            .map(|slot| slot.status)
            .unwrap_or(EntryStatus::Uninitialized)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.inner.state().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.inner.state().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.state().stats.clone()
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        let mut state = self.inner.state();
        if hit {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Replace the server value at `key` and mark it valid.
    pub fn set(&self, key: &ResourceKey, value: Value) {
        let mut state = self.inner.state();
        let slot = state.slot(key);
        slot.accept(value, true);
        slot.status = EntryStatus::Valid;
        state.queue(key);
        self.inner.finish(state);
    }

    /// Record a failed fetch. The last good value stays visible.
    pub fn set_error(&self, key: &ResourceKey, error: SyncError) {
        let mut state = self.inner.state();
        let slot = state.slot(key);
        slot.status = EntryStatus::Error;
        slot.error = Some(error);
        state.queue(key);
        self.inner.finish(state);
    }

    /// Mark one entry stale, keeping its value. Returns false if there was
    /// nothing to invalidate.
    pub fn invalidate_key(&self, key: &ResourceKey) -> bool {
        let mut state = self.inner.state();
        let affected = state.mark_stale(key);
        self.inner.finish(state);
        if affected {
            tracing::debug!(key = %key, "invalidated cache entry");
        }
        affected
    }

    /// Mark every entry registered under a tag covered by `tag` stale.
    pub fn invalidate_tag(&self, tag: &Tag) -> Vec<ResourceKey> {
        self.invalidate_tags(std::slice::from_ref(tag))
    }

    /// Mark every entry reached by any of `tags` stale, with one notification
    /// per affected key.
    pub fn invalidate_tags(&self, tags: &[Tag]) -> Vec<ResourceKey> {
        let mut state = self.inner.state();
        let mut targets: Vec<ResourceKey> = tags
            .iter()
            .flat_map(|tag| state.tags.resolve(tag))
            .collect();
        targets.sort();
        targets.dedup();
        let affected: Vec<ResourceKey> = targets
            .into_iter()
            .filter(|key| state.mark_stale(key))
            .collect();
        self.inner.finish(state);
        if !affected.is_empty() {
            let tags = tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(",");
            tracing::debug!(tags = %tags, entries = affected.len(), "invalidated tagged entries");
        }
        affected
    }

    /// Mark every entry stale.
    pub fn invalidate_all(&self) -> Vec<ResourceKey> {
        let mut state = self.inner.state();
        let mut keys: Vec<ResourceKey> = state.entries.keys().cloned().collect();
        keys.sort();
        let affected = keys.into_iter().filter(|key| state.mark_stale(key)).collect();
        self.inner.finish(state);
        affected
    }

    /// Apply an optimistic change to the visible value at `key`.
    ///
    /// Returns `None` (and changes nothing) if the key holds no value yet.
    pub fn patch(&self, key: &ResourceKey, updater: Updater) -> Option<OptimisticPatch> {
        let mut state = self.inner.state();
        state.next_patch += 1;
        let id = PatchId(state.next_patch);
        let slot = state.entries.get_mut(key)?;
        let prior_value = slot.visible.clone()?;
        let mut applied = prior_value.clone();
        updater(&mut applied);
        slot.layers.push(PatchLayer {
            id,
            updater,
            committed: false,
        });
        slot.visible = Some(applied.clone());
        state.queue(key);
        self.inner.finish(state);
        tracing::debug!(key = %key, patch = %id, "applied optimistic patch");
        Some(OptimisticPatch {
            key: key.clone(),
            id,
            prior_value,
            applied,
        })
    }

    /// Undo one optimistic patch, keeping every other layer on the entry.
    pub fn rollback(&self, patch: &OptimisticPatch) -> SyncResult<()> {
        let mut state = self.inner.state();
        let position = match state.entries.get(&patch.key) {
            None => Err("rollback against an entry that no longer exists"),
            Some(slot) => slot
                .layers
                .iter()
                .position(|layer| layer.id == patch.id)
                .ok_or("rollback of a patch that is no longer applied"),
        };
        let position = match position {
            Ok(position) => position,
            Err(reason) => {
                drop(state);
                return Err(self.inner.consistency_error(&patch.key, reason));
            }
        };
        if let Some(slot) = state.entries.get_mut(&patch.key) {
            slot.layers.remove(position);
            slot.recompute();
        }
        state.stats.rollbacks += 1;
        state.queue(&patch.key);
        self.inner.finish(state);
        tracing::debug!(key = %patch.key, patch = %patch.id, "rolled back optimistic patch");
        Ok(())
    }

    /// Mark a patch as confirmed by the server. The visible value does not change.
    pub fn commit(&self, patch: &OptimisticPatch) {
        let mut state = self.inner.state();
        let layer = state
            .entries
            .get_mut(&patch.key)
            .and_then(|slot| slot.layers.iter_mut().find(|layer| layer.id == patch.id));
        match layer {
            Some(layer) => layer.committed = true,
            None => tracing::debug!(key = %patch.key, patch = %patch.id, "commit of a patch already superseded"),
        }
    }

    /// Run `f` with notifications coalesced to one per affected key.
    pub fn batch<R>(&self, f: impl FnOnce(&CacheStore) -> R) -> R {
        self.inner.state().batch_depth += 1;
        let guard = BatchGuard { store: self };
        let result = f(self);
        drop(guard);
        result
    }

    /// Drop every entry, tag, refetcher and in-flight record.
    ///
    /// Subscribers stay registered and are told their entry is gone.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        let keys: Vec<ResourceKey> = state.entries.keys().cloned().collect();
        state.entries.clear();
        state.tags.clear();
        state.inflight.clear();
        state.refetchers.clear();
        for key in &keys {
            state.queue(key);
        }
        self.inner.finish(state);
    }

    /// Remove one entry outright.
    pub fn evict(&self, key: &ResourceKey) -> bool {
        let mut state = self.inner.state();
        let existed = state.entries.contains_key(key);
        state.remove_key(key);
        if existed {
            state.stats.evictions += 1;
            state.queue(key);
        }
        self.inner.finish(state);
        existed
    }

    // ------------------------------------------------------------------------
    // Tags and refetchers
    // ------------------------------------------------------------------------

    /// Replace the tags `key` is registered under.
    pub fn register_tags(&self, key: &ResourceKey, tags: Vec<Tag>) {
        self.inner.state().tags.register(key, tags);
    }

    /// Add tags to `key` without dropping existing ones.
    pub fn extend_tags(&self, key: &ResourceKey, tags: Vec<Tag>) {
        self.inner.state().tags.extend(key, tags);
    }

    pub fn tags_for(&self, key: &ResourceKey) -> Vec<Tag> {
        self.inner.state().tags.tags_for(key)
    }

    pub fn keys_for_tag(&self, tag: &Tag) -> Vec<ResourceKey> {
        self.inner.state().tags.resolve(tag)
    }

    pub fn register_refetcher(&self, key: &ResourceKey, refetcher: Refetcher) {
        self.inner.state().refetchers.insert(key.clone(), refetcher);
    }

    pub fn has_refetcher(&self, key: &ResourceKey) -> bool {
        self.inner.state().refetchers.contains_key(key)
    }

    pub fn refetcher(&self, key: &ResourceKey) -> Option<Refetcher> {
        self.inner.state().refetchers.get(key).cloned()
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Register `listener` for changes to `key`. Dropping the returned
    /// handle unsubscribes.
    pub fn subscribe(
        &self,
        key: &ResourceKey,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let (id, active) = self.inner.bus().add(key, Arc::new(listener));
        let inner: Arc<StoreInner> = Arc::clone(&self.inner);
        let owner: Weak<dyn Release> = Arc::downgrade(&inner) as Weak<dyn Release>;
        Subscription::new(owner, key.clone(), id, active)
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner.bus().count(key)
    }

    // ------------------------------------------------------------------------
    // Fetch bookkeeping
    // ------------------------------------------------------------------------

    /// Join the fetch in flight for `key`, or start one built by `launch`.
    ///
    /// Returns the shared fetch and whether an existing one was joined.
    pub(crate) fn begin_fetch(
        &self,
        key: &ResourceKey,
        launch: impl FnOnce(FetchTicket) -> SharedFetch,
    ) -> (SharedFetch, bool) {
        let mut state = self.inner.state();
        if let Some(inflight) = state.inflight.get(key) {
            let fetch = inflight.fetch.clone();
            state.stats.deduplicated += 1;
            return (fetch, true);
        }
        state.next_fetch += 1;
        let id = state.next_fetch;
        let slot = state.slot(key);
        slot.status = EntryStatus::Loading;
        let ticket = FetchTicket {
            id,
            generation: slot.generation,
        };
        state.stats.fetches += 1;
        let fetch = launch(ticket);
        state.inflight.insert(
            key.clone(),
            InFlight {
                id,
                fetch: fetch.clone(),
            },
        );
        state.queue(key);
        self.inner.finish(state);
        (fetch, false)
    }

    /// Store the result of a fetch started with `ticket`.
    pub(crate) fn complete_fetch(
        &self,
        key: &ResourceKey,
        ticket: FetchTicket,
        result: &SyncResult<Value>,
    ) -> FetchOutcome {
        let mut state = self.inner.state();
        if !state.inflight.get(key).is_some_and(|f| f.id == ticket.id) {
            tracing::debug!(key = %key, "fetch result dropped; entry was removed");
            return FetchOutcome::Discarded;
        }
        state.inflight.remove(key);
        let slot = state.slot(key);
        let superseded = slot.generation != ticket.generation;
        match result {
            Ok(value) => {
                slot.accept(value.clone(), !superseded);
                slot.status = if superseded {
                    EntryStatus::Stale
                } else {
                    EntryStatus::Valid
                };
            }
            Err(err) => {
                slot.error = Some(err.clone());
                slot.status = if superseded {
                    EntryStatus::Stale
                } else {
                    EntryStatus::Error
                };
            }
        }
        state.queue(key);
        self.inner.finish(state);
        if self.inner.config.evict_unused && self.subscriber_count(key) == 0 {
            self.inner.evict_if_unused(key);
        }
        if superseded {
            FetchOutcome::Superseded
        } else {
            FetchOutcome::Applied
        }
    }

    pub fn is_fetching(&self, key: &ResourceKey) -> bool {
        self.inner.state().inflight.contains_key(key)
    }
}

struct BatchGuard<'a> {
    store: &'a CacheStore,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.inner.state();
        state.batch_depth = state.batch_depth.saturating_sub(1);
        if std::thread::panicking() {
            return;
        }
        self.store.inner.finish(state);
    }
}
