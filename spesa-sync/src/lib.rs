//! Spesa Sync - Client-Side Data Synchronization
//!
//! Caches server resources by key, deduplicates concurrent fetches, applies
//! optimistic patches with rollback, and refetches subscribed queries when a
//! mutation invalidates the tags they provide.
//!
//! The pieces, bottom-up:
//!
//! - [`Transport`]: one HTTP exchange, implemented by the client crate.
//! - [`CacheStore`]: the only owner of cache entries, with the tag index and
//!   the subscription bus.
//! - [`QueryEndpoint`]: cached reads, one in-flight fetch per key.
//! - [`MutationEndpoint`]: writes with optimistic patches.
//! - [`SyncClient`]: wires transport, credentials and store together.

pub mod bus;
pub mod client;
pub mod credentials;
pub mod entry;
pub mod error;
pub mod key;
pub mod mutation;
pub mod patch;
pub mod query;
pub mod store;
pub mod tag;
pub mod transport;

pub use bus::{ChangeEvent, Listener, Subscription};
pub use client::{SyncClient, Transform};
pub use credentials::{Anonymous, CredentialSource, InMemoryCredentials};
pub use entry::{CacheEntry, EntryStatus};
pub use error::{SyncError, SyncResult, NETWORK_FAILURE_MESSAGE};
pub use key::{canonical_json, ResourceKey};
pub use mutation::{InvalidatePolicy, MutationEndpoint};
pub use patch::{list, Optimistic, OptimisticPatch, PatchId, PatchSet, Updater};
pub use query::{list_tags, QueryEndpoint, QueryState};
pub use store::{CacheConfig, CacheStats, CacheStore, FetchOutcome, Refetcher, WeakCacheStore};
pub use tag::{Tag, TagIndex, LIST_ID};
pub use transport::{path_segment, Method, Request, Response, ResponseBody, Transport, TransportError};
