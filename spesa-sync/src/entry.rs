//! Cache entry snapshots.
//!
//! The store owns entries exclusively; callers only ever see a
//! [`CacheEntry`] copy taken at read time, carrying the value together with
//! its freshness metadata.

use chrono::Utc;
use serde_json::Value;
use spesa_core::Timestamp;
use std::time::Duration;

use crate::error::SyncError;
use crate::key::ResourceKey;

/// Freshness state of a cache entry.
///
/// Transitions: `Uninitialized -> Loading -> (Valid | Error)`,
/// `Valid -> Stale` on invalidation, `Stale -> Loading` on refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Uninitialized,
    Loading,
    Valid,
    Stale,
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Valid => "valid",
            Self::Stale => "stale",
            Self::Error => "error",
        }
    }

    /// A query that finds the entry in this state must go to the network.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Stale | Self::Error)
    }
}

/// Read-only snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResourceKey,
    /// Last known value with any pending optimistic patches applied.
    pub value: Option<Value>,
    pub status: EntryStatus,
    pub error: Option<SyncError>,
    pub subscriber_count: usize,
    /// Optimistic patches not yet folded into a server-confirmed value.
    pub pending_patches: usize,
    /// When the value was last replaced by a server response.
    pub updated_at: Option<Timestamp>,
}

impl CacheEntry {
    pub fn is_loading(&self) -> bool {
        self.status == EntryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == EntryStatus::Error
    }

    pub fn is_valid(&self) -> bool {
        self.status == EntryStatus::Valid
    }

    pub fn is_stale(&self) -> bool {
        self.status == EntryStatus::Stale
    }

    /// Time since the server last confirmed the value.
    pub fn staleness(&self) -> Option<Duration> {
        self.updated_at.map(|updated_at| {
            let now = Utc::now();
            if now > updated_at {
                (now - updated_at).to_std().unwrap_or(Duration::ZERO)
            } else {
                Duration::ZERO
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: EntryStatus, updated_at: Option<Timestamp>) -> CacheEntry {
        CacheEntry {
            key: ResourceKey::unit("profile"),
            value: None,
            status,
            error: None,
            subscriber_count: 0,
            pending_patches: 0,
            updated_at,
        }
    }

    #[test]
    fn fetch_is_needed_only_without_a_usable_value() {
        assert!(EntryStatus::Uninitialized.needs_fetch());
        assert!(EntryStatus::Stale.needs_fetch());
        assert!(EntryStatus::Error.needs_fetch());
        assert!(!EntryStatus::Valid.needs_fetch());
        assert!(!EntryStatus::Loading.needs_fetch());
    }

    #[test]
    fn staleness_grows_with_age() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let staleness = entry(EntryStatus::Valid, Some(past)).staleness().unwrap();
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
        assert!(entry(EntryStatus::Loading, None).staleness().is_none());
    }

    #[test]
    fn status_helpers() {
        assert!(entry(EntryStatus::Stale, None).is_stale());
        assert!(entry(EntryStatus::Error, None).is_error());
        assert_eq!(EntryStatus::Valid.as_str(), "valid");
    }
}
