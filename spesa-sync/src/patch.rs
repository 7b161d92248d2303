//! Optimistic patches and their undo handles.
//!
//! Every patch is a re-applicable updater layered on top of the entry's
//! server-confirmed value. Rolling one back removes only its own layer and
//! replays the others, so overlapping mutations on the same key compose:
//! a failed earlier mutation never clobbers a later one's change.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::SyncResult;
use crate::key::ResourceKey;
use crate::store::CacheStore;

/// Pure, re-applicable change to a cached value.
pub type Updater = Arc<dyn Fn(&mut Value) + Send + Sync>;

/// Identity of one applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(pub(crate) u64);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch#{}", self.0)
    }
}

/// One layer on an entry's patch stack.
#[derive(Clone)]
pub(crate) struct PatchLayer {
    pub(crate) id: PatchId,
    pub(crate) updater: Updater,
    pub(crate) committed: bool,
}

impl PatchLayer {
    pub(crate) fn apply(&self, value: &mut Value) {
        (self.updater)(value);
    }
}

/// Record of one optimistic change, kept for the duration of a mutation.
#[derive(Debug, Clone)]
pub struct OptimisticPatch {
    pub key: ResourceKey,
    pub id: PatchId,
    /// Visible value immediately before the patch.
    pub prior_value: Value,
    /// Visible value immediately after the patch.
    pub applied: Value,
}

/// Patches taken by one mutation. Consumed by exactly one of commit or rollback.
#[derive(Debug, Default)]
#[must_use = "a patch set must be committed or rolled back"]
pub struct PatchSet {
    patches: Vec<OptimisticPatch>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, patch: OptimisticPatch) {
        self.patches.push(patch);
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patches(&self) -> &[OptimisticPatch] {
        &self.patches
    }

    /// Keep the changes; the next server value for each key supersedes them.
    pub fn commit(self, store: &CacheStore) {
        store.batch(|store| {
            for patch in &self.patches {
                store.commit(patch);
            }
        });
    }

    /// Undo every patch, last applied first.
    ///
    /// All patches are attempted; the first consistency error is returned.
    pub fn rollback(self, store: &CacheStore) -> SyncResult<()> {
        store.batch(|store| {
            let mut first_error = None;
            for patch in self.patches.iter().rev() {
                if let Err(err) = store.rollback(patch) {
                    first_error.get_or_insert(err);
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

/// Handed to a mutation's optimistic hook; records every patch it applies.
pub struct Optimistic<'a> {
    store: &'a CacheStore,
    patches: PatchSet,
}

impl<'a> Optimistic<'a> {
    pub(crate) fn new(store: &'a CacheStore) -> Self {
        Self {
            store,
            patches: PatchSet::new(),
        }
    }

    pub fn store(&self) -> &CacheStore {
        self.store
    }

    /// Patch the raw JSON value at `key`. Does nothing if the key holds no value.
    pub fn update(&mut self, key: &ResourceKey, updater: impl Fn(&mut Value) + Send + Sync + 'static) {
        if let Some(patch) = self.store.patch(key, Arc::new(updater)) {
            self.patches.push(patch);
        }
    }

    /// Patch the value at `key` through its typed shape.
    ///
    /// Values that do not decode as `T` are left untouched.
    pub fn update_as<T>(&mut self, key: &ResourceKey, updater: impl Fn(&mut T) + Send + Sync + 'static)
    where
        T: Serialize + DeserializeOwned,
    {
        self.update(key, move |value| {
            let Ok(mut typed) = serde_json::from_value::<T>(value.clone()) else {
                return;
            };
            updater(&mut typed);
            if let Ok(updated) = serde_json::to_value(&typed) {
                *value = updated;
            }
        });
    }

    pub(crate) fn into_patches(self) -> PatchSet {
        self.patches
    }
}

/// Updaters for list-shaped values whose items carry an `_id`-style field.
pub mod list {
    use serde_json::Value;

    /// Append `item` to an array value.
    pub fn push(value: &mut Value, item: &Value) {
        if let Value::Array(items) = value {
            items.push(item.clone());
        }
    }

    /// Remove every element whose `id_field` equals `id`.
    pub fn remove_by_id(value: &mut Value, id_field: &str, id: &str) {
        if let Value::Array(items) = value {
            items.retain(|item| item.get(id_field).and_then(Value::as_str) != Some(id));
        }
    }

    /// Apply `f` to the element whose `id_field` equals `id`.
    pub fn update_by_id(value: &mut Value, id_field: &str, id: &str, f: impl Fn(&mut Value)) {
        if let Value::Array(items) = value {
            for item in items.iter_mut() {
                if item.get(id_field).and_then(Value::as_str) == Some(id) {
                    f(item);
                }
            }
        }
    }

    /// Add `entry` to the string set stored at `field`, if absent.
    pub fn insert_into_set(item: &mut Value, field: &str, entry: &str) {
        let Value::Object(map) = item else {
            return;
        };
        let slot = map
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(set) = slot {
            if !set.iter().any(|v| v.as_str() == Some(entry)) {
                set.push(Value::String(entry.to_string()));
            }
        }
    }

    /// Remove `entry` from the string set stored at `field`.
    pub fn remove_from_set(item: &mut Value, field: &str, entry: &str) {
        if let Some(Value::Array(set)) = item.get_mut(field) {
            set.retain(|v| v.as_str() != Some(entry));
        }
    }

    /// Shallow-merge the fields of `fields` into an object value.
    pub fn merge_fields(item: &mut Value, fields: &Value) {
        if let (Value::Object(target), Value::Object(source)) = (item, fields) {
            for (name, field) in source {
                target.insert(name.clone(), field.clone());
            }
        }
    }
}
