//! Invalidation tags and the tag-to-key index.
//!
//! Queries register their key under the tags they provide; mutations name
//! the tags they invalidate. A tag without an id covers every tag of the
//! same kind, so invalidating `ShoppingList` reaches `ShoppingList:LIST` and
//! `ShoppingList:<item>` alike, while `ShoppingList:LIST` only reaches keys
//! that registered exactly that tag.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::key::ResourceKey;

/// Conventional id for "the whole collection".
pub const LIST_ID: &str = "LIST";

/// A label grouping cache entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    kind: String,
    id: Option<String>,
}

impl Tag {
    /// A tag covering every entry of `kind`.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }

    pub fn id(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id.into()),
        }
    }

    /// The collection tag for `kind` (`<kind>:LIST`).
    pub fn list(kind: impl Into<String>) -> Self {
        Self::id(kind, LIST_ID)
    }

    pub fn kind_name(&self) -> &str {
        &self.kind
    }

    pub fn id_value(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns true if invalidating `self` must reach entries that provide `provided`.
    pub fn covers(&self, provided: &Tag) -> bool {
        self.kind == provided.kind && (self.id.is_none() || self.id == provided.id)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => f.write_str(&self.kind),
        }
    }
}

/// Many-to-many relation between tags and resource keys.
#[derive(Debug, Default)]
pub struct TagIndex {
    by_tag: HashMap<Tag, HashSet<ResourceKey>>,
    by_key: HashMap<ResourceKey, HashSet<Tag>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tags `key` is registered under.
    pub fn register(&mut self, key: &ResourceKey, tags: impl IntoIterator<Item = Tag>) {
        self.remove_key(key);
        let tags: HashSet<Tag> = tags.into_iter().collect();
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_key.insert(key.clone(), tags);
    }

    /// Add tags without dropping the ones already registered.
    pub fn extend(&mut self, key: &ResourceKey, tags: impl IntoIterator<Item = Tag>) {
        let current = self.by_key.entry(key.clone()).or_default();
        for tag in tags {
            if current.insert(tag.clone()) {
                self.by_tag.entry(tag).or_default().insert(key.clone());
            }
        }
    }

    pub fn remove_key(&mut self, key: &ResourceKey) {
        if let Some(tags) = self.by_key.remove(key) {
            for tag in tags {
                if let Some(keys) = self.by_tag.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.by_tag.remove(&tag);
                    }
                }
            }
        }
    }

    /// All keys registered under a tag covered by `tag`, in a stable order.
    pub fn resolve(&self, tag: &Tag) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = match tag.id {
            Some(_) => self
                .by_tag
                .get(tag)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut found = HashSet::new();
                for (provided, keys) in &self.by_tag {
                    if tag.covers(provided) {
                        found.extend(keys.iter().cloned());
                    }
                }
                found.into_iter().collect()
            }
        };
        keys.sort();
        keys
    }

    pub fn tags_for(&self, key: &ResourceKey) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .by_key
            .get(key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_key.clear();
    }
}
