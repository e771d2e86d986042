//! Group membership registry.
//!
//! Tracks which cache keys belong to each invalidation group. Every group is
//! an LRU set with a fixed bound; the caller must drop an evicted key from
//! the store, otherwise the entry would escape the next group delete.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::keys::CacheGroup;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::registry";

pub struct GroupRegistry {
    limit: NonZeroUsize,
    groups: Mutex<HashMap<CacheGroup, LruCache<String, ()>>>,
}

impl GroupRegistry {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            limit,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `key` to `group`, returning a key that fell out of the bound.
    pub fn register(&self, group: CacheGroup, key: &str) -> Option<String> {
        let mut groups = mutex_lock(&self.groups, SOURCE, "register");
        let members = groups
            .entry(group)
            .or_insert_with(|| LruCache::new(self.limit));
        members
            .push(key.to_string(), ())
            .map(|(old_key, _)| old_key)
            .filter(|old_key| old_key.as_str() != key)
    }

    /// Removes and returns every key registered under `group`.
    pub fn take(&self, group: CacheGroup) -> Vec<String> {
        mutex_lock(&self.groups, SOURCE, "take")
            .remove(&group)
            .map(|members| members.into_iter().map(|(key, _)| key).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, group: CacheGroup, key: &str) -> bool {
        mutex_lock(&self.groups, SOURCE, "contains")
            .get(&group)
            .is_some_and(|members| members.contains(key))
    }

    pub fn len(&self, group: CacheGroup) -> usize {
        mutex_lock(&self.groups, SOURCE, "len")
            .get(&group)
            .map_or(0, LruCache::len)
    }

    pub fn clear(&self) {
        mutex_lock(&self.groups, SOURCE, "clear").clear();
    }
}
