//! Typed key/value storage.
//!
//! Each logical namespace gets its own `KeyedCache<V>`, so a lookup can never
//! observe a value of the wrong shape.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use lru::LruCache;
use metrics::counter;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_HIT: &str = "echoes_cache_hit_total";
const METRIC_MISS: &str = "echoes_cache_miss_total";
const METRIC_EVICT: &str = "echoes_cache_evict_total";

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Stored { evicted: Option<String> },
    Rejected,
}

/// Bounded LRU map from string keys to cloneable snapshots.
pub struct KeyedCache<V> {
    namespace: &'static str,
    entries: RwLock<LruCache<String, V>>,
}

impl<V: Clone> KeyedCache<V> {
    pub fn new(namespace: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            namespace,
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// A miss is the normal trigger for the storage fallback.
    pub fn get(&self, key: &str) -> Option<V> {
        // LRU promotion mutates, hence the write lock.
        let value = rw_write(&self.entries, SOURCE, "get").get(key).cloned();
        let metric = if value.is_some() { METRIC_HIT } else { METRIC_MISS };
        counter!(metric, "namespace" => self.namespace).increment(1);
        value
    }

    /// Inserts or replaces `key`. Returns the key pushed out by capacity, if any.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<String> {
        match self.set_when(key.into(), value, || true) {
            FillOutcome::Stored { evicted } => evicted,
            FillOutcome::Rejected => None,
        }
    }

    /// Inserts only if `admit` still holds while the entry lock is held.
    pub fn set_when(&self, key: String, value: V, admit: impl FnOnce() -> bool) -> FillOutcome {
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        if !admit() {
            return FillOutcome::Rejected;
        }

        let evicted = entries
            .push(key.clone(), value)
            .map(|(old_key, _)| old_key)
            .filter(|old_key| *old_key != key);
        drop(entries);

        if evicted.is_some() {
            counter!(METRIC_EVICT, "namespace" => self.namespace).increment(1);
        }
        FillOutcome::Stored { evicted }
    }

    pub fn delete(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "delete").pop(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> KeyedCache<String> {
        KeyedCache::new("test", NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn get_set_delete() {
        let cache = cache(4);
        assert!(cache.get("a").is_none());

        cache.set("a", "one".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("one"));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn replacing_a_key_is_not_an_eviction() {
        let cache = cache(1);
        assert_eq!(cache.set("a", "one".to_string()), None);
        assert_eq!(cache.set("a", "two".to_string()), None);
        assert_eq!(cache.get("a").as_deref(), Some("two"));
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        let _ = cache.get("a");

        let evicted = cache.set("c", "3".to_string());
        assert_eq!(evicted.as_deref(), Some("b"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn rejected_fill_leaves_cache_untouched() {
        let cache = cache(2);
        let outcome = cache.set_when("a".to_string(), "1".to_string(), || false);
        assert_eq!(outcome, FillOutcome::Rejected);
        assert!(cache.is_empty());
    }
}
