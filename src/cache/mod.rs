//! Echo read cache.
//!
//! Typed namespaces over [`KeyedCache`], group membership for bulk
//! invalidation, and a fill generation that keeps a read started before a
//! write from repopulating the cache with its pre-write snapshot.
//!
//! ```toml
//! [cache]
//! enabled = true
//! echo_limit = 500
//! page_limit = 200
//! group_key_limit = 1024
//! ```

mod config;
mod keys;
mod lock;
mod planner;
mod registry;
mod store;

pub use config::CacheConfig;
pub use keys::{
    CacheGroup, RECENT_SUMMARY_KEY, echo_by_id_key, echo_page_key, echo_tag_page_key,
    today_echos_key,
};
pub use planner::{EchoMutation, InvalidationPlan};
pub use registry::GroupRegistry;
pub use store::{FillOutcome, KeyedCache};

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::pagination::PageResult;
use crate::domain::entities::EchoRecord;

const METRIC_INVALIDATE: &str = "echoes_cache_invalidate_total";
const METRIC_FILL_SKIPPED: &str = "echoes_cache_fill_skipped_total";

/// Generation observed before a storage read; see [`EchoCache::ticket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

pub struct EchoCache {
    enabled: bool,
    generation: AtomicU64,
    echoes: KeyedCache<EchoRecord>,
    pages: KeyedCache<PageResult<EchoRecord>>,
    /// Tagged with the start of the local day they were loaded for.
    today: KeyedCache<(OffsetDateTime, Vec<EchoRecord>)>,
    text: KeyedCache<String>,
    groups: GroupRegistry,
}

impl EchoCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            generation: AtomicU64::new(0),
            echoes: KeyedCache::new("echo", config.echo_limit_non_zero()),
            pages: KeyedCache::new("page", config.page_limit_non_zero()),
            today: KeyedCache::new("today", config.today_limit_non_zero()),
            text: KeyedCache::new("text", config.text_limit_non_zero()),
            groups: GroupRegistry::new(config.group_key_limit_non_zero()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take a ticket before reading storage and hand it to the matching
    /// `fill_*` call. Any invalidation in between voids the ticket.
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.generation.load(Ordering::SeqCst))
    }

    pub fn echo(&self, id: Uuid) -> Option<EchoRecord> {
        self.read(&self.echoes, &echo_by_id_key(id))
    }

    pub fn fill_echo(&self, ticket: FillTicket, echo: EchoRecord) -> bool {
        self.fill(&self.echoes, None, echo_by_id_key(echo.id), echo, ticket)
    }

    pub fn page(&self, key: &str) -> Option<PageResult<EchoRecord>> {
        self.read(&self.pages, key)
    }

    /// Stores a listing page and registers it under the page group.
    pub fn fill_page(&self, ticket: FillTicket, key: String, page: PageResult<EchoRecord>) -> bool {
        self.fill(&self.pages, Some(CacheGroup::EchoPages), key, page, ticket)
    }

    /// A listing loaded for an earlier day counts as a miss.
    pub fn today(&self, show_private: bool, day_start: OffsetDateTime) -> Option<Vec<EchoRecord>> {
        self.read(&self.today, &today_echos_key(show_private))
            .filter(|(loaded_for, _)| *loaded_for == day_start)
            .map(|(_, echoes)| echoes)
    }

    pub fn fill_today(
        &self,
        ticket: FillTicket,
        show_private: bool,
        day_start: OffsetDateTime,
        echoes: Vec<EchoRecord>,
    ) -> bool {
        let key = today_echos_key(show_private);
        let value = (day_start, echoes);
        self.fill(&self.today, Some(CacheGroup::TodayEchos), key, value, ticket)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.read(&self.text, key)
    }

    pub fn fill_text(&self, ticket: FillTicket, key: &str, value: String) -> bool {
        self.fill(&self.text, None, key.to_string(), value, ticket)
    }

    /// Removes `key` from whichever namespace holds it.
    pub fn delete(&self, key: &str) -> bool {
        self.bump();
        let removed = self.echoes.delete(key)
            | self.pages.delete(key)
            | self.today.delete(key)
            | self.text.delete(key);
        if removed {
            counter!(METRIC_INVALIDATE, "target" => "key").increment(1);
        }
        removed
    }

    /// Removes every key registered under `group`.
    pub fn delete_group(&self, group: CacheGroup) -> usize {
        self.bump();
        let keys = self.groups.take(group);
        let store = self.group_store(group);
        let removed = keys.iter().filter(|key| store.delete(key)).count();

        counter!(METRIC_INVALIDATE, "target" => group.as_str()).increment(1);
        debug!(group = %group, tracked = keys.len(), removed, "Cache group invalidated");
        removed
    }

    pub fn apply(&self, plan: &InvalidationPlan) {
        if plan.is_empty() {
            return;
        }
        self.bump();

        if plan.all_echoes {
            self.echoes.clear();
            counter!(METRIC_INVALIDATE, "target" => "echo_all").increment(1);
        } else {
            for id in &plan.echoes {
                if self.echoes.delete(&echo_by_id_key(*id)) {
                    counter!(METRIC_INVALIDATE, "target" => "echo").increment(1);
                }
            }
        }

        for group in &plan.groups {
            self.delete_group(*group);
        }

        for key in &plan.text_keys {
            if self.text.delete(key) {
                counter!(METRIC_INVALIDATE, "target" => "text").increment(1);
            }
        }

        info!(plan = %plan, "Cache invalidation applied");
    }

    /// Drops everything, including group membership.
    pub fn clear(&self) {
        self.bump();
        self.groups.clear();
        self.echoes.clear();
        self.pages.clear();
        self.today.clear();
        self.text.clear();
    }

    pub fn group_len(&self, group: CacheGroup) -> usize {
        self.groups.len(group)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn group_store(&self, group: CacheGroup) -> &dyn GroupStore {
        match group {
            CacheGroup::EchoPages => &self.pages,
            CacheGroup::TodayEchos => &self.today,
        }
    }

    fn read<V: Clone>(&self, cache: &KeyedCache<V>, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        cache.get(key)
    }

    fn fill<V: Clone>(
        &self,
        cache: &KeyedCache<V>,
        group: Option<CacheGroup>,
        key: String,
        value: V,
        ticket: FillTicket,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        // Register before inserting: a group delete that races with this
        // fill either sees the key or has already bumped the generation.
        if let Some(group) = group
            && let Some(evicted) = self.groups.register(group, &key)
        {
            cache.delete(&evicted);
        }

        let outcome = cache.set_when(key, value, || {
            self.generation.load(Ordering::SeqCst) == ticket.0
        });

        match outcome {
            FillOutcome::Stored { evicted } => {
                if let (Some(group), Some(evicted)) = (group, evicted) {
                    debug!(group = %group, key = %evicted, "Evicted grouped cache entry");
                }
                true
            }
            FillOutcome::Rejected => {
                counter!(METRIC_FILL_SKIPPED, "namespace" => cache.namespace()).increment(1);
                debug!(namespace = cache.namespace(), "Discarded fill from a stale read");
                false
            }
        }
    }
}

/// Deletion by key, independent of the namespace's value type.
trait GroupStore {
    fn delete(&self, key: &str) -> bool;
}

impl<V: Clone> GroupStore for KeyedCache<V> {
    fn delete(&self, key: &str) -> bool {
        KeyedCache::delete(self, key)
    }
}
