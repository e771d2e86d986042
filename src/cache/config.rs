//! Cache configuration.
//!
//! Bounds for each typed namespace and for the group key registry.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_ECHO_LIMIT: usize = 500;
const DEFAULT_PAGE_LIMIT: usize = 200;
const DEFAULT_TODAY_LIMIT: usize = 4;
const DEFAULT_TEXT_LIMIT: usize = 16;
const DEFAULT_GROUP_KEY_LIMIT: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every read goes to storage and fills are discarded.
    pub enabled: bool,
    /// Maximum single-echo snapshots.
    pub echo_limit: usize,
    /// Maximum cached listing pages (plain and per-tag).
    pub page_limit: usize,
    /// Maximum cached "today" listings.
    pub today_limit: usize,
    /// Maximum derived text values such as the recent summary.
    pub text_limit: usize,
    /// Maximum keys tracked per invalidation group.
    pub group_key_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            echo_limit: DEFAULT_ECHO_LIMIT,
            page_limit: DEFAULT_PAGE_LIMIT,
            today_limit: DEFAULT_TODAY_LIMIT,
            text_limit: DEFAULT_TEXT_LIMIT,
            group_key_limit: DEFAULT_GROUP_KEY_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            echo_limit: settings.echo_limit,
            page_limit: settings.page_limit,
            today_limit: settings.today_limit,
            text_limit: settings.text_limit,
            group_key_limit: settings.group_key_limit,
        }
    }
}

impl CacheConfig {
    pub fn echo_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.echo_limit)
    }

    pub fn page_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.page_limit)
    }

    pub fn today_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.today_limit)
    }

    pub fn text_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.text_limit)
    }

    /// A page key evicted from its group is also dropped from the store, so
    /// keep this at least as large as `page_limit`.
    pub fn group_key_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.group_key_limit)
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.echo_limit, 500);
        assert_eq!(config.page_limit, 200);
        assert_eq!(config.today_limit, 4);
        assert_eq!(config.text_limit, 16);
        assert_eq!(config.group_key_limit, 1024);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            page_limit: 0,
            group_key_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.page_limit_non_zero().get(), 1);
        assert_eq!(config.group_key_limit_non_zero().get(), 1);
    }
}
