//! Cache key definitions.
//!
//! Keys are pure functions of a query's shape. Free-form parts (the search
//! string) are length-prefixed so that no two shapes render to the same key.

use std::fmt;

use uuid::Uuid;

/// Key of the cached "recent activity" summary.
pub const RECENT_SUMMARY_KEY: &str = "agent:recent-summary";

/// Named set of keys that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheGroup {
    /// Paginated listings, including per-tag listings.
    EchoPages,
    /// "Today" listings for both visibility variants.
    TodayEchos,
}

impl CacheGroup {
    pub const ALL: [CacheGroup; 2] = [CacheGroup::EchoPages, CacheGroup::TodayEchos];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheGroup::EchoPages => "echo-page-cache",
            CacheGroup::TodayEchos => "today-echos",
        }
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn echo_by_id_key(id: Uuid) -> String {
    format!("echo:id:{id}")
}

pub fn echo_page_key(page: u32, page_size: u32, search: &str, show_private: bool) -> String {
    format!(
        "echo:page:{page}:{page_size}:{}:{}:{search}",
        visibility(show_private),
        search.len()
    )
}

pub fn echo_tag_page_key(
    tag_id: Uuid,
    page: u32,
    page_size: u32,
    search: &str,
    show_private: bool,
) -> String {
    format!(
        "echo:tag:{tag_id}:{page}:{page_size}:{}:{}:{search}",
        visibility(show_private),
        search.len()
    )
}

pub fn today_echos_key(show_private: bool) -> String {
    format!("echo:today:{}", visibility(show_private))
}

fn visibility(show_private: bool) -> &'static str {
    if show_private { "all" } else { "public" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_shapes_share_a_key() {
        assert_eq!(
            echo_page_key(1, 10, "rust", false),
            echo_page_key(1, 10, "rust", false)
        );
    }

    #[test]
    fn visibility_and_paging_split_keys() {
        let base = echo_page_key(1, 10, "", false);
        assert_ne!(base, echo_page_key(1, 10, "", true));
        assert_ne!(base, echo_page_key(2, 10, "", false));
        assert_ne!(base, echo_page_key(1, 20, "", false));
        assert_ne!(today_echos_key(true), today_echos_key(false));
    }

    #[test]
    fn separators_inside_search_cannot_forge_another_shape() {
        // Without the length prefix both would read "...:public:a:b".
        let a = echo_page_key(1, 10, "a:b", false);
        let b = echo_page_key(1, 10, "b", false);
        assert_ne!(a, b);
        assert_ne!(
            echo_page_key(1, 10, "3:x", false),
            echo_page_key(1, 10, "x", false)
        );
    }

    #[test]
    fn tag_pages_do_not_collide_with_plain_pages() {
        let tag = Uuid::new_v4();
        assert_ne!(
            echo_tag_page_key(tag, 1, 10, "", false),
            echo_page_key(1, 10, "", false)
        );
    }
}
