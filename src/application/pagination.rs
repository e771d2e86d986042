//! Offset pagination helpers.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalised page window. Construct through [`PageRequest::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Pages start at 1; sizes outside `1..=100` fall back to 10.
    pub fn new(page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Listing query: a page window plus an optional content search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoQuery {
    pub page: PageRequest,
    /// Trimmed; empty means no filter.
    pub search: String,
}

impl EchoQuery {
    pub fn new(page: u32, page_size: u32, search: Option<&str>) -> Self {
        Self {
            page: PageRequest::new(page, page_size),
            search: search.map(str::trim).unwrap_or_default().to_string(),
        }
    }

    pub fn search(&self) -> Option<&str> {
        (!self.search.is_empty()).then_some(self.search.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PageResult<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}
