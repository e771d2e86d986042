use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{
        echoes::store::EchoStore,
        error::AppError,
        pagination::{EchoQuery, MAX_PAGE_SIZE, PageRequest, PageResult},
        repos::EchoFilter,
    },
    cache::{echo_page_key, echo_tag_page_key},
    domain::entities::{EchoRecord, TagRecord},
    util::timezone::local_day_bounds,
};

impl EchoStore {
    /// `None` when the echo does not exist. Visibility is the caller's call.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<EchoRecord>, AppError> {
        if let Some(echo) = self.cache.echo(id) {
            return Ok(Some(echo));
        }

        let ticket = self.cache.ticket();
        let echo = self.reader.find_echo(id).await?;
        if let Some(echo) = &echo {
            self.cache.fill_echo(ticket, echo.clone());
        }
        Ok(echo)
    }

    pub async fn get_by_page(
        &self,
        query: &EchoQuery,
        show_private: bool,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        let key = echo_page_key(
            query.page.page,
            query.page.page_size,
            &query.search,
            show_private,
        );
        if let Some(page) = self.cache.page(&key) {
            return Ok(page);
        }

        let ticket = self.cache.ticket();
        let filter = EchoFilter {
            search: query.search().map(str::to_string),
            include_private: show_private,
            ..Default::default()
        };
        let page = self.reader.list_echoes(&filter, query.page).await?;
        self.cache.fill_page(ticket, key, page.clone());
        Ok(page)
    }

    /// Distinct echoes carrying the tag; shares the page cache group.
    pub async fn get_by_tag(
        &self,
        tag_id: Uuid,
        query: &EchoQuery,
        show_private: bool,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        let key = echo_tag_page_key(
            tag_id,
            query.page.page,
            query.page.page_size,
            &query.search,
            show_private,
        );
        if let Some(page) = self.cache.page(&key) {
            return Ok(page);
        }

        let ticket = self.cache.ticket();
        let filter = EchoFilter {
            search: query.search().map(str::to_string),
            include_private: show_private,
            tag_id: Some(tag_id),
            ..Default::default()
        };
        let page = self.reader.list_echoes(&filter, query.page).await?;
        self.cache.fill_page(ticket, key, page.clone());
        Ok(page)
    }

    /// `created_at` in `[start, end)`. Bypasses the cache.
    pub async fn get_by_date_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        query: &EchoQuery,
        show_private: bool,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        if end <= start {
            return Err(AppError::validation("date range end must be after its start"));
        }
        let filter = EchoFilter {
            search: query.search().map(str::to_string),
            include_private: show_private,
            created_from: Some(start),
            created_until: Some(end),
            ..Default::default()
        };
        Ok(self.reader.list_echoes(&filter, query.page).await?)
    }

    /// Echoes of the current local day, newest first, capped at one full page.
    pub async fn get_today(&self, show_private: bool) -> Result<Vec<EchoRecord>, AppError> {
        let (start, end) = local_day_bounds(OffsetDateTime::now_utc(), self.tz);
        if let Some(echoes) = self.cache.today(show_private, start) {
            return Ok(echoes);
        }

        let ticket = self.cache.ticket();
        let filter = EchoFilter {
            include_private: show_private,
            created_from: Some(start),
            created_until: Some(end),
            ..Default::default()
        };
        let page = self
            .reader
            .list_echoes(&filter, PageRequest::new(1, MAX_PAGE_SIZE))
            .await?;
        debug!(
            count = page.items.len(),
            %start,
            %end,
            show_private,
            "Loaded today's echoes"
        );

        self.cache
            .fill_today(ticket, show_private, start, page.items.clone());
        Ok(page.items)
    }

    pub async fn list_tags(&self) -> Result<Vec<TagRecord>, AppError> {
        Ok(self.reader.list_tags().await?)
    }
}
