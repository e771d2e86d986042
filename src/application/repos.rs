use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, PageResult},
    domain::{
        echoes::MediaDraft,
        entities::{EchoRecord, Extension, MediaRecord, TagRecord},
        types::Layout,
    },
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Filters shared by every echo listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoFilter {
    /// Case-insensitive substring of the content.
    pub search: Option<String>,
    pub include_private: bool,
    pub tag_id: Option<Uuid>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<OffsetDateTime>,
    /// Exclusive upper bound on `created_at`.
    pub created_until: Option<OffsetDateTime>,
}

/// Columns of the echo row itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoFields {
    pub content: String,
    pub private: bool,
    pub layout: Layout,
    pub extension: Option<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEchoParams {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub fields: EchoFields,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait EchoReadRepo: Send + Sync {
    async fn find_echo(&self, id: Uuid) -> Result<Option<EchoRecord>, RepoError>;

    /// Newest first.
    async fn list_echoes(
        &self,
        filter: &EchoFilter,
        page: PageRequest,
    ) -> Result<PageResult<EchoRecord>, RepoError>;

    /// Most used first, then newest.
    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError>;
}

/// Opens a transaction scope for multi-row writes.
#[async_trait]
pub trait EchoUnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn EchoTx>, RepoError>;
}

/// Writes bound to one transaction. Dropping without [`EchoTx::commit`]
/// rolls everything back.
#[async_trait]
pub trait EchoTx: Send {
    async fn find_tags_by_names(&mut self, names: &[String]) -> Result<Vec<TagRecord>, RepoError>;

    async fn increment_tag_usage(&mut self, tag_id: Uuid) -> Result<(), RepoError>;

    async fn insert_tag(&mut self, tag: &TagRecord) -> Result<(), RepoError>;

    /// Removes association rows, then the tag. False when absent.
    async fn delete_tag(&mut self, tag_id: Uuid) -> Result<bool, RepoError>;

    /// The echo as this transaction sees it, uncommitted writes included.
    async fn find_echo(&mut self, id: Uuid) -> Result<Option<EchoRecord>, RepoError>;

    async fn insert_echo(&mut self, params: &NewEchoParams) -> Result<(), RepoError>;

    /// False when the echo does not exist.
    async fn update_echo(&mut self, id: Uuid, fields: &EchoFields) -> Result<bool, RepoError>;

    /// Removes tag associations and the echo row. Media must be gone already.
    async fn delete_echo(&mut self, id: Uuid) -> Result<bool, RepoError>;

    /// Single-statement `fav_count + 1`. False when the echo does not exist.
    async fn increment_likes(&mut self, id: Uuid) -> Result<bool, RepoError>;

    /// Ordered by position.
    async fn list_media(&mut self, echo_id: Uuid) -> Result<Vec<MediaRecord>, RepoError>;

    async fn insert_media(&mut self, media: &MediaRecord) -> Result<(), RepoError>;

    /// Rewrites the content columns of an existing row, keeping its id.
    async fn overwrite_media(
        &mut self,
        media_id: Uuid,
        position: i32,
        content: &MediaDraft,
    ) -> Result<(), RepoError>;

    async fn set_media_position(&mut self, media_id: Uuid, position: i32)
    -> Result<(), RepoError>;

    async fn delete_media(&mut self, media_ids: &[Uuid]) -> Result<u64, RepoError>;

    async fn delete_media_for_echo(&mut self, echo_id: Uuid) -> Result<u64, RepoError>;

    async fn set_live_video(
        &mut self,
        image_id: Uuid,
        video_id: Option<Uuid>,
    ) -> Result<(), RepoError>;

    async fn clear_live_videos(&mut self, echo_id: Uuid) -> Result<(), RepoError>;

    async fn replace_echo_tags(&mut self, echo_id: Uuid, tag_ids: &[Uuid])
    -> Result<(), RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}
