//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{ExtensionKind, Layout, MediaKind, MediaSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchoRecord {
    pub id: Uuid,
    pub content: String,
    pub username: String,
    pub user_id: Uuid,
    /// Ordered by `MediaRecord::position`.
    pub media: Vec<MediaRecord>,
    pub tags: Vec<TagRecord>,
    pub private: bool,
    pub layout: Layout,
    pub extension: Option<Extension>,
    pub fav_count: i64,
    pub created_at: OffsetDateTime,
}

impl EchoRecord {
    /// Ids of videos that are the moving half of a live photo in this echo.
    pub fn live_video_ids(&self) -> Vec<Uuid> {
        self.media.iter().filter_map(|m| m.live_video_id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub echo_id: Uuid,
    pub position: i32,
    pub url: String,
    pub kind: MediaKind,
    pub source: Option<MediaSource>,
    pub object_key: Option<String>,
    pub width: i32,
    pub height: i32,
    /// Set on image rows only; points at a video row of the same echo.
    pub live_video_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub id: Uuid,
    pub name: String,
    pub usage_count: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub kind: ExtensionKind,
    pub payload: String,
}
