//! In-memory repositories used when no database is configured and by tests.
//!
//! A transaction holds the state lock for its whole life and works on a copy;
//! commit swaps the copy in, drop discards it.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    application::{
        pagination::{PageRequest, PageResult},
        repos::{
            EchoFields, EchoFilter, EchoReadRepo, EchoTx, EchoUnitOfWork, NewEchoParams, RepoError,
        },
    },
    domain::{
        echoes::MediaDraft,
        entities::{EchoRecord, MediaRecord, TagRecord},
    },
};

#[derive(Debug, Clone)]
struct EchoRow {
    user_id: Uuid,
    username: String,
    fields: EchoFields,
    fav_count: i64,
    created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    echoes: HashMap<Uuid, EchoRow>,
    media: HashMap<Uuid, MediaRecord>,
    tags: HashMap<Uuid, TagRecord>,
    /// `(echo_id, tag_id)`
    echo_tags: BTreeSet<(Uuid, Uuid)>,
}

impl MemoryState {
    fn assemble(&self, id: Uuid) -> Option<EchoRecord> {
        let row = self.echoes.get(&id)?;

        let mut media: Vec<MediaRecord> = self
            .media
            .values()
            .filter(|m| m.echo_id == id)
            .cloned()
            .collect();
        media.sort_by_key(|m| (m.position, m.id));

        let mut tags: Vec<TagRecord> = self
            .echo_tags
            .range((id, Uuid::nil())..=(id, Uuid::from_u128(u128::MAX)))
            .filter_map(|(_, tag_id)| self.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Some(EchoRecord {
            id,
            content: row.fields.content.clone(),
            username: row.username.clone(),
            user_id: row.user_id,
            media,
            tags,
            private: row.fields.private,
            layout: row.fields.layout,
            extension: row.fields.extension.clone(),
            fav_count: row.fav_count,
            created_at: row.created_at,
        })
    }

    fn matches(&self, id: Uuid, row: &EchoRow, filter: &EchoFilter) -> bool {
        if !filter.include_private && row.fields.private {
            return false;
        }
        if let Some(search) = &filter.search {
            let needle = search.to_lowercase();
            if !row.fields.content.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if filter
            .tag_id
            .is_some_and(|tag_id| !self.echo_tags.contains(&(id, tag_id)))
        {
            return false;
        }
        if filter.created_from.is_some_and(|from| row.created_at < from) {
            return false;
        }
        if filter
            .created_until
            .is_some_and(|until| row.created_at >= until)
        {
            return false;
        }
        true
    }

    fn remove_tag_links(&mut self, echo_id: Uuid) {
        self.echo_tags.retain(|(echo, _)| *echo != echo_id);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    state: Arc<Mutex<MemoryState>>,
    transactions: Arc<AtomicUsize>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions begun so far, committed or not.
    pub fn transactions_started(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    pub async fn echo_count(&self) -> usize {
        self.state.lock().await.echoes.len()
    }

    pub async fn media_count(&self) -> usize {
        self.state.lock().await.media.len()
    }
}

#[async_trait]
impl EchoReadRepo for InMemoryRepositories {
    async fn find_echo(&self, id: Uuid) -> Result<Option<EchoRecord>, RepoError> {
        Ok(self.state.lock().await.assemble(id))
    }

    async fn list_echoes(
        &self,
        filter: &EchoFilter,
        page: PageRequest,
    ) -> Result<PageResult<EchoRecord>, RepoError> {
        let state = self.state.lock().await;

        let mut ids: Vec<(time::OffsetDateTime, Uuid)> = state
            .echoes
            .iter()
            .filter(|(id, row)| state.matches(**id, row, filter))
            .map(|(id, row)| (row.created_at, *id))
            .collect();
        ids.sort_by(|a, b| b.cmp(a));

        let total = ids.len() as u64;
        let items = ids
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .filter_map(|(_, id)| state.assemble(id))
            .collect();

        Ok(PageResult { items, total })
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut tags: Vec<TagRecord> = state.tags.values().cloned().collect();
        tags.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.name.cmp(&b.name))
        });
        Ok(tags)
    }
}

#[async_trait]
impl EchoUnitOfWork for InMemoryRepositories {
    async fn begin(&self) -> Result<Box<dyn EchoTx>, RepoError> {
        let guard = self.state.clone().lock_owned().await;
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl EchoTx for MemoryTx {
    async fn find_tags_by_names(&mut self, names: &[String]) -> Result<Vec<TagRecord>, RepoError> {
        Ok(self
            .working
            .tags
            .values()
            .filter(|tag| names.contains(&tag.name))
            .cloned()
            .collect())
    }

    async fn increment_tag_usage(&mut self, tag_id: Uuid) -> Result<(), RepoError> {
        let tag = self
            .working
            .tags
            .get_mut(&tag_id)
            .ok_or(RepoError::NotFound)?;
        tag.usage_count += 1;
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &TagRecord) -> Result<(), RepoError> {
        if self.working.tags.values().any(|t| t.name == tag.name) {
            return Err(RepoError::Duplicate {
                constraint: "tags_name_key".to_string(),
            });
        }
        self.working.tags.insert(tag.id, tag.clone());
        Ok(())
    }

    async fn delete_tag(&mut self, tag_id: Uuid) -> Result<bool, RepoError> {
        self.working.echo_tags.retain(|(_, tag)| *tag != tag_id);
        Ok(self.working.tags.remove(&tag_id).is_some())
    }

    async fn find_echo(&mut self, id: Uuid) -> Result<Option<EchoRecord>, RepoError> {
        Ok(self.working.assemble(id))
    }

    async fn insert_echo(&mut self, params: &NewEchoParams) -> Result<(), RepoError> {
        if self.working.echoes.contains_key(&params.id) {
            return Err(RepoError::Duplicate {
                constraint: "echoes_pkey".to_string(),
            });
        }
        self.working.echoes.insert(
            params.id,
            EchoRow {
                user_id: params.user_id,
                username: params.username.clone(),
                fields: params.fields.clone(),
                fav_count: 0,
                created_at: params.created_at,
            },
        );
        Ok(())
    }

    async fn update_echo(&mut self, id: Uuid, fields: &EchoFields) -> Result<bool, RepoError> {
        match self.working.echoes.get_mut(&id) {
            Some(row) => {
                row.fields = fields.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_echo(&mut self, id: Uuid) -> Result<bool, RepoError> {
        if self.working.media.values().any(|m| m.echo_id == id) {
            return Err(RepoError::Integrity {
                message: "echo still has media rows".to_string(),
            });
        }
        self.working.remove_tag_links(id);
        Ok(self.working.echoes.remove(&id).is_some())
    }

    async fn increment_likes(&mut self, id: Uuid) -> Result<bool, RepoError> {
        match self.working.echoes.get_mut(&id) {
            Some(row) => {
                row.fav_count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_media(&mut self, echo_id: Uuid) -> Result<Vec<MediaRecord>, RepoError> {
        let mut media: Vec<MediaRecord> = self
            .working
            .media
            .values()
            .filter(|m| m.echo_id == echo_id)
            .cloned()
            .collect();
        media.sort_by_key(|m| (m.position, m.id));
        Ok(media)
    }

    async fn insert_media(&mut self, media: &MediaRecord) -> Result<(), RepoError> {
        if !self.working.echoes.contains_key(&media.echo_id) {
            return Err(RepoError::InvalidInput {
                message: format!("echo {} does not exist", media.echo_id),
            });
        }
        self.working.media.insert(media.id, media.clone());
        Ok(())
    }

    async fn overwrite_media(
        &mut self,
        media_id: Uuid,
        position: i32,
        content: &MediaDraft,
    ) -> Result<(), RepoError> {
        let row = self
            .working
            .media
            .get_mut(&media_id)
            .ok_or(RepoError::NotFound)?;
        row.position = position;
        row.url = content.url.clone();
        row.kind = content.kind;
        row.source = content.source;
        row.object_key = content.object_key.clone();
        row.width = content.width;
        row.height = content.height;
        Ok(())
    }

    async fn set_media_position(
        &mut self,
        media_id: Uuid,
        position: i32,
    ) -> Result<(), RepoError> {
        let row = self
            .working
            .media
            .get_mut(&media_id)
            .ok_or(RepoError::NotFound)?;
        row.position = position;
        Ok(())
    }

    async fn delete_media(&mut self, media_ids: &[Uuid]) -> Result<u64, RepoError> {
        let mut removed = 0;
        for id in media_ids {
            if self.working.media.remove(id).is_some() {
                removed += 1;
            }
        }
        // Mirrors `ON DELETE SET NULL` on the live video reference.
        for row in self.working.media.values_mut() {
            if row.live_video_id.is_some_and(|video| media_ids.contains(&video)) {
                row.live_video_id = None;
            }
        }
        Ok(removed)
    }

    async fn delete_media_for_echo(&mut self, echo_id: Uuid) -> Result<u64, RepoError> {
        let before = self.working.media.len();
        self.working.media.retain(|_, m| m.echo_id != echo_id);
        Ok((before - self.working.media.len()) as u64)
    }

    async fn set_live_video(
        &mut self,
        image_id: Uuid,
        video_id: Option<Uuid>,
    ) -> Result<(), RepoError> {
        if let Some(video_id) = video_id.filter(|id| !self.working.media.contains_key(id)) {
            return Err(RepoError::InvalidInput {
                message: format!("live video {video_id} does not exist"),
            });
        }
        let row = self
            .working
            .media
            .get_mut(&image_id)
            .ok_or(RepoError::NotFound)?;
        row.live_video_id = video_id;
        Ok(())
    }

    async fn clear_live_videos(&mut self, echo_id: Uuid) -> Result<(), RepoError> {
        for row in self.working.media.values_mut() {
            if row.echo_id == echo_id {
                row.live_video_id = None;
            }
        }
        Ok(())
    }

    async fn replace_echo_tags(&mut self, echo_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        self.working.remove_tag_links(echo_id);
        for tag_id in tag_ids {
            if !self.working.tags.contains_key(tag_id) {
                return Err(RepoError::InvalidInput {
                    message: format!("tag {tag_id} does not exist"),
                });
            }
            self.working.echo_tags.insert((echo_id, *tag_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
