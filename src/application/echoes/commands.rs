use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    application::{
        echoes::{
            hooks::CommittedChange,
            live_photo::LiveLinker,
            reconcile::{MediaPlan, MediaReconciler, MergePlan, ReorderPlan, position},
            store::{Author, EchoStore},
            tags::{CreateTagError, TagResolver},
        },
        error::AppError,
        repos::{EchoFields, EchoTx, NewEchoParams},
    },
    domain::{
        echoes::{EchoDraft, MediaDraft},
        error::DomainError,
        entities::{EchoRecord, MediaRecord, TagRecord},
        types::MediaKind,
    },
};

impl From<CreateTagError> for AppError {
    fn from(error: CreateTagError) -> Self {
        match error {
            CreateTagError::Domain(err) => AppError::Domain(err),
            CreateTagError::Repo(err) => AppError::Repo(err),
        }
    }
}

impl EchoStore {
    /// validate (done by [`EchoDraft`]) → tags → media → links → commit → hooks.
    pub async fn create(&self, author: &Author, draft: EchoDraft) -> Result<EchoRecord, AppError> {
        let mut tx = self.uow.begin().await?;

        let mut tags = TagResolver::resolve(tx.as_mut(), draft.tags.as_slice()).await?;

        let id = Uuid::new_v4();
        let created_at = OffsetDateTime::now_utc();
        let fields = echo_fields(&draft);
        tx.insert_echo(&NewEchoParams {
            id,
            user_id: author.id,
            username: author.username.clone(),
            fields: fields.clone(),
            created_at,
        })
        .await?;

        let mut media = Vec::with_capacity(draft.media.len());
        for (index, item) in draft.media.iter().enumerate() {
            let row = new_media_row(id, index, item);
            tx.insert_media(&row).await?;
            media.push(row);
        }

        // Links need both rows persisted first.
        let kinds: Vec<MediaKind> = draft.media.iter().map(|m| m.kind).collect();
        for (image, video) in LiveLinker::link(&kinds, &draft.pair_tokens()) {
            let video_id = media[video].id;
            tx.set_live_video(media[image].id, Some(video_id)).await?;
            media[image].live_video_id = Some(video_id);
        }

        let tag_ids: Vec<Uuid> = tags.iter().map(|tag| tag.id).collect();
        tx.replace_echo_tags(id, &tag_ids).await?;
        tx.commit().await?;

        // Same order as a read.
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        let echo = EchoRecord {
            id,
            content: fields.content,
            username: author.username.clone(),
            user_id: author.id,
            media,
            tags,
            private: fields.private,
            layout: fields.layout,
            extension: fields.extension,
            fav_count: 0,
            created_at,
        };

        info!(
            echo_id = %echo.id,
            media = echo.media.len(),
            tags = echo.tags.len(),
            "Echo created"
        );
        self.hooks.run(&CommittedChange::Created(echo.clone())).await;
        Ok(echo)
    }

    pub async fn update(&self, id: Uuid, draft: EchoDraft) -> Result<EchoRecord, AppError> {
        let mut tx = self.uow.begin().await?;

        if !tx.update_echo(id, &echo_fields(&draft)).await? {
            return Err(DomainError::not_found("echo", id).into());
        }

        let tags = TagResolver::resolve(tx.as_mut(), draft.tags.as_slice()).await?;
        let tag_ids: Vec<Uuid> = tags.iter().map(|tag| tag.id).collect();
        tx.replace_echo_tags(id, &tag_ids).await?;

        let existing = tx.list_media(id).await?;
        let plan = MediaReconciler::plan(&existing, &draft.media);
        let reorder = plan.is_reorder();
        match plan {
            MediaPlan::Reorder(plan) => apply_reorder(tx.as_mut(), id, &plan, &draft.media).await?,
            MediaPlan::Merge(plan) => apply_merge(tx.as_mut(), id, &plan, &draft.media).await?,
        }

        // Read back before commit so nothing fallible sits between commit and hooks.
        let echo = tx
            .find_echo(id)
            .await?
            .ok_or_else(|| DomainError::not_found("echo", id))?;
        tx.commit().await?;

        info!(echo_id = %id, reorder, media = echo.media.len(), "Echo updated");
        self.hooks.run(&CommittedChange::Updated(echo.clone())).await;
        Ok(echo)
    }

    /// Media rows go first, then tag links and the echo itself.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.uow.begin().await?;

        let removed_media = tx.delete_media_for_echo(id).await?;
        if !tx.delete_echo(id).await? {
            return Err(DomainError::not_found("echo", id).into());
        }
        tx.commit().await?;

        info!(echo_id = %id, removed_media, "Echo deleted");
        self.hooks.run(&CommittedChange::Deleted(id)).await;
        Ok(())
    }

    pub async fn like(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.uow.begin().await?;
        if !tx.increment_likes(id).await? {
            return Err(DomainError::not_found("echo", id).into());
        }
        tx.commit().await?;

        debug!(echo_id = %id, "Echo liked");
        self.hooks.run(&CommittedChange::Liked(id)).await;
        Ok(())
    }

    pub async fn create_tag(&self, name: &str) -> Result<TagRecord, AppError> {
        let mut tx = self.uow.begin().await?;
        let tag = TagResolver::create(tx.as_mut(), name).await?;
        tx.commit().await?;
        Ok(tag)
    }

    pub async fn delete_tag(&self, tag_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.uow.begin().await?;
        if !tx.delete_tag(tag_id).await? {
            return Err(DomainError::not_found("tag", tag_id).into());
        }
        tx.commit().await?;

        info!(tag_id = %tag_id, "Tag deleted");
        self.hooks.run(&CommittedChange::TagDeleted(tag_id)).await;
        Ok(())
    }
}

fn echo_fields(draft: &EchoDraft) -> EchoFields {
    EchoFields {
        content: draft.content.clone(),
        private: draft.private,
        layout: draft.layout,
        extension: draft.extension.clone(),
    }
}

fn new_media_row(echo_id: Uuid, index: usize, item: &MediaDraft) -> MediaRecord {
    MediaRecord {
        id: Uuid::new_v4(),
        echo_id,
        position: position(index),
        url: item.url.clone(),
        kind: item.kind,
        source: item.source,
        object_key: item.object_key.clone(),
        width: item.width,
        height: item.height,
        live_video_id: None,
    }
}

/// Overwrites rows in place so every id survives, then rebuilds the links.
async fn apply_reorder(
    tx: &mut dyn EchoTx,
    echo_id: Uuid,
    plan: &ReorderPlan,
    requested: &[MediaDraft],
) -> Result<(), AppError> {
    if plan.rows.len() != requested.len() {
        return Err(DomainError::invariant(format!(
            "reorder of {} rows given {} media",
            plan.rows.len(),
            requested.len()
        ))
        .into());
    }
    tx.clear_live_videos(echo_id).await?;
    for (index, (row, item)) in plan.rows.iter().zip(requested).enumerate() {
        tx.overwrite_media(*row, position(index), item).await?;
    }
    for (image, video) in &plan.links {
        tx.set_live_video(*image, Some(*video)).await?;
    }
    debug!(echo_id = %echo_id, rows = plan.rows.len(), links = plan.links.len(), "Media reordered in place");
    Ok(())
}

async fn apply_merge(
    tx: &mut dyn EchoTx,
    echo_id: Uuid,
    plan: &MergePlan,
    requested: &[MediaDraft],
) -> Result<(), AppError> {
    for image in &plan.unlink {
        tx.set_live_video(*image, None).await?;
    }
    if !plan.delete.is_empty() {
        tx.delete_media(&plan.delete).await?;
    }
    for kept in &plan.keep {
        tx.set_media_position(kept.id, kept.position).await?;
    }

    let mut inserted: HashMap<usize, Uuid> = HashMap::with_capacity(plan.insert.len());
    for &index in &plan.insert {
        let row = new_media_row(echo_id, index, &requested[index]);
        tx.insert_media(&row).await?;
        inserted.insert(index, row.id);
    }
    for (image, video) in &plan.links {
        if let (Some(image_id), Some(video_id)) = (inserted.get(image), inserted.get(video)) {
            tx.set_live_video(*image_id, Some(*video_id)).await?;
        }
    }

    debug!(
        echo_id = %echo_id,
        deleted = plan.delete.len(),
        kept = plan.keep.len(),
        inserted = plan.insert.len(),
        "Media merged"
    );
    Ok(())
}
