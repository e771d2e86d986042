use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    application::repos::{EchoFields, EchoTx, NewEchoParams, RepoError},
    domain::{
        echoes::MediaDraft,
        entities::{EchoRecord, MediaRecord, TagRecord},
    },
};

use super::{
    echoes::{TagRow, fetch_echo, fetch_media},
    map_sqlx_error,
};

pub(super) struct PgEchoTx {
    tx: Transaction<'static, Postgres>,
}

impl PgEchoTx {
    pub(super) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

fn extension_columns(fields: &EchoFields) -> (Option<&'static str>, Option<&str>) {
    match &fields.extension {
        Some(extension) => (Some(extension.kind.as_str()), Some(extension.payload.as_str())),
        None => (None, None),
    }
}

#[async_trait]
impl EchoTx for PgEchoTx {
    async fn find_tags_by_names(&mut self, names: &[String]) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, usage_count, created_at FROM tags WHERE name = ANY($1)",
        )
        .bind(names)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn increment_tag_usage(&mut self, tag_id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE tags SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &TagRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO tags (id, name, usage_count, created_at) VALUES ($1, $2, $3, $4)")
            .bind(tag.id)
            .bind(&tag.name)
            .bind(tag.usage_count)
            .bind(tag.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_tag(&mut self, tag_id: Uuid) -> Result<bool, RepoError> {
        sqlx::query("DELETE FROM echo_tags WHERE tag_id = $1")
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_echo(&mut self, id: Uuid) -> Result<Option<EchoRecord>, RepoError> {
        fetch_echo(&mut *self.tx, id).await
    }

    async fn insert_echo(&mut self, params: &NewEchoParams) -> Result<(), RepoError> {
        let (extension_type, extension) = extension_columns(&params.fields);
        sqlx::query(
            r#"
            INSERT INTO echoes (
                id, user_id, username, content, private, layout,
                extension_type, extension, fav_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9)
            "#,
        )
        .bind(params.id)
        .bind(params.user_id)
        .bind(&params.username)
        .bind(&params.fields.content)
        .bind(params.fields.private)
        .bind(params.fields.layout.as_str())
        .bind(extension_type)
        .bind(extension)
        .bind(params.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_echo(&mut self, id: Uuid, fields: &EchoFields) -> Result<bool, RepoError> {
        let (extension_type, extension) = extension_columns(fields);
        let result = sqlx::query(
            r#"
            UPDATE echoes
            SET content = $2, private = $3, layout = $4, extension_type = $5, extension = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&fields.content)
        .bind(fields.private)
        .bind(fields.layout.as_str())
        .bind(extension_type)
        .bind(extension)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_echo(&mut self, id: Uuid) -> Result<bool, RepoError> {
        sqlx::query("DELETE FROM echo_tags WHERE echo_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        let result = sqlx::query("DELETE FROM echoes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_likes(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("UPDATE echoes SET fav_count = fav_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_media(&mut self, echo_id: Uuid) -> Result<Vec<MediaRecord>, RepoError> {
        fetch_media(&mut *self.tx, &[echo_id]).await
    }

    async fn insert_media(&mut self, media: &MediaRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO echo_media (
                id, echo_id, position, url, media_type, media_source,
                object_key, width, height, live_video_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(media.id)
        .bind(media.echo_id)
        .bind(media.position)
        .bind(&media.url)
        .bind(media.kind.as_str())
        .bind(media.source.map(|source| source.as_str()))
        .bind(&media.object_key)
        .bind(media.width)
        .bind(media.height)
        .bind(media.live_video_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn overwrite_media(
        &mut self,
        media_id: Uuid,
        position: i32,
        content: &MediaDraft,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE echo_media
            SET position = $2, url = $3, media_type = $4, media_source = $5,
                object_key = $6, width = $7, height = $8
            WHERE id = $1
            "#,
        )
        .bind(media_id)
        .bind(position)
        .bind(&content.url)
        .bind(content.kind.as_str())
        .bind(content.source.map(|source| source.as_str()))
        .bind(&content.object_key)
        .bind(content.width)
        .bind(content.height)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_media_position(
        &mut self,
        media_id: Uuid,
        position: i32,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE echo_media SET position = $2 WHERE id = $1")
            .bind(media_id)
            .bind(position)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_media(&mut self, media_ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM echo_media WHERE id = ANY($1)")
            .bind(media_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_media_for_echo(&mut self, echo_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM echo_media WHERE echo_id = $1")
            .bind(echo_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn set_live_video(
        &mut self,
        image_id: Uuid,
        video_id: Option<Uuid>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE echo_media SET live_video_id = $2 WHERE id = $1")
            .bind(image_id)
            .bind(video_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn clear_live_videos(&mut self, echo_id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE echo_media SET live_video_id = NULL WHERE echo_id = $1")
            .bind(echo_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn replace_echo_tags(&mut self, echo_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM echo_tags WHERE echo_id = $1")
            .bind(echo_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if tag_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO echo_tags (echo_id, tag_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(echo_id)
        .bind(tag_ids)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}
