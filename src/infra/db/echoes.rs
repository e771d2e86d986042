use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::{
        pagination::{PageRequest, PageResult},
        repos::{EchoFilter, EchoReadRepo, RepoError},
    },
    domain::{
        entities::{EchoRecord, Extension, MediaRecord, TagRecord},
        types::{ExtensionKind, Layout, MediaKind, MediaSource},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const ECHO_COLUMNS: &str = "e.id, e.user_id, e.username, e.content, e.private, e.layout, \
    e.extension_type, e.extension, e.fav_count, e.created_at";

pub(super) const MEDIA_COLUMNS: &str = "id, echo_id, position, url, media_type, media_source, \
    object_key, width, height, live_video_id";

#[derive(sqlx::FromRow)]
struct EchoRow {
    id: Uuid,
    user_id: Uuid,
    username: String,
    content: String,
    private: bool,
    layout: String,
    extension_type: Option<String>,
    extension: Option<String>,
    fav_count: i64,
    created_at: OffsetDateTime,
}

impl EchoRow {
    fn into_record(
        self,
        media: Vec<MediaRecord>,
        tags: Vec<TagRecord>,
    ) -> Result<EchoRecord, RepoError> {
        let layout = self.layout.parse::<Layout>().map_err(integrity)?;
        let extension = match (self.extension_type, self.extension) {
            (Some(kind), Some(payload)) => Some(Extension {
                kind: kind.parse::<ExtensionKind>().map_err(integrity)?,
                payload,
            }),
            _ => None,
        };

        Ok(EchoRecord {
            id: self.id,
            content: self.content,
            username: self.username,
            user_id: self.user_id,
            media,
            tags,
            private: self.private,
            layout,
            extension,
            fav_count: self.fav_count,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct MediaRow {
    id: Uuid,
    echo_id: Uuid,
    position: i32,
    url: String,
    media_type: String,
    media_source: Option<String>,
    object_key: Option<String>,
    width: i32,
    height: i32,
    live_video_id: Option<Uuid>,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = RepoError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            echo_id: row.echo_id,
            position: row.position,
            url: row.url,
            kind: row.media_type.parse::<MediaKind>().map_err(integrity)?,
            source: row
                .media_source
                .map(|source| source.parse::<MediaSource>())
                .transpose()
                .map_err(integrity)?,
            object_key: row.object_key,
            width: row.width,
            height: row.height,
            live_video_id: row.live_video_id,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct TagRow {
    id: Uuid,
    name: String,
    usage_count: i64,
    created_at: OffsetDateTime,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            usage_count: row.usage_count,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EchoTagRow {
    echo_id: Uuid,
    #[sqlx(flatten)]
    tag: TagRow,
}

fn integrity(err: impl std::fmt::Display) -> RepoError {
    RepoError::Integrity {
        message: err.to_string(),
    }
}

/// Escapes LIKE wildcards so the search is a plain substring match.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub(super) async fn fetch_media<'e, E>(
    executor: E,
    echo_ids: &[Uuid],
) -> Result<Vec<MediaRecord>, RepoError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {MEDIA_COLUMNS} FROM echo_media \
         WHERE echo_id = ANY($1) \
         ORDER BY echo_id, position, id"
    );
    let rows = sqlx::query_as::<_, MediaRow>(&sql)
        .bind(echo_ids)
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_error)?;
    rows.into_iter().map(MediaRecord::try_from).collect()
}

async fn fetch_tags<'e, E>(executor: E, echo_ids: &[Uuid]) -> Result<Vec<EchoTagRow>, RepoError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, EchoTagRow>(
        r#"
        SELECT et.echo_id, t.id, t.name, t.usage_count, t.created_at
        FROM echo_tags et
        INNER JOIN tags t ON t.id = et.tag_id
        WHERE et.echo_id = ANY($1)
        ORDER BY et.echo_id, t.name COLLATE "C"
        "#,
    )
    .bind(echo_ids)
    .fetch_all(executor)
    .await
    .map_err(map_sqlx_error)
}

/// Loads one echo through a single connection, so a transaction sees its own writes.
pub(super) async fn fetch_echo(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<EchoRecord>, RepoError> {
    let sql = format!("SELECT {ECHO_COLUMNS} FROM echoes e WHERE e.id = $1");
    let Some(row) = sqlx::query_as::<_, EchoRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
    else {
        return Ok(None);
    };

    let media = fetch_media(&mut *conn, &[id]).await?;
    let tags = fetch_tags(&mut *conn, &[id])
        .await?
        .into_iter()
        .map(|row| row.tag.into())
        .collect();
    row.into_record(media, tags).map(Some)
}

impl PostgresRepositories {
    fn apply_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q EchoFilter) {
        qb.push(" WHERE TRUE");

        if !filter.include_private {
            qb.push(" AND NOT e.private");
        }

        if let Some(search) = filter.search.as_ref() {
            qb.push(" AND e.content ILIKE ");
            qb.push_bind(like_pattern(search));
        }

        if let Some(tag_id) = filter.tag_id {
            qb.push(" AND EXISTS (SELECT 1 FROM echo_tags et WHERE et.echo_id = e.id AND et.tag_id = ");
            qb.push_bind(tag_id);
            qb.push(")");
        }

        if let Some(from) = filter.created_from {
            qb.push(" AND e.created_at >= ");
            qb.push_bind(from);
        }

        if let Some(until) = filter.created_until {
            qb.push(" AND e.created_at < ");
            qb.push_bind(until);
        }
    }

    /// Attaches media and tags to each row, keeping the row order.
    async fn hydrate(&self, rows: Vec<EchoRow>) -> Result<Vec<EchoRecord>, RepoError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let mut media: HashMap<Uuid, Vec<MediaRecord>> = HashMap::new();
        for item in fetch_media(self.pool(), &ids).await? {
            media.entry(item.echo_id).or_default().push(item);
        }

        let mut tags: HashMap<Uuid, Vec<TagRecord>> = HashMap::new();
        for row in fetch_tags(self.pool(), &ids).await? {
            tags.entry(row.echo_id).or_default().push(row.tag.into());
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_record(
                    media.remove(&id).unwrap_or_default(),
                    tags.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl EchoReadRepo for PostgresRepositories {
    async fn find_echo(&self, id: Uuid) -> Result<Option<EchoRecord>, RepoError> {
        let sql = format!("SELECT {ECHO_COLUMNS} FROM echoes e WHERE e.id = $1");
        let row = sqlx::query_as::<_, EchoRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_echoes(
        &self,
        filter: &EchoFilter,
        page: PageRequest,
    ) -> Result<PageResult<EchoRecord>, RepoError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM echoes e");
        Self::apply_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ECHO_COLUMNS} FROM echoes e"));
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY e.created_at DESC, e.id DESC LIMIT ");
        qb.push_bind(page.limit() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset() as i64);

        let rows: Vec<EchoRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PageResult {
            items: self.hydrate(rows).await?,
            total: Self::convert_count(total)?,
        })
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT id, name, usage_count, created_at
            FROM tags
            ORDER BY usage_count DESC, created_at DESC, name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }
}
