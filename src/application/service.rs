//! Caller-facing operations. Every mutation except `like` is gated on
//! [`AccessPolicy::can_administer`]; reads pass the policy's visibility
//! decision down to the store.

use std::sync::Arc;

use echoes_api_types::{EchoPayload, LayoutRecommendation, RecommendLayoutRequest};
use time::OffsetDateTime;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    application::{
        access::{AccessPolicy, Caller},
        echoes::{Author, EchoStore},
        error::AppError,
        pagination::{EchoQuery, PageResult},
        recommend::RecommendationEngine,
        summary::SummaryCoalescer,
    },
    domain::{
        echoes::EchoDraft,
        entities::{EchoRecord, TagRecord},
    },
};

#[derive(Clone)]
pub struct EchoService {
    pub(crate) store: EchoStore,
    pub(crate) policy: Arc<dyn AccessPolicy>,
    pub(crate) recommender: RecommendationEngine,
    pub(crate) summaries: SummaryCoalescer,
}

impl EchoService {
    pub fn new(
        store: EchoStore,
        policy: Arc<dyn AccessPolicy>,
        recommender: RecommendationEngine,
        summaries: SummaryCoalescer,
    ) -> Self {
        Self {
            store,
            policy,
            recommender,
            summaries,
        }
    }

    pub fn store(&self) -> &EchoStore {
        &self.store
    }

    #[instrument(skip(self, payload), fields(caller = ?caller.user_id()))]
    pub async fn create_echo(
        &self,
        caller: &Caller,
        payload: EchoPayload,
    ) -> Result<EchoRecord, AppError> {
        let author = self.require_admin(caller)?;
        let draft = EchoDraft::from_payload(payload)?;
        self.store.create(&author, draft).await
    }

    #[instrument(skip(self, payload), fields(caller = ?caller.user_id()))]
    pub async fn update_echo(
        &self,
        caller: &Caller,
        id: Uuid,
        payload: EchoPayload,
    ) -> Result<EchoRecord, AppError> {
        self.require_admin(caller)?;
        let draft = EchoDraft::from_payload(payload)?;
        self.store.update(id, draft).await
    }

    #[instrument(skip(self), fields(caller = ?caller.user_id()))]
    pub async fn delete_echo(&self, caller: &Caller, id: Uuid) -> Result<(), AppError> {
        self.require_admin(caller)?;
        self.store.delete(id).await
    }

    /// Open to every caller, anonymous included.
    pub async fn like_echo(&self, id: Uuid) -> Result<(), AppError> {
        self.store.like(id).await
    }

    pub async fn get_echo_by_id(&self, caller: &Caller, id: Uuid) -> Result<EchoRecord, AppError> {
        let echo = self.store.get_by_id(id).await?.ok_or(AppError::NotFound)?;
        if echo.private && !self.policy.can_view_private(caller) {
            return Err(AppError::PermissionDenied);
        }
        Ok(echo)
    }

    pub async fn get_echos_by_page(
        &self,
        caller: &Caller,
        query: &EchoQuery,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        self.store
            .get_by_page(query, self.policy.can_view_private(caller))
            .await
    }

    pub async fn get_today_echos(&self, caller: &Caller) -> Result<Vec<EchoRecord>, AppError> {
        self.store
            .get_today(self.policy.can_view_private(caller))
            .await
    }

    pub async fn get_echos_by_tag(
        &self,
        caller: &Caller,
        tag_id: Uuid,
        query: &EchoQuery,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        self.store
            .get_by_tag(tag_id, query, self.policy.can_view_private(caller))
            .await
    }

    pub async fn get_echos_by_date_range(
        &self,
        caller: &Caller,
        start: OffsetDateTime,
        end: OffsetDateTime,
        query: &EchoQuery,
    ) -> Result<PageResult<EchoRecord>, AppError> {
        self.store
            .get_by_date_range(start, end, query, self.policy.can_view_private(caller))
            .await
    }

    pub async fn get_all_tags(&self) -> Result<Vec<TagRecord>, AppError> {
        self.store.list_tags().await
    }

    #[instrument(skip(self), fields(caller = ?caller.user_id()))]
    pub async fn create_tag(&self, caller: &Caller, name: &str) -> Result<TagRecord, AppError> {
        self.require_admin(caller)?;
        self.store.create_tag(name).await
    }

    #[instrument(skip(self), fields(caller = ?caller.user_id()))]
    pub async fn delete_tag(&self, caller: &Caller, tag_id: Uuid) -> Result<(), AppError> {
        self.require_admin(caller)?;
        self.store.delete_tag(tag_id).await
    }

    pub async fn recommend_layout(&self, request: &RecommendLayoutRequest) -> LayoutRecommendation {
        self.recommender.recommend(request).await
    }

    pub async fn recommend_layout_for_echo(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<LayoutRecommendation, AppError> {
        let echo = self.get_echo_by_id(caller, id).await?;
        Ok(self.recommender.recommend_for_echo(&echo).await)
    }

    pub async fn get_recent_summary(&self) -> Result<String, AppError> {
        Ok(self.summaries.recent_summary().await?)
    }

    fn require_admin(&self, caller: &Caller) -> Result<Author, AppError> {
        match caller {
            Caller::User { id, username } if self.policy.can_administer(caller) => Ok(Author {
                id: *id,
                username: username.clone(),
            }),
            _ => {
                warn!(caller = ?caller.user_id(), "Mutation denied");
                Err(AppError::PermissionDenied)
            }
        }
    }
}
