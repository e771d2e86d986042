//! Best-effort side effects that run after a write has committed.
//!
//! Hooks run in registration order and are awaited before the write returns.
//! A failing hook is logged and counted; it never fails the write and never
//! stops the hooks after it.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    application::events::{EchoEvent, EventPublisher},
    cache::{EchoCache, EchoMutation, InvalidationPlan},
    domain::entities::EchoRecord,
};

const METRIC_HOOK_FAILURE: &str = "echoes_post_commit_failure_total";

#[derive(Debug, Clone, PartialEq)]
pub enum CommittedChange {
    Created(EchoRecord),
    Updated(EchoRecord),
    Deleted(Uuid),
    Liked(Uuid),
    TagDeleted(Uuid),
}

impl CommittedChange {
    pub fn mutation(&self) -> EchoMutation {
        match self {
            CommittedChange::Created(echo) => EchoMutation::Created(echo.id),
            CommittedChange::Updated(echo) => EchoMutation::Updated(echo.id),
            CommittedChange::Deleted(id) => EchoMutation::Deleted(*id),
            CommittedChange::Liked(id) => EchoMutation::Liked(*id),
            CommittedChange::TagDeleted(id) => EchoMutation::TagDeleted(*id),
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_commit(&self, change: &CommittedChange) -> Result<(), HookError>;
}

#[derive(Clone, Default)]
pub struct PostCommitHooks {
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl PostCommitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Returns how many hooks failed.
    pub async fn run(&self, change: &CommittedChange) -> usize {
        let mut failures = 0;
        for hook in &self.hooks {
            match hook.after_commit(change).await {
                Ok(()) => debug!(hook = hook.name(), "Post-commit hook completed"),
                Err(err) => {
                    failures += 1;
                    counter!(METRIC_HOOK_FAILURE, "hook" => hook.name()).increment(1);
                    warn!(
                        hook = hook.name(),
                        mutation = ?change.mutation(),
                        error = %err,
                        "Post-commit hook failed; the write is kept"
                    );
                }
            }
        }
        failures
    }
}

/// Drops every cache entry the change may have made stale.
pub struct CacheInvalidationHook {
    cache: Arc<EchoCache>,
}

impl CacheInvalidationHook {
    pub fn new(cache: Arc<EchoCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl PostCommitHook for CacheInvalidationHook {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn after_commit(&self, change: &CommittedChange) -> Result<(), HookError> {
        self.cache
            .apply(&InvalidationPlan::for_mutation(change.mutation()));
        Ok(())
    }
}

/// Publishes created/updated/deleted events.
pub struct EventPublishHook {
    publisher: Arc<dyn EventPublisher>,
}

impl EventPublishHook {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl PostCommitHook for EventPublishHook {
    fn name(&self) -> &'static str {
        "event_publish"
    }

    async fn after_commit(&self, change: &CommittedChange) -> Result<(), HookError> {
        let event = match change {
            CommittedChange::Created(echo) => EchoEvent::Created(echo.clone()),
            CommittedChange::Updated(echo) => EchoEvent::Updated(echo.clone()),
            CommittedChange::Deleted(id) => EchoEvent::Deleted { id: *id },
            CommittedChange::Liked(_) | CommittedChange::TagDeleted(_) => return Ok(()),
        };
        self.publisher
            .publish(event)
            .await
            .map_err(|err| HookError(err.to_string()))
    }
}
