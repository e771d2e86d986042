use std::sync::Arc;

use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    application::{
        echoes::hooks::{CacheInvalidationHook, PostCommitHook, PostCommitHooks},
        repos::{EchoReadRepo, EchoUnitOfWork},
    },
    cache::EchoCache,
};

/// Owner recorded on a new echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
}

#[derive(Clone)]
pub struct EchoStore {
    pub(crate) reader: Arc<dyn EchoReadRepo>,
    pub(crate) uow: Arc<dyn EchoUnitOfWork>,
    pub(crate) cache: Arc<EchoCache>,
    pub(crate) hooks: PostCommitHooks,
    pub(crate) tz: Tz,
}

impl EchoStore {
    /// Cache invalidation is always the first post-commit hook.
    pub fn new(
        reader: Arc<dyn EchoReadRepo>,
        uow: Arc<dyn EchoUnitOfWork>,
        cache: Arc<EchoCache>,
        tz: Tz,
    ) -> Self {
        let hooks = PostCommitHooks::new().with(Arc::new(CacheInvalidationHook::new(cache.clone())));
        Self {
            reader,
            uow,
            cache,
            hooks,
            tz,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks = self.hooks.with(hook);
        self
    }

    pub fn cache(&self) -> &Arc<EchoCache> {
        &self.cache
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}
