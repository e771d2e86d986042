//! The echo aggregate: cache-through reads and transactional writes.

mod commands;
pub mod hooks;
pub mod live_photo;
mod queries;
pub mod reconcile;
mod store;
pub mod tags;

pub use hooks::{
    CacheInvalidationHook, CommittedChange, EventPublishHook, HookError, PostCommitHook,
    PostCommitHooks,
};
pub use live_photo::LiveLinker;
pub use reconcile::{KeptMedia, MediaPlan, MediaReconciler, MergePlan, ReorderPlan};
pub use store::{Author, EchoStore};
pub use tags::{CreateTagError, TagResolver};
