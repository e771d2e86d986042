//! Echoes: a short-form timeline of text, media and tags.
//!
//! `application` holds the echo store, layout recommendation and the recent
//! activity summary; `infra` supplies storage, generation and telemetry
//! adapters; `cache` is the typed in-process read cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
