//! Contract of the generative text backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("text generation is disabled")]
    Disabled,
    #[error("generator transport failed: {0}")]
    Transport(String),
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator timed out")]
    Timeout,
    #[error("generator returned no text")]
    EmptyResponse,
    #[error("generation was cancelled")]
    Cancelled,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String, GenerationError>;
}

/// Used when no backend is configured.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}
