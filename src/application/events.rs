//! Outbound echo events for federation and webhook fan-out.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::EchoRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EchoEvent {
    Created(EchoRecord),
    Updated(EchoRecord),
    Deleted { id: Uuid },
}

impl EchoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EchoEvent::Created(_) => "echo_created",
            EchoEvent::Updated(_) => "echo_updated",
            EchoEvent::Deleted { .. } => "echo_deleted",
        }
    }

    pub fn echo_id(&self) -> Uuid {
        match self {
            EchoEvent::Created(echo) | EchoEvent::Updated(echo) => echo.id,
            EchoEvent::Deleted { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("event publish failed: {message}")]
pub struct PublishError {
    pub message: String,
}

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EchoEvent) -> Result<(), PublishError>;
}
