//! In-process fan-out of echo events.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::application::events::{EchoEvent, EventPublisher, PublishError};

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus. Slow subscribers lag and lose the oldest events; having no
/// subscriber at all is not an error.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EchoEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EchoEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: EchoEvent) -> Result<(), PublishError> {
        let name = event.name();
        let echo_id = event.echo_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event = name, %echo_id, receivers, "Event published");
            }
            Err(_) => {
                debug!(event = name, %echo_id, "Event dropped without subscribers");
            }
        }
        Ok(())
    }
}
