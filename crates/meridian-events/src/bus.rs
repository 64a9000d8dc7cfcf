//! Event bus trait and the in-process implementation.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::event::Event;

/// Result type alias using [`EventError`].
pub type EventResult<T> = Result<T, EventError>;

/// Errors from bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The event could not be handed to the transport.
    #[error("failed to publish event on {topic}: {reason}")]
    Publish {
        /// Topic of the event that failed.
        topic: &'static str,
        /// Transport-level failure description.
        reason: String,
    },
}

/// Transport for control-plane events.
///
/// Implementations provide at-least-once delivery; consumers deduplicate on
/// [`Event::dedup_key`]. Subscription hands back a broadcast receiver so a
/// slow consumer never blocks publishers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all current subscribers.
    async fn publish(&self, event: Event) -> EventResult<()>;

    /// Subscribe to all events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

/// In-process bus backed by [`tokio::sync::broadcast`].
///
/// Suitable for tests and single-node deployments. Publishing with no
/// subscribers is not an error: events are observability output first.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<Event>,
}

impl InMemoryEventBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> EventResult<()> {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic, receivers, "event published");
                Ok(())
            }
            // No receivers; the event is dropped but publishing succeeded.
            Err(broadcast::error::SendError(event)) => {
                debug!(topic = event.topic(), "event published with no subscribers");
                Ok(())
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::ModelId;

    fn alert(message: &str) -> Event {
        Event::Alert {
            model_id: ModelId::new("churn"),
            message: message.to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = InMemoryEventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(alert("first")).await.expect("publish failed");

        let received = rx.recv().await.expect("recv failed");
        assert_eq!(received.topic(), "orchestrator.alert");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::default();
        bus.publish(alert("nobody listening"))
            .await
            .expect("publish should not fail without subscribers");
    }

    #[tokio::test]
    async fn each_subscriber_sees_every_event() {
        let bus = InMemoryEventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(alert("one")).await.expect("publish failed");
        bus.publish(alert("two")).await.expect("publish failed");

        for rx in [&mut rx1, &mut rx2] {
            let first = rx.recv().await.expect("recv failed");
            let second = rx.recv().await.expect("recv failed");
            assert_eq!(first.model_id().as_str(), "churn");
            assert_eq!(second.model_id().as_str(), "churn");
        }
    }
}
