//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans every [`ExtractionEvent`] out to any number of
//! subscribers. It is shared via `Arc<EventBus>` and registered with the
//! pipeline as a [`PipelineObserver`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokenlift_core::types::CheckpointId;

use crate::event::PipelineEvent;
use crate::observer::{ObserverError, PipelineObserver};

// ---------------------------------------------------------------------------
// ExtractionEvent
// ---------------------------------------------------------------------------

/// A [`PipelineEvent`] addressed to one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionEvent {
    pub checkpoint_id: CheckpointId,
    pub event: PipelineEvent,
    pub timestamp: DateTime<Utc>,
}

impl ExtractionEvent {
    pub fn new(checkpoint_id: impl Into<CheckpointId>, event: PipelineEvent) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<ExtractionEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when there
    /// are none.
    pub fn publish(&self, event: ExtractionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
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
impl PipelineObserver for EventBus {
    fn name(&self) -> &'static str {
        "event_bus"
    }

    async fn on_event(&self, checkpoint_id: &str, event: &PipelineEvent) -> Result<(), ObserverError> {
        self.publish(ExtractionEvent::new(checkpoint_id, event.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observer_publishes_envelope() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.on_event("cp-1", &PipelineEvent::Complete).await.unwrap();

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.checkpoint_id, "cp-1");
        assert_eq!(received.event, PipelineEvent::Complete);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(ExtractionEvent::new(
            "cp-2",
            PipelineEvent::Error {
                message: "boom".into(),
            },
        ));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event.kind(), "error");
        assert_eq!(e2.checkpoint_id, "cp-2");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.on_event("cp-3", &PipelineEvent::Complete).await.unwrap();
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let json = serde_json::to_value(ExtractionEvent::new("cp-4", PipelineEvent::Complete)).unwrap();
        assert_eq!(json["checkpointId"], "cp-4");
        assert_eq!(json["event"]["type"], "complete");
    }
}
