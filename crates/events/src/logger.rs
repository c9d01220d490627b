//! Background subscriber that mirrors bus traffic into the log.

use tokio::sync::broadcast;

use crate::bus::ExtractionEvent;

/// Logs every event published on the [`EventBus`](crate::bus::EventBus).
pub struct EventLogger;

impl EventLogger {
    /// Run until the bus is dropped.
    pub async fn run(mut receiver: broadcast::Receiver<ExtractionEvent>) {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    tracing::info!(
                        checkpoint_id = %envelope.checkpoint_id,
                        event = envelope.event.kind(),
                        "Extraction event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
    }
}
