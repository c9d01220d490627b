//! Persistence of pipeline events as checkpoint updates.
//!
//! [`CheckpointPersistence`] is the only writer of stage results to the
//! store. The pipeline awaits it after every stage, so once a stage's
//! event has been handled its fields are durable.

use async_trait::async_trait;
use tokenlift_db::SharedStore;

use crate::event::PipelineEvent;
use crate::observer::{ObserverError, PipelineObserver};

pub struct CheckpointPersistence {
    store: SharedStore,
}

impl CheckpointPersistence {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineObserver for CheckpointPersistence {
    fn name(&self) -> &'static str {
        "checkpoint_persistence"
    }

    async fn on_event(&self, checkpoint_id: &str, event: &PipelineEvent) -> Result<(), ObserverError> {
        let Some(update) = event.to_update() else {
            return Ok(());
        };
        let checkpoint = self.store.update(checkpoint_id, &update).await?;
        tracing::debug!(
            checkpoint_id,
            event = event.kind(),
            status = %checkpoint.status,
            progress = checkpoint.progress,
            "Checkpoint persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Utc;
    use tokenlift_core::checkpoint::{Checkpoint, CheckpointStatus, ScreenshotInfo};
    use tokenlift_db::{CheckpointStore, MemoryCheckpointStore, StoreError};

    use super::*;

    #[tokio::test]
    async fn screenshot_event_is_written() {
        let store = Arc::new(MemoryCheckpointStore::new());
        store
            .create(&Checkpoint::with_id("cp-1", "https://example.com", Utc::now()))
            .await
            .unwrap();
        let persistence = CheckpointPersistence::new(store.clone());

        let event = PipelineEvent::Screenshot {
            screenshot: ScreenshotInfo {
                width: 1280,
                height: 800,
                size_bytes: 4096,
                sha256: "ab".repeat(32),
            },
        };
        persistence.on_event("cp-1", &event).await.unwrap();

        let checkpoint = store.load("cp-1").await.unwrap().unwrap();
        assert_eq!(checkpoint.status, CheckpointStatus::Screenshot);
        assert_eq!(checkpoint.progress, 20);
        assert_eq!(checkpoint.screenshot.unwrap().width, 1280);
    }

    #[tokio::test]
    async fn missing_checkpoint_surfaces_not_found() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let persistence = CheckpointPersistence::new(store);

        assert_matches!(
            persistence.on_event("ghost", &PipelineEvent::Complete).await,
            Err(ObserverError::Store(StoreError::NotFound(_)))
        );
    }

    #[tokio::test]
    async fn start_event_touches_nothing() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let persistence = CheckpointPersistence::new(store);
        // No record exists, but start writes nothing, so no NotFound.
        persistence
            .on_event(
                "ghost",
                &PipelineEvent::Start {
                    url: "https://example.com".into(),
                },
            )
            .await
            .unwrap();
    }
}
