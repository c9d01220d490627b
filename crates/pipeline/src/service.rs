//! Entry point for callers: start, observe, cancel and delete extraction
//! jobs.
//!
//! Each job runs as its own tokio task with a child of the service-wide
//! cancellation token, so [`ExtractionService::shutdown`] stops every job
//! and [`ExtractionService::cancel`] stops one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tokenlift_core::checkpoint::{Checkpoint, CheckpointFilter, CheckpointUpdate};
use tokenlift_core::error::CoreError;
use tokenlift_core::types::CheckpointId;
use tokenlift_core::validation::validate_source_url;
use tokenlift_db::{SharedStore, StoreError};

use crate::pipeline::{ExtractionPipeline, RunOutcome, CANCELLED_MESSAGE};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn not_found(id: &str) -> ServiceError {
    CoreError::NotFound {
        entity: "Checkpoint",
        id: id.to_string(),
    }
    .into()
}

/// Mark a checkpoint whose run task died `failed`, unless it already
/// reached a terminal state.
async fn record_crash(store: &SharedStore, id: &str, err: JoinError) {
    let message = if err.is_panic() {
        let payload = err.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("extraction aborted: {detail}")
    } else {
        CANCELLED_MESSAGE.to_string()
    };
    tracing::error!(checkpoint_id = id, error = %message, "Extraction task crashed");

    match store.load(id).await {
        Ok(Some(checkpoint)) if !checkpoint.status.is_terminal() => {
            if let Err(e) = store.update(id, &CheckpointUpdate::failed(message)).await {
                tracing::error!(checkpoint_id = id, error = %e, "Failed to record crashed extraction");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::error!(checkpoint_id = id, error = %e, "Failed to load crashed extraction"),
    }
}

pub struct ExtractionService {
    pipeline: Arc<ExtractionPipeline>,
    store: SharedStore,
    jobs: Arc<Mutex<HashMap<CheckpointId, CancellationToken>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ExtractionService {
    pub fn new(pipeline: ExtractionPipeline, store: SharedStore) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Validate `url`, create a `pending` checkpoint, and launch its
    /// pipeline in the background. Returns the new checkpoint id without
    /// waiting for any stage.
    pub async fn start(&self, url: &str) -> Result<CheckpointId, ServiceError> {
        if self.shutdown.is_cancelled() {
            return Err(CoreError::Conflict("service is shutting down".into()).into());
        }
        let url = validate_source_url(url)?;

        let checkpoint = Checkpoint::new(url, Utc::now());
        self.store.create(&checkpoint).await?;
        let id = checkpoint.id;

        let token = self.shutdown.child_token();
        self.jobs.lock().await.insert(id.clone(), token.clone());

        let pipeline = Arc::clone(&self.pipeline);
        let store = Arc::clone(&self.store);
        let jobs = Arc::clone(&self.jobs);
        let job_id = id.clone();
        self.tracker.spawn(async move {
            // The run gets its own task so a panic inside it is observed
            // here instead of silently ending the job.
            let run = {
                let job_id = job_id.clone();
                tokio::spawn(async move { pipeline.run(&job_id, &token).await })
            };
            match run.await {
                Ok(RunOutcome::NotRunnable { reason }) => {
                    tracing::warn!(checkpoint_id = %job_id, reason = %reason, "Extraction did not run");
                }
                Ok(_) => {}
                Err(e) => record_crash(&store, &job_id, e).await,
            }
            jobs.lock().await.remove(&job_id);
        });

        tracing::info!(checkpoint_id = %id, url = %checkpoint.url, "Extraction started");
        Ok(id)
    }

    /// Current checkpoint for `id`.
    pub async fn get(&self, id: &str) -> Result<Checkpoint, ServiceError> {
        self.store.load(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>, ServiceError> {
        Ok(self.store.list(filter).await?)
    }

    /// Signal the job for `id` to stop. Returns `false` when the checkpoint
    /// exists but no job is running for it.
    pub async fn cancel(&self, id: &str) -> Result<bool, ServiceError> {
        if let Some(token) = self.jobs.lock().await.get(id) {
            token.cancel();
            tracing::info!(checkpoint_id = id, "Extraction cancellation requested");
            return Ok(true);
        }
        self.get(id).await?;
        Ok(false)
    }

    /// Stop the job for `id`, if any, and remove its checkpoint.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        if let Some(token) = self.jobs.lock().await.remove(id) {
            token.cancel();
        }
        if !self.store.delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(checkpoint_id = id, "Extraction deleted");
        Ok(())
    }

    /// Number of jobs still running.
    pub async fn running_jobs(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Wait until every job spawned so far has finished, without
    /// cancelling them.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel every running job, refuse new ones, and wait for all tasks
    /// to record their terminal state.
    pub async fn shutdown(&self) {
        tracing::info!("Extraction service shutting down");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
