//! The checkpoint repository contract.

use std::sync::Arc;

use async_trait::async_trait;
use tokenlift_core::checkpoint::{Checkpoint, CheckpointFilter, CheckpointUpdate};
use tokenlift_core::types::CheckpointId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Checkpoint {0} already exists")]
    DuplicateKey(CheckpointId),

    #[error("Checkpoint {0} not found")]
    NotFound(CheckpointId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key-value repository for [`Checkpoint`] records.
///
/// Backends must be safe for concurrent use across different ids. Writes
/// to a single id are expected to come from one owner at a time.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Insert a new record. Fails with [`StoreError::DuplicateKey`] if the
    /// id is taken.
    async fn create(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Fetch a record; `Ok(None)` when absent.
    async fn load(&self, id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Merge `update` into the stored record, refresh `updated_at`, and
    /// return the merged record. Fails with [`StoreError::NotFound`] if the
    /// id is absent.
    async fn update(&self, id: &str, update: &CheckpointUpdate) -> Result<Checkpoint, StoreError>;

    /// Records matching `filter`, newest first.
    async fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>, StoreError>;

    /// Remove a record. Returns `true` if one was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Store handle shared between the service, pipelines and HTTP handlers.
pub type SharedStore = Arc<dyn CheckpointStore>;
