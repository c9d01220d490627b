//! In-process checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokenlift_core::checkpoint::{Checkpoint, CheckpointFilter, CheckpointUpdate};

use crate::store::{CheckpointStore, StoreError};

/// [`CheckpointStore`] over a `RwLock<HashMap>`. Contents are lost when
/// the process exits.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&checkpoint.id) {
            return Err(StoreError::DuplicateKey(checkpoint.id.clone()));
        }
        records.insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: &CheckpointUpdate) -> Result<Checkpoint, StoreError> {
        let mut records = self.records.write().await;
        let checkpoint = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        checkpoint.apply(update, Utc::now());
        Ok(checkpoint.clone())
    }

    async fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<Checkpoint> = records
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
