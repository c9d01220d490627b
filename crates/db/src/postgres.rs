//! PostgreSQL checkpoint store for the `extraction_checkpoints` table.
//!
//! Each checkpoint is kept whole in the `document` JSONB column so the
//! stored shape is exactly the read model served over HTTP. `status` and
//! the timestamps are mirrored into plain columns for filtering and
//! ordering.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tokenlift_core::checkpoint::{Checkpoint, CheckpointFilter, CheckpointUpdate};

use crate::store::{CheckpointStore, StoreError};

/// PostgreSQL unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO extraction_checkpoints \
                 (id, url, status, document, started_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.url)
        .bind(checkpoint.status.as_str())
        .bind(Json(checkpoint))
        .bind(checkpoint.started_at)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateKey(checkpoint.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row: Option<(Json<Checkpoint>,)> =
            sqlx::query_as("SELECT document FROM extraction_checkpoints WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(checkpoint),)| checkpoint))
    }

    /// Read-merge-write under a row lock so the merge rule stays in one
    /// place ([`Checkpoint::apply`]).
    async fn update(&self, id: &str, update: &CheckpointUpdate) -> Result<Checkpoint, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Json<Checkpoint>,)> = sqlx::query_as(
            "SELECT document FROM extraction_checkpoints WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Json(mut checkpoint),)) = row else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        checkpoint.apply(update, Utc::now());

        sqlx::query(
            "UPDATE extraction_checkpoints \
             SET status = $2, document = $3, updated_at = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(checkpoint.status.as_str())
        .bind(Json(&checkpoint))
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(checkpoint)
    }

    async fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>, StoreError> {
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);

        let rows: Vec<(Json<Checkpoint>,)> = sqlx::query_as(
            "SELECT document FROM extraction_checkpoints \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY started_at DESC, id DESC \
             LIMIT $2",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(c),)| c).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM extraction_checkpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
