//! Durable storage of extraction checkpoints.
//!
//! - [`CheckpointStore`]: the backend-agnostic contract.
//! - [`MemoryCheckpointStore`]: map-backed, for tests and dry runs.
//! - [`PgCheckpointStore`]: PostgreSQL backend storing each checkpoint
//!   as one JSONB document.

pub mod memory;
pub mod postgres;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryCheckpointStore;
pub use postgres::PgCheckpointStore;
pub use store::{CheckpointStore, SharedStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
