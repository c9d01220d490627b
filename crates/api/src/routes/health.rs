use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokenlift_db::CheckpointStore;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Checkpoint store backend (`memory` or `postgres`).
    pub store: &'static str,
    /// Whether the checkpoint store is reachable.
    pub db_healthy: bool,
    /// Extractions currently running in this process.
    pub running_jobs: usize,
}

/// GET /health -- returns service and store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.service.store();
    let db_healthy = store.health_check().await.is_ok();

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store: store.backend(),
        db_healthy,
        running_jobs: state.service.running_jobs().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
