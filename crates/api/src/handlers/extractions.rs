//! Handlers for the `/extractions` resource.
//!
//! Clients start an extraction, then poll the checkpoint until it reaches
//! `complete` or `failed`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokenlift_core::checkpoint::{CheckpointFilter, CheckpointStatus};
use tokenlift_core::types::CheckpointId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Upper bound on rows returned by a single list call.
pub const MAX_LIST_LIMIT: usize = 500;

/// Default page size when `limit` is omitted.
pub const DEFAULT_LIST_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Start extraction
// ---------------------------------------------------------------------------

/// Request body for `POST /extractions`.
#[derive(Debug, Deserialize)]
pub struct StartExtractionInput {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct StartedExtraction {
    pub id: CheckpointId,
}

/// POST /api/v1/extractions
///
/// Create a `pending` checkpoint and launch its pipeline. Responds as soon
/// as the checkpoint exists.
pub async fn start_extraction(
    State(state): State<AppState>,
    Json(input): Json<StartExtractionInput>,
) -> AppResult<impl IntoResponse> {
    let id = state.service.start(&input.url).await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: StartedExtraction { id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

/// Query parameters for `GET /extractions`.
#[derive(Debug, Deserialize)]
pub struct ListExtractionsParams {
    pub status: Option<CheckpointStatus>,
    pub limit: Option<usize>,
}

/// GET /api/v1/extractions?status=&limit=
///
/// Newest first.
pub async fn list_extractions(
    State(state): State<AppState>,
    Query(params): Query<ListExtractionsParams>,
) -> AppResult<impl IntoResponse> {
    let filter = CheckpointFilter {
        status: params.status,
        limit: Some(params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)),
    };
    let checkpoints = state.service.list(&filter).await?;

    Ok(Json(DataResponse { data: checkpoints }))
}

/// GET /api/v1/extractions/{id}
pub async fn get_extraction(
    State(state): State<AppState>,
    Path(id): Path<CheckpointId>,
) -> AppResult<impl IntoResponse> {
    let checkpoint = state.service.get(&id).await?;
    Ok(Json(DataResponse { data: checkpoint }))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CancelResult {
    /// `false` when the extraction had already finished.
    pub cancelled: bool,
}

/// POST /api/v1/extractions/{id}/cancel
///
/// The checkpoint moves to `failed` once the job observes the signal.
pub async fn cancel_extraction(
    State(state): State<AppState>,
    Path(id): Path<CheckpointId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.service.cancel(&id).await?;
    Ok(Json(DataResponse {
        data: CancelResult { cancelled },
    }))
}

/// DELETE /api/v1/extractions/{id}
///
/// Cancels a running job, then removes its checkpoint.
pub async fn delete_extraction(
    State(state): State<AppState>,
    Path(id): Path<CheckpointId>,
) -> AppResult<StatusCode> {
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
