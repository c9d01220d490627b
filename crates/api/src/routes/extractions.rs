//! Route definitions for the `/extractions` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::extractions;
use crate::state::AppState;

/// Routes mounted at `/extractions`.
///
/// ```text
/// GET    /                -> list_extractions
/// POST   /                -> start_extraction
/// GET    /{id}            -> get_extraction
/// DELETE /{id}            -> delete_extraction
/// POST   /{id}/cancel     -> cancel_extraction
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(extractions::list_extractions).post(extractions::start_extraction),
        )
        .route(
            "/{id}",
            get(extractions::get_extraction).delete(extractions::delete_extraction),
        )
        .route("/{id}/cancel", post(extractions::cancel_extraction))
}
