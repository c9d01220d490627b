pub mod extractions;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /extractions                     list, start
/// /extractions/{id}                get, delete
/// /extractions/{id}/cancel         cancel (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/extractions", extractions::router())
}
