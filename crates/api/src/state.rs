use std::sync::Arc;

use tokenlift_pipeline::ExtractionService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Extraction jobs and their checkpoint store.
    pub service: Arc<ExtractionService>,
}
