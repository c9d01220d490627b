#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tokenlift_api::config::ServerConfig;
use tokenlift_api::router::build_app_router;
use tokenlift_api::state::AppState;
use tokenlift_core::retry::RetryConfig;
use tokenlift_db::{MemoryCheckpointStore, SharedStore};
use tokenlift_events::EventBus;
use tokenlift_pipeline::stubs::dry_run_collaborators;
use tokenlift_pipeline::{ExtractionPipeline, ExtractionService, PipelineConfig};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Application wired to the in-memory store and the dry-run collaborators.
pub struct TestApp {
    pub router: Router,
    pub service: Arc<ExtractionService>,
}

pub fn build_test_app() -> TestApp {
    let store: SharedStore = Arc::new(MemoryCheckpointStore::new());
    let event_bus = Arc::new(EventBus::default());

    let config = PipelineConfig {
        retry: RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        },
        ..Default::default()
    };
    let pipeline = ExtractionPipeline::new(config, dry_run_collaborators(), Arc::clone(&store))
        .unwrap()
        .with_observer(event_bus.clone());
    let service = Arc::new(ExtractionService::new(pipeline, store));

    let server = test_config();
    let state = AppState {
        service: Arc::clone(&service),
    };

    TestApp {
        router: build_app_router(state, &server),
        service,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
