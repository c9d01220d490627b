use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenlift_api::config::{AppConfig, CollaboratorMode};
use tokenlift_api::router::build_app_router;
use tokenlift_api::state::AppState;
use tokenlift_db::{MemoryCheckpointStore, PgCheckpointStore, SharedStore};
use tokenlift_events::{EventBus, EventLogger};
use tokenlift_pipeline::stubs::dry_run_collaborators;
use tokenlift_pipeline::{Collaborators, ExtractionPipeline, ExtractionService};
use tokenlift_renderer::{HttpComponentRenderer, HttpPageRenderer, VisionClient};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = AppConfig::from_env()?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        dry_run = config.collaborators == CollaboratorMode::DryRun,
        "Loaded server configuration"
    );

    // --- Checkpoint store ---
    let store = build_store(config.database_url.as_deref()).await?;

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(event_bus.subscribe()));
    tracing::info!("Event bus created");

    // --- Pipeline ---
    let pipeline = ExtractionPipeline::new(
        config.pipeline.clone(),
        build_collaborators(&config.collaborators),
        Arc::clone(&store),
    )?
    .with_observer(event_bus.clone());
    let service = Arc::new(ExtractionService::new(pipeline, store));

    // --- App state ---
    let state = AppState {
        service: Arc::clone(&service),
    };
    let app = build_app_router(state, &config.server);

    // --- Start server ---
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, service.shutdown()).await.is_err() {
        tracing::warn!(
            running_jobs = service.running_jobs().await,
            "Extractions did not finish within the shutdown timeout"
        );
    }

    // Dropping the last senders closes the broadcast channel and stops the logger.
    drop(service);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "tokenlift_api=debug,tokenlift_pipeline=debug,tower_http=debug".into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Postgres when a database URL is configured, memory otherwise.
async fn build_store(database_url: Option<&str>) -> Result<SharedStore, BoxError> {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, checkpoints are kept in memory only");
        return Ok(Arc::new(MemoryCheckpointStore::new()));
    };

    let pool = tokenlift_db::create_pool(url).await?;
    tracing::info!("Database connection pool created");

    tokenlift_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    tokenlift_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgCheckpointStore::new(pool)))
}

fn build_collaborators(mode: &CollaboratorMode) -> Collaborators {
    match mode {
        CollaboratorMode::DryRun => {
            tracing::info!("Dry run: using stub renderer and identifier");
            dry_run_collaborators()
        }
        CollaboratorMode::Http {
            renderer_url,
            vision_url,
            vision_api_key,
        } => Collaborators {
            renderer: Arc::new(HttpPageRenderer::new(renderer_url.clone())),
            identifier: Arc::new(VisionClient::new(vision_url.clone(), vision_api_key.clone())),
            component_renderer: Some(Arc::new(HttpComponentRenderer::new(renderer_url.clone()))),
        },
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
