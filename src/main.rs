//! formcoach - conversational fitness coaching backend
//!
//! Turns natural-language requests into validated mutations against the
//! fitness state model, streaming assistant output to the client over SSE.

mod api;
mod domain;
mod draft;
mod llm;
mod orchestrator;
mod store;
mod tools;

use api::{create_router, AppState};
use draft::DraftStore;
use llm::ResponsesClient;
use orchestrator::Orchestrator;
use store::{DeltaLog, DeltaSynchronizer, HttpRemoteStore, OutboxWorker, OverlayStore};
use tools::HandlerRegistry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formcoach=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("FORMCOACH_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.formcoach/deltas.db")
    });

    let port: u16 = std::env::var("FORMCOACH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let model_endpoint = std::env::var("MODEL_ENDPOINT")
        .unwrap_or_else(|_| "https://api.openai.com/v1/responses".to_string());
    let model_name = std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string());
    let model_api_key = std::env::var("MODEL_API_KEY").unwrap_or_default();
    if model_api_key.is_empty() {
        tracing::warn!("MODEL_API_KEY is not set; model requests will be rejected upstream");
    }

    let remote_store_url =
        std::env::var("REMOTE_STORE_URL").unwrap_or_else(|_| "http://localhost:9090".to_string());

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Durable delta log + overlay + outbox
    tracing::info!(path = %db_path, "Opening delta log");
    let log = DeltaLog::open(&db_path)?;
    let overlay = Arc::new(OverlayStore::new());
    let remote = Arc::new(HttpRemoteStore::new(remote_store_url));

    let (nudge_tx, nudge_rx) = tokio::sync::mpsc::channel(8);
    let sync = DeltaSynchronizer::new(overlay.clone(), log.clone(), remote.clone(), nudge_tx);

    let worker = OutboxWorker::new(overlay, log, remote, nudge_rx);
    tokio::spawn(worker.run());

    // Orchestrator wiring
    let registry = Arc::new(HandlerRegistry::standard());
    let model = Arc::new(ResponsesClient::new(model_endpoint, model_api_key, model_name));
    let drafts = Arc::new(DraftStore::new());

    let progress_timeout = std::env::var("FORMCOACH_TURN_TIMEOUT_SECS")
        .ok()
        .and_then(|t| t.parse().ok())
        .map_or(std::time::Duration::from_secs(60), std::time::Duration::from_secs);
    let orchestrator = Arc::new(
        Orchestrator::new(registry, model, sync.clone(), drafts.clone())
            .with_progress_timeout(progress_timeout),
    );

    let state = AppState::new(orchestrator, sync, drafts);

    // Router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("formcoach server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
