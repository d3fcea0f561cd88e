pub mod catalog;
pub mod config;
pub mod downloads;
pub mod error;
pub mod ledger;
pub mod models;
pub mod paths;
pub mod progress;
pub mod store;
pub mod transcribe;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    body::Body,
    http::{HeaderValue, Method, Response, StatusCode},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use catalog::Catalog;
use config::Config;
use downloads::DownloadEngine;
use ledger::ProgressLedger;
use store::ArtifactStore;
use transcribe::{CommandTranscriber, Transcriber};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ArtifactStore,
    pub ledger: Arc<dyn ProgressLedger>,
    pub engine: DownloadEngine,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl AppState {
    /// Create the directory tree, open the ledger and drop any records
    /// and staging files left over from a previous run.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        paths::init_dirs(&config.config_dir)?;

        let ledger = ledger::open(&config).context("Failed to open progress ledger")?;
        let stale = ledger.purge().context("Failed to purge progress ledger")?;
        if stale > 0 {
            tracing::info!("[Ledger] Purged {} stale download record(s)", stale);
        }

        let catalog = Arc::new(Catalog::new(config.mirror_url.as_deref()));
        let store = ArtifactStore::new(config.models_dir(), catalog);
        let orphaned = store.sweep_staging().context("Failed to clear staging files")?;
        if orphaned > 0 {
            tracing::info!("[Store] Removed {} unfinished download file(s)", orphaned);
        }
        let engine = DownloadEngine::new(
            ledger.clone(),
            config.chunk_size,
            Duration::from_secs(config.connect_timeout_secs),
            config.read_timeout(),
        )?;
        let transcriber = config
            .transcribe_command
            .as_deref()
            .and_then(CommandTranscriber::from_command)
            .map(|t| Arc::new(t) as Arc<dyn Transcriber>);

        Ok(Self {
            config: Arc::new(config),
            store,
            ledger,
            engine,
            transcriber,
        })
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| is_local_origin(origin)))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/models", get(models::list_models))
        .route("/models/download", post(models::download_model))
        .route("/models/cancel-download", post(models::cancel_download))
        .route("/models/delete", post(models::delete_model))
        .route("/download-progress/:feature/:model", get(progress::download_progress))
        .route("/downloads/active", get(models::active_downloads))
        .route("/transcribe", post(transcribe::transcribe))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::new(Duration::from_secs(state.config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    origin
        .to_str()
        .map(|o| o.starts_with("http://127.0.0.1:") || o.starts_with("http://localhost:"))
        .unwrap_or(false)
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response<Body> {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    tracing::error!("Handler panicked: {}", message);

    let mut response = Response::new(Body::from(message));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
