use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::catalog::{CatalogEntry, Feature};
use crate::downloads::{fetch_artifact, FetchOutcome};
use crate::error::AppError;
use crate::ledger::{DownloadKey, LedgerError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub canceled: bool,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            canceled: false,
        }
    }

    pub fn canceled() -> Self {
        Self {
            canceled: true,
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            canceled: false,
        }
    }
}

/// Check the request against the allow-list. The error is the message
/// returned to the client.
fn resolve(state: &AppState, req: &ModelRequest) -> Result<CatalogEntry, String> {
    let feature = Feature::parse(&req.feature).ok_or_else(|| format!("Invalid feature: {}", req.feature))?;
    state
        .store
        .catalog()
        .get(feature, &req.model)
        .cloned()
        .ok_or_else(|| format!("Invalid model: {}", req.model))
}

/// GET /models
pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let mut models = Map::new();
    for feature in Feature::ALL {
        models.insert(feature.name().to_string(), json!(state.store.list(feature)));
    }
    Json(json!({ "models": models }))
}

/// POST /models/download
///
/// Blocks until the transfer completes, is canceled or fails.
pub async fn download_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let entry = match resolve(&state, &req) {
        Ok(entry) => entry,
        Err(message) => return Ok(Json(ApiResponse::failure(message))),
    };

    // Run detached so a client hanging up mid-transfer does not drop
    // the future before the staging file and ledger record are cleaned.
    let engine = state.engine.clone();
    let store = state.store.clone();
    let task = tokio::spawn(async move { fetch_artifact(&engine, &store, &entry).await });

    match task.await? {
        Ok(FetchOutcome::Completed { .. }) => Ok(Json(ApiResponse::ok())),
        Ok(FetchOutcome::Canceled) => Ok(Json(ApiResponse::canceled())),
        Err(e) if e.is_network() => Ok(Json(ApiResponse::failure(e.to_string()))),
        Err(e) => Err(e.into()),
    }
}

/// POST /models/cancel-download
pub async fn cancel_download(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let key = DownloadKey::new(&req.feature, &req.model);

    match state.ledger.cancel(&key) {
        Ok(()) => {
            tracing::info!("[Download] Cancel requested for {}", key);
            Ok(Json(ApiResponse::ok()))
        }
        Err(e @ LedgerError::NotFound(_)) => Ok(Json(ApiResponse::failure(e.to_string()))),
        Err(e) => Err(e.into()),
    }
}

/// POST /models/delete
pub async fn delete_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let entry = match resolve(&state, &req) {
        Ok(entry) => entry,
        Err(message) => return Ok(Json(ApiResponse::failure(message))),
    };

    state.store.delete(entry.feature, &entry.name)?;
    Ok(Json(ApiResponse::ok()))
}

#[derive(Debug, Serialize)]
struct ActiveDownload {
    key: String,
    percent: f64,
    canceled: bool,
}

/// GET /downloads/active
pub async fn active_downloads(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let downloads: Vec<ActiveDownload> = state
        .ledger
        .active()?
        .into_iter()
        .map(|(key, record)| ActiveDownload {
            key,
            percent: record.percent,
            canceled: record.canceled,
        })
        .collect();
    Ok(Json(json!({ "downloads": downloads })))
}
