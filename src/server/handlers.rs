//! Request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::inference::{CreditScorer, CustomerRecord, ModelInfo, ScoredRecord};

/// Body of `POST /batch_predict`
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub data: Vec<CustomerRecord>,
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "Credit Default Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": state.is_ready(),
        "endpoints": {
            "health": "GET /health",
            "predict": "POST /predict",
            "batch_predict": "POST /batch_predict",
            "model_info": "GET /model_info",
        },
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds();
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "ready": true,
                "model_path": state.config.model_path.display().to_string(),
                "uptime_secs": uptime_secs,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "ready": false,
                "error": state.load_error.clone().unwrap_or_else(|| "model not loaded".to_string()),
                "uptime_secs": uptime_secs,
            })),
        )
    }
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CustomerRecord>, JsonRejection>,
) -> Result<Json<ScoredRecord>> {
    let scorer = state.scorer()?;
    let Json(record) = payload?;
    let mut scored = score(scorer, vec![record]).await?;
    scored
        .pop()
        .map(Json)
        .ok_or_else(|| ServerError::Internal("empty prediction".to_string()))
}

pub async fn batch_predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<Vec<ScoredRecord>>> {
    let scorer = state.scorer()?;
    let Json(request) = payload?;
    if request.data.is_empty() {
        return Err(ServerError::BadRequest("data must contain at least one record".to_string()));
    }
    Ok(Json(score(scorer, request.data).await?))
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<ModelInfo>> {
    Ok(Json(state.scorer()?.model_info()))
}

/// Scoring is CPU-bound, so it runs off the async workers
async fn score(scorer: Arc<CreditScorer>, records: Vec<CustomerRecord>) -> Result<Vec<ScoredRecord>> {
    tokio::task::spawn_blocking(move || scorer.predict(&records))
        .await
        .map_err(|e| ServerError::Internal(format!("scoring task failed: {}", e)))?
        .map_err(ServerError::from)
}
