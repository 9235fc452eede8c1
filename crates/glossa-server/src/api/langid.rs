//! Language detection endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{run_blocking, AppState};
use glossa_core::LanguageDetection;

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub text: String,
    /// Number of top predictions to return
    #[serde(default = "default_k")]
    pub k: usize,
}

#[derive(Debug, Deserialize)]
pub struct BatchParams {
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub predictions: Vec<LanguageDetection>,
}

/// Detect the language of a single text
pub async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let detector = state.langid()?.clone();
    let _permit = state.acquire_permit().await?;
    debug!("Language detection request: {} chars, k={}", req.text.len(), req.k);

    let predictions = state
        .with_timeout(run_blocking(move || detector.detect(&req.text, req.k)))
        .await?;

    Ok(Json(DetectionResponse { predictions }))
}

/// Detect the language of up to 100 texts
pub async fn batch_detect(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
    Json(texts): Json<Vec<String>>,
) -> Result<Json<Vec<DetectionResponse>>, ApiError> {
    let detector = state.langid()?.clone();
    let _permit = state.acquire_permit().await?;
    info!("Batch language detection: {} texts, k={}", texts.len(), params.k);

    let results = state
        .with_timeout(run_blocking(move || detector.detect_batch(&texts, params.k)))
        .await?;

    Ok(Json(
        results
            .into_iter()
            .map(|predictions| DetectionResponse { predictions })
            .collect(),
    ))
}
