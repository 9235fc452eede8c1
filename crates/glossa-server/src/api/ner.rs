//! Named-entity recognition endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::error::ApiError;
use crate::state::{run_blocking, AppState};
use glossa_core::ner::infer;
use glossa_core::Entity;

#[derive(Debug, Deserialize)]
pub struct NerRequest {
    pub text: String,
    pub lang: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NerResponse {
    pub text: String,
    pub lang: String,
    pub entities: Vec<Entity>,
}

/// Run NER on the given text for the given language.
pub async fn recognize(
    State(state): State<AppState>,
    Json(req): Json<NerRequest>,
) -> Result<Json<NerResponse>, ApiError> {
    if req.text.is_empty() {
        return Err(ApiError::bad_request("text must contain at least 1 character"));
    }

    let _permit = state.acquire_permit().await?;
    let start = Instant::now();

    let entities = state
        .with_timeout(async {
            let model = state.ner.get_or_load(&req.lang).await?;
            let text = req.text.clone();
            run_blocking(move || infer(model.as_ref(), &text)).await
        })
        .await?;

    info!(
        "NER {}: {} chars, {} entities in {:.1}ms",
        req.lang,
        req.text.chars().count(),
        entities.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(Json(NerResponse {
        text: req.text,
        lang: req.lang,
        entities,
    }))
}
