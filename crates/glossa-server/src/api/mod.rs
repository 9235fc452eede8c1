//! API routes and handlers

mod health;
mod langid;
mod ner;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        // Named entity recognition
        .route("/ner", post(ner::recognize))
        .route("/languages", get(health::languages))
        // Language identification
        .route("/detect", post(langid::detect))
        .route("/batch-detect", post(langid::batch_detect))
        .layer(TraceLayer::new_for_http());

    let router = if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
