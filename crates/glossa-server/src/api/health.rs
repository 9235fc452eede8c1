//! Health and introspection endpoints

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ner: NerHealth,
    pub langid: LangIdHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NerHealth {
    pub loaded_languages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LangIdHealth {
    pub model_loaded: bool,
    pub model_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub supported: Vec<String>,
    pub models: BTreeMap<String, String>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ner: NerHealth {
            loaded_languages: state.ner.loaded_languages().await,
        },
        langid: LangIdHealth {
            model_loaded: state.langid.is_some(),
            model_path: state.langid_model_path.display().to_string(),
        },
    })
}

/// Languages the NER endpoint accepts and the model serving each
pub async fn languages(State(state): State<AppState>) -> Json<LanguagesResponse> {
    let registry = state.ner.registry();
    Json(LanguagesResponse {
        supported: registry.supported_languages(),
        models: registry
            .entries()
            .map(|(lang, model)| (lang.to_string(), model.to_string()))
            .collect(),
    })
}

/// API information
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "Glossa",
        "version": env!("CARGO_PKG_VERSION"),
        "ner_languages": state.ner.registry().supported_languages(),
        "langid_model": glossa_core::config::LANGID_MODEL_FILE,
        "endpoints": {
            "POST /ner": "Named entity recognition for a text in a supported language",
            "GET /languages": "Supported NER languages and their models",
            "POST /detect": "Detect language of single text",
            "POST /batch-detect": "Detect language of multiple texts",
            "GET /health": "Health check",
        }
    }))
}
