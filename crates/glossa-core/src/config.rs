//! Configuration types for the Glossa service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the fastText language identification model.
pub const LANGID_MODEL_FILE: &str = "lid.176.bin";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaConfig {
    /// Directory holding installed model packages
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Path to the fastText language identification model.
    /// Falls back to `<models_dir>/lid.176.bin` when unset.
    #[serde(default)]
    pub langid_model_path: Option<PathBuf>,

    /// Extra or replacement entries for the NER model table (language code -> model id)
    #[serde(default)]
    pub ner_models: BTreeMap<String, String>,

    /// Languages whose NER model is loaded at startup instead of on first request
    #[serde(default)]
    pub preload_languages: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for GlossaConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            langid_model_path: None,
            ner_models: BTreeMap::new(),
            preload_languages: Vec::new(),
            server: ServerConfig::default(),
        }
    }
}

impl GlossaConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn langid_model_path(&self) -> PathBuf {
        self.langid_model_path
            .clone()
            .unwrap_or_else(|| self.models_dir.join(LANGID_MODEL_FILE))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,

    /// Upper bound on concurrently running inference requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Per-request timeout (seconds), including a cold model load
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("GLOSSA_MODELS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glossa")
        .join("models")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_enabled() -> bool {
    true
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    300
}
