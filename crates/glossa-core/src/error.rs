//! Error types for the Glossa core

use thiserror::Error;

/// Result alias used throughout the core crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Language code is not a key of the model registry.
    #[error("Unsupported language: {lang}. Supported: {}", supported.join(", "))]
    UnsupportedLanguage { lang: String, supported: Vec<String> },

    /// Backing model package is missing or corrupt. Needs operator action.
    #[error("Model {model_id} not available: {reason}. {hint}")]
    ModelUnavailable {
        model_id: String,
        reason: String,
        hint: String,
    },

    #[error("Model load error: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tokenization error: {0}")]
    TokenizationError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    pub(crate) fn model_unavailable(
        model_id: impl Into<String>,
        reason: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Error::ModelUnavailable {
            model_id: model_id.into(),
            reason: reason.into(),
            hint: hint.into(),
        }
    }

    /// True when the failure stems from the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLanguage { .. } | Error::InvalidInput(_)
        )
    }
}
