//! Application state shared by all handlers

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glossa_core::{LanguageDetector, NerModelCache, ServerConfig};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    /// Lazily populated NER models, one per language
    pub ner: Arc<NerModelCache>,
    /// Language identification model, `None` when it failed to load at startup
    pub langid: Option<LanguageDetector>,
    pub langid_model_path: PathBuf,
    /// Concurrency limiter to prevent resource exhaustion
    pub request_semaphore: Arc<Semaphore>,
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(
        ner: NerModelCache,
        langid: Option<LanguageDetector>,
        langid_model_path: PathBuf,
        server: &ServerConfig,
    ) -> Self {
        Self {
            ner: Arc::new(ner),
            langid,
            langid_model_path,
            request_semaphore: Arc::new(Semaphore::new(server.max_concurrent_requests.max(1))),
            request_timeout_secs: server.request_timeout_secs,
        }
    }

    /// Acquire a permit for concurrent request processing
    pub async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>, ApiError> {
        self.request_semaphore
            .acquire()
            .await
            .map_err(|_| ApiError::service_unavailable("Server is shutting down"))
    }

    pub fn langid(&self) -> Result<&LanguageDetector, ApiError> {
        self.langid
            .as_ref()
            .ok_or_else(|| ApiError::service_unavailable("Model not loaded"))
    }

    /// Run `work` under the configured request timeout.
    pub async fn with_timeout<T>(
        &self,
        work: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        tokio::time::timeout(Duration::from_secs(self.request_timeout_secs), work)
            .await
            .map_err(|_| {
                ApiError::timeout(format!(
                    "Request exceeded {}s timeout",
                    self.request_timeout_secs
                ))
            })?
    }
}

/// Run CPU-bound model work off the async executor.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> glossa_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("Inference task failed: {e}")))?
        .map_err(ApiError::from)
}
