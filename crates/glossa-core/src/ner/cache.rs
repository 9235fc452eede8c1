//! Lazy per-language NER model cache.
//!
//! Every language gets its own `OnceCell`, so concurrent first requests for
//! one language share a single load while other languages load independently.
//! A failed load leaves the cell empty; the next request tries again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

use super::loader::ModelLoader;
use super::LoadedModel;
use crate::catalog::{LanguageCode, ModelRegistry};
use crate::error::{Error, Result};

pub struct NerModelCache {
    registry: ModelRegistry,
    loader: Arc<dyn ModelLoader>,
    models: RwLock<HashMap<LanguageCode, Arc<OnceCell<LoadedModel>>>>,
}

impl NerModelCache {
    pub fn new(registry: ModelRegistry, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            registry,
            loader,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Return the model serving `lang`, loading it on first use.
    pub async fn get_or_load(&self, lang: &str) -> Result<LoadedModel> {
        let (code, model_id) = self.registry.lookup(lang)?;

        {
            let guard = self.models.read().await;
            if let Some(model) = guard.get(lang).and_then(|cell| cell.get()) {
                return Ok(model.clone());
            }
        }

        let cell = {
            let mut guard = self.models.write().await;
            guard
                .entry(code.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        // Owned by its own task: dropping the caller must not cancel a load
        // other requests are waiting on.
        let init = {
            let loader = self.loader.clone();
            let model_id = model_id.clone();
            let code = code.clone();
            tokio::spawn(async move {
                cell.get_or_try_init(|| async move {
                    info!("Loading NER model {} for language {}", model_id, code);
                    let loaded = tokio::task::spawn_blocking(move || loader.load(&model_id))
                        .await
                        .map_err(|e| Error::ModelLoadError(e.to_string()))?;
                    if let Err(err) = &loaded {
                        warn!("Failed to load NER model for {}: {}", code, err);
                    }
                    loaded
                })
                .await
                .cloned()
            })
        };

        init.await
            .map_err(|e| Error::ModelLoadError(format!("Model load task failed: {e}")))?
    }

    pub async fn is_loaded(&self, lang: &str) -> bool {
        let guard = self.models.read().await;
        guard
            .get(lang)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Languages whose model is currently held, sorted.
    pub async fn loaded_languages(&self) -> Vec<String> {
        let guard = self.models.read().await;
        let mut langs: Vec<String> = guard
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(lang, _)| lang.to_string())
            .collect();
        langs.sort();
        langs
    }

    /// Load the given languages up front. Failures are logged, not returned.
    pub async fn preload(&self, langs: &[String]) {
        for lang in langs {
            if let Err(err) = self.get_or_load(lang).await {
                warn!("Preloading NER model for {} failed: {}", lang, err);
            }
        }
    }

    /// Drop every held model.
    pub async fn clear(&self) {
        let mut guard = self.models.write().await;
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelId;
    use crate::ner::{infer, EntityRecognizer, RecognizedSpan};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Greeter;

    impl EntityRecognizer for Greeter {
        fn recognize(&self, _text: &str) -> Result<Vec<RecognizedSpan>> {
            Ok(vec![RecognizedSpan::new("GREETING", 0, 5)])
        }
    }

    /// Loader that counts invocations and can be told to fail.
    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Option<Duration>,
        requested: Mutex<Vec<String>>,
    }

    impl CountingLoader {
        fn failing_once() -> Self {
            Self {
                failures_left: AtomicUsize::new(1),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, model_id: &ModelId) -> Result<LoadedModel> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(model_id.to_string());
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let should_fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(Error::model_unavailable(
                    model_id.as_str(),
                    "package not installed",
                    "install it",
                ));
            }
            Ok(Arc::new(Greeter))
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::from_entries([("en", "modelA"), ("fr", "modelB")])
    }

    #[tokio::test]
    async fn repeated_requests_reuse_the_loaded_model() {
        let loader = Arc::new(CountingLoader::default());
        let cache = NerModelCache::new(registry(), loader.clone());

        let first = cache.get_or_load("en").await.unwrap();
        for _ in 0..5 {
            let again = cache.get_or_load("en").await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(loader.loads(), 1);
        assert_eq!(*loader.requested.lock().unwrap(), vec!["modelA".to_string()]);
    }

    #[tokio::test]
    async fn unsupported_language_never_reaches_loader() {
        let loader = Arc::new(CountingLoader::default());
        let cache = NerModelCache::new(registry(), loader.clone());

        let err = match cache.get_or_load("de").await {
            Err(err) => err,
            Ok(_) => panic!("de is not in the registry"),
        };
        assert!(matches!(err, Error::UnsupportedLanguage { ref lang, .. } if lang == "de"));
        assert_eq!(loader.loads(), 0);
        assert!(cache.loaded_languages().await.is_empty());
        assert!(cache.models.read().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_load_once() {
        let loader = Arc::new(CountingLoader::slow(Duration::from_millis(50)));
        let cache = Arc::new(NerModelCache::new(registry(), loader.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_load("fr").await })
            })
            .collect();

        let mut models = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(model) => models.push(model),
                Err(err) => panic!("load failed: {err}"),
            }
        }

        assert_eq!(loader.loads(), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn languages_load_independently() {
        let loader = Arc::new(CountingLoader::slow(Duration::from_millis(20)));
        let cache = Arc::new(NerModelCache::new(registry(), loader.clone()));

        let (en, fr) = tokio::join!(cache.get_or_load("en"), cache.get_or_load("fr"));
        assert!(en.is_ok() && fr.is_ok());
        assert_eq!(loader.loads(), 2);
        assert_eq!(cache.loaded_languages().await, vec!["en", "fr"]);
    }

    #[tokio::test]
    async fn end_to_end_hello_world() {
        let cache = NerModelCache::new(registry(), Arc::new(CountingLoader::default()));

        let model = cache.get_or_load("en").await.unwrap();
        let entities = infer(model.as_ref(), "Hello world").unwrap();

        assert_eq!(cache.loaded_languages().await, vec!["en"]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Hello");
        assert_eq!(entities[0].label, "GREETING");
        assert_eq!((entities[0].start, entities[0].end), (0, 5));
    }

    #[tokio::test]
    async fn failed_load_leaves_language_absent_until_retry() {
        let loader = Arc::new(CountingLoader::failing_once());
        let cache = NerModelCache::new(registry(), loader.clone());

        match cache.get_or_load("fr").await {
            Err(Error::ModelUnavailable { model_id, .. }) => assert_eq!(model_id, "modelB"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("first load should fail"),
        }
        assert!(!cache.is_loaded("fr").await);
        assert!(cache.loaded_languages().await.is_empty());

        let model = cache.get_or_load("fr").await;
        assert!(model.is_ok());
        assert!(cache.is_loaded("fr").await);
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn abandoned_request_does_not_restart_load() {
        let loader = Arc::new(CountingLoader::slow(Duration::from_millis(300)));
        let cache = NerModelCache::new(registry(), loader.clone());

        let first = tokio::time::timeout(Duration::from_millis(50), cache.get_or_load("en")).await;
        assert!(first.is_err());

        let model = cache.get_or_load("en").await;
        assert!(model.is_ok());
        assert_eq!(loader.loads(), 1);
        assert!(cache.is_loaded("en").await);
    }

    #[tokio::test]
    async fn preload_and_clear() {
        let loader = Arc::new(CountingLoader::default());
        let cache = NerModelCache::new(registry(), loader.clone());

        cache
            .preload(&["en".to_string(), "xx".to_string()])
            .await;
        assert_eq!(cache.loaded_languages().await, vec!["en"]);

        cache.clear().await;
        assert!(!cache.is_loaded("en").await);

        cache.get_or_load("en").await.unwrap();
        assert_eq!(loader.loads(), 2);
    }
}
