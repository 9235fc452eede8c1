//! Glossa Core - language identification and named-entity recognition
//!
//! Pre-trained models are loaded from locally installed packages and served
//! through two capabilities:
//!
//! - [`langid::LanguageDetector`] wraps a fastText classifier (`lid.176.bin`)
//! - [`ner::NerModelCache`] lazily loads one BERT token-classification model
//!   per language and hands out shared read-only handles
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glossa_core::{BertNerLoader, ModelRegistry, NerModelCache};
//!
//! let loader = Arc::new(BertNerLoader::new(models_dir));
//! let cache = NerModelCache::new(ModelRegistry::default(), loader);
//!
//! let model = cache.get_or_load("en").await?;
//! let entities = glossa_core::ner::infer(model.as_ref(), "Angela Merkel visited Paris")?;
//! ```

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod langid;
pub mod ner;

pub use catalog::{LanguageCode, ModelId, ModelRegistry};
pub use config::{GlossaConfig, ServerConfig};
pub use download::ModelDownloader;
pub use error::{Error, Result};
pub use langid::{LanguageDetection, LanguageDetector, LanguageIdentifier};
pub use ner::{
    BertNerLoader, Entity, EntityRecognizer, LoadedModel, ModelLoader, NerModelCache,
    RecognizedSpan,
};
