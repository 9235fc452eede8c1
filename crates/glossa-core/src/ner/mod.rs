//! Named-entity recognition: model capability, loading, caching and output shaping.

pub mod adapter;
pub mod bert;
pub mod cache;
pub mod loader;

use std::sync::Arc;

use crate::error::Result;

pub use adapter::{infer, Entity};
pub use bert::BertNerModel;
pub use cache::NerModelCache;
pub use loader::{BertNerLoader, ModelLoader};

/// A labelled span as reported by a model, in byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedSpan {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl RecognizedSpan {
    pub fn new(label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }
}

/// The one capability a loaded NER model offers.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>>;
}

/// Shared read-only handle to a ready model.
pub type LoadedModel = Arc<dyn EntityRecognizer>;
