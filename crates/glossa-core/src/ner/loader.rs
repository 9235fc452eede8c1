//! Materializes installed NER model packages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::Device;
use tracing::{debug, info};

use super::bert::BertNerModel;
use super::LoadedModel;
use crate::catalog::ModelId;
use crate::error::{Error, Result};

/// Files a token-classification package must ship.
pub const REQUIRED_NER_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// Turns a model identifier into a ready model.
///
/// Implementations block; callers run them off the async executor.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_id: &ModelId) -> Result<LoadedModel>;
}

/// Hint attached to `ModelUnavailable` for NER packages.
pub fn install_hint(model_id: &ModelId) -> String {
    format!("Run: glossa-server pull {model_id}")
}

/// Returns the first required file missing from `model_dir`, if any.
pub fn missing_ner_file(model_dir: &Path) -> Option<&'static str> {
    REQUIRED_NER_FILES
        .iter()
        .copied()
        .find(|file| !model_dir.join(file).is_file())
}

/// Loads BERT token-classification checkpoints from `<models_dir>/<dir_name>`.
pub struct BertNerLoader {
    models_dir: PathBuf,
    device: Device,
}

impl BertNerLoader {
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            device: Device::Cpu,
        }
    }

    pub fn model_path(&self, model_id: &ModelId) -> PathBuf {
        self.models_dir.join(model_id.dir_name())
    }
}

impl ModelLoader for BertNerLoader {
    fn load(&self, model_id: &ModelId) -> Result<LoadedModel> {
        let model_dir = self.model_path(model_id);
        debug!("Resolving NER package {} at {:?}", model_id, model_dir);

        if !model_dir.is_dir() {
            return Err(Error::model_unavailable(
                model_id.as_str(),
                format!("package directory {} not found", model_dir.display()),
                install_hint(model_id),
            ));
        }
        if let Some(file) = missing_ner_file(&model_dir) {
            return Err(Error::model_unavailable(
                model_id.as_str(),
                format!("{file} missing from {}", model_dir.display()),
                install_hint(model_id),
            ));
        }

        let model = BertNerModel::load(&model_dir, &self.device).map_err(|e| match e {
            Error::ModelUnavailable { .. } => e,
            other => Error::model_unavailable(
                model_id.as_str(),
                format!("package is corrupt: {other}"),
                install_hint(model_id),
            ),
        })?;

        info!(
            "Loaded NER model {} ({} labels)",
            model_id,
            model.num_labels()
        );
        Ok(Arc::new(model))
    }
}
