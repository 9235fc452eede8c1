//! Model provisioning: NER packages from the Hugging Face Hub and the
//! fastText language identification model.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hf_hub::api::sync::Api;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::{debug, error, info};

use crate::catalog::ModelId;
use crate::error::{Error, Result};
use crate::ner::loader::{missing_ner_file, REQUIRED_NER_FILES};

/// Source of `lid.176.bin`.
pub const LANGID_MODEL_URL: &str =
    "https://dl.fbaipublicfiles.com/fasttext/supervised-models/lid.176.bin";

pub struct ModelDownloader {
    models_dir: PathBuf,
}

impl ModelDownloader {
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn model_path(&self, model_id: &ModelId) -> PathBuf {
        self.models_dir.join(model_id.dir_name())
    }

    pub fn is_installed(&self, model_id: &ModelId) -> bool {
        let path = self.model_path(model_id);
        path.is_dir() && missing_ner_file(&path).is_none()
    }

    /// Install a NER package into `<models_dir>/<dir_name>`.
    pub fn pull_ner(&self, model_id: &ModelId) -> Result<PathBuf> {
        let local_dir = self.model_path(model_id);
        std::fs::create_dir_all(&local_dir)?;

        if missing_ner_file(&local_dir).is_none() {
            info!("Model {} already installed at {:?}", model_id, local_dir);
            return Ok(local_dir);
        }

        info!("Downloading {} to {:?}", model_id, local_dir);
        let api = Api::new().map_err(|e| Error::DownloadError(e.to_string()))?;
        let repo = api.model(model_id.to_string());

        let pb = ProgressBar::new(REQUIRED_NER_FILES.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")
                .map_err(|e| Error::DownloadError(e.to_string()))?,
        );

        for file in REQUIRED_NER_FILES {
            let dest = local_dir.join(file);
            pb.set_message(file.to_string());
            if dest.is_file() {
                debug!("File already exists: {:?}", dest);
                pb.inc(1);
                continue;
            }

            let cached = repo.get(file).map_err(|e| {
                error!("Failed to download {} from {}: {}", file, model_id, e);
                Error::DownloadError(format!("{model_id}/{file}: {e}"))
            })?;
            std::fs::copy(&cached, &dest)?;
            debug!("Installed {:?} -> {:?}", cached, dest);
            pb.inc(1);
        }
        pb.finish_with_message("done");

        info!("Model {} installed", model_id);
        Ok(local_dir)
    }

    /// Fetch the language identification model to `path` unless it exists.
    pub fn pull_langid(&self, path: &Path) -> Result<()> {
        if path.is_file() {
            info!("Model already exists at {:?}", path);
            info!("Model size: {:.2} MB", file_size_mb(path)?);
            return Ok(());
        }

        info!("Downloading model from {}...", LANGID_MODEL_URL);
        info!("This will be saved to {:?}", path);

        if let Err(e) = download_file(LANGID_MODEL_URL, path) {
            error!("Failed to download model: {}", e);
            return Err(e);
        }

        info!("Model downloaded successfully! Size: {:.2} MB", file_size_mb(path)?);
        Ok(())
    }
}

fn file_size_mb(path: &Path) -> Result<f64> {
    Ok(std::fs::metadata(path)?.len() as f64 / (1024.0 * 1024.0))
}

/// Stream `url` into `dest` through a temporary sibling file.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = Client::builder()
        .timeout(Duration::from_secs(3600))
        .build()
        .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

    let response = client
        .get(url)
        .header("User-Agent", concat!("glossa/", env!("CARGO_PKG_VERSION")))
        .send()
        .map_err(|e| Error::DownloadError(format!("HTTP request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::DownloadError(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pb = match response.content_length() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:30} {bytes}/{total_bytes}")
            .map_err(|e| Error::DownloadError(e.to_string()))?,
    );

    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)?;
    let mut reader = pb.wrap_read(response);
    if let Err(e) = std::io::copy(&mut reader, &mut file) {
        let _ = std::fs::remove_file(&partial);
        return Err(Error::DownloadError(format!("Failed to read response: {e}")));
    }
    pb.finish();
    drop(file);

    install_partial(&partial, dest)
}

/// Move a finished download into place, removing it if that fails.
fn install_partial(partial: &Path, dest: &Path) -> Result<()> {
    std::fs::rename(partial, dest).map_err(|e| {
        let _ = std::fs::remove_file(partial);
        Error::DownloadError(format!("Failed to install {:?}: {e}", dest))
    })
}
