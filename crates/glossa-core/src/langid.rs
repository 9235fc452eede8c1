//! Language identification on top of fastText.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fasttext::FastText;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LANGID_MODEL_FILE;
use crate::error::{Error, Result};

/// Upper bound on `k` for a single text.
pub const MAX_TOP_K: usize = 10;
/// Upper bound on texts per batch request.
pub const MAX_BATCH_SIZE: usize = 100;

const LABEL_PREFIX: &str = "__label__";

/// Raw model output: label as the model names it plus its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub label: String,
    pub probability: f32,
}

/// Capability of a loaded language identification model.
pub trait LanguageIdentifier: Send + Sync {
    fn predict(&self, text: &str, k: usize) -> Result<Vec<RawPrediction>>;
}

/// fastText classifier loaded from a `.bin` / `.ftz` file.
pub struct FastTextIdentifier {
    model: FastText,
}

impl FastTextIdentifier {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::model_unavailable(
                LANGID_MODEL_FILE,
                format!("model file not found at {}", path.display()),
                "Run: glossa-server pull --langid",
            ));
        }

        info!("Loading fastText language identification model from {:?}", path);
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::ModelLoadError(format!("Non UTF-8 model path {:?}", path)))?;

        let mut model = FastText::new();
        model.load_model(path_str).map_err(|e| {
            Error::model_unavailable(
                LANGID_MODEL_FILE,
                format!("failed to read {}: {}", path.display(), e),
                "Run: glossa-server pull --langid",
            )
        })?;
        info!("Language identification model loaded");

        Ok(Self { model })
    }
}

impl LanguageIdentifier for FastTextIdentifier {
    fn predict(&self, text: &str, k: usize) -> Result<Vec<RawPrediction>> {
        let k = i32::try_from(k).map_err(|_| Error::InvalidInput(format!("k too large: {k}")))?;
        let predictions = self
            .model
            .predict(text, k, 0.0)
            .map_err(Error::InferenceError)?;
        Ok(predictions
            .into_iter()
            .map(|p| RawPrediction {
                label: p.label,
                probability: p.prob,
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub language: String,
    pub confidence: f32,
}

/// Validates requests and shapes identifier output.
#[derive(Clone)]
pub struct LanguageDetector {
    identifier: Arc<dyn LanguageIdentifier>,
    model_path: PathBuf,
}

impl LanguageDetector {
    pub fn new(identifier: Arc<dyn LanguageIdentifier>, model_path: PathBuf) -> Self {
        Self {
            identifier,
            model_path,
        }
    }

    /// Load the fastText model at `path`.
    pub fn load_fasttext(path: &Path) -> Result<Self> {
        let identifier = FastTextIdentifier::load(path)?;
        Ok(Self::new(Arc::new(identifier), path.to_path_buf()))
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Top-`k` languages for `text`.
    pub fn detect(&self, text: &str, k: usize) -> Result<Vec<LanguageDetection>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Text cannot be empty".to_string()));
        }
        validate_k(k)?;
        self.predict(text, k)
    }

    /// Top-`k` languages for every text; blank texts get no predictions.
    pub fn detect_batch(&self, texts: &[String], k: usize) -> Result<Vec<Vec<LanguageDetection>>> {
        if texts.is_empty() {
            return Err(Error::InvalidInput("Texts list cannot be empty".to_string()));
        }
        if texts.len() > MAX_BATCH_SIZE {
            return Err(Error::InvalidInput(format!(
                "Maximum {MAX_BATCH_SIZE} texts per batch"
            )));
        }
        validate_k(k)?;

        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Ok(Vec::new())
                } else {
                    self.predict(text, k)
                }
            })
            .collect()
    }

    fn predict(&self, text: &str, k: usize) -> Result<Vec<LanguageDetection>> {
        // fastText treats a newline as end of input
        let single_line = text.replace('\n', " ");
        let predictions = self.identifier.predict(&single_line, k)?;
        Ok(predictions
            .into_iter()
            .map(|p| LanguageDetection {
                language: p.label.replace(LABEL_PREFIX, ""),
                confidence: p.probability,
            })
            .collect())
    }
}

fn validate_k(k: usize) -> Result<()> {
    if (1..=MAX_TOP_K).contains(&k) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "k must be between 1 and {MAX_TOP_K}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was asked and answers with fixed labels.
    #[derive(Default)]
    struct ScriptedIdentifier {
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl LanguageIdentifier for ScriptedIdentifier {
        fn predict(&self, text: &str, k: usize) -> Result<Vec<RawPrediction>> {
            self.seen.lock().unwrap().push((text.to_string(), k));
            let labels = [("__label__en", 0.91), ("__label__de", 0.05), ("__label__nl", 0.02)];
            Ok(labels
                .iter()
                .take(k)
                .map(|(label, probability)| RawPrediction {
                    label: label.to_string(),
                    probability: *probability,
                })
                .collect())
        }
    }

    fn detector() -> (LanguageDetector, Arc<ScriptedIdentifier>) {
        let identifier = Arc::new(ScriptedIdentifier::default());
        let detector = LanguageDetector::new(identifier.clone(), PathBuf::from("lid.176.bin"));
        (detector, identifier)
    }

    #[test]
    fn strips_label_prefix() {
        let (detector, _) = detector();
        let result = detector.detect("Hello there", 2).unwrap();
        assert_eq!(
            result,
            vec![
                LanguageDetection {
                    language: "en".to_string(),
                    confidence: 0.91
                },
                LanguageDetection {
                    language: "de".to_string(),
                    confidence: 0.05
                },
            ]
        );
    }

    #[test]
    fn replaces_newlines_before_prediction() {
        let (detector, identifier) = detector();
        detector.detect("line one\nline two", 1).unwrap();
        assert_eq!(
            identifier.seen.lock().unwrap()[0],
            ("line one line two".to_string(), 1)
        );
    }

    #[test]
    fn rejects_blank_text_and_bad_k() {
        let (detector, identifier) = detector();
        assert!(matches!(detector.detect("   ", 1), Err(Error::InvalidInput(_))));
        assert!(matches!(detector.detect("hi", 0), Err(Error::InvalidInput(_))));
        assert!(matches!(detector.detect("hi", 11), Err(Error::InvalidInput(_))));
        assert!(identifier.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_skips_blank_entries() {
        let (detector, identifier) = detector();
        let texts = vec!["Hello".to_string(), " ".to_string(), "Goedemorgen".to_string()];
        let results = detector.detect_batch(&texts, 1).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0][0].language, "en");
        assert!(results[1].is_empty());
        assert_eq!(results[2].len(), 1);
        assert_eq!(identifier.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn batch_limits() {
        let (detector, _) = detector();
        assert!(matches!(
            detector.detect_batch(&[], 1),
            Err(Error::InvalidInput(_))
        ));

        let too_many = vec!["text".to_string(); MAX_BATCH_SIZE + 1];
        assert!(matches!(
            detector.detect_batch(&too_many, 1),
            Err(Error::InvalidInput(_))
        ));

        let at_limit = vec!["text".to_string(); MAX_BATCH_SIZE];
        assert_eq!(detector.detect_batch(&at_limit, 1).unwrap().len(), MAX_BATCH_SIZE);
        assert!(detector.detect_batch(&at_limit, 0).is_err());
    }

    #[test]
    fn missing_model_file_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = match LanguageDetector::load_fasttext(&dir.path().join("lid.176.bin")) {
            Err(err) => err,
            Ok(_) => panic!("no model file present"),
        };
        match err {
            Error::ModelUnavailable { hint, .. } => {
                assert_eq!(hint, "Run: glossa-server pull --langid")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
