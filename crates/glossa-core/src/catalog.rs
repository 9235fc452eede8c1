//! NER model catalog: which model package serves which language.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Default language -> model table.
///
/// Languages without a dedicated checkpoint share a multilingual one.
pub const DEFAULT_NER_MODELS: &[(&str, &str)] = &[
    ("en", "dslim/bert-base-NER"),
    ("fr", "Davlan/bert-base-multilingual-cased-ner-hrl"),
    ("de", "Davlan/bert-base-multilingual-cased-ner-hrl"),
    ("nl", "Davlan/bert-base-multilingual-cased-ner-hrl"),
    ("ru", "Babelscape/wikineural-multilingual-ner"),
    ("ar", "Babelscape/wikineural-multilingual-ner"),
    ("ms", "Babelscape/wikineural-multilingual-ner"),
];

/// Short language identifier used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an installable model package (a Hugging Face repo id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name of the installed package under the models directory.
    pub fn dir_name(&self) -> String {
        self.0.replace('/', "--")
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static mapping from language code to model identifier.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<LanguageCode, ModelId>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_entries(DEFAULT_NER_MODELS.iter().copied())
    }
}

impl ModelRegistry {
    pub fn from_entries<L, M>(entries: impl IntoIterator<Item = (L, M)>) -> Self
    where
        L: Into<String>,
        M: Into<String>,
    {
        let models = entries
            .into_iter()
            .map(|(lang, model)| (LanguageCode(lang.into()), ModelId(model.into())))
            .collect();
        Self { models }
    }

    /// Replace or extend entries of this table.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Result<Self> {
        for (lang, model) in overrides {
            let lang = lang.trim();
            let model = model.trim();
            if lang.is_empty() || model.is_empty() {
                return Err(Error::ConfigError(format!(
                    "Invalid NER model override '{lang}' = '{model}'"
                )));
            }
            self.models
                .insert(LanguageCode(lang.to_string()), ModelId(model.to_string()));
        }
        Ok(self)
    }

    /// Look up both the canonical language code and its model.
    pub fn lookup(&self, lang: &str) -> Result<(&LanguageCode, &ModelId)> {
        self.models
            .get_key_value(lang)
            .ok_or_else(|| Error::UnsupportedLanguage {
                lang: lang.to_string(),
                supported: self.supported_languages(),
            })
    }

    pub fn resolve(&self, lang: &str) -> Result<&ModelId> {
        self.lookup(lang).map(|(_, model)| model)
    }

    pub fn supported_languages(&self) -> Vec<String> {
        self.models.keys().map(|lang| lang.0.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&LanguageCode, &ModelId)> {
        self.models.iter()
    }

    /// Distinct model identifiers referenced by the table.
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.models
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl std::borrow::Borrow<str> for LanguageCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}
