//! BERT token-classification backend on candle.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::debug;

use super::{EntityRecognizer, RecognizedSpan};
use crate::error::{Error, Result};

/// Hard cap on encoder input length.
const MAX_SEQUENCE_LENGTH: usize = 512;

/// Tokens shared by consecutive windows of a long text.
const WINDOW_STRIDE: usize = 128;

/// Fields of `config.json` the classification head needs.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    max_position_embeddings: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

fn default_max_position_embeddings() -> usize {
    MAX_SEQUENCE_LENGTH
}

pub struct BertNerModel {
    tokenizer: Tokenizer,
    encoder: BertModel,
    classifier: Linear,
    labels: Vec<String>,
    device: Device,
}

impl BertNerModel {
    pub fn load(model_dir: &Path, device: &Device) -> Result<Self> {
        let config_str = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| Error::ModelLoadError(format!("Invalid config.json: {e}")))?;
        let head: HeadConfig = serde_json::from_str(&config_str)
            .map_err(|e| Error::ModelLoadError(format!("Invalid config.json: {e}")))?;
        let labels = ordered_labels(&head.id2label)?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| Error::TokenizationError(e.to_string()))?;
        let max_length = head.max_position_embeddings.min(MAX_SEQUENCE_LENGTH);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                stride: WINDOW_STRIDE.min(max_length / 4),
                ..Default::default()
            }))
            .map_err(|e| Error::TokenizationError(e.to_string()))?;
        tokenizer.with_padding(None);

        let weights_path = model_dir.join("model.safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };
        let encoder = BertModel::load(vb.pp("bert"), &config)?;
        let classifier = linear(head.hidden_size, labels.len(), vb.pp("classifier"))?;

        debug!("BERT NER labels: {:?}", labels);

        Ok(Self {
            tokenizer,
            encoder,
            classifier,
            labels,
            device: device.clone(),
        })
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    fn label(&self, id: u32) -> &str {
        self.labels
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("O")
    }

    /// Tag every non-special token of one encoder window.
    fn classify<'a>(&'a self, encoding: &Encoding) -> Result<Vec<TokenLabel<'a>>> {
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let hidden = self
            .encoder
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let logits = self.classifier.forward(&hidden)?;
        let predicted = logits.squeeze(0)?.argmax(D::Minus1)?.to_vec1::<u32>()?;

        let offsets = encoding.get_offsets();
        let special = encoding.get_special_tokens_mask();
        let words = encoding.get_word_ids();

        Ok(predicted
            .iter()
            .enumerate()
            .filter(|(idx, _)| special.get(*idx).copied().unwrap_or(0) == 0)
            .map(|(idx, label_id)| TokenLabel {
                label: self.label(*label_id),
                start: offsets[idx].0,
                end: offsets[idx].1,
                word: words.get(idx).copied().flatten(),
            })
            .collect())
    }
}

impl EntityRecognizer for BertNerModel {
    fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::TokenizationError(e.to_string()))?;

        let overflowing = encoding.get_overflowing();
        if !overflowing.is_empty() {
            debug!(
                "Text of {} bytes split into {} windows",
                text.len(),
                overflowing.len() + 1
            );
        }

        let windows = std::iter::once(&encoding)
            .chain(overflowing.iter())
            .map(|window| self.classify(window))
            .collect::<Result<Vec<_>>>()?;

        Ok(group_spans(&merge_windows(windows)))
    }
}

/// `id2label` keyed by stringified ids, turned into a dense vector.
fn ordered_labels(id2label: &HashMap<String, String>) -> Result<Vec<String>> {
    if id2label.is_empty() {
        return Err(Error::ModelLoadError(
            "config.json has no id2label mapping".to_string(),
        ));
    }

    let mut labels = vec![None; id2label.len()];
    for (id, label) in id2label {
        let idx: usize = id
            .parse()
            .map_err(|_| Error::ModelLoadError(format!("Invalid label id '{id}'")))?;
        let slot = labels
            .get_mut(idx)
            .ok_or_else(|| Error::ModelLoadError(format!("Label id {idx} out of range")))?;
        *slot = Some(label.clone());
    }

    labels
        .into_iter()
        .enumerate()
        .map(|(idx, label)| {
            label.ok_or_else(|| Error::ModelLoadError(format!("Missing label for id {idx}")))
        })
        .collect()
}

/// Per-token prediction with byte offsets.
#[derive(Debug, Clone, Copy)]
struct TokenLabel<'a> {
    label: &'a str,
    start: usize,
    end: usize,
    word: Option<u32>,
}

/// Join overlapping windows into one token stream.
///
/// A token already covered by an earlier window keeps the earlier tag.
fn merge_windows<'a>(windows: Vec<Vec<TokenLabel<'a>>>) -> Vec<TokenLabel<'a>> {
    let mut merged: Vec<TokenLabel<'a>> = Vec::new();
    for window in windows {
        let covered = merged.last().map(|token| token.end);
        merged.extend(
            window
                .into_iter()
                .filter(|token| covered.map_or(true, |end| token.start >= end)),
        );
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Begin,
    Inside,
}

/// Split a tag such as `B-PER` into position and entity type. `O` is `None`.
fn split_tag(label: &str) -> Option<(Tag, &str)> {
    if label == "O" {
        return None;
    }
    match label.split_once(['-', '_']) {
        Some(("B" | "S" | "U", kind)) => Some((Tag::Begin, kind)),
        Some(("I" | "E" | "L", kind)) => Some((Tag::Inside, kind)),
        _ => Some((Tag::Inside, label)),
    }
}

/// Merge per-token tags into entity spans.
///
/// Sub-word pieces follow the tag of the first piece of their word.
fn group_spans(tokens: &[TokenLabel<'_>]) -> Vec<RecognizedSpan> {
    let mut spans = Vec::new();
    let mut open: Option<RecognizedSpan> = None;
    let mut prev_word: Option<u32> = None;

    for token in tokens {
        let continues_word = token.word.is_some() && token.word == prev_word;
        prev_word = token.word;

        if continues_word {
            if let Some(span) = open.as_mut() {
                span.end = span.end.max(token.end);
            }
            continue;
        }

        match split_tag(token.label) {
            None => spans.extend(open.take()),
            Some((tag, kind)) => {
                let extends =
                    tag == Tag::Inside && matches!(&open, Some(span) if span.label == kind);
                if extends {
                    if let Some(span) = open.as_mut() {
                        span.end = token.end;
                    }
                } else {
                    spans.extend(open.take());
                    open = Some(RecognizedSpan::new(kind, token.start, token.end));
                }
            }
        }
    }

    spans.extend(open);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(label: &str, start: usize, end: usize, word: u32) -> TokenLabel<'_> {
        TokenLabel {
            label,
            start,
            end,
            word: Some(word),
        }
    }

    #[test]
    fn overlapping_windows_merge_into_one_stream() {
        // "Paris and Berlin and Rome", windows overlap on "and Berlin"
        let first = vec![
            token("B-LOC", 0, 5, 0),
            token("O", 6, 9, 1),
            token("B-LOC", 10, 16, 2),
        ];
        let second = vec![
            token("O", 6, 9, 1),
            token("O", 10, 16, 2),
            token("O", 17, 20, 3),
            token("B-LOC", 21, 25, 4),
        ];

        let merged = merge_windows(vec![first, second]);
        let starts: Vec<_> = merged.iter().map(|t| t.start).collect();
        assert_eq!(starts, vec![0, 6, 10, 17, 21]);
        assert_eq!(
            group_spans(&merged),
            vec![
                RecognizedSpan::new("LOC", 0, 5),
                RecognizedSpan::new("LOC", 10, 16),
                RecognizedSpan::new("LOC", 21, 25),
            ]
        );
    }

    #[test]
    fn entity_across_window_boundary_stays_whole() {
        // "New York" where the second window starts mid-entity
        let first = vec![token("O", 0, 3, 0), token("B-LOC", 4, 7, 1)];
        let second = vec![token("B-LOC", 4, 7, 1), token("I-LOC", 8, 12, 2)];
        assert_eq!(
            group_spans(&merge_windows(vec![first, second])),
            vec![RecognizedSpan::new("LOC", 4, 12)]
        );
    }

    #[test]
    fn splits_common_tag_schemes() {
        assert_eq!(split_tag("O"), None);
        assert_eq!(split_tag("B-PER"), Some((Tag::Begin, "PER")));
        assert_eq!(split_tag("I-LOC"), Some((Tag::Inside, "LOC")));
        assert_eq!(split_tag("S_ORG"), Some((Tag::Begin, "ORG")));
        assert_eq!(split_tag("MISC"), Some((Tag::Inside, "MISC")));
    }

    #[test]
    fn groups_begin_inside_runs() {
        // "Angela Merkel visited Paris"
        let tokens = vec![
            token("B-PER", 0, 6, 0),
            token("I-PER", 7, 13, 1),
            token("O", 14, 21, 2),
            token("B-LOC", 22, 27, 3),
        ];
        assert_eq!(
            group_spans(&tokens),
            vec![
                RecognizedSpan::new("PER", 0, 13),
                RecognizedSpan::new("LOC", 22, 27),
            ]
        );
    }

    #[test]
    fn subword_pieces_extend_their_word() {
        // "Tübingen" split into three pieces with a stray tag on the last one
        let tokens = vec![
            token("B-LOC", 0, 2, 0),
            token("I-LOC", 2, 6, 0),
            token("O", 6, 9, 0),
            token("O", 10, 12, 1),
        ];
        assert_eq!(group_spans(&tokens), vec![RecognizedSpan::new("LOC", 0, 9)]);
    }

    #[test]
    fn adjacent_begins_start_new_spans() {
        let tokens = vec![token("B-ORG", 0, 5, 0), token("B-ORG", 6, 11, 1)];
        assert_eq!(
            group_spans(&tokens),
            vec![
                RecognizedSpan::new("ORG", 0, 5),
                RecognizedSpan::new("ORG", 6, 11),
            ]
        );
    }

    #[test]
    fn inside_of_other_type_opens_new_span() {
        let tokens = vec![token("B-PER", 0, 4, 0), token("I-ORG", 5, 9, 1)];
        assert_eq!(
            group_spans(&tokens),
            vec![
                RecognizedSpan::new("PER", 0, 4),
                RecognizedSpan::new("ORG", 5, 9),
            ]
        );
    }

    #[test]
    fn orders_labels_by_id() {
        let id2label: HashMap<String, String> = [("1", "B-PER"), ("0", "O"), ("2", "I-PER")]
            .into_iter()
            .map(|(id, label)| (id.to_string(), label.to_string()))
            .collect();
        assert_eq!(ordered_labels(&id2label).unwrap(), vec!["O", "B-PER", "I-PER"]);
    }

    #[test]
    fn rejects_sparse_label_ids() {
        let id2label: HashMap<String, String> = [("0", "O"), ("5", "B-PER")]
            .into_iter()
            .map(|(id, label)| (id.to_string(), label.to_string()))
            .collect();
        assert!(ordered_labels(&id2label).is_err());
        assert!(ordered_labels(&HashMap::new()).is_err());
    }
}
