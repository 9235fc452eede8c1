//! Turns model output into response entities.

use serde::{Deserialize, Serialize};

use super::EntityRecognizer;
use crate::error::{Error, Result};

/// A labelled span with half-open character offsets `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Run `model` over `text` and normalize its spans.
///
/// Spans keep the order and overlap the model reported. Empty text never
/// reaches the model.
pub fn infer(model: &dyn EntityRecognizer, text: &str) -> Result<Vec<Entity>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let spans = model.recognize(text)?;
    let mut entities = Vec::with_capacity(spans.len());
    let mut cursor = CharCursor::default();

    for span in spans {
        if span.start > span.end
            || span.end > text.len()
            || !text.is_char_boundary(span.start)
            || !text.is_char_boundary(span.end)
        {
            return Err(Error::InferenceError(format!(
                "Model reported invalid span {}..{} ({}) for text of {} bytes",
                span.start,
                span.end,
                span.label,
                text.len()
            )));
        }

        let start = cursor.advance(text, span.start);
        let matched = &text[span.start..span.end];
        entities.push(Entity {
            text: matched.to_string(),
            label: span.label,
            start,
            end: start + matched.chars().count(),
        });
    }

    Ok(entities)
}

/// Byte-to-char offset conversion that resumes from the previous position.
/// Spans arrive mostly in order, so each call scans only the gap.
#[derive(Debug, Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    /// Char offset of byte offset `to`, which must lie on a char boundary.
    fn advance(&mut self, text: &str, to: usize) -> usize {
        if to < self.byte {
            *self = Self::default();
        }
        self.chars += text[self.byte..to].chars().count();
        self.byte = to;
        self.chars
    }
}
