//! Incoming question: validation, whitespace normalization, date context.

use tracing::warn;

use crate::date_range::{extract_date_range, DateRange};
use crate::error::ValidationError;

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 500;

/// A validated user question, ready for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    raw: String,
    normalized: String,
    date_range: Option<DateRange>,
}

impl Question {
    /// Validate `raw` and derive the normalized text and date range.
    ///
    /// An unparsable date expression is logged and dropped; it never rejects
    /// the question.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let chars = raw.chars().count();
        if raw.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        if chars < MIN_QUESTION_CHARS {
            return Err(ValidationError::TooShort { min: MIN_QUESTION_CHARS });
        }
        if chars > MAX_QUESTION_CHARS {
            return Err(ValidationError::TooLong { max: MAX_QUESTION_CHARS });
        }
        if !raw.chars().any(is_cyrillic_letter) {
            return Err(ValidationError::NotCyrillic);
        }

        let normalized = normalize_whitespace(raw);
        let date_range = match extract_date_range(&normalized) {
            Ok(range) => range,
            Err(e) => {
                warn!("Ignoring date expression in question: {}", e);
                None
            }
        };

        Ok(Self { raw: raw.to_string(), normalized, date_range })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    /// Extra context for the model, if the question mentions a period.
    pub fn extra_context(&self) -> Option<String> {
        self.date_range.map(|range| range.to_context())
    }
}

fn is_cyrillic_letter(c: char) -> bool {
    matches!(c, 'А'..='я' | 'Ё' | 'ё')
}

/// Trim and collapse every whitespace run into a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
