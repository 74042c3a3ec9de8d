use serde::{Deserialize, Serialize};

use crate::fallback::TRANSCRIPTION_UNAVAILABLE;

/// `(start, end)` in seconds; `end` is open when unknown.
/// Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange(pub f64, pub Option<f64>);

impl TimeRange {
    pub fn start(&self) -> f64 {
        self.0
    }

    pub fn end(&self) -> Option<f64> {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub time_range: TimeRange,
}

impl Segment {
    pub fn new(text: impl Into<String>, start: f64, end: Option<f64>) -> Self {
        Self {
            text: text.into(),
            time_range: TimeRange(start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<Segment>,
}

impl TranscriptionResult {
    /// Whole text as one open-ended segment
    pub fn single(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![Segment::new(text.clone(), 0.0, None)],
            text,
        }
    }

    /// Join segment texts with single spaces
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, segments }
    }

    /// Result reported when every strategy failed; carries no segments
    pub fn exhausted() -> Self {
        Self {
            text: TRANSCRIPTION_UNAVAILABLE.to_string(),
            segments: Vec::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.text == TRANSCRIPTION_UNAVAILABLE
    }

    /// Contains something besides whitespace
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
