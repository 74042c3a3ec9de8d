//! Greedy CTC decoding
//!
//! Frame-wise arg-max ids are collapsed (consecutive repeats merged), blanks
//! dropped, and the survivors detokenized. The cleanup pass then strips any
//! special-token literals the tokenizer left behind and turns the `|` word
//! delimiter into a space.

use crate::error::InferenceResult;
use crate::runtime::{FrameLogits, TextTokenizer};

/// Blank used when the vocabulary does not name one
pub const DEFAULT_BLANK_ID: u32 = 0;

/// Removed from decoded text in addition to the tokenizer's own specials
pub const SPECIAL_TOKEN_LITERALS: [&str; 8] = [
    "<pad>", "<s>", "</s>", "<unk>", "<blank>", "<epsilon>", "[PAD]", "[UNK]",
];

pub const WORD_DELIMITER: char = '|';

pub fn greedy_ids(logits: &FrameLogits) -> Vec<u32> {
    logits.argmax_ids()
}

/// Merge runs of the same id
pub fn collapse_repeats(ids: &[u32]) -> Vec<u32> {
    let mut collapsed = ids.to_vec();
    collapsed.dedup();
    collapsed
}

pub fn remove_blanks(ids: &[u32], blank_id: u32) -> Vec<u32> {
    ids.iter().copied().filter(|&id| id != blank_id).collect()
}

/// Collapse first so a blank between two equal ids keeps both
pub fn collapse_and_remove_blanks(ids: &[u32], blank_id: u32) -> Vec<u32> {
    remove_blanks(&collapse_repeats(ids), blank_id)
}

/// Strip special-token literals, map `|` to spaces and squeeze whitespace
pub fn clean_transcript(text: &str, extra_specials: &[String]) -> String {
    let mut cleaned = text.to_string();
    for literal in SPECIAL_TOKEN_LITERALS {
        cleaned = cleaned.replace(literal, "");
    }
    for literal in extra_specials.iter().filter(|s| !s.is_empty()) {
        cleaned = cleaned.replace(literal.as_str(), "");
    }
    cleaned = cleaned.replace(WORD_DELIMITER, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct CtcGreedyDecoder<'a> {
    tokenizer: &'a dyn TextTokenizer,
    blank_id: u32,
}

impl<'a> CtcGreedyDecoder<'a> {
    pub fn new(tokenizer: &'a dyn TextTokenizer) -> Self {
        Self {
            blank_id: tokenizer.blank_id().unwrap_or(DEFAULT_BLANK_ID),
            tokenizer,
        }
    }

    pub fn with_blank_id(mut self, blank_id: u32) -> Self {
        self.blank_id = blank_id;
        self
    }

    pub fn blank_id(&self) -> u32 {
        self.blank_id
    }

    /// # Errors
    ///
    /// Propagates tokenizer decode failures.
    pub fn decode(&self, logits: &FrameLogits) -> InferenceResult<String> {
        self.decode_frame_ids(&greedy_ids(logits))
    }

    /// Decode per-frame arg-max ids
    ///
    /// # Errors
    ///
    /// Propagates tokenizer decode failures.
    pub fn decode_frame_ids(&self, frame_ids: &[u32]) -> InferenceResult<String> {
        let ids = collapse_and_remove_blanks(frame_ids, self.blank_id);
        if ids.is_empty() {
            return Ok(String::new());
        }
        let text = self.tokenizer.decode(&ids, true)?;
        Ok(clean_transcript(&text, &self.tokenizer.special_tokens()))
    }
}
