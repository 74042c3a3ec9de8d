use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokenizers::Tokenizer;

use super::TextTokenizer;
use crate::error::{InferenceError, InferenceResult};
use crate::registry::ArtifactKind;

/// Tokens tried, in order, as the CTC blank
const BLANK_CANDIDATES: [&str; 4] = ["<blank>", "<pad>", "[PAD]", "<epsilon>"];

/// Tokens tried as end-of-sequence markers
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<eos>", "<end_of_turn>", "<|endoftext|>"];

/// `tokenizer.json` adapter over the `tokenizers` crate
pub struct HfTokenizer {
    inner: Tokenizer,
    specials: Vec<String>,
    blank_id: Option<u32>,
}

impl HfTokenizer {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when the file is missing or malformed.
    pub fn from_file(path: &Path) -> InferenceResult<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            InferenceError::Runtime(format!("Failed to load tokenizer {}: {e}", path.display()))
        })?;

        let mut specials: Vec<String> = inner
            .get_added_tokens_decoder()
            .values()
            .filter(|token| token.special)
            .map(|token| token.content.clone())
            .collect();
        specials.sort();
        specials.dedup();

        let blank_id = BLANK_CANDIDATES
            .iter()
            .find_map(|token| inner.token_to_id(token));

        Ok(Self {
            inner,
            specials,
            blank_id,
        })
    }

    /// `tokenizer.json` inside a package, or beside a quantized file
    pub fn path_for(location: &Path, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::DirectoryPackage => location.join("tokenizer.json"),
            ArtifactKind::QuantizedFile => location.with_file_name("tokenizer.json"),
        }
    }

    /// # Errors
    ///
    /// See [`HfTokenizer::from_file`].
    pub fn for_artifact(location: &Path, kind: ArtifactKind) -> InferenceResult<Self> {
        Self::from_file(&Self::path_for(location, kind))
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    /// Ids of every known end-of-sequence marker
    pub fn eos_ids(&self) -> Vec<u32> {
        let ids: HashSet<u32> = EOS_CANDIDATES
            .iter()
            .filter_map(|token| self.inner.token_to_id(token))
            .collect();
        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> InferenceResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| InferenceError::Runtime(format!("Tokenization failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> InferenceResult<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| InferenceError::Runtime(format!("Detokenization failed: {e}")))
    }

    fn special_tokens(&self) -> Vec<String> {
        self.specials.clone()
    }

    fn blank_id(&self) -> Option<u32> {
        self.blank_id
    }
}
