//! Multiple-choice scoring from a single forward pass
//!
//! Each label is scored by the next-token logit of its first token after
//! the prompt, and the scores are normalized with a softmax. Labels that
//! share a first token therefore share a score.

use std::collections::HashSet;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::runtime::{LoadedModelHandle, TextTokenizer};

/// Label to probability, in first-seen label order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceScoreSet {
    entries: Vec<(String, f64)>,
}

impl ChoiceScoreSet {
    /// Equal mass over the distinct labels
    pub fn uniform(choices: &[String]) -> Self {
        let labels = distinct_labels(choices);
        let mass = 1.0 / labels.len().max(1) as f64;
        Self {
            entries: labels.into_iter().map(|label| (label, mass)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == label)
            .map(|(_, probability)| *probability)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(label, p)| (label.as_str(), *p))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    /// Most probable label; the first one on ties
    pub fn best(&self) -> Option<(&str, f64)> {
        self.iter().fold(None, |best, (label, p)| match best {
            Some((_, top)) if p <= top => best,
            _ => Some((label, p)),
        })
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ChoiceScoreSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, probability) in &self.entries {
            map.serialize_entry(label, probability)?;
        }
        map.end()
    }
}

/// Drop repeated labels, keeping the first occurrence
fn distinct_labels(choices: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    choices
        .iter()
        .filter(|label| seen.insert(label.as_str()))
        .cloned()
        .collect()
}

/// Numerically stable softmax. Scores that are all `-inf` (or NaN) give a
/// uniform distribution.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let uniform = || vec![1.0 / scores.len() as f64; scores.len()];

    let max = scores
        .iter()
        .copied()
        .filter(|s| !s.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return uniform();
    }

    let exps: Vec<f64> = scores
        .iter()
        .map(|&s| if s.is_nan() { 0.0 } else { (s - max).exp() })
        .collect();
    let sum: f64 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return uniform();
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Logit of the label's first token; `-inf` for labels that encode to nothing
fn first_token_score(tokenizer: &dyn TextTokenizer, logits: &[f32], label: &str) -> InferenceResult<f64> {
    let ids = tokenizer.encode(label, false)?;
    let Some(&first) = ids.first() else {
        return Ok(f64::NEG_INFINITY);
    };
    logits
        .get(first as usize)
        .map(|&logit| f64::from(logit))
        .ok_or_else(|| {
            InferenceError::Runtime(format!(
                "token {first} for label '{label}' is outside the {}-entry vocabulary",
                logits.len()
            ))
        })
}

/// Probability of each distinct label being the model's next answer
///
/// # Errors
///
/// Returns [`InferenceError::BackendUnavailable`] for non-text handles and
/// [`InferenceError::Runtime`] for tokenizer or model failures.
pub fn classify(handle: &LoadedModelHandle, prompt: &str, choices: &[String]) -> InferenceResult<ChoiceScoreSet> {
    let labels = distinct_labels(choices);
    if labels.is_empty() {
        return Ok(ChoiceScoreSet::default());
    }

    let model = handle.text_model()?;
    let tokenizer = handle.tokenizer();

    let mut prompt_ids = tokenizer.encode(prompt, true)?;
    prompt_ids.truncate(model.context_window());
    if prompt_ids.is_empty() {
        return Err(InferenceError::Runtime("prompt encoded to zero tokens".to_string()));
    }

    let logits = model.session()?.forward(&prompt_ids)?;
    let scores = labels
        .iter()
        .map(|label| first_token_score(tokenizer, &logits, label))
        .collect::<InferenceResult<Vec<f64>>>()?;

    let entries: Vec<(String, f64)> = labels.into_iter().zip(softmax(&scores)).collect();
    debug!(choices = entries.len(), prompt_tokens = prompt_ids.len(), "Choices scored");
    Ok(ChoiceScoreSet { entries })
}
