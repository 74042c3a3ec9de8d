//! Greedy generation bounded by the model's context window

use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{InferenceError, InferenceResult};
use crate::runtime::{argmax, LoadedModelHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Overrides the configured default cap
    pub max_output_tokens: Option<usize>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens: None,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationController {
    default_max_new_tokens: usize,
    reserved_output_budget: usize,
}

impl GenerationController {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            default_max_new_tokens: config.default_max_new_tokens,
            reserved_output_budget: config.reserved_output_budget,
        }
    }

    /// Longest prompt kept after truncation; never below one token
    pub fn prompt_limit(&self, context_window: usize) -> usize {
        context_window
            .saturating_sub(self.reserved_output_budget)
            .max(1)
            .min(context_window)
    }

    /// New tokens allowed for a prompt of `prompt_tokens`
    pub fn output_budget(&self, context_window: usize, prompt_tokens: usize, requested: Option<usize>) -> usize {
        let cap = requested.unwrap_or(self.default_max_new_tokens);
        cap.min(context_window.saturating_sub(prompt_tokens))
    }

    /// Generate a continuation of `request.prompt` with special tokens removed
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::BackendUnavailable`] for non-text handles and
    /// [`InferenceError::Runtime`] for tokenizer or model failures.
    pub fn generate(&self, handle: &LoadedModelHandle, request: &GenerationRequest) -> InferenceResult<String> {
        let model = handle.text_model()?;
        let tokenizer = handle.tokenizer();
        let context_window = model.context_window();

        let mut prompt_ids = tokenizer.encode(&request.prompt, true)?;
        let limit = self.prompt_limit(context_window);
        if prompt_ids.len() > limit {
            debug!(prompt_tokens = prompt_ids.len(), limit, "Truncating prompt");
            prompt_ids.truncate(limit);
        }
        if prompt_ids.is_empty() {
            return Err(InferenceError::Runtime("prompt encoded to zero tokens".to_string()));
        }

        let budget = self.output_budget(context_window, prompt_ids.len(), request.max_output_tokens);
        if budget == 0 {
            return Ok(String::new());
        }

        let eos = model.eos_token_ids();
        let mut session = model.session()?;
        let mut logits = session.forward(&prompt_ids)?;
        let mut generated: Vec<u32> = Vec::with_capacity(budget);

        loop {
            let next = argmax(&logits)
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| InferenceError::Runtime("model returned empty logits".to_string()))?;
            if eos.contains(&next) {
                break;
            }
            generated.push(next);
            if generated.len() >= budget {
                break;
            }
            logits = session.forward(&[next])?;
        }

        debug!(
            prompt_tokens = prompt_ids.len(),
            new_tokens = generated.len(),
            budget,
            "Generation finished"
        );
        tokenizer.decode(&generated, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> GenerationController {
        GenerationController::new(&GenerationConfig::default())
    }

    #[test]
    fn test_budget_respects_window_and_cap() {
        let controller = controller();
        assert_eq!(controller.output_budget(8192, 100, None), 256);
        assert_eq!(controller.output_budget(8192, 8000, None), 192);
        assert_eq!(controller.output_budget(8192, 100, Some(10)), 10);
        assert_eq!(controller.output_budget(512, 512, None), 0);
    }

    #[test]
    fn test_prompt_limit_reserves_output_room() {
        let controller = controller();
        assert_eq!(controller.prompt_limit(8192), 7936);
        assert_eq!(controller.prompt_limit(100), 1);
        assert_eq!(controller.prompt_limit(0), 0);
    }
}
