use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use logger_redacted::{redacted_debug, redacted_info};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::audio::AudioLoader;
use crate::cache::ModelCache;
use crate::classifier::{self, ChoiceScoreSet};
use crate::config::InferenceConfig;
use crate::error::{InferenceError, InferenceResult};
use crate::fallback;
use crate::generation::{GenerationController, GenerationRequest};
use crate::ladder::{LadderReport, TranscriptionLadder};
use crate::registry::ModelRegistry;
use crate::runtime::{default_loader, LoadedModelHandle, ModelLoader};
use crate::transcription::TranscriptionResult;

/// Inference entry point shared by every caller in the process
///
/// Model failures never reach callers: generation degrades to a fixed
/// per-role sentence, choice scoring to a uniform distribution and
/// transcription to the exhausted sentinel. The only error a caller sees
/// is an audio file that no backend could decode.
pub struct InferenceService {
    config: InferenceConfig,
    registry: ModelRegistry,
    cache: ModelCache,
    generator: GenerationController,
    audio_loader: AudioLoader,
    ladder: TranscriptionLadder,
}

impl InferenceService {
    /// Service with the loader compiled into this build
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] for an invalid configuration.
    pub fn new(config: InferenceConfig) -> InferenceResult<Self> {
        Self::with_loader(config, default_loader())
    }

    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] for an invalid configuration.
    pub fn with_loader(config: InferenceConfig, loader: Arc<dyn ModelLoader>) -> InferenceResult<Self> {
        config.validate()?;

        let registry = ModelRegistry::from_config(&config);
        let ladder = TranscriptionLadder::standard(&config.audio)?;
        info!(
            models_dir = %config.models_dir.display(),
            roles = registry.len(),
            device = %loader.select_device(),
            stages = ?ladder.stage_names(),
            "Inference service initialized"
        );

        Ok(Self {
            generator: GenerationController::new(&config.generation),
            audio_loader: AudioLoader::from_config(&config.audio),
            cache: ModelCache::new(loader),
            registry,
            ladder,
            config,
        })
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_audio_loader(mut self, audio_loader: AudioLoader) -> Self {
        self.audio_loader = audio_loader;
        self
    }

    pub fn with_ladder(mut self, ladder: TranscriptionLadder) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn model_path(&self, role: &str) -> Option<&Path> {
        self.registry.location(role)
    }

    pub fn is_model_available(&self, role: &str) -> bool {
        self.registry.is_available(role)
    }

    fn acquire(&self, role: &str) -> InferenceResult<Arc<LoadedModelHandle>> {
        let descriptor = self.registry.resolve(role)?;
        if !descriptor.is_present() {
            return Err(InferenceError::BackendUnavailable(format!(
                "model artifact for '{role}' not found at {}",
                descriptor.location.display()
            )));
        }
        self.cache.acquire(descriptor)
    }

    /// Generated text for `request`, or the role's fallback sentence
    pub fn generate(&self, role: &str, request: &GenerationRequest) -> String {
        let request_id = Uuid::new_v4();
        let span = info_span!("generate", %request_id, role);
        let _entered = span.enter();
        redacted_info!(self.config.logging, &request.prompt, "Generation requested");

        let started = Instant::now();
        match self
            .acquire(role)
            .and_then(|handle| self.generator.generate(&handle, request))
        {
            Ok(text) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis(),
                    output_chars = text.chars().count(),
                    "Generation completed"
                );
                redacted_debug!(self.config.logging, &text, "Generated text");
                text
            }
            Err(e) => {
                warn!(error_code = e.code(), error = %e, "Generation unavailable, returning fallback");
                fallback::generation_fallback(role).to_string()
            }
        }
    }

    /// Generation with the configured default output cap
    pub fn run_inference(&self, role: &str, prompt: &str) -> String {
        self.generate(role, &GenerationRequest::new(prompt))
    }

    /// Probability per distinct choice, or a uniform distribution
    pub fn compute_choice_probabilities(&self, role: &str, prompt: &str, choices: &[String]) -> ChoiceScoreSet {
        let request_id = Uuid::new_v4();
        let span = info_span!("classify", %request_id, role, choices = choices.len());
        let _entered = span.enter();
        redacted_info!(self.config.logging, prompt, "Choice scoring requested");

        if choices.is_empty() {
            return ChoiceScoreSet::default();
        }

        match self
            .acquire(role)
            .and_then(|handle| classifier::classify(&handle, prompt, choices))
        {
            Ok(scores) => {
                if let Some((label, probability)) = scores.best() {
                    info!(best = label, probability, "Choices scored");
                }
                scores
            }
            Err(e) => {
                warn!(error_code = e.code(), error = %e, "Choice scoring unavailable, returning uniform");
                fallback::uniform_distribution(choices)
            }
        }
    }

    /// Transcribe an audio file through the ladder
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::AudioDecode`] only when no backend can
    /// decode `path`. Every model-side failure yields the exhausted
    /// sentinel instead.
    pub fn transcribe_audio(&self, role: &str, path: &Path) -> InferenceResult<TranscriptionResult> {
        self.transcribe_with_report(role, path).map(|report| report.result)
    }

    /// [`InferenceService::transcribe_audio`] with the ladder's trace
    ///
    /// # Errors
    ///
    /// See [`InferenceService::transcribe_audio`].
    pub fn transcribe_with_report(&self, role: &str, path: &Path) -> InferenceResult<LadderReport> {
        let request_id = Uuid::new_v4();
        let span = info_span!("transcribe", %request_id, role);
        let _entered = span.enter();

        // Decode before touching the model so unreadable input always surfaces
        let audio = self.audio_loader.load(path)?;

        let handle = match self.acquire(role) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error_code = e.code(), error = %e, "Speech model unavailable");
                return Ok(LadderReport {
                    result: TranscriptionResult::exhausted(),
                    resolved_by: None,
                    attempts: Vec::new(),
                });
            }
        };

        let started = Instant::now();
        let report = self.ladder.transcribe(&handle, &audio);
        info!(
            resolved_by = report.resolved_by.unwrap_or("none"),
            audio_s = audio.duration_seconds(),
            elapsed_ms = started.elapsed().as_millis(),
            preview = %self.config.logging.preview(&report.result.text),
            "Transcription finished"
        );
        Ok(report)
    }

    /// [`InferenceService::generate`] on the blocking pool
    pub async fn generate_async(self: &Arc<Self>, role: String, request: GenerationRequest) -> String {
        let service = Arc::clone(self);
        let fallback_role = role.clone();
        tokio::task::spawn_blocking(move || service.generate(&role, &request))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Generation worker aborted");
                fallback::generation_fallback(&fallback_role).to_string()
            })
    }

    /// [`InferenceService::compute_choice_probabilities`] on the blocking pool
    pub async fn compute_choice_probabilities_async(
        self: &Arc<Self>,
        role: String,
        prompt: String,
        choices: Vec<String>,
    ) -> ChoiceScoreSet {
        let service = Arc::clone(self);
        let uniform = fallback::uniform_distribution(&choices);
        tokio::task::spawn_blocking(move || service.compute_choice_probabilities(&role, &prompt, &choices))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Choice scoring worker aborted");
                uniform
            })
    }

    /// [`InferenceService::transcribe_audio`] on the blocking pool
    ///
    /// # Errors
    ///
    /// See [`InferenceService::transcribe_audio`].
    pub async fn transcribe_audio_async(
        self: &Arc<Self>,
        role: String,
        path: PathBuf,
    ) -> InferenceResult<TranscriptionResult> {
        let service = Arc::clone(self);
        match tokio::task::spawn_blocking(move || service.transcribe_audio(&role, &path)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Transcription worker aborted");
                Ok(TranscriptionResult::exhausted())
            }
        }
    }
}
