//! Capabilities a loaded model can expose
//!
//! The orchestration layer never names a concrete runtime. Loaders turn a
//! [`ModelDescriptor`] into a [`LoadedModelHandle`] whose weights implement
//! the traits below; everything downstream (generation, choice scoring, the
//! transcription ladder) works against those traits only.

pub mod frames;
pub mod tokenizer;

#[cfg(feature = "candle")]
pub mod candle;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::audio::AudioBuffer;
use crate::error::{InferenceError, InferenceResult};
use crate::registry::ModelDescriptor;
use crate::transcription::TranscriptionResult;

pub use frames::{argmax, FeatureMatrix, FrameLogits};
pub use tokenizer::HfTokenizer;

/// Device a model was placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cuda(usize),
    Metal(usize),
    Cpu,
}

impl ComputeDevice {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            ComputeDevice::Metal(ordinal) => write!(f, "metal:{ordinal}"),
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

pub trait TextTokenizer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when the tokenizer rejects the input.
    fn encode(&self, text: &str, add_special_tokens: bool) -> InferenceResult<Vec<u32>>;

    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] for ids outside the vocabulary.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> InferenceResult<String>;

    /// Literal special-token strings, stripped from CTC output
    fn special_tokens(&self) -> Vec<String> {
        Vec::new()
    }

    /// Explicit CTC blank id, when the vocabulary defines one
    fn blank_id(&self) -> Option<u32> {
        None
    }
}

/// Incremental decoding state for one request
pub trait LmSession {
    /// Append `ids` to the sequence and return logits for the next position
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] on any backend failure.
    fn forward(&mut self, ids: &[u32]) -> InferenceResult<Vec<f32>>;
}

pub trait CausalLm: Send + Sync {
    /// Maximum positions the model attends over
    fn context_window(&self) -> usize;

    fn eos_token_ids(&self) -> &[u32];

    /// Start a fresh sequence. Implementations may serialize sessions.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when state cannot be reset.
    fn session(&self) -> InferenceResult<Box<dyn LmSession + '_>>;
}

/// Packaged end-to-end speech recognizer with native long-form chunking
pub trait SpeechPipeline: Send + Sync {
    /// # Errors
    ///
    /// Any error moves the transcription ladder to its next stage.
    fn transcribe(&self, audio: &AudioBuffer, chunk_seconds: f32) -> InferenceResult<TranscriptionResult>;
}

/// Feature extraction (and optionally decoding) packaged with a speech model
pub trait SpeechProcessor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when extraction fails.
    fn extract_features(&self, samples: &[f32], sample_rate: u32) -> InferenceResult<FeatureMatrix>;

    /// Built-in decoding of per-frame arg-max ids; `None` when the processor
    /// leaves decoding to the tokenizer
    fn decode_ids(&self, _frame_ids: &[u32]) -> Option<InferenceResult<String>> {
        None
    }
}

/// CTC acoustic model: features in, per-frame vocabulary logits out
pub trait AcousticModel: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] on any backend failure.
    fn forward(&self, features: &FeatureMatrix) -> InferenceResult<FrameLogits>;

    /// Mel bins the model expects; `None` defers to `audio.num_mel_bins`
    fn feature_dim(&self) -> Option<usize> {
        None
    }
}

#[derive(Clone, Default)]
pub struct SpeechBundle {
    pub pipeline: Option<Arc<dyn SpeechPipeline>>,
    pub processor: Option<Arc<dyn SpeechProcessor>>,
    pub acoustic: Option<Arc<dyn AcousticModel>>,
}

impl SpeechBundle {
    pub fn with_pipeline(mut self, pipeline: Arc<dyn SpeechPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn SpeechProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_acoustic(mut self, acoustic: Arc<dyn AcousticModel>) -> Self {
        self.acoustic = Some(acoustic);
        self
    }
}

#[derive(Clone)]
pub enum ModelWeights {
    Text(Arc<dyn CausalLm>),
    Speech(SpeechBundle),
}

/// A model resident in memory, shared by every request for its location
pub struct LoadedModelHandle {
    location: PathBuf,
    device: ComputeDevice,
    tokenizer: Arc<dyn TextTokenizer>,
    weights: ModelWeights,
}

impl LoadedModelHandle {
    pub fn new(
        location: impl Into<PathBuf>,
        device: ComputeDevice,
        tokenizer: Arc<dyn TextTokenizer>,
        weights: ModelWeights,
    ) -> Self {
        Self {
            location: location.into(),
            device,
            tokenizer,
            weights,
        }
    }

    pub fn text(
        location: impl Into<PathBuf>,
        device: ComputeDevice,
        tokenizer: Arc<dyn TextTokenizer>,
        model: Arc<dyn CausalLm>,
    ) -> Self {
        Self::new(location, device, tokenizer, ModelWeights::Text(model))
    }

    pub fn speech(
        location: impl Into<PathBuf>,
        device: ComputeDevice,
        tokenizer: Arc<dyn TextTokenizer>,
        bundle: SpeechBundle,
    ) -> Self {
        Self::new(location, device, tokenizer, ModelWeights::Speech(bundle))
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    /// # Errors
    ///
    /// Returns [`InferenceError::BackendUnavailable`] for speech-only handles.
    pub fn text_model(&self) -> InferenceResult<&dyn CausalLm> {
        match &self.weights {
            ModelWeights::Text(model) => Ok(model.as_ref()),
            ModelWeights::Speech(_) => Err(InferenceError::BackendUnavailable(format!(
                "{} holds a speech model, not a text model",
                self.location.display()
            ))),
        }
    }

    pub fn speech_bundle(&self) -> Option<&SpeechBundle> {
        match &self.weights {
            ModelWeights::Speech(bundle) => Some(bundle),
            ModelWeights::Text(_) => None,
        }
    }
}

impl fmt::Debug for LoadedModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.weights {
            ModelWeights::Text(_) => "text",
            ModelWeights::Speech(_) => "speech",
        };
        f.debug_struct("LoadedModelHandle")
            .field("location", &self.location)
            .field("device", &self.device)
            .field("weights", &kind)
            .finish_non_exhaustive()
    }
}

/// Turns descriptors into resident models
pub trait ModelLoader: Send + Sync {
    /// Best device available to this loader
    fn select_device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    /// # Errors
    ///
    /// Returns [`InferenceError::BackendUnavailable`] when no runtime can
    /// handle the artifact and [`InferenceError::Runtime`] when loading fails.
    fn load(&self, descriptor: &ModelDescriptor, device: ComputeDevice) -> InferenceResult<LoadedModelHandle>;
}

/// Loader used when no native runtime is compiled in. Every load fails,
/// which sends callers down their degraded path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
    fn load(&self, descriptor: &ModelDescriptor, _device: ComputeDevice) -> InferenceResult<LoadedModelHandle> {
        Err(InferenceError::BackendUnavailable(format!(
            "no inference runtime compiled in for '{}' ({}); rebuild with the `candle` feature",
            descriptor.role, descriptor.artifact_kind
        )))
    }
}

/// The loader for this build
pub fn default_loader() -> Arc<dyn ModelLoader> {
    #[cfg(feature = "candle")]
    {
        Arc::new(candle::CandleLoader)
    }
    #[cfg(not(feature = "candle"))]
    {
        Arc::new(UnavailableLoader)
    }
}
