//! In-memory model doubles shared by the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clinical_inference::audio::{AudioBackend, AudioBuffer, DecodedAudio};
use clinical_inference::registry::ModelDescriptor;
use clinical_inference::runtime::{
    AcousticModel, CausalLm, ComputeDevice, FeatureMatrix, FrameLogits, LmSession, LoadedModelHandle,
    ModelLoader, SpeechBundle, SpeechPipeline, SpeechProcessor, TextTokenizer,
};
use clinical_inference::{
    InferenceConfig, InferenceError, InferenceResult, InferenceService, ModelRegistry, TranscriptionResult,
};

pub const PAD: u32 = 0;
pub const UNK: u32 = 1;
pub const BOS: u32 = 2;
pub const EOS: u32 = 3;

/// Whitespace tokenizer over a fixed word list; ids 0-3 are specials
pub struct WordTokenizer {
    vocab: Vec<String>,
}

impl WordTokenizer {
    pub fn new(words: &[&str]) -> Self {
        let vocab = ["<pad>", "<unk>", "<s>", "</s>"]
            .iter()
            .chain(words)
            .map(ToString::to_string)
            .collect();
        Self { vocab }
    }

    pub fn id(&self, word: &str) -> u32 {
        self.vocab
            .iter()
            .position(|w| w == word)
            .map_or(UNK, |p| u32::try_from(p).unwrap())
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
}

impl TextTokenizer for WordTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> InferenceResult<Vec<u32>> {
        let mut ids = Vec::new();
        if add_special_tokens {
            ids.push(BOS);
        }
        ids.extend(text.split_whitespace().map(|word| self.id(word)));
        Ok(ids)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> InferenceResult<String> {
        let words: Vec<&str> = ids
            .iter()
            .filter(|&&id| !(skip_special_tokens && id <= EOS))
            .map(|&id| {
                self.vocab
                    .get(id as usize)
                    .map(String::as_str)
                    .ok_or_else(|| InferenceError::Runtime(format!("unknown id {id}")))
            })
            .collect::<InferenceResult<_>>()?;
        Ok(words.join(" "))
    }

    fn special_tokens(&self) -> Vec<String> {
        self.vocab[..4].to_vec()
    }
}

pub type Script = Arc<dyn Fn(&[u32]) -> Vec<f32> + Send + Sync>;

/// Causal LM whose next-token logits are a function of the sequence so far
pub struct ScriptedLm {
    context_window: usize,
    eos: Vec<u32>,
    script: Script,
    pub forward_calls: AtomicUsize,
    pub longest_sequence: AtomicUsize,
}

impl ScriptedLm {
    pub fn new(context_window: usize, script: Script) -> Self {
        Self {
            context_window,
            eos: vec![EOS],
            script,
            forward_calls: AtomicUsize::new(0),
            longest_sequence: AtomicUsize::new(0),
        }
    }

    /// Always predicts `token`
    pub fn constant(context_window: usize, vocab_size: usize, token: u32) -> Self {
        Self::new(context_window, Arc::new(move |_| one_hot(vocab_size, token)))
    }

    pub fn failing(context_window: usize) -> Self {
        Self::new(context_window, Arc::new(|_| Vec::new()))
    }
}

pub fn one_hot(vocab_size: usize, token: u32) -> Vec<f32> {
    let mut logits = vec![0.0; vocab_size];
    logits[token as usize] = 10.0;
    logits
}

struct ScriptedSession<'a> {
    model: &'a ScriptedLm,
    history: Vec<u32>,
}

impl LmSession for ScriptedSession<'_> {
    fn forward(&mut self, ids: &[u32]) -> InferenceResult<Vec<f32>> {
        self.history.extend_from_slice(ids);
        self.model.forward_calls.fetch_add(1, Ordering::SeqCst);
        self.model
            .longest_sequence
            .fetch_max(self.history.len(), Ordering::SeqCst);
        Ok((self.model.script)(&self.history))
    }
}

impl CausalLm for ScriptedLm {
    fn context_window(&self) -> usize {
        self.context_window
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos
    }

    fn session(&self) -> InferenceResult<Box<dyn LmSession + '_>> {
        Ok(Box::new(ScriptedSession {
            model: self,
            history: Vec::new(),
        }))
    }
}

pub type Builder = Box<dyn Fn(&ModelDescriptor, ComputeDevice) -> InferenceResult<LoadedModelHandle> + Send + Sync>;

/// Loader that counts loads and can be slowed down to widen race windows
pub struct CountingLoader {
    pub loads: AtomicUsize,
    delay: Duration,
    build: Builder,
}

impl CountingLoader {
    pub fn new(build: Builder) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            delay: Duration::ZERO,
            build,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, descriptor: &ModelDescriptor, device: ComputeDevice) -> InferenceResult<LoadedModelHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        (self.build)(descriptor, device)
    }
}

/// Loader handing out `model` with `tokenizer` for every descriptor
pub fn text_loader(tokenizer: Arc<WordTokenizer>, model: Arc<ScriptedLm>) -> CountingLoader {
    CountingLoader::new(Box::new(move |descriptor, device| {
        Ok(LoadedModelHandle::text(
            descriptor.location.clone(),
            device,
            tokenizer.clone(),
            model.clone(),
        ))
    }))
}

pub fn speech_loader(tokenizer: Arc<WordTokenizer>, bundle: SpeechBundle) -> CountingLoader {
    CountingLoader::new(Box::new(move |descriptor, device| {
        Ok(LoadedModelHandle::speech(
            descriptor.location.clone(),
            device,
            tokenizer.clone(),
            bundle.clone(),
        ))
    }))
}

pub struct FixedPipeline {
    text: String,
    pub calls: AtomicUsize,
}

impl FixedPipeline {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl SpeechPipeline for FixedPipeline {
    fn transcribe(&self, _audio: &AudioBuffer, _chunk_seconds: f32) -> InferenceResult<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.text == "!fail" {
            return Err(InferenceError::Runtime("pipeline crashed".to_string()));
        }
        Ok(TranscriptionResult {
            text: self.text.clone(),
            segments: Vec::new(),
        })
    }
}

/// One zero row per 10 ms of audio
pub struct ZeroProcessor {
    pub dims: usize,
    pub calls: AtomicUsize,
}

impl ZeroProcessor {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SpeechProcessor for ZeroProcessor {
    fn extract_features(&self, samples: &[f32], _sample_rate: u32) -> InferenceResult<FeatureMatrix> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeatureMatrix::zeros((samples.len() / 160).max(1), self.dims))
    }
}

/// Emits the same frame-id pattern for every input
pub struct ScriptedAcoustic {
    frame_ids: Vec<u32>,
    vocab_size: usize,
    dims: Option<usize>,
    fail: bool,
    pub calls: AtomicUsize,
    pub seen_dims: AtomicUsize,
}

impl ScriptedAcoustic {
    pub fn new(frame_ids: Vec<u32>, vocab_size: usize) -> Self {
        Self {
            frame_ids,
            vocab_size,
            dims: None,
            fail: false,
            calls: AtomicUsize::new(0),
            seen_dims: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new(), 1)
        }
    }

    pub fn with_feature_dim(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AcousticModel for ScriptedAcoustic {
    fn forward(&self, features: &FeatureMatrix) -> InferenceResult<FrameLogits> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_dims.store(features.dims(), Ordering::SeqCst);
        if self.fail {
            return Err(InferenceError::Runtime("acoustic model crashed".to_string()));
        }
        FrameLogits::from_rows(
            self.frame_ids
                .iter()
                .map(|&id| one_hot(self.vocab_size, id))
                .collect(),
        )
    }

    fn feature_dim(&self) -> Option<usize> {
        self.dims
    }
}

pub enum FakeBackend {
    Fail(&'static str),
    Empty(&'static str),
    Tone(&'static str, u32),
}

impl AudioBackend for FakeBackend {
    fn name(&self) -> &'static str {
        match self {
            FakeBackend::Fail(name) | FakeBackend::Empty(name) | FakeBackend::Tone(name, _) => name,
        }
    }

    fn decode(&self, _path: &Path, _target_rate: u32) -> InferenceResult<DecodedAudio> {
        match self {
            FakeBackend::Fail(name) => Err(InferenceError::Audio(format!("{name} cannot read this"))),
            FakeBackend::Empty(_) => Ok(DecodedAudio {
                samples: Vec::new(),
                channels: 1,
                sample_rate: 16_000,
            }),
            FakeBackend::Tone(_, rate) => Ok(DecodedAudio {
                samples: vec![0.1; *rate as usize],
                channels: 1,
                sample_rate: *rate,
            }),
        }
    }
}

/// Mono 16-bit WAV of a 440 Hz tone
pub fn write_wav(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let total = (sample_rate as f32 * seconds) as usize;
    for i in 0..total {
        let t = i as f32 / sample_rate as f32;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3;
        writer.write_sample((sample * f32::from(i16::MAX)) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Create an artifact directory so availability checks pass
pub fn artifact(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::create_dir_all(&path).unwrap();
    path
}

/// Service over `loader` with exactly the given roles registered
pub fn build_service(
    config: InferenceConfig,
    loader: Arc<CountingLoader>,
    roles: Vec<(&str, PathBuf)>,
) -> InferenceService {
    InferenceService::with_loader(config, loader)
        .unwrap()
        .with_registry(ModelRegistry::new(
            roles.into_iter().map(|(role, path)| ModelDescriptor::new(role, path)),
        ))
}
