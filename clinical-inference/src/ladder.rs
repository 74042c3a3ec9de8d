//! Ordered transcription strategies
//!
//! Stages run from most to least integrated:
//!
//! 1. [`PipelineStage`]: a packaged speech pipeline with its own chunking
//! 2. [`DirectModelStage`]: the packaged processor feeds the acoustic model once
//! 3. [`ManualFeatureStage`]: in-crate fbank features, CMVN and CTC decoding
//!    over overlapping chunks
//!
//! The first stage yielding non-empty text wins and later stages never run.
//! A stage that fails, lacks a capability or produces only whitespace moves
//! the ladder on. If every stage falls through the result is
//! [`TranscriptionResult::exhausted`].

use error_common::codes;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{cmvn, AudioBuffer, Chunk, Chunker, FbankConfig, FbankExtractor};
use crate::config::AudioConfig;
use crate::ctc::{clean_transcript, CtcGreedyDecoder};
use crate::error::InferenceResult;
use crate::runtime::{AcousticModel, LoadedModelHandle, TextTokenizer};
use crate::transcription::{Segment, TranscriptionResult};

/// What a stage produced
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Transcribed(TranscriptionResult),
    /// The handle lacks what this stage needs
    Unsupported(&'static str),
}

pub trait TranscriptionStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Any error sends the ladder to the next stage.
    fn attempt(&self, handle: &LoadedModelHandle, audio: &AudioBuffer) -> InferenceResult<StageOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Empty,
    Unsupported,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageAttempt {
    pub stage: &'static str,
    pub status: AttemptStatus,
    pub detail: Option<String>,
}

/// Result plus the path the ladder took to reach it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderReport {
    pub result: TranscriptionResult,
    /// `None` when the ladder was exhausted
    pub resolved_by: Option<&'static str>,
    pub attempts: Vec<StageAttempt>,
}

pub struct TranscriptionLadder {
    stages: Vec<Box<dyn TranscriptionStage>>,
}

impl TranscriptionLadder {
    pub fn new(stages: Vec<Box<dyn TranscriptionStage>>) -> Self {
        Self { stages }
    }

    /// The three standard stages
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InferenceError::Config`] for an invalid chunk layout.
    pub fn standard(config: &AudioConfig) -> InferenceResult<Self> {
        Ok(Self::new(vec![
            Box::new(PipelineStage::new(config.pipeline_chunk_seconds)),
            Box::new(DirectModelStage),
            Box::new(ManualFeatureStage::from_config(config)?),
        ]))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn transcribe(&self, handle: &LoadedModelHandle, audio: &AudioBuffer) -> LadderReport {
        let mut attempts = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            debug!(stage = name, "Attempting transcription stage");

            let (status, detail) = match stage.attempt(handle, audio) {
                Ok(StageOutcome::Transcribed(result)) if result.has_text() => {
                    info!(stage = name, segments = result.segments.len(), "Transcription succeeded");
                    attempts.push(StageAttempt {
                        stage: name,
                        status: AttemptStatus::Succeeded,
                        detail: None,
                    });
                    return LadderReport {
                        result,
                        resolved_by: Some(name),
                        attempts,
                    };
                }
                Ok(StageOutcome::Transcribed(_)) => {
                    warn!(stage = name, "Transcription stage produced empty text");
                    (AttemptStatus::Empty, None)
                }
                Ok(StageOutcome::Unsupported(reason)) => {
                    debug!(stage = name, reason, "Transcription stage not supported by model");
                    (AttemptStatus::Unsupported, Some(reason.to_string()))
                }
                Err(e) => {
                    warn!(stage = name, error_code = e.code(), error = %e, "Transcription stage failed");
                    (AttemptStatus::Failed, Some(e.to_string()))
                }
            };
            attempts.push(StageAttempt {
                stage: name,
                status,
                detail,
            });
        }

        warn!(
            error_code = codes::inference::TRANSCRIPTION_EXHAUSTED,
            stages = attempts.len(),
            "All transcription strategies failed"
        );
        LadderReport {
            result: TranscriptionResult::exhausted(),
            resolved_by: None,
            attempts,
        }
    }
}

/// Stage 1: packaged pipeline with native long-form chunking
#[derive(Debug, Clone)]
pub struct PipelineStage {
    chunk_seconds: f32,
}

impl PipelineStage {
    pub fn new(chunk_seconds: f32) -> Self {
        Self { chunk_seconds }
    }
}

impl TranscriptionStage for PipelineStage {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn attempt(&self, handle: &LoadedModelHandle, audio: &AudioBuffer) -> InferenceResult<StageOutcome> {
        let Some(pipeline) = handle.speech_bundle().and_then(|b| b.pipeline.as_ref()) else {
            return Ok(StageOutcome::Unsupported("no speech pipeline"));
        };

        let mut result = pipeline.transcribe(audio, self.chunk_seconds)?;
        result.text = result.text.trim().to_string();
        if result.segments.is_empty() {
            result = TranscriptionResult::single(result.text);
        }
        Ok(StageOutcome::Transcribed(result))
    }
}

/// Stage 2: processor features through the acoustic model in one pass
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectModelStage;

impl TranscriptionStage for DirectModelStage {
    fn name(&self) -> &'static str {
        "direct_model"
    }

    fn attempt(&self, handle: &LoadedModelHandle, audio: &AudioBuffer) -> InferenceResult<StageOutcome> {
        let Some(bundle) = handle.speech_bundle() else {
            return Ok(StageOutcome::Unsupported("not a speech model"));
        };
        let (Some(processor), Some(acoustic)) = (bundle.processor.as_ref(), bundle.acoustic.as_ref()) else {
            return Ok(StageOutcome::Unsupported("no processor/acoustic model pair"));
        };

        let features = processor.extract_features(&audio.samples, audio.sample_rate)?;
        let logits = acoustic.forward(&features)?;
        let frame_ids = crate::ctc::greedy_ids(&logits);

        let tokenizer = handle.tokenizer();
        let text = match processor.decode_ids(&frame_ids) {
            Some(decoded) => clean_transcript(&decoded?, &tokenizer.special_tokens()),
            None => CtcGreedyDecoder::new(tokenizer).decode_frame_ids(&frame_ids)?,
        };
        Ok(StageOutcome::Transcribed(TranscriptionResult::single(text)))
    }
}

/// Stage 3: overlapping chunks, fbank + CMVN, acoustic model, greedy CTC
#[derive(Debug, Clone)]
pub struct ManualFeatureStage {
    chunker: Chunker,
    fbank: FbankConfig,
    cmvn_epsilon: f32,
    parallel: bool,
}

impl ManualFeatureStage {
    pub fn new(chunker: Chunker, fbank: FbankConfig, cmvn_epsilon: f32, parallel: bool) -> Self {
        Self {
            chunker,
            fbank,
            cmvn_epsilon,
            parallel,
        }
    }

    /// # Errors
    ///
    /// Returns [`crate::error::InferenceError::Config`] for an invalid chunk layout.
    pub fn from_config(config: &AudioConfig) -> InferenceResult<Self> {
        let fbank = FbankConfig {
            sample_rate: config.target_sample_rate,
            num_mel_bins: config.num_mel_bins,
            ..FbankConfig::default()
        };
        Ok(Self::new(
            Chunker::from_config(config)?,
            fbank,
            config.cmvn_epsilon,
            config.parallel_chunks,
        ))
    }

    fn transcribe_chunk(
        &self,
        chunk: &Chunk<'_>,
        extractor: &FbankExtractor,
        acoustic: &dyn AcousticModel,
        tokenizer: &dyn TextTokenizer,
    ) -> InferenceResult<String> {
        let mut features = extractor.extract(chunk.samples)?;
        cmvn(&mut features, self.cmvn_epsilon);
        let logits = acoustic.forward(&features)?;
        CtcGreedyDecoder::new(tokenizer).decode(&logits)
    }
}

impl TranscriptionStage for ManualFeatureStage {
    fn name(&self) -> &'static str {
        "manual_features"
    }

    fn attempt(&self, handle: &LoadedModelHandle, audio: &AudioBuffer) -> InferenceResult<StageOutcome> {
        let Some(acoustic) = handle.speech_bundle().and_then(|b| b.acoustic.clone()) else {
            return Ok(StageOutcome::Unsupported("no acoustic model"));
        };

        // A model that states its mel resolution overrides the configured one
        let extractor = FbankExtractor::new(FbankConfig {
            sample_rate: audio.sample_rate,
            num_mel_bins: acoustic.feature_dim().unwrap_or(self.fbank.num_mel_bins),
            ..self.fbank.clone()
        });
        let tokenizer = handle.tokenizer();
        let chunks = self.chunker.split(audio);
        debug!(chunks = chunks.len(), parallel = self.parallel, "Transcribing chunks");

        let run = |chunk: &Chunk<'_>| -> String {
            match self.transcribe_chunk(chunk, &extractor, acoustic.as_ref(), tokenizer) {
                Ok(text) => text,
                Err(e) => {
                    warn!(start = chunk.start, end = chunk.end, error = %e, "Chunk transcription failed");
                    String::new()
                }
            }
        };
        // Both paths keep chunk order
        let texts: Vec<String> = if self.parallel {
            chunks.par_iter().map(run).collect()
        } else {
            chunks.iter().map(run).collect()
        };

        let rate = audio.sample_rate;
        let segments = chunks
            .iter()
            .zip(texts)
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(chunk, text)| Segment::new(text, chunk.start_seconds(rate), Some(chunk.end_seconds(rate))))
            .collect();

        Ok(StageOutcome::Transcribed(TranscriptionResult::from_segments(segments)))
    }
}

