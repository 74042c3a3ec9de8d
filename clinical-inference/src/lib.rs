//! Clinical Inference Orchestration
//!
//! Runs locally hosted clinical models behind a small, failure-tolerant API.
//! Model weights never leave the host and every failure has a defined,
//! degraded answer.
//!
//! # Capabilities
//!
//! - **Model registry**: role names (`triage_edge`, `intake_chat`,
//!   `consult_reasoning`, `cxr_foundation`, `medasr`) resolved to artifacts
//!   under a configurable models directory
//! - **Single-flight cache**: each model is loaded once per process, even
//!   under concurrent first use
//! - **Bounded generation**: prompts are truncated to leave room for output
//!   and generation never runs past the context window
//! - **Choice scoring**: first-token logits turned into a probability per label
//! - **Transcription ladder**: packaged pipeline, then direct model
//!   inference, then in-crate filterbank features with greedy CTC decoding
//!   over 20 s chunks with 2 s overlap
//! - **Audio ingestion**: WAV, symphonia codecs and an `ffmpeg` fallback,
//!   normalized to 16 kHz mono
//!
//! # Degraded Mode
//!
//! | Operation | On model failure |
//! |-----------|------------------|
//! | generation | fixed per-role sentence |
//! | choice scoring | uniform distribution |
//! | transcription | `[Transcription unavailable: ...]` sentinel |
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use clinical_inference::{InferenceConfig, InferenceService};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InferenceConfig::from_env()?;
//! let service = InferenceService::new(config)?;
//!
//! let triage = service.run_inference("triage_edge", "45M, crushing chest pain for 30 minutes");
//! println!("Triage: {triage}");
//!
//! let choices = vec!["Tachycardic".to_string(), "Normal".to_string()];
//! let scores = service.compute_choice_probabilities("intake_chat", "HR 128 bpm. Rhythm:", &choices);
//! println!("Scores: {}", serde_json::to_string(&scores)?);
//!
//! let transcript = service.transcribe_audio("medasr", "visit.wav".as_ref())?;
//! println!("Transcript: {}", transcript.text);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod ctc;
pub mod error;
pub mod fallback;
pub mod generation;
pub mod ladder;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod transcription;

pub use cache::ModelCache;
pub use classifier::ChoiceScoreSet;
pub use config::*;
pub use error::*;
pub use generation::{GenerationController, GenerationRequest};
pub use ladder::{LadderReport, TranscriptionLadder, TranscriptionStage};
pub use registry::{ArtifactKind, ModelDescriptor, ModelRegistry, ModelRole};
pub use service::*;
pub use transcription::*;
