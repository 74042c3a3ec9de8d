use std::path::PathBuf;

use error_common::{codes, RustCareError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("No model registered for role '{0}'")]
    ModelNotFound(String),

    #[error("Inference backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Inference runtime failure: {0}")]
    Runtime(String),

    #[error("Audio backend error: {0}")]
    Audio(String),

    #[error("Unable to decode audio file {}: {}", path.display(), attempts.join("; "))]
    AudioDecode { path: PathBuf, attempts: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InferenceError {
    /// Structured code from `error_common::codes`
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => codes::inference::MODEL_NOT_FOUND,
            Self::BackendUnavailable(_) => codes::inference::BACKEND_UNAVAILABLE,
            Self::Runtime(_) | Self::Serialization(_) => codes::inference::RUNTIME_FAILURE,
            Self::Audio(_) | Self::AudioDecode { .. } => codes::inference::AUDIO_DECODE_FAILURE,
            Self::Config(_) => codes::configuration::INVALID_VALUE,
            Self::Io(_) => codes::system::IO_FAILURE,
        }
    }

    /// Permanent failures do not clear up by retrying with the same configuration
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound(_) | Self::BackendUnavailable(_) | Self::Config(_)
        )
    }
}

impl From<InferenceError> for RustCareError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Config(message) => RustCareError::ConfigError(message),
            other => RustCareError::inference(other.code(), other.to_string()),
        }
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;
