use thiserror::Error;

use crate::codes;

/// Simplified error enum for common use cases
#[derive(Error, Debug)]
pub enum RustCareError {
    /// Inference layer errors, tagged with a code from [`codes::inference`]
    #[error("Inference error [{code}]: {message}")]
    InferenceError { code: &'static str, message: String },

    /// Internal system errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RustCareError {
    /// Build an inference error with an explicit code
    pub fn inference(code: &'static str, message: impl Into<String>) -> Self {
        Self::InferenceError {
            code,
            message: message.into(),
        }
    }

    /// Stable error code for API responses and log correlation
    pub fn code(&self) -> &'static str {
        match self {
            Self::InferenceError { code, .. } => code,
            Self::ConfigError(_) => codes::configuration::INVALID_VALUE,
            Self::InternalError(_) | Self::Other(_) => codes::system::INTERNAL,
        }
    }

    /// Whether retrying the same call can succeed without a configuration change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InferenceError { code, .. } if *code == codes::inference::RUNTIME_FAILURE
        )
    }
}

/// Result type alias for RustCare operations
pub type Result<T> = std::result::Result<T, RustCareError>;

/// Log an error with its code and the calling context
pub fn log_error(context: &str, error: &RustCareError) {
    tracing::error!(
        context = context,
        error_code = error.code(),
        error = %error,
        "RustCare error occurred"
    );
}
