use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};
use crate::registry::ArtifactKind;

/// Prefix for environment overrides; nested keys are separated by `__`,
/// e.g. `CLINICAL_AUDIO__CHUNK_SECONDS=15`
pub const ENV_PREFIX: &str = "CLINICAL_";

/// Inference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Root that relative model locations are resolved against
    pub models_dir: PathBuf,
    /// Per-role location overrides and additional roles
    pub roles: BTreeMap<String, RoleConfig>,
    pub generation: GenerationConfig,
    pub audio: AudioConfig,
    pub logging: LoggerConfig,
}

/// Location override for a single role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleConfig {
    /// Absolute, or relative to `models_dir`
    pub location: PathBuf,
    /// Inferred from the location when omitted
    #[serde(default)]
    pub kind: Option<ArtifactKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// New-token cap used when a request does not name one
    pub default_max_new_tokens: usize,
    /// Tokens held back from the context window when truncating prompts
    pub reserved_output_budget: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_max_new_tokens: 256,
            reserved_output_budget: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_sample_rate: u32,
    pub chunk_seconds: f32,
    pub overlap_seconds: f32,
    /// Chunk length handed to a packaged speech pipeline
    pub pipeline_chunk_seconds: f32,
    pub num_mel_bins: usize,
    pub cmvn_epsilon: f32,
    /// Run manual-feature chunks on the rayon pool
    pub parallel_chunks: bool,
    pub ffmpeg_binary: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            chunk_seconds: 20.0,
            overlap_seconds: 2.0,
            pipeline_chunk_seconds: 30.0,
            num_mel_bins: 128,
            cmvn_epsilon: 1e-6,
            parallel_chunks: true,
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("ml_models"),
            roles: BTreeMap::new(),
            generation: GenerationConfig::default(),
            audio: AudioConfig::default(),
            logging: LoggerConfig::default(),
        }
    }
}

impl InferenceConfig {
    /// Layer defaults, an optional YAML file and `CLINICAL_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] when the file is missing, a value
    /// fails to parse, or the merged configuration is inconsistent.
    pub fn load(path: Option<&Path>) -> InferenceResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(InferenceError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| InferenceError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables only
    ///
    /// # Errors
    ///
    /// See [`InferenceConfig::load`].
    pub fn from_env() -> InferenceResult<Self> {
        Self::load(None)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] naming the first offending field.
    pub fn validate(&self) -> InferenceResult<()> {
        let audio = &self.audio;

        if audio.target_sample_rate == 0 {
            return Err(InferenceError::Config(
                "audio.target_sample_rate must be positive".to_string(),
            ));
        }
        if audio.chunk_seconds <= 0.0 || audio.pipeline_chunk_seconds <= 0.0 {
            return Err(InferenceError::Config(
                "audio chunk lengths must be positive".to_string(),
            ));
        }
        if audio.overlap_seconds < 0.0 || audio.overlap_seconds >= audio.chunk_seconds {
            return Err(InferenceError::Config(format!(
                "audio.overlap_seconds ({}) must be in [0, chunk_seconds = {})",
                audio.overlap_seconds, audio.chunk_seconds
            )));
        }
        if audio.num_mel_bins == 0 {
            return Err(InferenceError::Config(
                "audio.num_mel_bins must be positive".to_string(),
            ));
        }
        if audio.cmvn_epsilon <= 0.0 {
            return Err(InferenceError::Config(
                "audio.cmvn_epsilon must be positive".to_string(),
            ));
        }

        for (role, override_) in &self.roles {
            if override_.location.as_os_str().is_empty() {
                return Err(InferenceError::Config(format!(
                    "roles.{role}.location must not be empty"
                )));
            }
        }

        Ok(())
    }

    /// Resolve a configured location against `models_dir`
    pub fn resolve_location(&self, location: &Path) -> PathBuf {
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.models_dir.join(location)
        }
    }
}
