//! Role name to model artifact mapping
//!
//! Five roles ship built in. Configuration may relocate any of them or add
//! new roles; every location is resolved against `models_dir` once, when
//! the registry is built.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::{InferenceError, InferenceResult};

/// How a model artifact is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Single quantized weights file (GGUF)
    QuantizedFile,
    /// Package directory with weights, config and tokenizer
    DirectoryPackage,
}

impl ArtifactKind {
    /// `.gguf` files are quantized; anything else is treated as a package directory
    pub fn infer(location: &Path) -> Self {
        match location.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gguf") => ArtifactKind::QuantizedFile,
            _ => ArtifactKind::DirectoryPackage,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::QuantizedFile => write!(f, "quantized_file"),
            ArtifactKind::DirectoryPackage => write!(f, "directory_package"),
        }
    }
}

/// Built-in roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    TriageEdge,
    IntakeChat,
    ConsultReasoning,
    CxrFoundation,
    MedAsr,
}

impl ModelRole {
    pub const ALL: [ModelRole; 5] = [
        ModelRole::TriageEdge,
        ModelRole::IntakeChat,
        ModelRole::ConsultReasoning,
        ModelRole::CxrFoundation,
        ModelRole::MedAsr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelRole::TriageEdge => "triage_edge",
            ModelRole::IntakeChat => "intake_chat",
            ModelRole::ConsultReasoning => "consult_reasoning",
            ModelRole::CxrFoundation => "cxr_foundation",
            ModelRole::MedAsr => "medasr",
        }
    }

    /// Location relative to `models_dir`
    pub fn default_location(self) -> &'static str {
        match self {
            ModelRole::TriageEdge => "gguf/gemma-2-2b-it-Q4_K_M.gguf",
            ModelRole::IntakeChat => "txgemma-2b-predict",
            ModelRole::ConsultReasoning => "medgemma-1.5-4b-it",
            ModelRole::CxrFoundation => "cxr-foundation",
            ModelRole::MedAsr => "medasr",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelRole {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triage_edge" => Ok(ModelRole::TriageEdge),
            "intake_chat" => Ok(ModelRole::IntakeChat),
            "consult_reasoning" => Ok(ModelRole::ConsultReasoning),
            "cxr_foundation" => Ok(ModelRole::CxrFoundation),
            "medasr" => Ok(ModelRole::MedAsr),
            _ => Err(InferenceError::ModelNotFound(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub role: String,
    pub location: PathBuf,
    pub artifact_kind: ArtifactKind,
}

impl ModelDescriptor {
    pub fn new(role: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        Self {
            role: role.into(),
            artifact_kind: ArtifactKind::infer(&location),
            location,
        }
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.artifact_kind = kind;
        self
    }

    /// The artifact currently exists on disk
    pub fn is_present(&self) -> bool {
        self.location.exists()
    }
}

/// Immutable after construction; lookups never touch the filesystem
/// except for availability checks.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    descriptors: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.role.clone(), descriptor))
                .collect(),
        }
    }

    /// Built-in roles under `models_dir`, then configured overrides
    pub fn from_config(config: &InferenceConfig) -> Self {
        let builtin = ModelRole::ALL.iter().map(|role| {
            ModelDescriptor::new(role.as_str(), config.models_dir.join(role.default_location()))
        });
        let configured = config.roles.iter().map(|(role, entry)| {
            let descriptor = ModelDescriptor::new(role.clone(), config.resolve_location(&entry.location));
            match entry.kind {
                Some(kind) => descriptor.with_kind(kind),
                None => descriptor,
            }
        });

        // Later entries win, so overrides replace built-ins
        Self::new(builtin.chain(configured))
    }

    /// # Errors
    ///
    /// Returns [`InferenceError::ModelNotFound`] for an unregistered role.
    pub fn resolve(&self, role: &str) -> InferenceResult<&ModelDescriptor> {
        self.descriptors
            .get(role)
            .ok_or_else(|| InferenceError::ModelNotFound(role.to_string()))
    }

    pub fn location(&self, role: &str) -> Option<&Path> {
        self.descriptors.get(role).map(|d| d.location.as_path())
    }

    /// Registered and present on disk
    pub fn is_available(&self, role: &str) -> bool {
        self.descriptors.get(role).is_some_and(ModelDescriptor::is_present)
    }

    /// All descriptors ordered by role name
    pub fn descriptors(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
