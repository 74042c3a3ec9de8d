// Logger configuration
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Redact PHI/PII from free text before it is logged
    pub redaction_enabled: bool,
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON lines on the console instead of the human format
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    pub log_dir: Option<PathBuf>,
    /// File name prefix inside `log_dir`
    pub file_prefix: String,
    /// Characters of prompt/transcript text kept in log previews
    pub preview_chars: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            log_level: "info".to_string(),
            json: false,
            log_dir: None,
            file_prefix: "clinical-inference.log".to_string(),
            preview_chars: crate::redactor::DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl LoggerConfig {
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Log-safe preview of free text under this configuration
    pub fn preview(&self, text: &str) -> String {
        if self.redaction_enabled {
            return crate::redactor::redact_preview_with(text, self.preview_chars);
        }
        let mut chars = text.chars();
        let head: String = chars.by_ref().take(self.preview_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}
