//! PHI-aware logging for the clinical inference workspace
//!
//! Prompts and transcripts routinely carry protected health information.
//! Nothing in the workspace logs them verbatim: free text goes through
//! [`PiiRedactor`] (usually via [`LoggerConfig::preview`] or the `redacted_*!`
//! macros) and only a short, masked preview reaches the log sink.
//!
//! # Detected Data Types
//!
//! - **Email Addresses**: user@example.com → EMAIL[hash] or u***@e***
//! - **Phone Numbers**: (555) 123-4567 → (***) ***-****
//! - **SSN**: 123-45-6789 → ***-**-****
//! - **Credit Cards**: 4111-1111-1111-1111 → ****-****-****-****
//! - **IP Addresses**: 192.168.1.1 → 192.***.***.1
//! - **Medical Record Numbers**: MRN 123456 → MRN[REDACTED]
//! - **Dates**: 1980-04-12, 4/12/1980 → [DATE]
//!
//! With `hash_for_correlation` (the default) each value is replaced by a
//! short SHA-256 digest so repeated occurrences can still be correlated.
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_logging, redacted_info, LoggerConfig};
//!
//! let config = LoggerConfig::default().with_log_dir("logs");
//! let _guard = init_logging(&config).unwrap();
//! redacted_info!(config, "Patient MRN 884213 reports chest pain", role = "triage_edge", "prompt received");
//! ```

pub mod redactor;
pub mod macros;
pub mod config;
pub mod subscriber;

pub use redactor::*;
pub use config::*;
pub use subscriber::*;

#[doc(hidden)]
pub use tracing;
