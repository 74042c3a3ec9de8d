//! Common error handling utilities for the clinical inference workspace
//!
//! Provides the shared error enum and the structured error codes used by
//! every crate, so callers at the workspace boundary see one error type with
//! a stable code regardless of which component failed.
//!
//! # Error Categories
//!
//! - **InferenceError**: model resolution, runtime and audio failures
//! - **ConfigError**: invalid or unreadable configuration
//! - **InternalError**: everything else
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, RustCareError};
//!
//! fn resolve(role: &str) -> Result<(), RustCareError> {
//!     Err(RustCareError::inference(
//!         codes::inference::MODEL_NOT_FOUND,
//!         format!("no model registered for role '{role}'"),
//!     ))
//! }
//!
//! let err = resolve("radiology").unwrap_err();
//! assert_eq!(err.code(), codes::inference::MODEL_NOT_FOUND);
//! ```

pub mod types;
pub mod codes;

pub use types::*;
