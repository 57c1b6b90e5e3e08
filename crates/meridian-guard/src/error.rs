//! Error types for request guards.

use thiserror::Error;

/// Errors returned while building or running guards.
#[derive(Debug, Error)]
pub enum GuardError {
    /// A sanitizer pattern failed to compile.
    #[error("invalid sanitizer pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    /// The rate limit store could not be reached.
    #[error("rate limit store error: {0}")]
    Store(String),
}
