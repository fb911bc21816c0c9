//! Error types for Turnstile.
//!
//! Admission decisions never fail; these errors only come out of the
//! configuration and construction layer.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter definition was rejected during validation
    #[error("Invalid limiter '{name}': {reason}")]
    InvalidLimiter { name: String, reason: String },

    /// Layered configuration loading failed
    #[error("Configuration load error: {0}")]
    Load(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        TurnstileError::InvalidLimiter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
