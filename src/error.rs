//! Error types for the Hostpace throttle.

use thiserror::Error;

/// Main error type for Hostpace operations.
#[derive(Error, Debug)]
pub enum HostpaceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit rule failed validation
    #[error("Invalid rate limit rule: {0}")]
    InvalidRule(String),

    /// A rule with the same description is already registered
    #[error("Rate limit rule already exists: {0}")]
    RuleExists(String),

    /// No rule with the given description
    #[error("Rate limit rule not found: {0}")]
    RuleNotFound(String),

    /// The caller was cancelled while waiting for its turn to send
    #[error("Interrupted while throttling request to {0}")]
    Interrupted(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Hostpace operations.
pub type Result<T> = std::result::Result<T, HostpaceError>;
