//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// The limiter itself never fails: a denied admission is a normal return
/// value. These errors only surface at the configuration and adapter edges.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy with a zero ceiling or a zero-length window
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    /// A policy name that is not in the policy table
    #[error("Unknown rate limit policy: {0}")]
    UnknownPolicy(String),

    /// An empty identifier was supplied
    #[error("Rate limit identifier must not be empty")]
    InvalidIdentifier,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
