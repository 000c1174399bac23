//! Error types for the HTTP health surface and configuration validation.

use thiserror::Error;

/// Configuration errors, surfaced as a startup failure naming the offending
/// field — never silently defaulted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be set")]
    Missing { field: &'static str },

    #[error("{field} must be a non-zero, non-negative duration")]
    InvalidDuration { field: &'static str },

    #[error("{field} is invalid: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Errors from standing up or running the health HTTP server.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("server failed: {message}")]
    ServerFailed { message: String },

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}
