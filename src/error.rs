// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Upstream answered with a non-success status
    #[error("{stage}: upstream returned status {status}")]
    Status { stage: &'static str, status: u16 },

    /// Upstream payload was malformed, empty, or carried an error object
    #[error("{stage}: {message}")]
    Api { stage: &'static str, message: String },

    /// Markup conversion failed for a single revision
    #[error("converter {endpoint}: {message}")]
    Converter { endpoint: String, message: String },

    /// An internal guarantee was broken
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The shared cancellation signal fired
    #[error("operation cancelled")]
    Cancelled,

    /// A pipeline stage could not be joined
    #[error("stage {stage} failed: {message}")]
    Stage { stage: &'static str, message: String },
}

impl AppError {
    /// Create an API payload error.
    pub fn api(stage: &'static str, message: impl fmt::Display) -> Self {
        Self::Api {
            stage,
            message: message.to_string(),
        }
    }

    /// Create a converter error for the given endpoint.
    pub fn converter(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Converter {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a stage join error.
    pub fn stage(stage: &'static str, message: impl fmt::Display) -> Self {
        Self::Stage {
            stage,
            message: message.to_string(),
        }
    }

    /// Whether this error only reports cooperative shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
