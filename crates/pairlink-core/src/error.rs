//! Error types for pairlink

use thiserror::Error;

/// Main error type for conduit and configuration operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Conduit transport error: {0}")]
    Transport(String),

    #[error("Conduit connection closed")]
    ConduitClosed,

    #[error("Conduit request failed: {method} - {message}")]
    RequestFailed { method: String, message: String },

    #[error("Conduit request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using pairlink's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a failed-request error
    pub fn request_failed(method: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RequestFailed {
            method: method.into(),
            message: message.into(),
        }
    }
}
