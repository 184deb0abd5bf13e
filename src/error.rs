//! Error types and handling for stroom
//!
//! Every stage reports failure through a single terminal `Err` item carrying a
//! [`StreamError`]. The error is `Clone` so that one failure can be observed by
//! every consumer attached to a stream.

use thiserror::Error;

/// Main error type for stroom operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// A user-supplied function failed inside a stage
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },
    /// A value could not be serialized to text
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The consuming side of a sink went away
    #[error("Sink closed")]
    SinkClosed,
    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
    /// I/O related errors
    #[error("IO error: {0}")]
    IO(String),
    /// Custom error with message
    #[error("Stream error: {0}")]
    Custom(String),
}

impl StreamError {
    /// Build a [`StreamError::Stage`] from any displayable failure
    pub fn stage<E: std::fmt::Display>(stage: &'static str, err: E) -> Self {
        StreamError::Stage {
            stage,
            message: err.to_string(),
        }
    }

    /// Shorthand for [`StreamError::Custom`]
    pub fn custom(msg: impl Into<String>) -> Self {
        StreamError::Custom(msg.into())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IO(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;
