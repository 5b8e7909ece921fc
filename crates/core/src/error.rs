//! Error types for the ASRHub coordination core

use thiserror::Error;

/// Result type alias for ASRHub core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the ASRHub core
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration (fatal at init)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session reference (recoverable; callers translate to not-found)
    #[error("Session error: {0}")]
    Session(String),

    /// Malformed or undeclared audio format; the offending chunk is dropped
    #[error("Audio error: {0}")]
    Audio(String),

    /// Detector inference failure; workers count these and keep going
    #[error("Detection error: {0}")]
    Detection(String),

    /// Audio queue operation failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Recording service failure
    #[error("Recording error: {0}")]
    Recording(String),

    /// ASR provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider lease or inference timeout; treated as a failed transcription
    #[error("Timeout after {timeout_ms}ms: {context}")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
        /// What was being waited for
        context: String,
    },

    /// Action store dispatch failure (store shut down)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::Recording(format!("WAV error: {}", err))
    }
}
