//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared utilities
pub type Result<T> = std::result::Result<T, MoviesError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum MoviesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
