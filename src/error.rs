//! Centralized error types for pecmbox.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the pecmbox library.
///
/// Decoding problems (bad base64, unknown charsets, broken encoded-words,
/// malformed certified-mail metadata) never surface here: they degrade to
/// a best-effort value and are logged instead.
#[derive(Error, Debug)]
pub enum PecError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("Archive file not found: {0}")]
    FileNotFound(PathBuf),

    /// The archive cannot be read at the byte level (e.g. it is UTF-16).
    #[error("Archive '{source_name}' cannot be parsed: {reason}")]
    InvalidArchive { source_name: String, reason: String },

    /// A single message could not be parsed. Caught by the pipeline and
    /// turned into a placeholder message.
    #[error("Malformed message #{index}: {reason}")]
    MalformedMessage { index: usize, reason: String },

    /// The configuration file is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization of results failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, PecError>`.
pub type Result<T> = std::result::Result<T, PecError>;

impl PecError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `InvalidArchive` variant.
    pub fn invalid_archive(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArchive {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `PecError::io`).
impl From<std::io::Error> for PecError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
