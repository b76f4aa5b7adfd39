//! Error types for file normalization.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while renaming, converting or moving a download.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// File system error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The path has no file name component.
    #[error("not a file path: {path}")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },

    /// The external converter failed.
    #[error("conversion of {path} failed: {reason}")]
    ConversionFailed {
        /// The source file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}

impl NormalizeError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a conversion error.
    pub fn conversion(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConversionFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
