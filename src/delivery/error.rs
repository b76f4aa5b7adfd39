//! Error types for email delivery.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while mailing books.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No mail provider key was configured.
    #[error("no mail provider API key configured (set SENDGRID_API_KEY)")]
    MissingApiKey,

    /// Network-level failure talking to the provider.
    #[error("network error sending mail: {source}")]
    Network {
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider refused the message.
    #[error("mail provider returned HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// The configured provider URL is not usable.
    #[error("invalid mail provider URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// File system error reading or clearing the books directory.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(source: reqwest::Error) -> Self {
        Self::Network { source }
    }

    /// Creates an HTTP status error, keeping at most 200 characters of body.
    pub fn http_status(status: u16, body: &str) -> Self {
        Self::HttpStatus {
            status,
            body: body.chars().take(200).collect(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
