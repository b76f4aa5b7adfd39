//! Error types for bibliographic metadata lookup.

use thiserror::Error;

/// Errors that can occur while resolving a title to a canonical record.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Network-level failure talking to the metadata service.
    #[error("network error looking up '{query}': {source}")]
    Network {
        /// The title or identifier being looked up.
        query: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The metadata service answered with a non-success status.
    #[error("metadata service returned HTTP {status} for '{query}'")]
    HttpStatus {
        /// The title or identifier being looked up.
        query: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected metadata response for '{query}': {reason}")]
    Parse {
        /// The title or identifier being looked up.
        query: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The configured base URL is not a valid URL.
    #[error("invalid metadata service URL '{url}'")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },
}

impl MetadataError {
    /// Creates a network error.
    pub fn network(query: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            query: query.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(query: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            query: query.into(),
            status,
        }
    }

    /// Creates a parse error.
    pub fn parse(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            query: query.into(),
            reason: reason.into(),
        }
    }
}
