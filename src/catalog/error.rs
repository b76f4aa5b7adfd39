//! Error types for catalog search and hosted-file retrieval.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network-level failure.
    #[error("network error querying {catalog}: {source}")]
    Network {
        /// Catalog name.
        catalog: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The catalog answered with a non-success status.
    #[error("{catalog} returned HTTP {status}")]
    HttpStatus {
        /// Catalog name.
        catalog: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The catalog page or payload did not have the expected shape.
    #[error("unexpected response from {catalog}: {reason}")]
    Parse {
        /// Catalog name.
        catalog: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The catalog refuses queries this short.
    #[error("search query '{query}' is too short (at least 3 characters required)")]
    QueryTooShort {
        /// The rejected query.
        query: String,
    },

    /// The catalog reported a failure through its own error field.
    #[error("{catalog} rejected the request: {message}")]
    Rejected {
        /// Catalog name.
        catalog: String,
        /// The error reported by the service.
        message: String,
    },

    /// The candidate cannot be fetched by this catalog.
    #[error("{catalog} cannot fetch candidate '{title}'")]
    UnsupportedCandidate {
        /// Catalog name.
        catalog: String,
        /// Candidate title.
        title: String,
    },

    /// The download finished without any content.
    #[error("{catalog} sent an empty file from {url}")]
    EmptyFile {
        /// Catalog name.
        catalog: String,
        /// The download link.
        url: String,
    },

    /// File system error while storing a fetched file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Creates a network error.
    pub fn network(catalog: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            catalog: catalog.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(catalog: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            catalog: catalog.into(),
            status,
        }
    }

    /// Creates a parse error.
    pub fn parse(catalog: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            catalog: catalog.into(),
            reason: reason.into(),
        }
    }

    /// Creates a rejection error from a service-reported message.
    pub fn rejected(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            catalog: catalog.into(),
            message: message.into(),
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
