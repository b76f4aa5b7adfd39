//! Error types for the download module.
//!
//! Every variant names the page or file involved so a failed mirror attempt
//! can be logged with enough context to try the next one.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving or downloading from a mirror.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error fetching a mirror page.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The page that failed to load.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The mirror page answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The page URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The mirror page has no link with the expected label.
    #[error("no '{label}' link found on {url}")]
    LinkNotFound {
        /// The page URL.
        url: String,
        /// The label that was looked for.
        label: String,
    },

    /// The browser automation session failed.
    #[error("browser error: {reason}")]
    Browser {
        /// What went wrong.
        reason: String,
    },

    /// The download did not finish within the allowed time.
    #[error("download from {url} did not complete within {timeout_secs}s")]
    Timeout {
        /// The direct link that was navigated to.
        url: String,
        /// The configured timeout.
        timeout_secs: u64,
    },

    /// The browser finished but no completed file appeared.
    #[error("no completed file appeared after navigating to {url}")]
    NoFile {
        /// The direct link that was navigated to.
        url: String,
    },

    /// File system error in the downloads directory.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No usable mirror was supplied.
    #[error("no mirrors to try")]
    NoMirrors,

    /// Every mirror was tried and none produced a file.
    #[error("all {attempted} mirrors failed")]
    AllMirrorsFailed {
        /// Number of mirrors attempted.
        attempted: usize,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a browser error.
    pub fn browser(reason: impl Into<String>) -> Self {
        Self::Browser {
            reason: reason.into(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_not_found_display() {
        let err = DownloadError::LinkNotFound {
            url: "https://library.lol/main/abc".to_string(),
            label: "GET".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no 'GET' link found on https://library.lol/main/abc"
        );
    }

    #[test]
    fn test_timeout_display_includes_seconds() {
        let err = DownloadError::Timeout {
            url: "https://cdn/book.epub".to_string(),
            timeout_secs: 300,
        };
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn test_all_mirrors_failed_display() {
        assert_eq!(
            DownloadError::AllMirrorsFailed { attempted: 3 }.to_string(),
            "all 3 mirrors failed"
        );
    }
}
