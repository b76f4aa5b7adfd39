//! Error types for the relevance judge.

use thiserror::Error;

/// Errors that can occur while asking the language model about a candidate.
#[derive(Debug, Error)]
pub enum RelevanceError {
    /// No API key was configured.
    #[error("no API key configured for the relevance model (set OPENAI_API_KEY)")]
    MissingApiKey,

    /// Network-level failure.
    #[error("network error calling the relevance model: {source}")]
    Network {
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The model endpoint answered with a non-success status.
    #[error("relevance model returned HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// The response could not be decoded or carried no answer.
    #[error("unexpected relevance model response: {reason}")]
    Parse {
        /// What was wrong with the response.
        reason: String,
    },

    /// The configured base URL is not usable.
    #[error("invalid relevance model URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl RelevanceError {
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

    /// Creates a parse error.
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}
