//! Shared HTTP client construction policy.
//!
//! Every outbound client (metadata lookup, catalogs, LLM, mail) is built here
//! so timeouts, compression and the user-agent policy stay consistent.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::debug;

/// Default connect timeout for outbound requests.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout for outbound requests.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Connect/read timeouts applied to every client built by [`build_http_client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout in seconds.
    pub connect_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Builds an HTTP client using the shared project policy.
///
/// `component` is only used for logging.
///
/// # Errors
///
/// Returns the underlying [`reqwest::Error`] when the client cannot be built
/// (for example when the TLS backend fails to initialize).
pub fn build_http_client(
    component: &str,
    user_agent: impl Into<String>,
    timeouts: HttpTimeouts,
) -> Result<Client, reqwest::Error> {
    debug!(
        component,
        connect_secs = timeouts.connect_secs,
        read_secs = timeouts.read_secs,
        "Building HTTP client"
    );
    base_builder(user_agent.into(), timeouts).build()
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.read_secs))
        .user_agent(user_agent)
        .gzip(true)
}
