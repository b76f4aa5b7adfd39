//! Mirror page resolution: find the direct download link on a mirror page.

use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::html::{absolutize_url, collapse_whitespace, compile_static_selector};
use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::BROWSER_USER_AGENT;

use super::DownloadError;

/// Label of the direct-download link on mirror pages.
pub const DEFAULT_MIRROR_LABEL: &str = "GET";

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));

/// Turns a mirror page URL into the direct file URL.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Returns the absolute direct-download URL found on `page_url`.
    async fn resolve(&self, page_url: &str) -> Result<String, DownloadError>;
}

/// Fetches the mirror page over HTTP and picks the labelled anchor.
#[derive(Debug, Clone)]
pub struct HttpLinkResolver {
    client: Client,
    label: String,
}

impl HttpLinkResolver {
    /// Creates a resolver looking for anchors whose text equals `label`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if the HTTP client cannot be built.
    pub fn new(label: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, DownloadError> {
        let client = build_http_client("mirror", BROWSER_USER_AGENT, timeouts)
            .map_err(|e| DownloadError::network("mirror client", e))?;
        Ok(Self {
            client,
            label: label.into(),
        })
    }
}

#[async_trait]
impl LinkResolver for HttpLinkResolver {
    #[instrument(skip(self), fields(label = %self.label))]
    async fn resolve(&self, page_url: &str) -> Result<String, DownloadError> {
        let base = Url::parse(page_url).map_err(|_| DownloadError::InvalidUrl {
            url: page_url.to_string(),
        })?;
        let response = self
            .client
            .get(base)
            .send()
            .await
            .map_err(|e| DownloadError::network(page_url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(page_url, status.as_u16()));
        }
        // Redirects may move the page; relative hrefs resolve against where it landed.
        let landed = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| DownloadError::network(page_url, e))?;

        let link = find_labelled_link(&html, &landed, &self.label).ok_or_else(|| {
            DownloadError::LinkNotFound {
                url: page_url.to_string(),
                label: self.label.clone(),
            }
        })?;
        debug!(page = page_url, link = %link, "Resolved direct download link");
        Ok(link.into())
    }
}

/// Finds the first anchor whose visible text equals `label` and returns its
/// absolute target.
#[must_use]
pub fn find_labelled_link(html: &str, base: &Url, label: &str) -> Option<Url> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter(|anchor| collapse_whitespace(&anchor.text().collect::<String>()) == label)
        .find_map(|anchor| absolutize_url(anchor.value().attr("href")?, base))
}
