//! Browser automation seam.
//!
//! Mirror hosts only hand out files to a real browser, so the direct link is
//! opened in a Chrome session driven over WebDriver (`fantoccini`), with the
//! download directory pointed at the workspace.

use std::path::Path;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use super::DownloadError;

/// Default chromedriver endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Starts browser sessions that save downloads into a directory.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Starts a fresh session whose downloads land in `download_dir`.
    async fn launch(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, DownloadError>;
}

/// One live browser session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates to `url`, which may trigger a download.
    async fn goto(&mut self, url: &str) -> Result<(), DownloadError>;

    /// Ends the session.
    async fn close(&mut self) -> Result<(), DownloadError>;
}

/// Launches Chrome sessions through a WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverLauncher {
    /// Creates a launcher for the given WebDriver endpoint.
    #[must_use]
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
        }
    }
}

impl Default for WebDriverLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_WEBDRIVER_URL, true)
    }
}

/// Chrome capabilities for unattended downloads into `download_dir`.
#[must_use]
pub fn chrome_capabilities(download_dir: &Path, headless: bool) -> Map<String, Value> {
    let mut args = Vec::new();
    if headless {
        args.push("--headless=new");
    }
    args.extend([
        "--window-size=1920,1080",
        "--disable-notifications",
        "--no-sandbox",
        "--disable-gpu",
        "--disable-software-rasterizer",
        "--disable-dev-shm-usage",
    ]);

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "prefs": {
                "download.default_directory": download_dir.to_string_lossy(),
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing_for_trusted_sources_enabled": false,
                "safebrowsing.enabled": false
            }
        }),
    );
    caps
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    #[instrument(skip(self), fields(webdriver = %self.webdriver_url, headless = self.headless))]
    async fn launch(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, DownloadError> {
        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(download_dir, self.headless))
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| {
                DownloadError::browser(format!(
                    "cannot start session at {}: {e}",
                    self.webdriver_url
                ))
            })?;
        debug!(dir = %download_dir.display(), "Browser session started");
        Ok(Box::new(WebDriverSession {
            client: Some(client),
        }))
    }
}

/// A live WebDriver session.
struct WebDriverSession {
    client: Option<Client>,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<(), DownloadError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| DownloadError::browser("session already closed"))?;
        client
            .goto(url)
            .await
            .map_err(|e| DownloadError::browser(format!("navigation to {url} failed: {e}")))
    }

    async fn close(&mut self) -> Result<(), DownloadError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        client.close().await.map_err(|e| {
            warn!(error = %e, "Browser session did not close cleanly");
            DownloadError::browser(format!("closing session failed: {e}"))
        })
    }
}
