//! Mirror resolution and browser-driven downloads.
//!
//! A catalog candidate carries up to three mirror *pages*. Each page links to
//! the file under a fixed label (`GET`); the direct link is opened in a
//! browser session that saves into the downloads directory, and the directory
//! is polled until the browser has finished writing.
//!
//! # Flow per mirror
//!
//! 1. [`LinkResolver::resolve`] the mirror page to a direct link
//! 2. [`BrowserLauncher::launch`] a fresh session and navigate to the link
//! 3. settle, then [`DownloadWait::wait_for_download_complete`]
//! 4. close the session; success iff a new completed file exists
//!
//! A failed attempt removes any partial `.crdownload` files and the next
//! mirror is tried. Mirrors are never retried.

mod browser;
mod error;
mod link;
mod wait;

pub use browser::{
    BrowserLauncher, BrowserSession, DEFAULT_WEBDRIVER_URL, WebDriverLauncher, chrome_capabilities,
};
pub use error::DownloadError;
pub use link::{DEFAULT_MIRROR_LABEL, HttpLinkResolver, LinkResolver, find_labelled_link};
pub use wait::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_POLL_INTERVAL, DownloadWait, IN_PROGRESS_EXTENSION,
    completed_files, in_progress_files, remove_partial_files,
};

use wait::newest_new_file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

/// Default pause between navigation and the first directory check.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(4);

/// Downloads files through mirror pages into one directory.
pub struct MirrorDownloader {
    resolver: Box<dyn LinkResolver>,
    launcher: Box<dyn BrowserLauncher>,
    downloads_dir: PathBuf,
    wait: DownloadWait,
    settle_delay: Duration,
}

impl std::fmt::Debug for MirrorDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorDownloader")
            .field("downloads_dir", &self.downloads_dir)
            .field("wait", &self.wait)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

impl MirrorDownloader {
    /// Creates a downloader writing into `downloads_dir` with default timing.
    ///
    /// A relative directory is resolved against the current directory here,
    /// since the browser only honours an absolute download path.
    #[must_use]
    pub fn new(
        resolver: Box<dyn LinkResolver>,
        launcher: Box<dyn BrowserLauncher>,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            launcher,
            downloads_dir: absolute_dir(downloads_dir.into()),
            wait: DownloadWait::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the poll settings.
    #[must_use]
    pub fn with_wait(mut self, wait: DownloadWait) -> Self {
        self.wait = wait;
        self
    }

    /// Overrides the delay between navigation and polling.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// The directory files are downloaded into.
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Downloads through one mirror page, returning the completed file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if the page cannot be resolved, the browser
    /// fails, the wait times out, or no new completed file appears. Partial
    /// files are removed before returning an error.
    #[instrument(skip(self))]
    pub async fn download_from_page(&self, page_url: &str) -> Result<PathBuf, DownloadError> {
        let link = self.resolver.resolve(page_url).await?;

        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|e| DownloadError::io(&self.downloads_dir, e))?;
        let before: HashSet<PathBuf> = completed_files(&self.downloads_dir)?.into_iter().collect();

        let result = self.fetch_with_browser(&link).await;
        let outcome = result.and_then(|()| {
            let fresh = newest_new_file(&self.downloads_dir, &before)?;
            fresh.ok_or_else(|| DownloadError::NoFile { url: link.clone() })
        });

        match outcome {
            Ok(path) => {
                info!(page = page_url, file = %path.display(), "Download complete");
                Ok(path)
            }
            Err(error) => {
                let removed = remove_partial_files(&self.downloads_dir);
                warn!(page = page_url, error = %error, removed, "Download attempt failed");
                Err(error)
            }
        }
    }

    /// Tries `mirrors` in order and stops at the first one that yields a file.
    ///
    /// Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NoMirrors`] when nothing usable was given and
    /// [`DownloadError::AllMirrorsFailed`] when every attempt failed.
    pub async fn download_from_mirrors(&self, mirrors: &[String]) -> Result<PathBuf, DownloadError> {
        let mut attempted = 0;
        for mirror in mirrors.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
            attempted += 1;
            match self.download_from_page(mirror).await {
                Ok(path) => return Ok(path),
                Err(error) => {
                    warn!(mirror, attempt = attempted, error = %error, "Mirror failed; trying next");
                }
            }
        }
        if attempted == 0 {
            Err(DownloadError::NoMirrors)
        } else {
            Err(DownloadError::AllMirrorsFailed { attempted })
        }
    }

    async fn fetch_with_browser(&self, link: &str) -> Result<(), DownloadError> {
        let mut session = self.launcher.launch(&self.downloads_dir).await?;
        let navigated = session.goto(link).await;
        let completed = match navigated {
            Ok(()) => {
                tokio::time::sleep(self.settle_delay).await;
                Ok(self.wait.wait_for_download_complete(&self.downloads_dir).await)
            }
            Err(error) => Err(error),
        };
        if let Err(error) = session.close().await {
            warn!(error = %error, "Ignoring browser close failure");
        }

        if completed? {
            Ok(())
        } else {
            Err(DownloadError::Timeout {
                url: link.to_string(),
                timeout_secs: self.wait.timeout.as_secs(),
            })
        }
    }
}

fn absolute_dir(dir: PathBuf) -> PathBuf {
    match std::path::absolute(&dir) {
        Ok(absolute) => absolute,
        Err(error) => {
            warn!(dir = %dir.display(), error = %error, "Cannot make downloads directory absolute");
            dir
        }
    }
}
