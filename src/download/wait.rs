//! Download-directory polling.
//!
//! Chrome writes a download to `<name>.crdownload` and renames it when done,
//! so "complete" means no in-progress file is left in the directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::DownloadError;

/// Extension Chrome gives files still being written.
pub const IN_PROGRESS_EXTENSION: &str = "crdownload";

/// Default wait before giving up on a download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between directory checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded poll settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadWait {
    /// Longest time to wait for in-progress files to disappear.
    pub timeout: Duration,
    /// Delay between checks.
    pub poll_interval: Duration,
}

impl Default for DownloadWait {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DownloadWait {
    /// Creates poll settings.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Polls `dir` until no in-progress file remains.
    ///
    /// Returns `false` on timeout. An unreadable directory counts as "nothing
    /// in progress".
    pub async fn wait_for_download_complete(&self, dir: &Path) -> bool {
        let started = Instant::now();
        loop {
            let pending = in_progress_files(dir).map(|f| f.len()).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "Cannot read download directory");
                0
            });
            if pending == 0 {
                return true;
            }
            if started.elapsed() >= self.timeout {
                debug!(dir = %dir.display(), pending, "Download wait timed out");
                return false;
            }
            debug!(dir = %dir.display(), pending, "Download still in progress");
            sleep(self.poll_interval).await;
        }
    }
}

fn is_in_progress(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(IN_PROGRESS_EXTENSION))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Lists in-progress downloads in `dir`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the directory cannot be read.
pub fn in_progress_files(dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DownloadError::io(dir, e))? {
        let path = entry.map_err(|e| DownloadError::io(dir, e))?.path();
        if path.is_file() && is_in_progress(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Lists completed, non-empty, visible files in `dir`, sorted by name.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the directory cannot be read.
pub fn completed_files(dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DownloadError::io(dir, e))? {
        let entry = entry.map_err(|e| DownloadError::io(dir, e))?;
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() && meta.len() > 0 && !is_in_progress(&path) && !is_hidden(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The most recently modified completed file in `dir` that is not in `before`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the directory cannot be read.
pub(super) fn newest_new_file(
    dir: &Path,
    before: &HashSet<PathBuf>,
) -> Result<Option<PathBuf>, DownloadError> {
    Ok(completed_files(dir)?
        .into_iter()
        .filter(|path| !before.contains(path))
        .max_by_key(|path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        }))
}

/// Deletes leftover in-progress files. Returns how many were removed.
pub fn remove_partial_files(dir: &Path) -> usize {
    let Ok(partials) = in_progress_files(dir) else {
        return 0;
    };
    partials
        .into_iter()
        .filter(|path| match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed partial download");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot remove partial download");
                false
            }
        })
        .count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick_wait() -> DownloadWait {
        DownloadWait::new(Duration::from_millis(120), Duration::from_millis(20))
    }

    #[test]
    fn test_default_wait_matches_browser_budget() {
        let wait = DownloadWait::default();
        assert_eq!(wait.timeout, Duration::from_secs(300));
        assert_eq!(wait.poll_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_empty_directory_is_complete() {
        let dir = TempDir::new().unwrap();
        assert!(quick_wait().wait_for_download_complete(dir.path()).await);
    }

    #[tokio::test]
    async fn test_stuck_partial_times_out() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dune.epub.crdownload"), b"part").unwrap();
        assert!(!quick_wait().wait_for_download_complete(dir.path()).await);
    }

    #[tokio::test]
    async fn test_wait_completes_when_partial_is_renamed() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("Dune.epub.crdownload");
        std::fs::write(&partial, b"part").unwrap();

        let finished = dir.path().join("Dune.epub");
        let renamer = tokio::spawn(async move {
            sleep(Duration::from_millis(40)).await;
            std::fs::rename(partial, finished).unwrap();
        });

        let wait = DownloadWait::new(Duration::from_secs(5), Duration::from_millis(10));
        assert!(wait.wait_for_download_complete(dir.path()).await);
        renamer.await.unwrap();
    }

    #[test]
    fn test_completed_files_skip_partial_empty_and_hidden() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.epub"), b"book").unwrap();
        std::fs::write(dir.path().join("a.mobi"), b"book").unwrap();
        std::fs::write(dir.path().join("c.epub.crdownload"), b"part").unwrap();
        std::fs::write(dir.path().join("empty.epub"), b"").unwrap();
        std::fs::write(dir.path().join(".com.google.Chrome.x"), b"tmp").unwrap();

        let names: Vec<_> = completed_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.mobi", "b.epub"]);
    }

    #[test]
    fn test_remove_partial_files_only_touches_partials() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.epub"), b"book").unwrap();
        std::fs::write(dir.path().join("x.crdownload"), b"part").unwrap();
        std::fs::write(dir.path().join("y.CRDOWNLOAD"), b"part").unwrap();

        assert_eq!(remove_partial_files(dir.path()), 2);
        assert!(dir.path().join("keep.epub").exists());
        assert!(in_progress_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_newest_new_file_ignores_files_seen_before() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.epub");
        std::fs::write(&old, b"old").unwrap();
        let before: HashSet<PathBuf> = completed_files(dir.path()).unwrap().into_iter().collect();
        assert_eq!(newest_new_file(dir.path(), &before).unwrap(), None);

        std::fs::write(dir.path().join("fresh.epub"), b"fresh").unwrap();
        assert_eq!(
            newest_new_file(dir.path(), &before).unwrap(),
            Some(dir.path().join("fresh.epub"))
        );
    }

    #[test]
    fn test_missing_directory_reports_io() {
        let dir = TempDir::new().unwrap();
        let err = completed_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, DownloadError::Io { .. }));
    }
}
