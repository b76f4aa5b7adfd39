//! In-memory collaborators for driving the pipeline without network or browser.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use book_courier::catalog::{
    Catalog, CatalogCandidate, CatalogError, FallbackCatalog, Format, Locator, SearchFilter,
};
use book_courier::delivery::{DeliveryError, Mailer, OutgoingMail};
use book_courier::download::{
    BrowserLauncher, BrowserSession, DownloadError, DownloadWait, IN_PROGRESS_EXTENSION,
    LinkResolver, MirrorDownloader,
};
use book_courier::library::{Converter, NormalizeError};
use book_courier::metadata::{BookMetadata, MetadataError, MetadataLookup};
use book_courier::relevance::{RelevanceError, RelevanceJudge};

pub fn mirror_candidate(title: &str, extension: &str, mirrors: &[&str]) -> CatalogCandidate {
    CatalogCandidate {
        title: title.to_string(),
        author: None,
        extension: extension.to_string(),
        language: Some("English".to_string()),
        locator: Locator::Mirrors(mirrors.iter().map(|m| (*m).to_string()).collect()),
    }
}

pub fn hosted_candidate(title: &str, extension: &str, id: &str) -> CatalogCandidate {
    CatalogCandidate {
        title: title.to_string(),
        author: None,
        extension: extension.to_string(),
        language: Some("English".to_string()),
        locator: Locator::Hosted {
            id: id.to_string(),
            hash: format!("hash-{id}"),
        },
    }
}

/// Returns a fixed record, or nothing.
#[derive(Clone, Default)]
pub struct FakeMetadata {
    pub record: Option<BookMetadata>,
    pub lookups: Arc<Mutex<Vec<String>>>,
}

impl FakeMetadata {
    pub fn found(title: &str, authors: &[&str]) -> Self {
        Self {
            record: Some(BookMetadata::new(
                title,
                authors.iter().map(|a| (*a).to_string()).collect(),
            )),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn lookup(&self, title: &str) -> Result<Option<BookMetadata>, MetadataError> {
        self.lookups.lock().unwrap().push(title.to_string());
        Ok(self.record.clone())
    }
}

/// Answers `(query, format)` pairs from a table and records every search.
/// As a fallback catalog it writes `<stem>.<ext>` into the destination.
#[derive(Clone)]
pub struct FakeCatalog {
    name: &'static str,
    results: Arc<HashMap<(String, Format), Vec<CatalogCandidate>>>,
    pub searches: Arc<Mutex<Vec<(String, Format)>>>,
    pub fetches: Arc<Mutex<Vec<String>>>,
}

impl FakeCatalog {
    pub fn new(name: &'static str, results: Vec<((&str, Format), Vec<CatalogCandidate>)>) -> Self {
        Self {
            name,
            results: Arc::new(
                results
                    .into_iter()
                    .map(|((query, format), hits)| ((query.to_string(), format), hits))
                    .collect(),
            ),
            searches: Arc::default(),
            fetches: Arc::default(),
        }
    }

    pub fn empty(name: &'static str) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), filter.format));
        Ok(self
            .results
            .get(&(query.to_string(), filter.format))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FallbackCatalog for FakeCatalog {
    async fn fetch(
        &self,
        candidate: &CatalogCandidate,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, CatalogError> {
        self.fetches.lock().unwrap().push(candidate.title.clone());
        let path = dest_dir.join(format!("{file_stem}.{}", candidate.extension));
        std::fs::write(&path, b"hosted ebook").map_err(|e| CatalogError::io(&path, e))?;
        Ok(path)
    }
}

/// Accepts exactly the listed candidate titles.
#[derive(Clone, Default)]
pub struct FakeJudge {
    accepted: Arc<HashSet<String>>,
    pub asked: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeJudge {
    pub fn accepting(titles: &[&str]) -> Self {
        Self {
            accepted: Arc::new(titles.iter().map(|t| (*t).to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn rejecting_all() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelevanceJudge for FakeJudge {
    async fn is_desired_book(
        &self,
        requested: &str,
        candidate_title: &str,
    ) -> Result<bool, RelevanceError> {
        self.asked
            .lock()
            .unwrap()
            .push((requested.to_string(), candidate_title.to_string()));
        Ok(self.accepted.contains(candidate_title))
    }
}

/// Maps mirror page -> direct link; unknown pages fail.
#[derive(Clone, Default)]
pub struct MapResolver(pub Arc<HashMap<String, String>>);

impl MapResolver {
    pub fn new(links: &[(&str, &str)]) -> Self {
        Self(Arc::new(
            links
                .iter()
                .map(|(page, link)| ((*page).to_string(), (*link).to_string()))
                .collect(),
        ))
    }
}

#[async_trait]
impl LinkResolver for MapResolver {
    async fn resolve(&self, page_url: &str) -> Result<String, DownloadError> {
        self.0
            .get(page_url)
            .cloned()
            .ok_or_else(|| DownloadError::LinkNotFound {
                url: page_url.to_string(),
                label: "GET".to_string(),
            })
    }
}

/// What the fake browser does when navigating to a link.
#[derive(Clone)]
pub enum Behaviour {
    /// Saves a completed file with this name.
    Save(&'static str),
    /// Leaves a partial file that never completes.
    Stall(&'static str),
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    behaviours: Arc<HashMap<String, Behaviour>>,
    pub visited: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowser {
    pub fn new(behaviours: &[(&str, Behaviour)]) -> Self {
        Self {
            behaviours: Arc::new(
                behaviours
                    .iter()
                    .map(|(link, b)| ((*link).to_string(), b.clone()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

struct FakeSession {
    dir: PathBuf,
    browser: FakeBrowser,
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, dir: &Path) -> Result<Box<dyn BrowserSession>, DownloadError> {
        Ok(Box::new(FakeSession {
            dir: dir.to_path_buf(),
            browser: self.clone(),
        }))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<(), DownloadError> {
        self.browser.visited.lock().unwrap().push(url.to_string());
        match self.browser.behaviours.get(url) {
            Some(Behaviour::Save(name)) => {
                std::fs::write(self.dir.join(name), b"ebook").unwrap();
            }
            Some(Behaviour::Stall(name)) => {
                std::fs::write(
                    self.dir.join(format!("{name}.{IN_PROGRESS_EXTENSION}")),
                    b"part",
                )
                .unwrap();
            }
            None => {}
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DownloadError> {
        Ok(())
    }
}

/// A downloader over fakes with millisecond-scale polling.
pub fn fast_downloader(
    downloads_dir: &Path,
    resolver: MapResolver,
    browser: &FakeBrowser,
) -> MirrorDownloader {
    MirrorDownloader::new(Box::new(resolver), Box::new(browser.clone()), downloads_dir)
        .with_wait(DownloadWait::new(
            Duration::from_millis(60),
            Duration::from_millis(10),
        ))
        .with_settle_delay(Duration::ZERO)
}

/// Writes a placeholder EPUB on success; fails without output otherwise.
#[derive(Clone, Default)]
pub struct FakeConverter {
    pub fail: bool,
    pub calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeConverter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, source: &Path, target: &Path) -> Result<(), NormalizeError> {
        self.calls.lock().unwrap().push(source.to_path_buf());
        if self.fail {
            return Err(NormalizeError::conversion(source, "converter exited with 1"));
        }
        std::fs::write(target, b"converted").map_err(|e| NormalizeError::io(target, e))
    }
}

/// Records attachment names; fails for the listed ones.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    failing: Arc<HashSet<String>>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingMailer {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            failing: Arc::new(names.iter().map(|n| (*n).to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        if self.failing.contains(&mail.attachment.file_name) {
            return Err(DeliveryError::http_status(500, "mail provider down"));
        }
        self.sent
            .lock()
            .unwrap()
            .push(mail.attachment.file_name.clone());
        Ok(())
    }
}
