//! Per-request workflow: search, filter, download, normalize.
//!
//! ```text
//! request ─┬─ link ─────────────► download page ─────┐
//!          ├─ mirrors ──────────► download mirrors ──┤
//!          └─ title ─► lookup ─► primary search ─► judge ─► download mirrors ─┤
//!                                       │ nothing accepted                    │
//!                                       └─► fallback search ─► judge ─► fetch ┤
//!                                                                             ▼
//!                                                         normalize ─► Stored(path)
//! ```
//!
//! Any dead end records the title in the not-found log exactly once and
//! yields [`RequestOutcome::NotFound`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{
    Catalog, CatalogCandidate, FallbackCatalog, Format, SearchFilter, author_queries,
    search_primary,
};
use crate::download::MirrorDownloader;
use crate::library::{Converter, NormalizeError, normalize_file, sanitize_file_stem};
use crate::metadata::{BookMetadata, MetadataLookup};
use crate::not_found::{NotFoundLog, NotFoundLogError};
use crate::relevance::{RelevanceJudge, select_candidate};
use crate::request::BookRequest;

/// Infrastructure failures that stop a single request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The workspace directories could not be created.
    #[error("cannot prepare directory {path}: {source}")]
    Workspace {
        /// The directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded file could not be filed into the library.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The not-found log could not be written.
    #[error(transparent)]
    NotFoundLog(#[from] NotFoundLogError),
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The book was stored at this path in the books directory.
    Stored(PathBuf),
    /// Nothing could be obtained; the title was logged.
    NotFound,
}

/// Totals for [`BookPipeline::run_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Paths of stored books.
    pub stored: Vec<PathBuf>,
    /// Titles recorded as not found.
    pub not_found: Vec<String>,
    /// Titles that failed with an infrastructure error.
    pub failed: Vec<String>,
}

impl BatchSummary {
    /// Number of requests accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.stored.len() + self.not_found.len() + self.failed.len()
    }
}

/// Workspace directories used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Workspace {
    /// Where the browser saves files.
    downloads_dir: PathBuf,
    /// Where normalized books are collected.
    books_dir: PathBuf,
}

/// Owns the collaborators and drives each request through the workflow.
pub struct BookPipeline {
    metadata: Box<dyn MetadataLookup>,
    primary: Box<dyn Catalog>,
    fallback: Option<Box<dyn FallbackCatalog>>,
    judge: Box<dyn RelevanceJudge>,
    downloader: MirrorDownloader,
    converter: Box<dyn Converter>,
    not_found: NotFoundLog,
    workspace: Workspace,
}

impl std::fmt::Debug for BookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookPipeline")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|c| c.name().to_string()))
            .field("downloader", &self.downloader)
            .field("not_found", &self.not_found)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BookPipeline`]; every collaborator except the fallback is required.
pub struct BookPipelineBuilder {
    metadata: Box<dyn MetadataLookup>,
    primary: Box<dyn Catalog>,
    fallback: Option<Box<dyn FallbackCatalog>>,
    judge: Box<dyn RelevanceJudge>,
    downloader: MirrorDownloader,
    converter: Box<dyn Converter>,
    not_found: NotFoundLog,
    books_dir: PathBuf,
}

impl BookPipelineBuilder {
    /// Adds a fallback catalog consulted when the primary yields nothing.
    #[must_use]
    pub fn fallback(mut self, fallback: Box<dyn FallbackCatalog>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Finishes the pipeline.
    #[must_use]
    pub fn build(self) -> BookPipeline {
        let workspace = Workspace {
            downloads_dir: self.downloader.downloads_dir().to_path_buf(),
            books_dir: self.books_dir,
        };
        BookPipeline {
            metadata: self.metadata,
            primary: self.primary,
            fallback: self.fallback,
            judge: self.judge,
            downloader: self.downloader,
            converter: self.converter,
            not_found: self.not_found,
            workspace,
        }
    }
}

impl BookPipeline {
    /// Starts a builder. Downloads go to the downloader's directory.
    #[must_use]
    pub fn builder(
        metadata: Box<dyn MetadataLookup>,
        primary: Box<dyn Catalog>,
        judge: Box<dyn RelevanceJudge>,
        downloader: MirrorDownloader,
        converter: Box<dyn Converter>,
        not_found: NotFoundLog,
        books_dir: impl Into<PathBuf>,
    ) -> BookPipelineBuilder {
        BookPipelineBuilder {
            metadata,
            primary,
            fallback: None,
            judge,
            downloader,
            converter,
            not_found,
            books_dir: books_dir.into(),
        }
    }

    /// Runs one request to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only for infrastructure failures. A book
    /// that cannot be found is `Ok(RequestOutcome::NotFound)`.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn process(&self, request: &BookRequest) -> Result<RequestOutcome, PipelineError> {
        self.prepare_workspace().await?;

        if request.needs_search() {
            return self.search_and_fetch(&request.title).await;
        }

        if let Some(link) = &request.download_link {
            info!(link = %link, "Downloading from explicit link");
            return match self.downloader.download_from_page(link).await {
                Ok(path) => self.store(&path, &request.title).await,
                Err(error) => self.give_up(&request.title, &error.to_string()),
            };
        }

        info!(count = request.mirrors.len(), "Downloading from listed mirrors");
        match self.downloader.download_from_mirrors(&request.mirrors).await {
            Ok(path) => self.store(&path, &request.title).await,
            Err(error) => self.give_up(&request.title, &error.to_string()),
        }
    }

    /// Runs requests one after another. A failing request never stops the batch.
    pub async fn run_batch(&self, requests: &[BookRequest]) -> BatchSummary {
        self.run_batch_with_progress(requests, |_, _, _| {}).await
    }

    /// [`run_batch`](Self::run_batch), calling `on_start(position, total, request)`
    /// before each request. Positions start at 1.
    pub async fn run_batch_with_progress(
        &self,
        requests: &[BookRequest],
        mut on_start: impl FnMut(usize, usize, &BookRequest),
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (index, request) in requests.iter().enumerate() {
            on_start(index + 1, requests.len(), request);
            info!(
                index = index + 1,
                total = requests.len(),
                title = %request.title,
                "Processing request"
            );
            match self.process(request).await {
                Ok(RequestOutcome::Stored(path)) => summary.stored.push(path),
                Ok(RequestOutcome::NotFound) => summary.not_found.push(request.title.clone()),
                Err(error) => {
                    warn!(title = %request.title, error = %error, "Request failed");
                    summary.failed.push(request.title.clone());
                }
            }
        }
        info!(
            stored = summary.stored.len(),
            not_found = summary.not_found.len(),
            failed = summary.failed.len(),
            "Batch finished"
        );
        summary
    }

    async fn search_and_fetch(&self, raw_title: &str) -> Result<RequestOutcome, PipelineError> {
        let metadata = self.resolve_metadata(raw_title).await;

        let candidates = search_primary(self.primary.as_ref(), &metadata.title, &metadata.authors).await;
        if let Some(accepted) =
            select_candidate(self.judge.as_ref(), &metadata.title, candidates).await
        {
            return match self.downloader.download_from_mirrors(accepted.mirrors()).await {
                Ok(path) => self.store(&path, &accepted.title).await,
                Err(error) => self.give_up(raw_title, &error.to_string()),
            };
        }

        let Some(fallback) = &self.fallback else {
            return self.give_up(raw_title, "no accepted candidate and no fallback catalog");
        };
        info!(catalog = fallback.name(), "Primary catalog exhausted; trying fallback");
        let Some(accepted) = self.search_fallback(fallback.as_ref(), &metadata).await else {
            return self.give_up(raw_title, "no accepted candidate in any catalog");
        };

        let stem = sanitize_file_stem(&accepted.title);
        match fallback
            .fetch(&accepted, &self.workspace.downloads_dir, &stem)
            .await
        {
            Ok(path) => self.store(&path, &accepted.title).await,
            Err(error) => self.give_up(raw_title, &error.to_string()),
        }
    }

    async fn search_fallback(
        &self,
        fallback: &dyn FallbackCatalog,
        metadata: &BookMetadata,
    ) -> Option<CatalogCandidate> {
        let filter = SearchFilter::english(Format::Epub);
        for query in author_queries(&metadata.title, &metadata.authors) {
            let candidates = match fallback.search(&query, &filter).await {
                Ok(candidates) => candidates,
                Err(error) => {
                    warn!(catalog = fallback.name(), query = %query, error = %error, "Fallback search failed");
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }
            if let Some(accepted) =
                select_candidate(self.judge.as_ref(), &metadata.title, candidates).await
            {
                return Some(accepted);
            }
        }
        None
    }

    async fn resolve_metadata(&self, raw_title: &str) -> BookMetadata {
        match self.metadata.lookup(raw_title).await {
            Ok(Some(found)) => {
                debug!(title = %found.title, authors = ?found.authors, "Resolved canonical record");
                found
            }
            Ok(None) => {
                debug!("No canonical record; searching with the raw title");
                BookMetadata::new(raw_title, Vec::new())
            }
            Err(error) => {
                warn!(error = %error, "Metadata lookup failed; searching with the raw title");
                BookMetadata::new(raw_title, Vec::new())
            }
        }
    }

    async fn store(&self, downloaded: &Path, title: &str) -> Result<RequestOutcome, PipelineError> {
        let stem = sanitize_file_stem(title);
        let stored = normalize_file(
            downloaded,
            &self.workspace.books_dir,
            &stem,
            self.converter.as_ref(),
        )
        .await?;
        Ok(RequestOutcome::Stored(stored))
    }

    fn give_up(&self, title: &str, reason: &str) -> Result<RequestOutcome, PipelineError> {
        warn!(title, reason, "Book not found");
        self.not_found.record(title)?;
        Ok(RequestOutcome::NotFound)
    }

    async fn prepare_workspace(&self) -> Result<(), PipelineError> {
        for dir in [&self.workspace.downloads_dir, &self.workspace.books_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| PipelineError::Workspace {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
