//! Book requests and the CSV batch input format.
//!
//! A CSV batch has a `Title` column and up to three mirror page columns
//! (`Mirror_1`, `Mirror_2`, `Mirror_3`). Blank mirror cells are ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// A single book to find, download and normalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRequest {
    /// Free-text title as entered by the user (or read from CSV).
    pub title: String,
    /// Explicit mirror page to download from, skipping catalog search.
    pub download_link: Option<String>,
    /// Known mirror pages in priority order, skipping catalog search.
    pub mirrors: Vec<String>,
}

impl BookRequest {
    /// A request that goes through metadata lookup and catalog search.
    #[must_use]
    pub fn title_only(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            download_link: None,
            mirrors: Vec::new(),
        }
    }

    /// A request with an explicit mirror page.
    #[must_use]
    pub fn with_link(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            download_link: Some(link.into()),
            mirrors: Vec::new(),
        }
    }

    /// A request with known mirror pages. Blank entries are dropped.
    #[must_use]
    pub fn with_mirrors<I, S>(title: impl Into<String>, mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mirrors = mirrors
            .into_iter()
            .map(Into::into)
            .map(|m: String| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        Self {
            title: title.into(),
            download_link: None,
            mirrors,
        }
    }

    /// True when the request names no explicit link and no mirrors.
    #[must_use]
    pub fn needs_search(&self) -> bool {
        self.download_link.is_none() && self.mirrors.is_empty()
    }
}

/// Errors reading a CSV batch.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The CSV file could not be opened or parsed.
    #[error("cannot read book list {path}: {source}")]
    Csv {
        /// The CSV path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The CSV file has no `Title` column.
    #[error("book list {path} has no `Title` column")]
    MissingTitleColumn {
        /// The CSV path.
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct CsvBookRow {
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Mirror_1", default)]
    mirror_1: Option<String>,
    #[serde(rename = "Mirror_2", default)]
    mirror_2: Option<String>,
    #[serde(rename = "Mirror_3", default)]
    mirror_3: Option<String>,
}

/// Reads book requests from a CSV batch file.
///
/// Rows without a title are skipped with a warning.
///
/// # Errors
///
/// Returns [`RequestError`] when the file cannot be read, has no `Title`
/// column, or contains a malformed row.
pub fn read_csv_requests(path: &Path) -> Result<Vec<BookRequest>, RequestError> {
    let csv_error = |source| RequestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let has_title = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .any(|header| header == "Title");
    if !has_title {
        return Err(RequestError::MissingTitleColumn {
            path: path.to_path_buf(),
        });
    }

    let mut requests = Vec::new();
    for (index, row) in reader.deserialize::<CsvBookRow>().enumerate() {
        let row = row.map_err(csv_error)?;
        let Some(title) = row.title.filter(|t| !t.trim().is_empty()) else {
            warn!(row = index + 1, "Skipping CSV row without a title");
            continue;
        };
        let mirrors = [row.mirror_1, row.mirror_2, row.mirror_3]
            .into_iter()
            .flatten();
        requests.push(BookRequest::with_mirrors(title, mirrors));
    }

    debug!(path = %path.display(), count = requests.len(), "Read book list");
    Ok(requests)
}
