//! Catalog search across the public mirror catalog and the private book service.
//!
//! # Architecture
//!
//! - [`Catalog`] - async trait every catalog implements (title search with a filter)
//! - [`FallbackCatalog`] - a catalog that also hosts the files it lists
//! - [`LibgenCatalog`] - primary catalog; candidates carry mirror page URLs
//! - [`ZLibraryClient`] - private book-service API used as the fallback
//! - [`search_primary`] - format-preference × author-query search loop

mod error;
mod libgen;
mod zlibrary;

pub use error::CatalogError;
pub use libgen::LibgenCatalog;
pub use zlibrary::{
    ZLibraryBook, ZLibraryClient, ZLibraryFile, ZLibraryResponse, ZLibrarySession, ZLibraryUser,
};

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Language every search is restricted to.
pub const SEARCH_LANGUAGE: &str = "English";

/// E-book formats the catalogs are searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// EPUB, the delivery format.
    Epub,
    /// Mobipocket.
    Mobi,
    /// Kindle Format 8.
    Azw3,
}

impl Format {
    /// Lowercase file extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Formats in the order the primary catalog is searched.
pub const FORMAT_PREFERENCE: [Format; 3] = [Format::Epub, Format::Mobi, Format::Azw3];

/// Restricts a catalog search to one format and language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    /// Required file format.
    pub format: Format,
    /// Required language, compared case-insensitively.
    pub language: String,
}

impl SearchFilter {
    /// An English-only filter for `format`.
    #[must_use]
    pub fn english(format: Format) -> Self {
        Self {
            format,
            language: SEARCH_LANGUAGE.to_string(),
        }
    }
}

/// Where a candidate's file can be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Mirror pages, in priority order (Mirror 1, 2, 3).
    Mirrors(Vec<String>),
    /// A file hosted by the catalog itself.
    Hosted {
        /// Catalog book id.
        id: String,
        /// Catalog book hash.
        hash: String,
    },
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCandidate {
    /// Listed title.
    pub title: String,
    /// Listed author, if any.
    pub author: Option<String>,
    /// Lowercase file extension.
    pub extension: String,
    /// Listed language, if any.
    pub language: Option<String>,
    /// How to get the file.
    pub locator: Locator,
}

impl CatalogCandidate {
    /// Mirror pages for this candidate (empty for hosted files).
    #[must_use]
    pub fn mirrors(&self) -> &[String] {
        match &self.locator {
            Locator::Mirrors(mirrors) => mirrors,
            Locator::Hosted { .. } => &[],
        }
    }
}

/// A searchable catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Short catalog name used in logs.
    fn name(&self) -> &str;

    /// Searches for `query`, returning candidates in catalog order.
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError>;
}

/// A catalog that hosts the files it lists.
#[async_trait]
pub trait FallbackCatalog: Catalog {
    /// Stores the candidate's file as `<dest_dir>/<file_stem>.<ext>`.
    async fn fetch(
        &self,
        candidate: &CatalogCandidate,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, CatalogError>;
}

/// Builds search strings: `"<title> <author>"` per author, then the bare title.
#[must_use]
pub fn author_queries(title: &str, authors: &[String]) -> Vec<String> {
    let title = title.trim();
    let mut queries: Vec<String> = authors
        .iter()
        .map(|author| author.trim())
        .filter(|author| !author.is_empty())
        .map(|author| format!("{title} {author}"))
        .collect();
    queries.push(title.to_string());
    queries.dedup();
    queries
}

/// Searches `catalog` by format preference, then by author query.
///
/// Returns the first non-empty result set. A failing query is logged and
/// treated as empty so the remaining combinations are still tried.
pub async fn search_primary(
    catalog: &dyn Catalog,
    title: &str,
    authors: &[String],
) -> Vec<CatalogCandidate> {
    let queries = author_queries(title, authors);
    for format in FORMAT_PREFERENCE {
        let filter = SearchFilter::english(format);
        for query in &queries {
            debug!(catalog = catalog.name(), query = %query, %format, "Searching catalog");
            match catalog.search(query, &filter).await {
                Ok(candidates) if !candidates.is_empty() => {
                    info!(
                        catalog = catalog.name(),
                        query = %query,
                        %format,
                        count = candidates.len(),
                        "Catalog returned candidates"
                    );
                    return candidates;
                }
                Ok(_) => {}
                Err(error) => warn!(
                    catalog = catalog.name(),
                    query = %query,
                    error = %error,
                    "Catalog search failed"
                ),
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingCatalog {
        calls: Mutex<Vec<(String, Format)>>,
        hit_on: Option<(String, Format)>,
    }

    #[async_trait]
    impl Catalog for RecordingCatalog {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(
            &self,
            query: &str,
            filter: &SearchFilter,
        ) -> Result<Vec<CatalogCandidate>, CatalogError> {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), filter.format));
            if self.hit_on.as_ref() == Some(&(query.to_string(), filter.format)) {
                return Ok(vec![CatalogCandidate {
                    title: query.to_string(),
                    author: None,
                    extension: filter.format.extension().to_string(),
                    language: Some(filter.language.clone()),
                    locator: Locator::Mirrors(vec!["https://m1".to_string()]),
                }]);
            }
            Err(CatalogError::parse("recording", "no table"))
        }
    }

    #[test]
    fn test_format_preference_order() {
        assert_eq!(FORMAT_PREFERENCE, [Format::Epub, Format::Mobi, Format::Azw3]);
        assert_eq!(Format::Azw3.to_string(), "azw3");
    }

    #[test]
    fn test_author_queries_authors_then_bare_title() {
        let queries = author_queries("Good Omens", &["Terry Pratchett".into(), "Neil Gaiman".into()]);
        assert_eq!(
            queries,
            ["Good Omens Terry Pratchett", "Good Omens Neil Gaiman", "Good Omens"]
        );
    }

    #[test]
    fn test_author_queries_without_authors() {
        assert_eq!(author_queries(" Dune ", &[]), ["Dune"]);
        assert_eq!(author_queries("Dune", &["  ".into()]), ["Dune"]);
    }

    #[tokio::test]
    async fn test_search_primary_walks_formats_then_authors() {
        let catalog = RecordingCatalog {
            calls: Mutex::new(Vec::new()),
            hit_on: Some(("Dune".to_string(), Format::Mobi)),
        };
        let found = search_primary(&catalog, "Dune", &["Frank Herbert".to_string()]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extension, "mobi");

        let calls = catalog.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("Dune Frank Herbert".to_string(), Format::Epub),
                ("Dune".to_string(), Format::Epub),
                ("Dune Frank Herbert".to_string(), Format::Mobi),
                ("Dune".to_string(), Format::Mobi),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_primary_exhausts_everything_then_returns_empty() {
        let catalog = RecordingCatalog {
            calls: Mutex::new(Vec::new()),
            hit_on: None,
        };
        let found = search_primary(&catalog, "Dune", &[]).await;
        assert!(found.is_empty());
        assert_eq!(catalog.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_hosted_candidate_has_no_mirrors() {
        let candidate = CatalogCandidate {
            title: "Dune".to_string(),
            author: None,
            extension: "epub".to_string(),
            language: None,
            locator: Locator::Hosted {
                id: "1".to_string(),
                hash: "abc".to_string(),
            },
        };
        assert!(candidate.mirrors().is_empty());
    }
}
