//! Title resolution: free-text title → ISBN → canonical title and authors.
//!
//! The canonical record is only a search aid. When lookup fails the pipeline
//! keeps using the raw title the user typed.

mod error;
mod openlibrary;

pub use error::MetadataError;
pub use openlibrary::OpenLibraryLookup;

use async_trait::async_trait;

/// Canonical bibliographic record for a requested title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    /// Canonical title.
    pub title: String,
    /// Author names in the order the service lists them.
    pub authors: Vec<String>,
    /// The ISBN the record was resolved through, if any.
    pub isbn: Option<String>,
}

impl BookMetadata {
    /// Creates a record without an ISBN.
    #[must_use]
    pub fn new(title: impl Into<String>, authors: Vec<String>) -> Self {
        Self {
            title: title.into(),
            authors,
            isbn: None,
        }
    }
}

/// Resolves a free-text title to a canonical record.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Returns the canonical record, or `None` when nothing matches.
    async fn lookup(&self, title: &str) -> Result<Option<BookMetadata>, MetadataError>;
}
