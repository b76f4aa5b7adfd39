//! Open Library backed [`MetadataLookup`].
//!
//! Two calls: the search API finds an ISBN for the free text, then the books
//! API returns the canonical record for that ISBN.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::default_api_user_agent;

use super::{BookMetadata, MetadataError, MetadataLookup};

/// Default Open Library base URL.
const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

/// Number of search documents inspected for an ISBN.
const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    isbn: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<BookAuthor>,
}

#[derive(Debug, Deserialize)]
struct BookAuthor {
    name: String,
}

/// Looks up canonical book records on Open Library.
#[derive(Debug, Clone)]
pub struct OpenLibraryLookup {
    client: Client,
    base_url: Url,
}

impl OpenLibraryLookup {
    /// Creates a lookup against the public Open Library service.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the HTTP client cannot be built.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, MetadataError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeouts)
    }

    /// Creates a lookup with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_base_url(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, MetadataError> {
        let base_url = Url::parse(base_url).map_err(|_| MetadataError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        let client = build_http_client("openlibrary", default_api_user_agent(), timeouts)
            .map_err(|e| MetadataError::network(base_url.as_str(), e))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MetadataError> {
        self.base_url
            .join(path)
            .map_err(|_| MetadataError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
            })
    }

    async fn get_json<T>(&self, url: Url, query: &str) -> Result<T, MetadataError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::network(query, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::http_status(query, status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| MetadataError::parse(query, e.to_string()))
    }

    /// Finds the first ISBN Open Library associates with `title`.
    #[instrument(skip(self), fields(service = "openlibrary"))]
    async fn isbn_from_words(&self, title: &str) -> Result<Option<String>, MetadataError> {
        let mut url = self.endpoint("search.json")?;
        url.query_pairs_mut()
            .append_pair("q", title)
            .append_pair("fields", "title,author_name,isbn")
            .append_pair("limit", SEARCH_LIMIT);

        let body: SearchResponse = self.get_json(url, title).await?;
        Ok(body
            .docs
            .into_iter()
            .find_map(|doc| doc.isbn.into_iter().find(|isbn| !isbn.trim().is_empty())))
    }

    /// Fetches the canonical record for an ISBN.
    #[instrument(skip(self), fields(service = "openlibrary"))]
    async fn record_for_isbn(&self, isbn: &str) -> Result<Option<BookMetadata>, MetadataError> {
        let key = format!("ISBN:{isbn}");
        let mut url = self.endpoint("api/books")?;
        url.query_pairs_mut()
            .append_pair("bibkeys", &key)
            .append_pair("format", "json")
            .append_pair("jscmd", "data");

        let mut body: HashMap<String, BookRecord> = self.get_json(url, isbn).await?;
        let Some(record) = body.remove(&key) else {
            return Ok(None);
        };
        let Some(title) = record.title.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        Ok(Some(BookMetadata {
            title,
            authors: record.authors.into_iter().map(|a| a.name).collect(),
            isbn: Some(isbn.to_string()),
        }))
    }
}

#[async_trait]
impl MetadataLookup for OpenLibraryLookup {
    async fn lookup(&self, title: &str) -> Result<Option<BookMetadata>, MetadataError> {
        let Some(isbn) = self.isbn_from_words(title).await? else {
            debug!(title, "No ISBN found for title");
            return Ok(None);
        };
        debug!(title, isbn = %isbn, "Resolved title to ISBN");
        self.record_for_isbn(&isbn).await
    }
}
