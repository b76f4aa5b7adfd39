//! Primary catalog: the public Library Genesis title search page.
//!
//! The search page is HTML; results live in the table with class `c`, one row
//! per file, columns in this order:
//!
//! `ID | Author | Title | Publisher | Year | Pages | Language | Size | Extension | Mirror 1..5 | Edit`
//!
//! Cells that contain a titled link (`<a title="...">`) hold a mirror page URL;
//! everything else is read as text with `<i>` decorations (ISBNs, edition
//! notes) stripped.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::html::{
    absolutize_url, collapse_whitespace, compile_static_regex, compile_static_selector,
};
use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::BROWSER_USER_AGENT;

use super::{Catalog, CatalogCandidate, CatalogError, Locator, SearchFilter};

/// Default search page.
const DEFAULT_SEARCH_URL: &str = "https://libgen.is/search.php";

const CATALOG_NAME: &str = "libgen";

/// Shortest query the search page accepts.
const MIN_QUERY_CHARS: usize = 3;

/// Number of mirror columns kept per row.
const MIRROR_COLUMNS: usize = 3;

const COL_AUTHOR: usize = 1;
const COL_TITLE: usize = 2;
const COL_LANGUAGE: usize = 6;
const COL_EXTENSION: usize = 8;
const COL_FIRST_MIRROR: usize = 9;

/// Trailing ISBN lists such as `9780441013593, 0441013597`.
static TRAILING_ISBN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?:[\s,;]*\b(?:97[89][-\s]?)?(?:\d[-\s]?){9}[\dXx]\b)+[\s,;]*$")
});

static RESULTS_TABLE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("table.c"));
static ANY_TABLE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("td"));
static TITLED_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a[title]"));

/// One parsed search-result row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LibgenRow {
    author: String,
    title: String,
    language: String,
    extension: String,
    mirrors: Vec<String>,
}

/// Scrapes the Library Genesis title search.
#[derive(Debug, Clone)]
pub struct LibgenCatalog {
    client: Client,
    search_url: Url,
}

impl LibgenCatalog {
    /// Creates a catalog pointed at the public search page.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the HTTP client cannot be built.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, CatalogError> {
        Self::with_search_url(DEFAULT_SEARCH_URL, timeouts)
    }

    /// Creates a catalog with a custom search page URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_search_url(search_url: &str, timeouts: HttpTimeouts) -> Result<Self, CatalogError> {
        let search_url = Url::parse(search_url).map_err(|e| {
            CatalogError::parse(CATALOG_NAME, format!("invalid search URL '{search_url}': {e}"))
        })?;
        let client = build_http_client(CATALOG_NAME, BROWSER_USER_AGENT, timeouts)
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        Ok(Self { client, search_url })
    }

    async fn fetch_results_page(&self, query: &str) -> Result<String, CatalogError> {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("req", query)
            .append_pair("column", "title");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::http_status(CATALOG_NAME, status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))
    }
}

#[async_trait]
impl Catalog for LibgenCatalog {
    fn name(&self) -> &str {
        CATALOG_NAME
    }

    #[instrument(skip(self, filter), fields(catalog = CATALOG_NAME, format = %filter.format))]
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Err(CatalogError::QueryTooShort {
                query: query.to_string(),
            });
        }

        let html = self.fetch_results_page(query).await?;
        let rows = parse_results_page(&html, &self.search_url);
        debug!(rows = rows.len(), "Parsed search results");

        Ok(rows
            .into_iter()
            .filter(|row| matches_filter(row, filter))
            .map(into_candidate)
            .collect())
    }
}

fn matches_filter(row: &LibgenRow, filter: &SearchFilter) -> bool {
    row.extension
        .eq_ignore_ascii_case(filter.format.extension())
        && row.language.eq_ignore_ascii_case(&filter.language)
}

fn into_candidate(row: LibgenRow) -> CatalogCandidate {
    CatalogCandidate {
        title: row.title,
        author: (!row.author.is_empty()).then_some(row.author),
        extension: row.extension.to_ascii_lowercase(),
        language: (!row.language.is_empty()).then_some(row.language),
        locator: Locator::Mirrors(row.mirrors),
    }
}

/// Parses every result row on a search page. Rows too short to hold the
/// extension column are skipped.
fn parse_results_page(html: &str, page_url: &Url) -> Vec<LibgenRow> {
    let document = Html::parse_document(html);
    let table = document
        .select(&RESULTS_TABLE)
        .next()
        .or_else(|| document.select(&ANY_TABLE).nth(2));
    let Some(table) = table else {
        return Vec::new();
    };

    table
        .select(&ROW)
        .skip(1)
        .filter_map(|row| parse_row(row, page_url))
        .collect()
}

fn parse_row(row: ElementRef<'_>, page_url: &Url) -> Option<LibgenRow> {
    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
    if cells.len() <= COL_EXTENSION {
        return None;
    }

    let mirrors = cells
        .iter()
        .skip(COL_FIRST_MIRROR)
        .take(MIRROR_COLUMNS)
        .filter_map(|cell| titled_link(*cell))
        .filter_map(|href| absolutize_url(&href, page_url).map(String::from))
        .collect();

    Some(LibgenRow {
        author: cell_text(cells[COL_AUTHOR]),
        title: clean_title(&cell_text(cells[COL_TITLE])),
        language: cell_text(cells[COL_LANGUAGE]),
        extension: cell_text(cells[COL_EXTENSION]),
        mirrors,
    })
}

/// Returns the href of the first link with a non-empty `title` attribute.
fn titled_link(cell: ElementRef<'_>) -> Option<String> {
    cell.select(&TITLED_LINK)
        .find(|a| a.value().attr("title").is_some_and(|t| !t.trim().is_empty()))
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Visible text of a cell, skipping anything inside `<i>`.
fn cell_text(cell: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in cell.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_italic = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| e.name() == "i"));
        if !in_italic {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn clean_title(raw: &str) -> String {
    TRAILING_ISBN_RE.replace(raw, "").trim().to_string()
}
