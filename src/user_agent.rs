//! Shared User-Agent strings for API and catalog HTTP clients.
//!
//! API traffic (metadata, LLM, mail) identifies the tool. Catalog pages are
//! scraped with a browser User-Agent because the public catalogs serve a
//! degraded page to unknown clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/book-courier";

/// Browser User-Agent used for catalog and mirror page requests.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

/// Default User-Agent for API requests (identifies the tool).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("book-courier/{version} (+{PROJECT_UA_URL})")
}
