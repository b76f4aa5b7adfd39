//! Private book-service client (Z-Library `eapi`), used as the fallback catalog.
//!
//! The service authenticates with a `remix_userid`/`remix_userkey` cookie pair,
//! obtained either by logging in with credentials or supplied directly from a
//! cached session. Every response carries a `success` flag and, on failure, an
//! `error` string; those are surfaced through [`ZLibraryResponse`] rather than
//! as `Err`, which is reserved for transport and decoding failures.
//!
//! Authenticated calls made without a session return
//! [`ZLibraryResponse::not_logged_in`] without touching the network.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;
use url::form_urlencoded;

use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::BROWSER_USER_AGENT;

use super::{
    Catalog, CatalogCandidate, CatalogError, FallbackCatalog, Locator, SearchFilter,
};

/// Default API domain.
const DEFAULT_BASE_URL: &str = "https://singlelogin.se";

const CATALOG_NAME: &str = "zlibrary";

const NOT_LOGGED_IN: &str = "Not logged in";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Authenticated session state held by the client.
#[derive(Clone, PartialEq, Eq)]
pub struct ZLibrarySession {
    /// `remix_userid` cookie value.
    pub user_id: String,
    /// `remix_userkey` cookie value.
    pub user_key: String,
    /// Account email, when the service reported it.
    pub email: Option<String>,
    /// Account display name.
    pub name: Option<String>,
    /// Send-to-Kindle address registered on the account.
    pub kindle_email: Option<String>,
}

impl fmt::Debug for ZLibrarySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZLibrarySession")
            .field("user_id", &self.user_id)
            .field("user_key", &"<redacted>")
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ZLibrarySession {
    fn cookie_header(&self) -> String {
        format!(
            "siteLanguageV2=en; remix_userid={}; remix_userkey={}",
            self.user_id, self.user_key
        )
    }
}

/// A service reply: the `success` flag, the service `error` field, and the
/// decoded payload when successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZLibraryResponse<T> {
    /// Whether the service reported success.
    pub success: bool,
    /// Error reported by the service.
    pub error: Option<String>,
    /// Decoded payload on success.
    pub payload: Option<T>,
}

impl<T> ZLibraryResponse<T> {
    /// The reply produced locally for authenticated calls without a session.
    #[must_use]
    pub fn not_logged_in() -> Self {
        Self {
            success: false,
            error: Some(NOT_LOGGED_IN.to_string()),
            payload: None,
        }
    }

    fn failed(error: Option<String>) -> Self {
        Self {
            success: false,
            error,
            payload: None,
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> ZLibraryResponse<U> {
        ZLibraryResponse {
            success: self.success,
            error: self.error,
            payload: self.payload.map(f),
        }
    }

    /// Converts into the payload, or a [`CatalogError::Rejected`] carrying the
    /// service error.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Rejected`] when the reply was not successful.
    pub fn into_result(self) -> Result<T, CatalogError> {
        match self.payload {
            Some(payload) if self.success => Ok(payload),
            _ => Err(CatalogError::rejected(
                CATALOG_NAME,
                self.error.unwrap_or_else(|| "request failed".to_string()),
            )),
        }
    }
}

/// Account details returned by login and profile calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZLibraryUser {
    /// Numeric account id (as a string).
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Registered send-to-Kindle address.
    #[serde(default)]
    pub kindle_email: Option<String>,
    /// Session key.
    pub remix_userkey: String,
}

/// A book listed by a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZLibraryBook {
    /// Book id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Book hash (second half of the file key).
    pub hash: String,
    /// Listed title.
    pub title: String,
    /// Listed author.
    #[serde(default)]
    pub author: Option<String>,
    /// File extension.
    #[serde(default)]
    pub extension: Option<String>,
    /// Listed language.
    #[serde(default)]
    pub language: Option<String>,
}

/// File descriptor returned by the book-file endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZLibraryFile {
    /// Title-like description.
    pub description: String,
    /// Author, when known.
    #[serde(default)]
    pub author: Option<String>,
    /// File extension.
    pub extension: String,
    /// Direct download link.
    #[serde(rename = "downloadLink")]
    pub download_link: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    user: ZLibraryUser,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    books: Vec<ZLibraryBook>,
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    file: ZLibraryFile,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// The service reports `success` as `1`/`0` or `true`/`false`.
fn is_truthy(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(serde_json::Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}

/// Client for the private book-service API.
pub struct ZLibraryClient {
    client: Client,
    base_url: Url,
    session: Option<ZLibrarySession>,
}

impl fmt::Debug for ZLibraryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZLibraryClient")
            .field("base_url", &self.base_url.as_str())
            .field("logged_in", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ZLibraryClient {
    /// Creates an unauthenticated client for the public API domain.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the HTTP client cannot be built.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, CatalogError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeouts)
    }

    /// Creates an unauthenticated client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_base_url(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            CatalogError::parse(CATALOG_NAME, format!("invalid base URL '{base_url}': {e}"))
        })?;
        let client = build_http_client(CATALOG_NAME, BROWSER_USER_AGENT, timeouts)
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        Ok(Self {
            client,
            base_url,
            session: None,
        })
    }

    /// True once a login call succeeded.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// The current session, if logged in.
    #[must_use]
    pub fn session(&self) -> Option<&ZLibrarySession> {
        self.session.as_ref()
    }

    /// Logs in with account credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only for transport or decoding failures; a
    /// rejected login is reported through the response.
    #[instrument(skip(self, password), fields(catalog = CATALOG_NAME))]
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<ZLibraryResponse<ZLibraryUser>, CatalogError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("email", email)
            .append_pair("password", password)
            .finish();
        let request = self.post("/eapi/user/login")?.body(body);
        let response: ZLibraryResponse<UserPayload> = self.send(request).await?;
        Ok(self.store_session(response.map(|p| p.user)))
    }

    /// Logs in with a cached `remix_userid`/`remix_userkey` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only for transport or decoding failures.
    #[instrument(skip(self, user_key), fields(catalog = CATALOG_NAME))]
    pub async fn login_with_token(
        &mut self,
        user_id: &str,
        user_key: &str,
    ) -> Result<ZLibraryResponse<ZLibraryUser>, CatalogError> {
        let probe = ZLibrarySession {
            user_id: user_id.to_string(),
            user_key: user_key.to_string(),
            email: None,
            name: None,
            kindle_email: None,
        };
        let request = self
            .get("/eapi/user/profile")?
            .header(COOKIE, probe.cookie_header());
        let response: ZLibraryResponse<UserPayload> = self.send(request).await?;
        Ok(self.store_session(response.map(|p| p.user)))
    }

    /// Fetches the logged-in account profile.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only for transport or decoding failures.
    pub async fn profile(&self) -> Result<ZLibraryResponse<ZLibraryUser>, CatalogError> {
        let Some(request) = self.authenticated(self.get("/eapi/user/profile")?) else {
            return Ok(ZLibraryResponse::not_logged_in());
        };
        let response: ZLibraryResponse<UserPayload> = self.send(request).await?;
        Ok(response.map(|p| p.user))
    }

    /// Searches the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only for transport or decoding failures.
    #[instrument(skip(self), fields(catalog = CATALOG_NAME))]
    pub async fn search_books(
        &self,
        message: &str,
        languages: &[&str],
        extensions: &[&str],
    ) -> Result<ZLibraryResponse<Vec<ZLibraryBook>>, CatalogError> {
        let body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            form.append_pair("message", message);
            for language in languages {
                form.append_pair("languages", language);
            }
            for extension in extensions {
                form.append_pair("extensions", extension);
            }
            form.finish()
        };

        let Some(request) = self.authenticated(self.post("/eapi/book/search")?) else {
            return Ok(ZLibraryResponse::not_logged_in());
        };
        let response: ZLibraryResponse<SearchPayload> = self.send(request.body(body)).await?;
        Ok(response.map(|p| p.books))
    }

    /// Looks up the downloadable file for a book.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only for transport or decoding failures.
    pub async fn book_file(
        &self,
        id: &str,
        hash: &str,
    ) -> Result<ZLibraryResponse<ZLibraryFile>, CatalogError> {
        let path = format!("/eapi/book/{id}/{hash}/file");
        let Some(request) = self.authenticated(self.get(&path)?) else {
            return Ok(ZLibraryResponse::not_logged_in());
        };
        let response: ZLibraryResponse<FilePayload> = self.send(request).await?;
        Ok(response.map(|p| p.file))
    }

    /// Downloads a book to `<dest_dir>/<file_stem>.<ext>`.
    ///
    /// The file is removed again when streaming fails or nothing was written.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Rejected`] when the service refuses the file
    /// lookup, [`CatalogError::Parse`] when it reports no extension,
    /// [`CatalogError::EmptyFile`] for an empty body, and network/IO errors
    /// while streaming.
    #[instrument(skip(self, dest_dir), fields(catalog = CATALOG_NAME))]
    pub async fn download_book(
        &self,
        id: &str,
        hash: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, CatalogError> {
        let file = self.book_file(id, hash).await?.into_result()?;
        let extension = file.extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return Err(CatalogError::parse(
                CATALOG_NAME,
                format!("book {id} has no file extension"),
            ));
        }
        let path = dest_dir.join(format!("{file_stem}.{extension}"));

        let response = self
            .client
            .get(&file.download_link)
            .send()
            .await
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::http_status(CATALOG_NAME, status.as_u16()));
        }

        let written = match stream_to_file(response, &path).await {
            Ok(0) => Err(CatalogError::EmptyFile {
                catalog: CATALOG_NAME.to_string(),
                url: file.download_link.clone(),
            }),
            other => other,
        };
        match written {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "Downloaded hosted book");
                Ok(path)
            }
            Err(error) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(path = %path.display(), error = %e, "No partial file to remove");
                }
                warn!(path = %path.display(), error = %error, "Hosted download failed");
                Err(error)
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::parse(CATALOG_NAME, format!("invalid path '{path}': {e}")))
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, CatalogError> {
        Ok(self.client.get(self.endpoint(path)?))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, CatalogError> {
        Ok(self
            .client
            .post(self.endpoint(path)?)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE))
    }

    /// Attaches the session cookies, or returns `None` when not logged in.
    fn authenticated(&self, request: RequestBuilder) -> Option<RequestBuilder> {
        let Some(session) = &self.session else {
            debug!("Not logged in; skipping authenticated request");
            return None;
        };
        Some(request.header(COOKIE, session.cookie_header()))
    }

    async fn send<T>(&self, request: RequestBuilder) -> Result<ZLibraryResponse<T>, CatalogError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(|e| {
            CatalogError::parse(CATALOG_NAME, format!("HTTP {status}: {e}"))
        })?;

        let error = body
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if !is_truthy(body.get("success")) {
            if let Some(message) = &error {
                warn!(catalog = CATALOG_NAME, error = %message, "Service reported failure");
            }
            return Ok(ZLibraryResponse::failed(error));
        }

        let payload = serde_json::from_value::<T>(body)
            .map_err(|e| CatalogError::parse(CATALOG_NAME, e.to_string()))?;
        Ok(ZLibraryResponse {
            success: true,
            error,
            payload: Some(payload),
        })
    }

    fn store_session(
        &mut self,
        response: ZLibraryResponse<ZLibraryUser>,
    ) -> ZLibraryResponse<ZLibraryUser> {
        if let Some(user) = response.payload.as_ref().filter(|_| response.success) {
            self.session = Some(ZLibrarySession {
                user_id: user.id.clone(),
                user_key: user.remix_userkey.clone(),
                email: user.email.clone(),
                name: user.name.clone(),
                kindle_email: user.kindle_email.clone(),
            });
            info!(catalog = CATALOG_NAME, user_id = %user.id, "Logged in");
        }
        response
    }
}

#[async_trait]
impl Catalog for ZLibraryClient {
    fn name(&self) -> &str {
        CATALOG_NAME
    }

    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        let books = self
            .search_books(query, &[filter.language.as_str()], &[filter.format.extension()])
            .await?
            .into_result()?;

        Ok(books
            .into_iter()
            .map(|book| CatalogCandidate {
                extension: book
                    .extension
                    .as_deref()
                    .unwrap_or(filter.format.extension())
                    .to_ascii_lowercase(),
                title: book.title,
                author: book.author,
                language: book.language,
                locator: Locator::Hosted {
                    id: book.id,
                    hash: book.hash,
                },
            })
            .collect())
    }
}

#[async_trait]
impl FallbackCatalog for ZLibraryClient {
    async fn fetch(
        &self,
        candidate: &CatalogCandidate,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, CatalogError> {
        match &candidate.locator {
            Locator::Hosted { id, hash } => self.download_book(id, hash, dest_dir, file_stem).await,
            Locator::Mirrors(_) => Err(CatalogError::UnsupportedCandidate {
                catalog: CATALOG_NAME.to_string(),
                title: candidate.title.clone(),
            }),
        }
    }
}

/// Streams a response body into `path`, returning the number of bytes written.
async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, CatalogError> {
    let output = File::create(path)
        .await
        .map_err(|e| CatalogError::io(path, e))?;
    let mut writer = BufWriter::new(output);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CatalogError::network(CATALOG_NAME, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| CatalogError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }
    writer.flush().await.map_err(|e| CatalogError::io(path, e))?;
    Ok(bytes_written)
}
