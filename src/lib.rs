//! Book Courier Core Library
//!
//! Finds e-books by title, downloads them through catalog mirrors with a
//! browser session, files them into a books folder as EPUB where possible,
//! and mails them to a reading device.
//!
//! # Architecture
//!
//! - [`request`] - Book requests and CSV request lists
//! - [`metadata`] - Canonical title/author lookup
//! - [`catalog`] - Primary and fallback catalog search
//! - [`relevance`] - LLM filter over catalog candidates
//! - [`download`] - Mirror link resolution and browser downloads
//! - [`library`] - File naming, moving and EPUB conversion
//! - [`delivery`] - Mailing books and clearing the books folder
//! - [`not_found`] - Log of titles that could not be obtained
//! - [`pipeline`] - Per-request workflow over the above

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod delivery;
pub mod download;
mod html;
pub mod http;
pub mod library;
pub mod metadata;
pub mod not_found;
pub mod pipeline;
pub mod relevance;
pub mod request;
pub mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogCandidate, FallbackCatalog, LibgenCatalog, ZLibraryClient};
pub use delivery::{MailEnvelope, Mailer, SendGridMailer};
pub use download::{MirrorDownloader, WebDriverLauncher};
pub use library::{Converter, EbookConvert};
pub use metadata::{BookMetadata, MetadataLookup, OpenLibraryLookup};
pub use not_found::NotFoundLog;
pub use pipeline::{BatchSummary, BookPipeline, RequestOutcome};
pub use relevance::{OpenAiJudge, RelevanceJudge};
pub use request::BookRequest;
