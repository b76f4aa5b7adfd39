//! Mailing collected books to the reading device, and clearing the books folder.
//!
//! Each file in the books directory goes out as its own message with the file
//! attached. A failure for one file is logged and counted; the rest still go.

mod error;
mod sendgrid;

pub use error::DeliveryError;
pub use sendgrid::SendGridMailer;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "Sending books to Kindle";

/// Default HTML body.
pub const DEFAULT_HTML_BODY: &str = "<h1>Here is your book!</h1>";

/// Sender, recipient and wording shared by every message of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    /// From-address.
    pub from: String,
    /// Reading-device address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

impl MailEnvelope {
    /// An envelope with the default subject and body.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: DEFAULT_SUBJECT.to_string(),
            html_body: DEFAULT_HTML_BODY.to_string(),
        }
    }

    /// Replaces the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

/// A file attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub file_name: String,
    /// MIME type.
    pub mime_type: &'static str,
    /// Raw file bytes.
    pub content: Vec<u8>,
}

/// One message with one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// From-address.
    pub from: String,
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
    /// The attached book.
    pub attachment: Attachment,
}

impl OutgoingMail {
    fn new(envelope: &MailEnvelope, attachment: Attachment) -> Self {
        Self {
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            subject: envelope.subject.clone(),
            html_body: envelope.html_body.clone(),
            attachment,
        }
    }
}

/// Sends a message.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `mail`.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

/// Counts of a [`send_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages accepted by the provider.
    pub sent: usize,
    /// Files that could not be read or sent.
    pub failed: usize,
}

/// What [`finish_batch`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchFinish {
    /// Delivery counts, when sending ran.
    pub delivery: Option<DeliveryReport>,
    /// Entries removed, when clearing ran.
    pub cleared: Option<usize>,
}

/// MIME type used for an attachment, by file extension.
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "epub" => "application/epub+zip",
        "mobi" => "application/x-mobipocket-ebook",
        "azw3" => "application/vnd.amazon.ebook",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn regular_files(dir: &Path) -> Result<Vec<PathBuf>, DeliveryError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DeliveryError::io(dir, e))? {
        let path = entry.map_err(|e| DeliveryError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// True when `dir` holds at least one `.epub` file. A missing directory holds none.
#[must_use]
pub fn has_epub_files(dir: &Path) -> bool {
    regular_files(dir).is_ok_and(|files| {
        files.iter().any(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
        })
    })
}

/// Mails every file in `books_dir`, one message per file, in name order.
///
/// # Errors
///
/// Returns [`DeliveryError::Io`] only if the directory cannot be listed;
/// per-file failures are counted in the report.
pub async fn send_all(
    books_dir: &Path,
    mailer: &dyn Mailer,
    envelope: &MailEnvelope,
) -> Result<DeliveryReport, DeliveryError> {
    let mut report = DeliveryReport::default();
    for path in regular_files(books_dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot read book; skipping");
                report.failed += 1;
                continue;
            }
        };
        let mail = OutgoingMail::new(
            envelope,
            Attachment {
                mime_type: mime_type_for(&path),
                file_name,
                content,
            },
        );
        match mailer.send(&mail).await {
            Ok(()) => {
                info!(file = %mail.attachment.file_name, to = %envelope.to, "Book sent");
                report.sent += 1;
            }
            Err(error) => {
                warn!(file = %mail.attachment.file_name, error = %error, "Sending failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Removes every file and sub-directory in `dir`, keeping `dir` itself.
///
/// Returns the number of entries removed. A missing directory is already clear.
///
/// # Errors
///
/// Returns [`DeliveryError::Io`] if an entry cannot be removed.
pub async fn clear_folder(dir: &Path) -> Result<usize, DeliveryError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(DeliveryError::io(dir, e)),
    };
    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DeliveryError::io(dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| DeliveryError::io(&path, e))?;
        let outcome = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        outcome.map_err(|e| DeliveryError::io(&path, e))?;
        removed += 1;
    }
    info!(dir = %dir.display(), removed, "Cleared folder");
    Ok(removed)
}

/// Runs the end-of-session steps.
///
/// Without any `.epub` in `books_dir` both steps are skipped, whatever was
/// chosen. Otherwise books are sent if `send`, then the folder is cleared if
/// `clear`.
///
/// # Errors
///
/// Returns [`DeliveryError`] if the folder cannot be listed or cleared.
pub async fn finish_batch(
    books_dir: &Path,
    mailer: &dyn Mailer,
    envelope: &MailEnvelope,
    send: bool,
    clear: bool,
) -> Result<BatchFinish, DeliveryError> {
    let mut finish = BatchFinish::default();
    if !has_epub_files(books_dir) {
        info!(dir = %books_dir.display(), "No EPUB books collected; nothing to send or clear");
        return Ok(finish);
    }
    if send {
        finish.delivery = Some(send_all(books_dir, mailer, envelope).await?);
    }
    if clear {
        finish.cleared = Some(clear_folder(books_dir).await?);
    }
    Ok(finish)
}
