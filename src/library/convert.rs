//! EPUB conversion through an external converter (calibre's `ebook-convert`).

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::NormalizeError;

/// Default converter program.
pub const DEFAULT_CONVERTER: &str = "ebook-convert";

/// Extensions that are converted to EPUB.
pub const CONVERTIBLE_EXTENSIONS: [&str; 2] = ["mobi", "azw3"];

/// Converts an e-book file into EPUB.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Writes an EPUB rendition of `source` to `target`.
    async fn convert(&self, source: &Path, target: &Path) -> Result<(), NormalizeError>;
}

/// Runs `<program> <source> <target>`.
#[derive(Debug, Clone)]
pub struct EbookConvert {
    program: String,
}

impl EbookConvert {
    /// Uses `program` as the converter executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for EbookConvert {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER)
    }
}

#[async_trait]
impl Converter for EbookConvert {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn convert(&self, source: &Path, target: &Path) -> Result<(), NormalizeError> {
        let output = Command::new(&self.program)
            .arg(source)
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| NormalizeError::conversion(source, format!("cannot run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let skip = stderr.chars().count().saturating_sub(200);
            let tail: String = stderr.chars().skip(skip).collect();
            return Err(NormalizeError::conversion(
                source,
                format!("{} exited with {}: {tail}", self.program, output.status),
            ));
        }
        if !tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Err(NormalizeError::conversion(
                source,
                format!("{} produced no {}", self.program, target.display()),
            ));
        }
        debug!(target = %target.display(), "Converted to EPUB");
        Ok(())
    }
}

/// True when files with this extension are converted.
#[must_use]
pub fn is_convertible(extension: &str) -> bool {
    CONVERTIBLE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}
