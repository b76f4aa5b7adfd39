//! Append-only CSV log of titles that could not be obtained.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// File name of the log inside the logs directory.
pub const NOT_FOUND_FILE_NAME: &str = "not_found_books.csv";

/// Header of the single column.
pub const NOT_FOUND_HEADER: &str = "Book Name";

/// Errors writing the not-found log.
#[derive(Debug, Error)]
pub enum NotFoundLogError {
    /// The log directory or file could not be created or opened.
    #[error("cannot open not-found log {path}: {source}")]
    Io {
        /// The log path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The row could not be written.
    #[error("cannot write to not-found log {path}: {source}")]
    Csv {
        /// The log path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

/// The not-found log at `<logs_dir>/not_found_books.csv`.
#[derive(Debug, Clone)]
pub struct NotFoundLog {
    path: PathBuf,
}

impl NotFoundLog {
    /// A log inside `logs_dir`. Nothing is created until the first record.
    #[must_use]
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: logs_dir.as_ref().join(NOT_FOUND_FILE_NAME),
        }
    }

    /// Path of the CSV file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row for `title`, writing the header first when the file is new.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundLogError`] if the directory, file or row cannot be written.
    pub fn record(&self, title: &str) -> Result<(), NotFoundLogError> {
        let io_err = |source| NotFoundLogError::Io {
            path: self.path.clone(),
            source,
        };
        let csv_err = |source| NotFoundLogError::Csv {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let is_new = std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record([NOT_FOUND_HEADER]).map_err(csv_err)?;
        }
        writer.write_record([title]).map_err(csv_err)?;
        writer
            .flush()
            .map_err(|e| csv_err(csv::Error::from(e)))?;

        info!(title, log = %self.path.display(), "Recorded book as not found");
        Ok(())
    }

    /// Titles recorded so far, in order. A missing log has none.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundLogError`] if an existing log cannot be read.
    pub fn titles(&self) -> Result<Vec<String>, NotFoundLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let csv_err = |source| NotFoundLogError::Csv {
            path: self.path.clone(),
            source,
        };
        let mut reader = csv::Reader::from_path(&self.path).map_err(csv_err)?;
        let mut titles = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            if let Some(title) = record.get(0) {
                titles.push(title.to_string());
            }
        }
        Ok(titles)
    }
}
