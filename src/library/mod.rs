//! Turns a finished download into a library file.
//!
//! The download is renamed to the book title, converted to EPUB when it is a
//! Kindle format, and moved into the books directory. A failed conversion is
//! not fatal: the original is moved over unmodified.

mod convert;
mod error;

pub use convert::{CONVERTIBLE_EXTENSIONS, Converter, DEFAULT_CONVERTER, EbookConvert, is_convertible};
pub use error::NormalizeError;

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

/// Longest stem produced by [`sanitize_file_stem`], in characters.
const MAX_STEM_CHARS: usize = 120;

/// Stem used when a title sanitizes to nothing.
const FALLBACK_STEM: &str = "book";

/// Makes a title safe to use as a file name stem.
///
/// Path separators become `-`, other reserved and control characters are
/// dropped, whitespace runs collapse to one space, and leading/trailing dots
/// and spaces are trimmed.
#[must_use]
pub fn sanitize_file_stem(title: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in title.chars() {
        let mapped = match ch {
            '/' | '\\' => Some('-'),
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_whitespace() => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        };
        match mapped {
            Some(' ') => {
                if !prev_space {
                    out.push(' ');
                    prev_space = true;
                }
            }
            Some(c) => {
                out.push(c);
                prev_space = false;
            }
            None => {}
        }
    }

    let truncated: String = out
        .trim_matches(|c: char| c == ' ' || c == '.')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    let trimmed = truncated.trim_end_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Renames `path` to `<stem>.<ext>` in the same directory.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the path has no file name or the rename fails.
pub async fn rename_file(path: &Path, stem: &str) -> Result<PathBuf, NormalizeError> {
    let dir = path.parent().ok_or_else(|| NormalizeError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    let file_name = match lowercase_extension(path) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    };
    let target = dir.join(file_name);
    if target != path {
        tokio::fs::rename(path, &target)
            .await
            .map_err(|e| NormalizeError::io(path, e))?;
    }
    Ok(target)
}

/// Moves `path` into `dir`, keeping its file name.
///
/// Falls back to copy-and-delete when a rename cannot cross file systems.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the directory cannot be created or the file
/// cannot be moved.
pub async fn move_file(path: &Path, dir: &Path) -> Result<PathBuf, NormalizeError> {
    let file_name = path.file_name().ok_or_else(|| NormalizeError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| NormalizeError::io(dir, e))?;
    let target = dir.join(file_name);

    if tokio::fs::rename(path, &target).await.is_err() {
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| NormalizeError::io(&target, e))?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| NormalizeError::io(path, e))?;
    }
    Ok(target)
}

/// Renames, converts if needed, and files `downloaded` into `books_dir`.
///
/// Returns the final path in `books_dir`.
///
/// # Errors
///
/// Returns [`NormalizeError`] for file system failures. A failed conversion
/// is logged and the original file is moved instead.
#[instrument(skip(converter), fields(file = %downloaded.display()))]
pub async fn normalize_file(
    downloaded: &Path,
    books_dir: &Path,
    stem: &str,
    converter: &dyn Converter,
) -> Result<PathBuf, NormalizeError> {
    let renamed = rename_file(downloaded, stem).await?;
    let extension = lowercase_extension(&renamed).unwrap_or_default();

    if extension != "epub" && is_convertible(&extension) {
        tokio::fs::create_dir_all(books_dir)
            .await
            .map_err(|e| NormalizeError::io(books_dir, e))?;
        let target = books_dir.join(format!("{stem}.epub"));
        match converter.convert(&renamed, &target).await {
            Ok(()) => {
                tokio::fs::remove_file(&renamed)
                    .await
                    .map_err(|e| NormalizeError::io(&renamed, e))?;
                info!(target = %target.display(), "Converted and stored");
                return Ok(target);
            }
            Err(error) => {
                warn!(error = %error, "Conversion failed; storing original format");
            }
        }
    }

    let stored = move_file(&renamed, books_dir).await?;
    info!(target = %stored.display(), "Stored");
    Ok(stored)
}
