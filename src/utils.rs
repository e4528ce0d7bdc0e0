//! Utility functions for file sizes, export paths and cleanup

use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Exact size in bytes of a regular file
///
/// Returns `Ok(None)` when the path exists but is not a regular file, so callers
/// can tell "metadata could not be read" apart from "metadata has no usable size".
///
/// # Examples
///
/// ```
/// # #[tokio::main]
/// # async fn main() -> std::io::Result<()> {
/// use clip_upload::utils::exact_file_size;
///
/// let dir = std::env::temp_dir();
/// assert_eq!(exact_file_size(&dir).await?, None);
/// # Ok(())
/// # }
/// ```
pub async fn exact_file_size(path: &Path) -> std::io::Result<Option<u64>> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_file() {
        Ok(Some(metadata.len()))
    } else {
        Ok(None)
    }
}

/// Remove a file, treating "already gone" as success
///
/// Returns `true` if a file was actually removed.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Turn an asset identifier into something safe to use as a file stem
///
/// Path separators and other characters that are awkward in file names are
/// replaced with `_`; an empty result becomes `"asset"`.
///
/// # Examples
///
/// ```
/// use clip_upload::utils::sanitize_file_stem;
///
/// assert_eq!(sanitize_file_stem("ABC/L0/001"), "ABC_L0_001");
/// assert_eq!(sanitize_file_stem(""), "asset");
/// ```
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.').to_string();
    if stem.is_empty() {
        "asset".to_string()
    } else {
        stem
    }
}

/// First free path of the form `stem.ext`, `stem (1).ext`, `stem (2).ext`, ...
///
/// Returns `None` if every candidate up to the attempt limit is taken.
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> Option<PathBuf> {
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return Some(candidate);
    }

    (1..=MAX_RENAME_ATTEMPTS)
        .map(|i| dir.join(format!("{} ({}).{}", stem, i, extension)))
        .find(|path| !path.exists())
}
