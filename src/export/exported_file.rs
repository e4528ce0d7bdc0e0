//! Ownership guard for the file produced by the export stage

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::utils::remove_file_if_exists;

/// An exported file still owned by the export task
///
/// The file is deleted unless ownership is handed out with [`keep`](Self::keep).
/// [`discard`](Self::discard) deletes it asynchronously; dropping an armed guard
/// (e.g. while unwinding) deletes it synchronously.
#[derive(Debug)]
pub(super) struct ExportedFile {
    path: PathBuf,
    armed: bool,
}

impl ExportedFile {
    pub(super) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// Transfer ownership of the file to the caller
    pub(super) fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Delete the file; returns the path if something was removed
    pub(super) async fn discard(mut self) -> std::io::Result<Option<PathBuf>> {
        let removed = remove_file_if_exists(&self.path).await?;
        self.armed = false;
        if removed {
            Ok(Some(std::mem::take(&mut self.path)))
        } else {
            Ok(None)
        }
    }
}

impl Drop for ExportedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "failed to remove exported file"),
        }
    }
}
