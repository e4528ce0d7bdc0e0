//! Download stage backed by a remote mirror directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::copy::copy_with_progress;
use super::traits::{ExportSessionProvider, ProgressReporter};
use crate::error::StageError;
use crate::types::{AssetId, ExportSession};
use crate::utils::{remove_file_if_exists, sanitize_file_stem};

/// Suffix counter keeping partial download files unique within the process
static NEXT_PARTIAL: AtomicU64 = AtomicU64::new(0);

/// Export session provider for assets that may live only in remote storage
///
/// Assets are looked up by their sanitized identifier. If the asset is already
/// present under `local_root` the session is created immediately; otherwise it
/// is copied from `remote_root` (a mounted cloud drive, network share, etc.)
/// into `local_root` first, reporting download progress per chunk.
///
/// # Examples
///
/// ```no_run
/// use clip_upload::stages::{ExportSessionProvider, MirroredAssetSource, ProgressReporter};
/// use clip_upload::AssetId;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MirroredAssetSource::new("/mnt/cloud/library", "/var/cache/library");
/// let session = source
///     .request_export_session(
///         &AssetId::new("clip-001.mov"),
///         ProgressReporter::disconnected(),
///         CancellationToken::new(),
///     )
///     .await?;
/// println!("exporting from {:?}", session.source_path);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MirroredAssetSource {
    remote_root: PathBuf,
    local_root: PathBuf,
    chunk_size: usize,
}

impl MirroredAssetSource {
    /// Create a source mirroring `remote_root` into `local_root`
    pub fn new(remote_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            remote_root: remote_root.into(),
            local_root: local_root.into(),
            chunk_size: 1024 * 1024,
        }
    }

    /// Override the download chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Where the local copy of `asset` lives (whether or not it exists yet)
    pub fn local_path(&self, asset: &AssetId) -> PathBuf {
        self.local_root.join(sanitize_file_stem(asset.as_str()))
    }

    async fn download(
        &self,
        asset: &AssetId,
        remote: &Path,
        local: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        tokio::fs::create_dir_all(&self.local_root).await?;

        // Concurrent downloads of one asset each write their own partial file;
        // the rename that lands last wins and every copy is complete
        let partial = self.local_root.join(format!(
            "{}.{}-{}.part",
            sanitize_file_stem(asset.as_str()),
            std::process::id(),
            NEXT_PARTIAL.fetch_add(1, Ordering::Relaxed)
        ));

        let bytes = copy_with_progress(remote, &partial, self.chunk_size, progress, cancel).await?;
        if let Err(e) = tokio::fs::rename(&partial, local).await {
            remove_file_if_exists(&partial).await.ok();
            // Platforms that refuse to replace an existing file: another
            // download of the same asset finished first
            if is_regular_file(local).await {
                debug!(%asset, ?local, error = %e, "asset cached by a concurrent download");
                return Ok(());
            }
            return Err(e.into());
        }

        info!(%asset, bytes, ?local, "asset downloaded from remote storage");
        Ok(())
    }
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl ExportSessionProvider for MirroredAssetSource {
    async fn request_export_session(
        &self,
        asset: &AssetId,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<ExportSession, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let local = self.local_path(asset);
        if is_regular_file(&local).await {
            debug!(%asset, ?local, "asset already available locally");
            progress.report(1.0);
            return Ok(ExportSession {
                asset: asset.clone(),
                source_path: local,
                downloaded: false,
            });
        }

        let remote = self.remote_root.join(sanitize_file_stem(asset.as_str()));
        match tokio::fs::metadata(&remote).await {
            Ok(m) if m.is_file() => {}
            _ => return Err(StageError::AssetNotFound(asset.to_string())),
        }

        debug!(%asset, ?remote, "downloading asset from remote storage");
        self.download(asset, &remote, &local, &progress, &cancel)
            .await?;

        Ok(ExportSession {
            asset: asset.clone(),
            source_path: local,
            downloaded: true,
        })
    }

    fn name(&self) -> &'static str {
        "mirrored"
    }
}
