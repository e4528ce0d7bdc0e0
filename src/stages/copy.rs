//! Chunked file copy shared by the filesystem stages

use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::ProgressReporter;
use crate::error::StageError;
use crate::utils::remove_file_if_exists;

/// Copy `source` to a new file at `dest`, one chunk at a time
///
/// Cancellation is checked before every chunk; progress is reported after
/// every chunk. `dest` must not exist yet. On any failure, including
/// cancellation, the partially written `dest` is removed.
pub(crate) async fn copy_with_progress(
    source: &Path,
    dest: &Path,
    chunk_size: usize,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64, StageError> {
    let writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await?;
    copy_into(source, writer, dest, chunk_size, progress, cancel).await
}

/// Copy `source` into `writer`, a freshly created file at `dest`
///
/// Same progress and cancellation behavior as [`copy_with_progress`]; `dest`
/// is removed on any failure.
pub(crate) async fn copy_into(
    source: &Path,
    mut writer: File,
    dest: &Path,
    chunk_size: usize,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64, StageError> {
    let result = copy_from(source, &mut writer, chunk_size.max(1), progress, cancel).await;
    drop(writer);

    if result.is_err() {
        if let Err(e) = remove_file_if_exists(dest).await {
            warn!(?dest, error = %e, "failed to remove partial copy");
        }
    }

    result
}

async fn copy_from(
    source: &Path,
    writer: &mut File,
    chunk_size: usize,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64, StageError> {
    let mut reader = File::open(source).await?;
    let total = reader.metadata().await?.len();
    copy_chunks(&mut reader, writer, total, chunk_size, progress, cancel).await
}

async fn copy_chunks(
    reader: &mut File,
    writer: &mut File,
    total: u64,
    chunk_size: usize,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<u64, StageError> {
    let mut buf = vec![0u8; chunk_size];
    let mut copied: u64 = 0;
    progress.report(0.0);

    loop {
        if cancel.is_cancelled() {
            debug!(copied, total, "copy cancelled");
            return Err(StageError::Cancelled);
        }

        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;

        if total > 0 {
            progress.report((copied as f64 / total as f64).min(1.0));
        }
    }

    writer.flush().await?;
    if total == 0 {
        progress.report(1.0);
    }

    Ok(copied)
}
