//! Traits and types for the pluggable export stages

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StageError;
use crate::types::{AssetId, ExportSession, UserContext};

/// Thread-safe sink for a stage's fractional progress
///
/// Stages may call [`report`](Self::report) from any thread, including plain
/// `std::thread` workers. The export task re-delivers the values on its own
/// driver task, so callbacks never run on the reporting thread.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<f64>>,
}

impl ProgressReporter {
    /// Create a reporter together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that drops every value
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Report a fraction in `[0, 1]`
    ///
    /// Reports made after the receiving side went away are ignored.
    pub fn report(&self, fraction: f64) {
        if let Some(tx) = &self.tx {
            tx.send(fraction).ok();
        }
    }
}

/// Download stage: make an asset available for local export
///
/// Implementations may need to fetch the asset from cloud storage first.
/// They should watch `cancel` and return [`StageError::Cancelled`] once they
/// notice it; finishing the unit of work in flight is acceptable.
#[async_trait]
pub trait ExportSessionProvider: Send + Sync {
    /// Obtain a local export session for `asset`
    ///
    /// # Errors
    ///
    /// Returns an error if the asset does not exist, cannot be downloaded, or
    /// the stage was cancelled.
    async fn request_export_session(
        &self,
        asset: &AssetId,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<ExportSession, StageError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Export stage: transcode/export a session to a file on disk
#[async_trait]
pub trait AssetExporter: Send + Sync {
    /// Export `session` and return the location of the produced file
    ///
    /// The session is consumed. Implementations must not leave partial output
    /// behind when they fail or stop because of cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the export fails or the stage was cancelled.
    async fn export(
        &self,
        session: ExportSession,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<PathBuf, StageError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Remote check of whether an upload fits the account's quota
#[async_trait]
pub trait QuotaChecker: Send + Sync {
    /// `Ok(true)` if uploading `size_bytes` stays within the user's quota
    async fn can_upload(&self, user: &UserContext, size_bytes: u64) -> Result<bool, StageError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Exact file size computation
#[async_trait]
pub trait FileSizer: Send + Sync {
    /// Exact size of the file at `path`
    ///
    /// `Ok(None)` means the size could not be determined even though no I/O
    /// error occurred.
    async fn exact_file_size(&self, path: &Path) -> std::io::Result<Option<u64>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
