//! Upload pipeline facade
//!
//! [`UploadPipeline`] owns the configuration, the event channel and the stage
//! implementations, and hands out export tasks and thumbnail request builders
//! that share them.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::CompositeExportTask;
use crate::requests::ThumbnailRequests;
use crate::stages::{CachedQuotaChecker, ExportStages, FileCopyExporter, MirroredAssetSource};
use crate::types::{AssetId, Event, TaskId, UserContext};

/// Entry point for exporting assets and building thumbnail requests
///
/// # Example
///
/// ```no_run
/// use clip_upload::{AssetId, Config, UploadPipeline, UserContext};
///
/// # #[tokio::main]
/// # async fn main() -> clip_upload::Result<()> {
/// let pipeline = UploadPipeline::with_filesystem_stages(
///     Config::new("https://api.example.com"),
///     "/mnt/cloud",
///     "/var/cache/clips",
/// )
/// .await?;
///
/// let mut events = pipeline.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("event: {:?}", event);
///     }
/// });
///
/// let task = pipeline.create_export_task(AssetId::new("clip-001.mov"), UserContext::new("/users/42"));
/// task.start()?;
/// task.wait().await;
/// # Ok(())
/// # }
/// ```
pub struct UploadPipeline {
    config: Arc<Config>,
    stages: ExportStages,
    thumbnails: ThumbnailRequests,
    event_tx: broadcast::Sender<Event>,
    next_task_id: AtomicU64,
}

impl UploadPipeline {
    /// Create a pipeline running the given stages
    ///
    /// Validates the configuration and makes sure the export directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings and [`Error::Io`] if the
    /// export directory cannot be created.
    pub async fn new(config: Config, stages: ExportStages) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.export.export_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create export directory '{}': {}",
                        config.export.export_dir.display(),
                        e
                    ),
                ))
            })?;

        let thumbnails = ThumbnailRequests::new(&config.api)?;
        let (event_tx, _rx) = broadcast::channel(config.export.event_channel_capacity);

        info!(
            base_url = %config.api.base_url,
            export_dir = ?config.export.export_dir,
            stages = ?stages,
            "upload pipeline ready"
        );

        Ok(Self {
            config: Arc::new(config),
            stages,
            thumbnails,
            event_tx,
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Create a pipeline backed by the filesystem stages
    ///
    /// Assets are mirrored from `remote_root` into `local_root`, exported into
    /// the configured export directory, and checked against the quota cached
    /// on each task's [`UserContext`].
    pub async fn with_filesystem_stages(
        config: Config,
        remote_root: impl Into<PathBuf>,
        local_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let chunk_size = config.export.chunk_size;
        let stages = ExportStages::new(
            Arc::new(MirroredAssetSource::new(remote_root, local_root).with_chunk_size(chunk_size)),
            Arc::new(FileCopyExporter::from_config(&config.export)),
            Arc::new(CachedQuotaChecker),
        );
        Self::new(config, stages).await
    }

    /// Subscribe to events of every task created by this pipeline
    ///
    /// Subscribers only see events sent after they subscribed; slow
    /// subscribers may observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Create a pending export task for `asset`, checked against `user`'s quota
    ///
    /// The task does nothing until [`CompositeExportTask::start`] is called.
    pub fn create_export_task(&self, asset: AssetId, user: UserContext) -> CompositeExportTask {
        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        debug!(task_id = id.0, %asset, user_id = %user.user_id, "creating export task");
        CompositeExportTask::new(id, asset, user, self.stages.clone(), self.event_tx.clone())
    }

    /// Thumbnail request builders for the configured API
    pub fn thumbnails(&self) -> &ThumbnailRequests {
        &self.thumbnails
    }

    /// The stages export tasks run with
    pub fn stages(&self) -> &ExportStages {
        &self.stages
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

impl std::fmt::Debug for UploadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("base_url", &self.config.api.base_url)
            .field("stages", &self.stages)
            .field("subscribers", &self.event_tx.receiver_count())
            .finish_non_exhaustive()
    }
}
