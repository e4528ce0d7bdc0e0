//! Export stage that writes the session's media into the export directory

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::copy::copy_into;
use super::traits::{AssetExporter, ProgressReporter};
use crate::config::ExportConfig;
use crate::error::StageError;
use crate::types::ExportSession;
use crate::utils::{sanitize_file_stem, unique_path};

/// Exporter that passes media through unchanged
///
/// Suitable when the source is already in an uploadable container, and as a
/// reference for platform transcoders: the output gets a unique name inside
/// the export directory, progress is reported per chunk and partial output is
/// removed on failure or cancellation.
#[derive(Clone, Debug)]
pub struct FileCopyExporter {
    export_dir: PathBuf,
    file_extension: String,
    chunk_size: usize,
}

impl FileCopyExporter {
    /// Create an exporter writing `.mp4` files into `export_dir`
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            file_extension: "mp4".to_string(),
            chunk_size: 1024 * 1024,
        }
    }

    /// Create an exporter from the export section of the config
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            export_dir: config.export_dir.clone(),
            file_extension: config.file_extension.clone(),
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Override the copy chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl FileCopyExporter {
    /// Create the first free `stem (n).ext` file in the export directory
    ///
    /// A name taken between the lookup and the creation is skipped.
    async fn reserve(&self, stem: &str) -> Result<(PathBuf, File), StageError> {
        loop {
            let candidate = unique_path(&self.export_dir, stem, &self.file_extension)
                .ok_or_else(|| {
                    StageError::Other(format!(
                        "no free export file name for {} in {}",
                        stem,
                        self.export_dir.display()
                    ))
                })?;

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(?candidate, "export file name taken concurrently, trying next");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl AssetExporter for FileCopyExporter {
    async fn export(
        &self,
        session: ExportSession,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<PathBuf, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        tokio::fs::create_dir_all(&self.export_dir).await?;

        let stem = session
            .source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(sanitize_file_stem)
            .unwrap_or_else(|| sanitize_file_stem(session.asset.as_str()));
        let (dest, writer) = self.reserve(&stem).await?;

        debug!(asset = %session.asset, source = ?session.source_path, ?dest, "exporting asset");
        let bytes = copy_into(
            &session.source_path,
            writer,
            &dest,
            self.chunk_size,
            &progress,
            &cancel,
        )
        .await?;

        info!(asset = %session.asset, bytes, ?dest, "asset exported");
        Ok(dest)
    }

    fn name(&self) -> &'static str {
        "file_copy"
    }
}
