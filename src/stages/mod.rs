//! Pluggable stages of the export pipeline
//!
//! The composite export task drives three stages through trait objects:
//!
//! - [`ExportSessionProvider`]: make the asset available locally (download stage)
//! - [`AssetExporter`]: export the local session to a file (export stage)
//! - [`QuotaChecker`] + [`FileSizer`]: size the file and check it against the
//!   account's upload quota (quota stage)
//!
//! Filesystem-backed implementations are provided for each seam:
//!
//! - [`MirroredAssetSource`]: copies assets from a remote mirror on demand
//! - [`FileCopyExporter`]: passes media through into the export directory
//! - [`CachedQuotaChecker`]: decides from the quota cached on the user context
//! - [`FsFileSizer`]: reads exact sizes from file metadata

mod copy;
mod exporter;
mod mirrored;
mod quota;
mod traits;

use std::sync::Arc;

pub use exporter::FileCopyExporter;
pub use mirrored::MirroredAssetSource;
pub use quota::{CachedQuotaChecker, FsFileSizer};
pub use traits::{AssetExporter, ExportSessionProvider, FileSizer, ProgressReporter, QuotaChecker};

/// The set of stage implementations an export task runs with
#[derive(Clone)]
pub struct ExportStages {
    /// Download stage
    pub sessions: Arc<dyn ExportSessionProvider>,
    /// Export stage
    pub exporter: Arc<dyn AssetExporter>,
    /// Remote quota check
    pub quota: Arc<dyn QuotaChecker>,
    /// Exact file size computation
    pub sizer: Arc<dyn FileSizer>,
}

impl ExportStages {
    /// Combine stage implementations, sizing files from filesystem metadata
    pub fn new(
        sessions: Arc<dyn ExportSessionProvider>,
        exporter: Arc<dyn AssetExporter>,
        quota: Arc<dyn QuotaChecker>,
    ) -> Self {
        Self {
            sessions,
            exporter,
            quota,
            sizer: Arc::new(FsFileSizer),
        }
    }

    /// Replace the file sizer
    pub fn with_sizer(mut self, sizer: Arc<dyn FileSizer>) -> Self {
        self.sizer = sizer;
        self
    }
}

impl std::fmt::Debug for ExportStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStages")
            .field("sessions", &self.sessions.name())
            .field("exporter", &self.exporter.name())
            .field("quota", &self.quota.name())
            .field("sizer", &self.sizer.name())
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_names_every_stage() {
        let stages = ExportStages::new(
            Arc::new(MirroredAssetSource::new("/remote", "/local")),
            Arc::new(FileCopyExporter::new("/exports")),
            Arc::new(CachedQuotaChecker),
        );

        let debug = format!("{:?}", stages);

        for name in ["mirrored", "file_copy", "cached", "metadata"] {
            assert!(debug.contains(name), "{name} missing from {debug}");
        }
    }
}
