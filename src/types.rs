//! Core types for clip-upload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorDomain;

/// Unique identifier for a composite export task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a media asset, possibly stored only in the cloud
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset reference from its identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Cached upload quota of an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadQuota {
    /// Bytes still available in the current window
    pub free_bytes: u64,
    /// Total bytes allowed per window
    pub max_bytes: u64,
    /// When the current window resets
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
}

/// Account identity carried into the quota check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Account identifier or URI (e.g. "/users/42")
    pub user_id: String,
    /// Last known quota, if the account has one
    #[serde(default)]
    pub upload_quota: Option<UploadQuota>,
}

impl UserContext {
    /// Create a context without cached quota information
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            upload_quota: None,
        }
    }

    /// Attach cached quota information
    pub fn with_quota(mut self, quota: UploadQuota) -> Self {
        self.upload_quota = Some(quota);
        self
    }
}

/// Locally obtainable version of an asset, ready to be exported
///
/// Produced by the download stage and moved into the export stage.
#[derive(Debug, PartialEq, Eq)]
pub struct ExportSession {
    /// The asset this session was created for
    pub asset: AssetId,
    /// Local file the export reads from
    pub source_path: PathBuf,
    /// Whether the asset had to be downloaded to create this session
    pub downloaded: bool,
}

/// Stage of a composite export task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Making the asset available locally
    Download,
    /// Transcoding/exporting to a file
    Export,
    /// Checking the exported size against the upload quota
    QuotaCheck,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Export => "export",
            Stage::QuotaCheck => "quota_check",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a composite export task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not started
    Pending,
    /// A stage is in progress
    Running(Stage),
    /// Terminal: exported, failed or cancelled
    Finished,
}

/// Event emitted during an export task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stage started
    StageStarted {
        /// Task ID
        id: TaskId,
        /// The stage that started
        stage: Stage,
    },

    /// Download progress update
    DownloadProgress {
        /// Task ID
        id: TaskId,
        /// Fraction complete (0.0 to 1.0)
        fraction: f64,
    },

    /// Export progress update
    ExportProgress {
        /// Task ID
        id: TaskId,
        /// Fraction complete (0.0 to 1.0)
        fraction: f64,
    },

    /// Task finished with an exported file that fits the quota
    Exported {
        /// Task ID
        id: TaskId,
        /// Location of the exported file
        path: PathBuf,
        /// Exact size of the exported file
        size_bytes: u64,
    },

    /// Task finished with an error
    Failed {
        /// Task ID
        id: TaskId,
        /// Stage that failed
        stage: Stage,
        /// Domain the error is tagged with
        domain: ErrorDomain,
        /// Error message
        error: String,
    },

    /// Task was cancelled
    Cancelled {
        /// Task ID
        id: TaskId,
        /// Stage that was active when cancellation was observed
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
    },

    /// An exported file was deleted because the task did not succeed
    FileDiscarded {
        /// Task ID
        id: TaskId,
        /// The deleted file
        path: PathBuf,
    },
}
