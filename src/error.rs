//! Error types for clip-upload
//!
//! This module provides the error taxonomy for the library:
//! - A top-level [`Error`] whose variants are tagged with the pipeline domain
//!   that produced them ([`ErrorDomain`])
//! - [`StageError`] for failures reported by the pluggable export stages
//! - [`RequestError`] for failures while building thumbnail requests
//! - [`FileSizeError`] for the two ways exact file size computation can fail
//!
//! Cancellation is deliberately absent from [`Error`]: a cancelled export task
//! finishes without any outcome.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for clip-upload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clip-upload
///
/// Every pipeline failure carries the domain that produced it, and keeps the
/// underlying cause available through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum Error {
    /// Building the "create thumbnail" request failed
    #[error("create thumbnail request failed: {0}")]
    CreateThumbnail(#[source] RequestError),

    /// Building the "activate thumbnail" request failed
    #[error("activate thumbnail request failed: {0}")]
    ActivateThumbnail(#[source] RequestError),

    /// Building the thumbnail binary upload request failed
    #[error("upload thumbnail request failed: {0}")]
    UploadThumbnail(#[source] RequestError),

    /// An upload precondition was not met (e.g. the source file is missing)
    #[error("{message}: {}", path.display())]
    Upload {
        /// Human-readable description of the failed precondition
        message: String,
        /// The file the precondition was checked against
        path: PathBuf,
    },

    /// The download stage could not provide a local export session
    #[error("failed to create export session: {0}")]
    CreateExportSession(#[source] StageError),

    /// The export stage failed to produce a file
    #[error("export failed: {0}")]
    Export(#[source] StageError),

    /// The remote quota check failed
    #[error("quota check failed: {0}")]
    QuotaCheck(#[source] StageError),

    /// Uploading the exported file would exceed the account's quota
    #[error("uploading {size_bytes} bytes would exceed weekly quota")]
    QuotaExceeded {
        /// Exact size of the exported file
        size_bytes: u64,
    },

    /// The exact size of the exported file could not be determined
    #[error("exact filesize calculation failed: {0}")]
    FileSize(#[from] FileSizeError),

    /// `start()` was called on a task that was already started
    #[error("export task already started")]
    AlreadyStarted,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pipeline domain an error originated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    /// Thumbnail creation request
    CreateThumbnail,
    /// Thumbnail activation request
    ActivateThumbnail,
    /// Thumbnail binary upload request
    UploadThumbnail,
    /// Upload preconditions
    Upload,
    /// Download stage
    CreateExportSession,
    /// Export stage
    Export,
    /// Remote quota check
    QuotaCheck,
    /// Quota would be exceeded
    QuotaExceeded,
    /// Exact file size computation
    FileSize,
    /// Errors outside the upload pipeline (config, I/O, task misuse)
    General,
}

impl Error {
    /// The pipeline domain this error is tagged with
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Error::CreateThumbnail(_) => ErrorDomain::CreateThumbnail,
            Error::ActivateThumbnail(_) => ErrorDomain::ActivateThumbnail,
            Error::UploadThumbnail(_) => ErrorDomain::UploadThumbnail,
            Error::Upload { .. } => ErrorDomain::Upload,
            Error::CreateExportSession(_) => ErrorDomain::CreateExportSession,
            Error::Export(_) => ErrorDomain::Export,
            Error::QuotaCheck(_) => ErrorDomain::QuotaCheck,
            Error::QuotaExceeded { .. } => ErrorDomain::QuotaExceeded,
            Error::FileSize(_) => ErrorDomain::FileSize,
            Error::AlreadyStarted | Error::Config { .. } | Error::Io(_) | Error::Serialization(_) => {
                ErrorDomain::General
            }
        }
    }

    /// Machine-readable error code (e.g., "quota_exceeded")
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::CreateThumbnail(_) => "create_thumbnail_failed",
            Error::ActivateThumbnail(_) => "activate_thumbnail_failed",
            Error::UploadThumbnail(_) => "upload_thumbnail_failed",
            Error::Upload { .. } => "upload_precondition_failed",
            Error::CreateExportSession(_) => "create_export_session_failed",
            Error::Export(_) => "export_failed",
            Error::QuotaCheck(_) => "quota_check_failed",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::FileSize(FileSizeError::Io(_)) => "filesize_io_error",
            Error::FileSize(FileSizeError::Unavailable { .. }) => "filesize_unavailable",
            Error::AlreadyStarted => "already_started",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// Failure reported by one of the export stages
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage observed cancellation and stopped early
    #[error("stage cancelled")]
    Cancelled,

    /// The requested asset could not be found
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// I/O error inside the stage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error from a remote stage
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any other stage-specific failure
    #[error("{0}")]
    Other(String),
}

/// Failure while building a thumbnail request
#[derive(Debug, Error)]
pub enum RequestError {
    /// The resource URI was empty
    #[error("resource URI is empty")]
    EmptyUri,

    /// The resource URI could not be resolved against the API base URL
    #[error("invalid resource URI {uri:?}: {source}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },

    /// The resolved URL has no path that segments can be appended to
    #[error("resource URI {uri:?} cannot be used as a base")]
    CannotBeABase {
        /// The offending URI
        uri: String,
    },

    /// A header value could not be encoded
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The request body could not be encoded
    #[error("failed to encode request body: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The source file size could not be computed
    #[error(transparent)]
    FileSize(#[from] FileSizeError),
}

/// Exact file size computation failure
///
/// The two variants fail the pipeline identically; they stay separate so the
/// cause can be diagnosed.
#[derive(Debug, Error)]
pub enum FileSizeError {
    /// Reading the file metadata failed
    #[error("failed to read file metadata: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata was readable but yielded no size (e.g. not a regular file)
    #[error("no size available for {}", path.display())]
    Unavailable {
        /// The file whose size was requested
        path: PathBuf,
    },
}
