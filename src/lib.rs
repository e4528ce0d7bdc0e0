//! # clip-upload
//!
//! Backend library for uploading video clips and their thumbnails to a
//! video hosting API.
//!
//! ## Design Philosophy
//!
//! clip-upload is designed to be:
//! - **Pluggable** - Download, export and quota checks are trait seams
//! - **Cancellable** - Every export task can be stopped at any stage, and never
//!   leaves an exported file behind unless it succeeded
//! - **Library-first** - Requests are built, not sent; the transport is yours
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use clip_upload::{AssetId, Config, TaskOutcome, UploadPipeline, UserContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new("https://api.example.com");
//!     config.export.export_dir = "/var/tmp/clip-exports".into();
//!
//!     let pipeline =
//!         UploadPipeline::with_filesystem_stages(config, "/mnt/cloud", "/var/cache/clips").await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let task = pipeline
//!         .create_export_task(AssetId::new("clip-001.mov"), UserContext::new("/users/42"))
//!         .on_export_progress(|fraction| println!("export {:.0}%", fraction * 100.0));
//!     task.start()?;
//!
//!     if let Some(TaskOutcome::Exported(path)) = task.wait().await {
//!         let upload = pipeline
//!             .thumbnails()
//!             .upload_thumbnail(&path.with_extension("jpg"), "https://upload.example.com/t/1")
//!             .await?;
//!         println!("PUT {} ({} bytes)", upload.request.url(), upload.size_bytes);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Composite export task (download, export, quota check)
pub mod export;
/// Pipeline facade tying config, stages and events together
pub mod pipeline;
/// Thumbnail request builders
pub mod requests;
/// Pluggable export stages and their filesystem implementations
pub mod stages;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{ApiConfig, Config, ExportConfig};
pub use error::{Error, ErrorDomain, FileSizeError, RequestError, Result, StageError};
pub use export::{CompositeExportTask, TaskOutcome};
pub use pipeline::UploadPipeline;
pub use requests::{ThumbnailRequests, ThumbnailUpload};
pub use types::{
    AssetId, Event, ExportSession, Stage, TaskId, TaskState, UploadQuota, UserContext,
};
