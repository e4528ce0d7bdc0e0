//! Configuration types for clip-upload

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// API endpoint configuration used by the request builders
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL that relative resource URIs are resolved against
    /// (e.g. "https://api.example.com")
    pub base_url: String,

    /// Optional `Accept` header attached to every built request
    /// (e.g. a versioned vendor media type)
    #[serde(default)]
    pub accept: Option<String>,
}

impl ApiConfig {
    /// Create an API config with the given base URL and no `Accept` override
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            accept: None,
        }
    }
}

/// Export pipeline configuration (directories, copy behavior, events)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory exported files are written to (default: system temp dir + "clip-upload/exports")
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Chunk size in bytes used by the filesystem stages when copying (default: 1 MiB)
    ///
    /// Also the granularity at which those stages observe cancellation and report progress.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// File extension given to exported files (default: "mp4")
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Capacity of the broadcast event channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            chunk_size: default_chunk_size(),
            file_extension: default_file_extension(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

/// Top-level configuration
///
/// # Example
///
/// ```
/// use clip_upload::Config;
///
/// let config = Config::from_json_str(
///     r#"{ "api": { "base_url": "https://api.example.com" }, "export": { "chunk_size": 65536 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.export.chunk_size, 65536);
/// assert_eq!(config.export.file_extension, "mp4");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint settings
    pub api: ApiConfig,

    /// Export pipeline settings
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Create a config for the given API base URL with default export settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig::new(base_url),
            export: ExportConfig::default(),
        }
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot enforce
    pub fn validate(&self) -> Result<()> {
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.cannot_be_a_base() => {
                return Err(Error::Config {
                    message: format!("base URL {} cannot be a base", self.api.base_url),
                    key: Some("api.base_url".to_string()),
                });
            }
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Config {
                    message: format!("invalid base URL {}: {}", self.api.base_url, e),
                    key: Some("api.base_url".to_string()),
                });
            }
        }

        if self.export.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be greater than zero".to_string(),
                key: Some("export.chunk_size".to_string()),
            });
        }

        if self.export.event_channel_capacity == 0 {
            return Err(Error::Config {
                message: "event channel capacity must be greater than zero".to_string(),
                key: Some("export.event_channel_capacity".to_string()),
            });
        }

        if self.export.file_extension.is_empty() || self.export.file_extension.contains('/') {
            return Err(Error::Config {
                message: format!(
                    "invalid exported file extension {:?}",
                    self.export.file_extension
                ),
                key: Some("export.file_extension".to_string()),
            });
        }

        Ok(())
    }
}

fn default_export_dir() -> PathBuf {
    std::env::temp_dir().join("clip-upload").join("exports")
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_file_extension() -> String {
    "mp4".to_string()
}

fn default_event_capacity() -> usize {
    1000
}
