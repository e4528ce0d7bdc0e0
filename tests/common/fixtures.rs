//! Test fixtures: temporary directory layouts, assets and pipelines

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use clip_upload::{Config, UploadPipeline, UploadQuota, UserContext};

/// Size of the clip used by the quota scenarios
pub const TEN_MB: u64 = 10 * 1024 * 1024;

/// API base URL used by every test pipeline
pub const TEST_BASE_URL: &str = "https://api.example.com";

/// Temporary remote mirror, local cache and export directory
pub struct Workspace {
    _root: TempDir,
    /// Simulated remote storage
    pub remote: PathBuf,
    /// Local cache the download stage fills
    pub local: PathBuf,
    /// Directory exported files are written to
    pub export: PathBuf,
}

impl Workspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let remote = root.path().join("remote");
        let local = root.path().join("local");
        let export = root.path().join("exports");
        std::fs::create_dir_all(&remote).expect("Failed to create remote dir");
        Self {
            _root: root,
            remote,
            local,
            export,
        }
    }

    /// Place an asset of `size` bytes in remote storage only
    pub fn remote_asset(&self, name: &str, size: u64) -> PathBuf {
        write_file(&self.remote.join(name), size)
    }

    /// Place an asset of `size` bytes in the local cache
    pub fn local_asset(&self, name: &str, size: u64) -> PathBuf {
        std::fs::create_dir_all(&self.local).expect("Failed to create local dir");
        write_file(&self.local.join(name), size)
    }

    /// Config pointing the export directory into this workspace
    pub fn config(&self, chunk_size: usize) -> Config {
        let mut config = Config::new(TEST_BASE_URL);
        config.export.export_dir = self.export.clone();
        config.export.chunk_size = chunk_size;
        config
    }

    /// Pipeline backed by the filesystem stages of this workspace
    pub async fn pipeline(&self, chunk_size: usize) -> UploadPipeline {
        UploadPipeline::with_filesystem_stages(self.config(chunk_size), &self.remote, &self.local)
            .await
            .expect("Failed to create pipeline")
    }

    /// Files currently present in the export directory
    pub fn exported_files(&self) -> Vec<PathBuf> {
        list_files(&self.export)
    }

    /// Files currently present in the local cache
    pub fn cached_files(&self) -> Vec<PathBuf> {
        list_files(&self.local)
    }
}

/// Write a file of `size` bytes with a repeating byte pattern
pub fn write_file(path: &Path, size: u64) -> PathBuf {
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(path, data).expect("Failed to write fixture file");
    path.to_path_buf()
}

/// User whose cached quota leaves `free_bytes` available until next week
pub fn user_with_free_bytes(free_bytes: u64) -> UserContext {
    UserContext::new("/users/42").with_quota(UploadQuota {
        free_bytes,
        max_bytes: 5 * TEN_MB,
        resets_at: Some(chrono::Utc::now() + chrono::Duration::days(7)),
    })
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    }
}
