//! Quota stage collaborators: cached-quota checker and filesystem sizer

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use tracing::debug;

use super::traits::{FileSizer, QuotaChecker};
use crate::error::StageError;
use crate::types::UserContext;

/// Quota checker that decides from the quota cached on the [`UserContext`]
///
/// - No quota on the account: every upload fits
/// - Quota window already reset (`resets_at` in the past): the full
///   `max_bytes` is available again
/// - Otherwise: the upload fits if it is no larger than `free_bytes`
#[derive(Clone, Copy, Debug, Default)]
pub struct CachedQuotaChecker;

#[async_trait]
impl QuotaChecker for CachedQuotaChecker {
    async fn can_upload(&self, user: &UserContext, size_bytes: u64) -> Result<bool, StageError> {
        let Some(quota) = &user.upload_quota else {
            debug!(user = %user.user_id, size_bytes, "no upload quota on account");
            return Ok(true);
        };

        let available = match quota.resets_at {
            Some(resets_at) if resets_at <= Utc::now() => quota.max_bytes,
            _ => quota.free_bytes,
        };

        debug!(
            user = %user.user_id,
            size_bytes,
            available,
            "checking upload against cached quota"
        );
        Ok(size_bytes <= available)
    }

    fn name(&self) -> &'static str {
        "cached"
    }
}

/// [`FileSizer`] reading sizes from filesystem metadata
#[derive(Clone, Copy, Debug, Default)]
pub struct FsFileSizer;

#[async_trait]
impl FileSizer for FsFileSizer {
    async fn exact_file_size(&self, path: &Path) -> std::io::Result<Option<u64>> {
        crate::utils::exact_file_size(path).await
    }

    fn name(&self) -> &'static str {
        "metadata"
    }
}
