//! End-to-end tests for the export pipeline on the filesystem stages
//!
//! These tests run the full download → export → quota check sequence against
//! real files in temporary directories:
//! - 10 MB clips that fit or exceed the cached weekly quota
//! - Cancellation before start and in the middle of a download
//! - Ordering and scoping of published events

mod common;

use async_trait::async_trait;
use clip_upload::stages::{
    CachedQuotaChecker, ExportStages, FileCopyExporter, MirroredAssetSource, QuotaChecker,
};
use clip_upload::{
    AssetId, Error, ErrorDomain, Event, Stage, StageError, TaskOutcome, TaskState, UploadPipeline,
    UserContext,
};
use common::{
    TEN_MB, Workspace, assert_exported, assert_no_files, drain_events, finish, user_with_free_bytes,
    wait_for_event,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Quota checker with a fixed answer that records the size it was asked about
struct FixedQuota {
    fits: bool,
    asked: AtomicU64,
}

#[async_trait]
impl QuotaChecker for FixedQuota {
    async fn can_upload(&self, _user: &UserContext, size_bytes: u64) -> Result<bool, StageError> {
        self.asked.store(size_bytes, Ordering::SeqCst);
        Ok(self.fits)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

async fn pipeline_with_quota(ws: &Workspace, quota: Arc<FixedQuota>) -> UploadPipeline {
    let config = ws.config(256 * 1024);
    let stages = ExportStages::new(
        Arc::new(MirroredAssetSource::new(&ws.remote, &ws.local).with_chunk_size(256 * 1024)),
        Arc::new(FileCopyExporter::from_config(&config.export)),
        quota,
    );
    UploadPipeline::new(config, stages)
        .await
        .expect("Failed to create pipeline")
}

// -----------------------------------------------------------------------
// Quota scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn ten_mb_clip_within_quota_is_exported() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", TEN_MB);
    let quota = Arc::new(FixedQuota {
        fits: true,
        asked: AtomicU64::new(0),
    });
    let pipeline = pipeline_with_quota(&ws, quota.clone()).await;

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();

    let path = assert_exported(finish(&task).await, TEN_MB);
    assert!(path.starts_with(&ws.export));
    assert_eq!(quota.asked.load(Ordering::SeqCst), TEN_MB);
    assert_eq!(task.state(), TaskState::Finished);
}

#[tokio::test]
async fn ten_mb_clip_over_quota_fails_and_is_deleted() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", TEN_MB);
    let quota = Arc::new(FixedQuota {
        fits: false,
        asked: AtomicU64::new(0),
    });
    let pipeline = pipeline_with_quota(&ws, quota).await;
    let mut events = pipeline.subscribe();

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();

    match finish(&task).await {
        Some(TaskOutcome::Failed(err)) => {
            assert!(matches!(err, Error::QuotaExceeded { size_bytes } if *size_bytes == TEN_MB));
            assert!(err.to_string().contains("would exceed weekly quota"));
        }
        other => panic!("expected quota failure, got {other:?}"),
    }
    assert_no_files(&ws.exported_files());

    let events = drain_events(&mut events, task.id());
    assert!(events.iter().any(|e| matches!(e, Event::FileDiscarded { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Failed {
            stage: Stage::QuotaCheck,
            domain: ErrorDomain::QuotaExceeded,
            ..
        }
    )));
}

#[tokio::test]
async fn cached_quota_rejects_clip_larger_than_free_bytes() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", TEN_MB);
    let pipeline = ws.pipeline(256 * 1024).await;

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), user_with_free_bytes(TEN_MB - 1));
    task.start().unwrap();

    let err = finish(&task).await.and_then(TaskOutcome::error).expect("expected failure");
    assert_eq!(err.domain(), ErrorDomain::QuotaExceeded);
    assert_no_files(&ws.exported_files());
}

#[tokio::test]
async fn cached_quota_accepts_clip_of_exactly_free_bytes() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", TEN_MB);
    let pipeline = ws.pipeline(256 * 1024).await;

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), user_with_free_bytes(TEN_MB));
    task.start().unwrap();

    assert_exported(finish(&task).await, TEN_MB);
}

#[tokio::test]
async fn missing_asset_fails_in_download_stage() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline(1024).await;

    let task = pipeline.create_export_task(AssetId::new("nowhere.mov"), UserContext::new("/users/42"));
    task.start().unwrap();

    let err = finish(&task).await.and_then(TaskOutcome::error).expect("expected failure");
    assert!(matches!(err, Error::CreateExportSession(StageError::AssetNotFound(_))));
    assert_no_files(&ws.exported_files());
}

#[tokio::test]
async fn locally_cached_asset_is_not_downloaded_again() {
    let ws = Workspace::new();
    ws.local_asset("clip.mov", 4096);
    let pipeline = ws.pipeline(1024).await;
    let mut events = pipeline.subscribe();

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();
    assert_exported(finish(&task).await, 4096);

    let download_progress: Vec<f64> = drain_events(&mut events, task.id())
        .into_iter()
        .filter_map(|e| match e {
            Event::DownloadProgress { fraction, .. } => Some(fraction),
            _ => None,
        })
        .collect();
    assert_eq!(download_progress, vec![1.0]);
}

// -----------------------------------------------------------------------
// Cancellation
// -----------------------------------------------------------------------

#[tokio::test]
async fn cancel_before_start_never_runs_a_stage() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", 4096);
    let pipeline = ws.pipeline(1024).await;
    let mut events = pipeline.subscribe();

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.cancel();
    task.start().unwrap();

    assert!(finish(&task).await.is_none());
    assert!(task.outcome().is_none());
    assert_no_files(&ws.cached_files());
    assert_no_files(&ws.exported_files());

    let events = drain_events(&mut events, task.id());
    assert!(!events.iter().any(|e| matches!(e, Event::StageStarted { .. })));
    assert!(matches!(events.as_slice(), [Event::Cancelled { stage: None, .. }]));
}

#[tokio::test]
async fn cancel_during_download_leaves_no_files() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", TEN_MB);
    // Tiny chunks keep the download running long enough to cancel it
    let pipeline = ws.pipeline(64).await;
    let mut events = pipeline.subscribe();

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();

    let first_progress = wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e, Event::DownloadProgress { fraction, .. } if *fraction > 0.0)
    })
    .await;
    assert!(first_progress.is_some(), "download never reported progress");
    task.cancel();

    assert!(finish(&task).await.is_none());
    assert_no_files(&ws.cached_files());
    assert_no_files(&ws.exported_files());

    let cancelled = wait_for_event(&mut events, Duration::from_secs(5), |e| {
        matches!(e, Event::Cancelled { .. })
    })
    .await;
    assert!(matches!(
        cancelled,
        Some(Event::Cancelled {
            stage: Some(Stage::Download),
            ..
        })
    ));
}

// -----------------------------------------------------------------------
// Events
// -----------------------------------------------------------------------

#[tokio::test]
async fn events_follow_stage_order() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", 64 * 1024);
    let pipeline = ws.pipeline(8 * 1024).await;
    let mut events = pipeline.subscribe();

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();
    assert_exported(finish(&task).await, 64 * 1024);

    let events = drain_events(&mut events, task.id());
    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            Event::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![Stage::Download, Stage::Export, Stage::QuotaCheck]);

    let last_download = events
        .iter()
        .rposition(|e| matches!(e, Event::DownloadProgress { .. }))
        .unwrap();
    let export_started = events
        .iter()
        .position(|e| matches!(e, Event::StageStarted { stage: Stage::Export, .. }))
        .unwrap();
    assert!(last_download < export_started, "download progress leaked into export stage");

    let exports: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            Event::ExportProgress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert!(exports.windows(2).all(|w| w[0] <= w[1]), "export progress regressed: {exports:?}");
    assert_eq!(exports.last().copied(), Some(1.0));

    assert!(matches!(events.last(), Some(Event::Exported { size_bytes, .. }) if *size_bytes == 64 * 1024));
}

#[tokio::test]
async fn concurrent_tasks_export_independently() {
    let ws = Workspace::new();
    for name in ["a.mov", "b.mov", "c.mov"] {
        ws.remote_asset(name, 32 * 1024);
    }
    let pipeline = ws.pipeline(4 * 1024).await;

    let tasks: Vec<_> = ["a.mov", "b.mov", "c.mov"]
        .into_iter()
        .map(|name| pipeline.create_export_task(AssetId::new(name), UserContext::new("/users/42")))
        .collect();
    for task in &tasks {
        task.start().unwrap();
    }

    for task in &tasks {
        assert_exported(finish(task).await, 32 * 1024);
    }
    assert_eq!(ws.exported_files().len(), 3);
}

#[tokio::test]
async fn concurrent_tasks_on_one_asset_both_export() {
    let ws = Workspace::new();
    let size = 4 * 1024 * 1024;
    ws.remote_asset("clip.mov", size);
    let pipeline = ws.pipeline(512).await;

    let first = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    let second = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    first.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    second.start().unwrap();

    let first_path = assert_exported(finish(&first).await, size).to_path_buf();
    let second_path = assert_exported(finish(&second).await, size).to_path_buf();
    assert_ne!(first_path, second_path);

    let cached = ws.cached_files();
    assert_eq!(cached.len(), 1, "expected only the cached asset, found {cached:?}");
    assert_eq!(std::fs::metadata(&cached[0]).unwrap().len(), size);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let ws = Workspace::new();
    ws.remote_asset("clip.mov", 1024);
    let pipeline = ws.pipeline(1024).await;

    let task = pipeline.create_export_task(AssetId::new("clip.mov"), UserContext::new("/users/42"));
    task.start().unwrap();
    assert!(matches!(task.start(), Err(Error::AlreadyStarted)));

    assert_exported(finish(&task).await, 1024);
}

#[tokio::test]
async fn cached_quota_checker_is_the_default_filesystem_quota() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline(1024).await;
    assert_eq!(pipeline.stages().quota.name(), CachedQuotaChecker.name());
}
