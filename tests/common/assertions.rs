//! Custom test assertions for integration tests

use std::path::Path;
use std::time::Duration;
use clip_upload::{CompositeExportTask, Event, TaskId, TaskOutcome};
use tokio::sync::broadcast;

/// Upper bound for any single export in these tests
pub const TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for the task to finish, failing the test on timeout
pub async fn finish(task: &CompositeExportTask) -> Option<&TaskOutcome> {
    tokio::time::timeout(TASK_TIMEOUT, task.wait())
        .await
        .expect("export task did not finish in time")
}

/// Wait for the first event matching `predicate`
///
/// Returns `None` on timeout or when the channel closes.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Drain every event already queued for `id`
pub fn drain_events(events: &mut broadcast::Receiver<Event>, id: TaskId) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) if event_task(&event) == id => seen.push(event),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return seen,
        }
    }
}

/// The task an event belongs to
pub fn event_task(event: &Event) -> TaskId {
    match event {
        Event::StageStarted { id, .. }
        | Event::DownloadProgress { id, .. }
        | Event::ExportProgress { id, .. }
        | Event::Exported { id, .. }
        | Event::Failed { id, .. }
        | Event::Cancelled { id, .. }
        | Event::FileDiscarded { id, .. } => *id,
    }
}

/// Assert that the task exported a file of exactly `size` bytes and return its path
pub fn assert_exported<'a>(outcome: Option<&'a TaskOutcome>, size: u64) -> &'a Path {
    match outcome {
        Some(TaskOutcome::Exported(path)) => {
            let len = std::fs::metadata(path)
                .unwrap_or_else(|e| panic!("exported file {} missing: {}", path.display(), e))
                .len();
            assert_eq!(len, size, "exported file has wrong size");
            path
        }
        other => panic!("expected exported outcome, got {:?}", other),
    }
}

/// Assert that a directory holds no files
pub fn assert_no_files(files: &[std::path::PathBuf]) {
    assert!(files.is_empty(), "expected no files, found {:?}", files);
}
