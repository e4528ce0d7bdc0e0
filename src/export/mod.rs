//! Composite export task: download → export → quota check
//!
//! A [`CompositeExportTask`] turns an asset reference into an exported file
//! that is known to fit the account's upload quota. It runs three stages
//! strictly one after another on a single driver task:
//!
//! 1. Download - obtain a local [`ExportSession`](crate::types::ExportSession)
//! 2. Export - write the session to a file the task owns
//! 3. Quota check - compute the file's exact size and check it against the quota
//!
//! The task records exactly one [`TaskOutcome`], or none at all if it is
//! cancelled. The exported file is deleted whenever the task does not end in
//! [`TaskOutcome::Exported`].
//!
//! Split into focused submodules:
//! - [`orchestration`] - the driver running the stage sequence
//! - [`progress`] - progress re-delivery onto the driver task
//! - [`exported_file`] - ownership guard for the produced file

mod exported_file;
mod orchestration;
mod progress;


use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::stages::ExportStages;
use crate::types::{AssetId, Event, Stage, TaskId, TaskState, UserContext};

use orchestration::TaskRunner;
pub use progress::ProgressCallback;
use progress::ProgressRelay;

/// Callback fired once when an outcome is recorded (never on cancellation)
pub type CompletionCallback = Box<dyn FnOnce(&TaskOutcome) + Send + Sync>;

/// Terminal result of an export task that was not cancelled
#[derive(Debug)]
pub enum TaskOutcome {
    /// The exported file fits the quota; the caller now owns it
    Exported(std::path::PathBuf),
    /// A stage failed; the error carries the domain it came from
    Failed(Error),
}

impl TaskOutcome {
    /// Path of the exported file, if the task succeeded
    pub fn path(&self) -> Option<&Path> {
        match self {
            TaskOutcome::Exported(path) => Some(path),
            TaskOutcome::Failed(_) => None,
        }
    }

    /// The recorded error, if the task failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            TaskOutcome::Exported(_) => None,
            TaskOutcome::Failed(error) => Some(error),
        }
    }
}

/// State shared between the task handle and its driver
pub(crate) struct TaskShared {
    id: TaskId,
    cancel: CancellationToken,
    started: AtomicBool,
    outcome: OnceLock<TaskOutcome>,
    state: watch::Sender<TaskState>,
}

impl TaskShared {
    /// Publish `Finished` for a cancelled task; emits `Cancelled` only on the first call
    fn finish_cancelled(&self, stage: Option<Stage>, event_tx: &broadcast::Sender<Event>) {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == TaskState::Finished {
                false
            } else {
                *state = TaskState::Finished;
                true
            }
        });
        if transitioned {
            event_tx.send(Event::Cancelled { id: self.id, stage }).ok();
        }
    }
}

#[derive(Default)]
struct TaskCallbacks {
    on_download: Option<ProgressCallback>,
    on_export: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
}

/// Cancellable, progress-reporting export of one asset
///
/// # Example
///
/// ```no_run
/// use clip_upload::export::CompositeExportTask;
/// use clip_upload::stages::{
///     CachedQuotaChecker, ExportStages, FileCopyExporter, MirroredAssetSource,
/// };
/// use clip_upload::{AssetId, TaskId, UserContext};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> clip_upload::Result<()> {
/// let stages = ExportStages::new(
///     Arc::new(MirroredAssetSource::new("/mnt/cloud", "/var/cache/clips")),
///     Arc::new(FileCopyExporter::new("/var/tmp/exports")),
///     Arc::new(CachedQuotaChecker),
/// );
/// let (event_tx, _events) = tokio::sync::broadcast::channel(100);
///
/// let task = CompositeExportTask::new(
///     TaskId(1),
///     AssetId::new("clip-001.mov"),
///     UserContext::new("/users/42"),
///     stages,
///     event_tx,
/// )
/// .on_export_progress(|fraction| println!("export {:.0}%", fraction * 100.0));
///
/// task.start()?;
/// match task.wait().await {
///     Some(outcome) => println!("finished: {:?}", outcome),
///     None => println!("cancelled"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct CompositeExportTask {
    shared: Arc<TaskShared>,
    asset: AssetId,
    user: UserContext,
    stages: ExportStages,
    event_tx: broadcast::Sender<Event>,
    callbacks: Mutex<Option<TaskCallbacks>>,
}

impl CompositeExportTask {
    /// Create a pending task
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier used in events and logs
    /// * `asset` - The asset to export
    /// * `user` - Account the quota is checked against
    /// * `stages` - Stage implementations to run
    /// * `event_tx` - Channel the task's events are published on
    pub fn new(
        id: TaskId,
        asset: AssetId,
        user: UserContext,
        stages: ExportStages,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (state, _) = watch::channel(TaskState::Pending);
        Self {
            shared: Arc::new(TaskShared {
                id,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                outcome: OnceLock::new(),
                state,
            }),
            asset,
            user,
            stages,
            event_tx,
            callbacks: Mutex::new(Some(TaskCallbacks::default())),
        }
    }

    /// Receive download progress fractions while the download stage runs
    pub fn on_download_progress(self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.with_callbacks(|c| c.on_download = Some(Arc::new(callback)))
    }

    /// Receive export progress fractions while the export stage runs
    pub fn on_export_progress(self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.with_callbacks(|c| c.on_export = Some(Arc::new(callback)))
    }

    /// Receive the outcome once it is recorded
    ///
    /// Not called when the task is cancelled.
    pub fn on_complete(self, callback: impl FnOnce(&TaskOutcome) + Send + Sync + 'static) -> Self {
        self.with_callbacks(|c| c.on_complete = Some(Box::new(callback)))
    }

    fn with_callbacks(mut self, apply: impl FnOnce(&mut TaskCallbacks)) -> Self {
        let slot = self
            .callbacks
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(callbacks) = slot.as_mut() {
            apply(callbacks);
        }
        self
    }

    /// Start the task on the current tokio runtime
    ///
    /// Does nothing (and starts no stage) if the task was already cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if called more than once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        if self.shared.cancel.is_cancelled() {
            info!(task_id = self.shared.id.0, "export task cancelled before start");
            self.shared.finish_cancelled(None, &self.event_tx);
            return Ok(());
        }

        let callbacks = match self.callbacks.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
        .unwrap_or_default();

        let runner = TaskRunner {
            shared: self.shared.clone(),
            asset: self.asset.clone(),
            user: self.user.clone(),
            stages: self.stages.clone(),
            event_tx: self.event_tx.clone(),
            relay: ProgressRelay::new(
                self.shared.id,
                self.shared.cancel.clone(),
                self.event_tx.clone(),
                callbacks.on_download,
                callbacks.on_export,
            ),
            on_complete: callbacks.on_complete,
        };
        tokio::spawn(runner.run());
        Ok(())
    }

    /// Request cancellation
    ///
    /// The active stage sees the cancellation through its token; whatever it
    /// returns afterwards is discarded and any exported file is deleted. A
    /// task that was never started finishes immediately. Cancelling a task
    /// that already recorded an outcome has no effect on that outcome.
    pub fn cancel(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        info!(task_id = self.shared.id.0, "cancelling export task");
        self.shared.cancel.cancel();

        if !self.shared.started.load(Ordering::SeqCst) {
            self.shared.finish_cancelled(None, &self.event_tx);
        }
    }

    /// Wait until the task is finished
    ///
    /// Returns the recorded outcome, or `None` if the task was cancelled.
    /// Never resolves for a task that is neither started nor cancelled.
    pub async fn wait(&self) -> Option<&TaskOutcome> {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `shared`, so the channel cannot close while we wait
        let _ = state.wait_for(|s| *s == TaskState::Finished).await;
        self.shared.outcome.get()
    }

    /// Task identifier
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// The asset being exported
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        *self.shared.state.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<TaskState> {
        self.shared.state.subscribe()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// The recorded outcome, if any
    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.shared.outcome.get()
    }
}

impl std::fmt::Debug for CompositeExportTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeExportTask")
            .field("id", &self.shared.id)
            .field("asset", &self.asset)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
