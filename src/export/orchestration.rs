//! Export task orchestration -- the driver that runs the three stages in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::exported_file::ExportedFile;
use super::progress::ProgressRelay;
use super::{CompletionCallback, TaskOutcome, TaskShared};
use crate::error::{Error, FileSizeError};
use crate::stages::{ExportStages, ProgressReporter};
use crate::types::{AssetId, Event, ExportSession, Stage, TaskState, UserContext};

/// Why the sequence stopped before producing a result
enum Halt {
    Cancelled(Stage),
    Failed { stage: Stage, error: Error },
}

/// Owned state of one running export task
///
/// Lives on the driver task spawned by `start()`. Stages get a progress
/// reporter and a child cancellation token, never a handle back to the runner.
pub(super) struct TaskRunner {
    pub(super) shared: Arc<TaskShared>,
    pub(super) asset: AssetId,
    pub(super) user: UserContext,
    pub(super) stages: ExportStages,
    pub(super) event_tx: broadcast::Sender<Event>,
    pub(super) relay: ProgressRelay,
    pub(super) on_complete: Option<CompletionCallback>,
}

impl TaskRunner {
    /// Run all stages and publish the terminal state
    ///
    /// Phases:
    /// 1. Download: obtain a local export session for the asset
    /// 2. Export: write the session to a file the runner owns
    /// 3. Quota check: size the file and check it against the user's quota
    pub(super) async fn run(mut self) {
        let id = self.shared.id;
        info!(task_id = id.0, asset = %self.asset, "starting export task");

        match self.execute().await {
            Ok((path, size_bytes)) => {
                info!(task_id = id.0, ?path, size_bytes, "export task finished");
                self.event_tx
                    .send(Event::Exported {
                        id,
                        path: path.clone(),
                        size_bytes,
                    })
                    .ok();
                self.record(TaskOutcome::Exported(path));
            }
            Err(Halt::Failed { stage, error }) => {
                error!(task_id = id.0, %stage, error = %error, "export task failed");
                self.event_tx
                    .send(Event::Failed {
                        id,
                        stage,
                        domain: error.domain(),
                        error: error.to_string(),
                    })
                    .ok();
                self.record(TaskOutcome::Failed(error));
            }
            Err(Halt::Cancelled(stage)) => {
                info!(task_id = id.0, %stage, "export task cancelled");
                self.shared.finish_cancelled(Some(stage), &self.event_tx);
            }
        }
    }

    async fn execute(&mut self) -> Result<(PathBuf, u64), Halt> {
        let session = self.download_stage().await?;
        let exported = self.export_stage(session).await?;

        match self.quota_stage(exported.path()).await {
            Ok(size_bytes) => Ok((exported.keep(), size_bytes)),
            Err(halt) => {
                self.discard(exported).await;
                Err(halt)
            }
        }
    }

    async fn download_stage(&mut self) -> Result<ExportSession, Halt> {
        self.enter(Stage::Download)?;

        let (reporter, mut rx) = ProgressReporter::channel();
        let cancel = self.shared.cancel.child_token();
        let pending = self
            .stages
            .sessions
            .request_export_session(&self.asset, reporter, cancel);
        let result = self.relay.drive(Stage::Download, &mut rx, pending).await;

        // A session produced after cancellation is discarded
        self.ensure_active(Stage::Download)?;

        let session = result.map_err(|e| Halt::Failed {
            stage: Stage::Download,
            error: Error::CreateExportSession(e),
        })?;
        debug!(
            task_id = self.shared.id.0,
            source = ?session.source_path,
            downloaded = session.downloaded,
            "export session ready"
        );
        Ok(session)
    }

    async fn export_stage(&mut self, session: ExportSession) -> Result<ExportedFile, Halt> {
        self.enter(Stage::Export)?;

        let (reporter, mut rx) = ProgressReporter::channel();
        let cancel = self.shared.cancel.child_token();
        let pending = self.stages.exporter.export(session, reporter, cancel);
        let result = self
            .relay
            .drive(Stage::Export, &mut rx, pending)
            .await
            .map(ExportedFile::new);

        if self.shared.cancel.is_cancelled() {
            if let Ok(file) = result {
                self.discard(file).await;
            }
            return Err(Halt::Cancelled(Stage::Export));
        }

        result.map_err(|e| Halt::Failed {
            stage: Stage::Export,
            error: Error::Export(e),
        })
    }

    /// Size the exported file and check the quota; returns the exact size
    ///
    /// Neither call supports cooperative cancellation, so both are raced
    /// against the task's token and abandoned on cancel.
    async fn quota_stage(&mut self, path: &Path) -> Result<u64, Halt> {
        self.enter(Stage::QuotaCheck)?;
        let cancel = self.shared.cancel.clone();

        let size = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Cancelled(Stage::QuotaCheck)),
            size = self.stages.sizer.exact_file_size(path) => size,
        };
        self.ensure_active(Stage::QuotaCheck)?;

        let size_bytes = match size {
            Ok(Some(size_bytes)) => size_bytes,
            Ok(None) => {
                return Err(Halt::Failed {
                    stage: Stage::QuotaCheck,
                    error: Error::FileSize(FileSizeError::Unavailable {
                        path: path.to_path_buf(),
                    }),
                });
            }
            Err(e) => {
                return Err(Halt::Failed {
                    stage: Stage::QuotaCheck,
                    error: Error::FileSize(FileSizeError::Io(e)),
                });
            }
        };

        debug!(
            task_id = self.shared.id.0,
            size_bytes,
            quota = self.stages.quota.name(),
            "checking quota"
        );
        let fits = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Cancelled(Stage::QuotaCheck)),
            fits = self.stages.quota.can_upload(&self.user, size_bytes) => fits,
        };
        self.ensure_active(Stage::QuotaCheck)?;

        match fits {
            Ok(true) => Ok(size_bytes),
            Ok(false) => Err(Halt::Failed {
                stage: Stage::QuotaCheck,
                error: Error::QuotaExceeded { size_bytes },
            }),
            Err(e) => Err(Halt::Failed {
                stage: Stage::QuotaCheck,
                error: Error::QuotaCheck(e),
            }),
        }
    }

    /// Check cancellation, then publish `stage` as the running stage
    fn enter(&self, stage: Stage) -> Result<(), Halt> {
        self.ensure_active(stage)?;
        self.shared.state.send_replace(TaskState::Running(stage));
        self.event_tx
            .send(Event::StageStarted {
                id: self.shared.id,
                stage,
            })
            .ok();
        debug!(task_id = self.shared.id.0, %stage, "stage started");
        Ok(())
    }

    fn ensure_active(&self, stage: Stage) -> Result<(), Halt> {
        if self.shared.cancel.is_cancelled() {
            Err(Halt::Cancelled(stage))
        } else {
            Ok(())
        }
    }

    async fn discard(&self, file: ExportedFile) {
        let id = self.shared.id;
        match file.discard().await {
            Ok(Some(path)) => {
                info!(task_id = id.0, ?path, "discarded exported file");
                self.event_tx.send(Event::FileDiscarded { id, path }).ok();
            }
            Ok(None) => {}
            Err(e) => {
                warn!(task_id = id.0, error = %e, "failed to discard exported file");
            }
        }
    }

    /// Record the outcome, publish `Finished`, then fire the completion callback
    fn record(&mut self, outcome: TaskOutcome) {
        if let Err(rejected) = self.shared.outcome.set(outcome) {
            warn!(task_id = self.shared.id.0, ?rejected, "outcome already recorded, ignoring");
        }
        self.shared.state.send_replace(TaskState::Finished);

        if let (Some(callback), Some(outcome)) = (self.on_complete.take(), self.shared.outcome.get())
        {
            callback(outcome);
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Unwinding out of a stage or callback must not leave waiters hanging
        self.shared.state.send_if_modified(|state| {
            if *state == TaskState::Finished {
                false
            } else {
                *state = TaskState::Finished;
                true
            }
        });
    }
}
