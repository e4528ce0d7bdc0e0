//! Progress relay from stage reporters to callbacks and events

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::types::{Event, Stage, TaskId};

/// Callback receiving a progress fraction in `[0, 1]`
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Re-delivers stage progress on the driver task
///
/// Values are clamped to `[0, 1]`, non-finite values and values below the last
/// delivered value of the same stage are dropped, and nothing is delivered once
/// the task is cancelled.
pub(super) struct ProgressRelay {
    id: TaskId,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
    on_download: Option<ProgressCallback>,
    on_export: Option<ProgressCallback>,
    last_download: Option<f64>,
    last_export: Option<f64>,
}

impl ProgressRelay {
    pub(super) fn new(
        id: TaskId,
        cancel: CancellationToken,
        event_tx: broadcast::Sender<Event>,
        on_download: Option<ProgressCallback>,
        on_export: Option<ProgressCallback>,
    ) -> Self {
        Self {
            id,
            cancel,
            event_tx,
            on_download,
            on_export,
            last_download: None,
            last_export: None,
        }
    }

    /// Await `stage_future` while relaying everything that arrives on `rx`
    ///
    /// Reports queued before the stage finished are delivered before its
    /// output is returned.
    pub(super) async fn drive<F: Future>(
        &mut self,
        stage: Stage,
        rx: &mut mpsc::UnboundedReceiver<f64>,
        stage_future: F,
    ) -> F::Output {
        tokio::pin!(stage_future);
        let mut reporting = true;

        loop {
            tokio::select! {
                biased;
                fraction = rx.recv(), if reporting => match fraction {
                    Some(fraction) => self.deliver(stage, fraction),
                    None => reporting = false,
                },
                output = &mut stage_future => {
                    while let Ok(fraction) = rx.try_recv() {
                        self.deliver(stage, fraction);
                    }
                    return output;
                }
            }
        }
    }

    pub(super) fn deliver(&mut self, stage: Stage, fraction: f64) {
        if self.cancel.is_cancelled() || !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let (last, callback) = match stage {
            Stage::Download => (&mut self.last_download, self.on_download.as_ref()),
            Stage::Export => (&mut self.last_export, self.on_export.as_ref()),
            Stage::QuotaCheck => return,
        };

        if let Some(previous) = *last {
            if fraction < previous {
                trace!(
                    task_id = self.id.0,
                    %stage,
                    fraction,
                    previous,
                    "dropping regressed progress"
                );
                return;
            }
        }
        *last = Some(fraction);

        if let Some(callback) = callback {
            callback(fraction);
        }

        let event = match stage {
            Stage::Download => Event::DownloadProgress {
                id: self.id,
                fraction,
            },
            _ => Event::ExportProgress {
                id: self.id,
                fraction,
            },
        };
        self.event_tx.send(event).ok();
    }
}
