//! Background worker running a process with channel-based progress.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use bulkfs_core::{Action, ProcessError, ProcessErrorItem};

use crate::engine::Process;
use crate::progress::{OperationProgress, ProcessSummary, ProgressContract};

/// Default channel buffer size for process events.
pub const EVENT_CHANNEL_SIZE: usize = 100;

/// Event sent from a running process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// An item is about to be processed.
    Item(PathBuf),
    /// An item finished.
    Progress {
        /// Overall completion, `0.0..=100.0`.
        percent: f64,
        /// Counters at this point.
        progress: OperationProgress,
    },
    /// An item failed; carries the action the worker applied.
    Error(ProcessErrorItem),
    /// The run ended.
    Finished(Result<ProcessSummary, ProcessError>),
}

/// [`ProgressContract`] that forwards callbacks over a channel.
///
/// Sends block when the channel is full, so a slow receiver slows the
/// process down rather than dropping events. Events are dropped once the
/// receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<ProcessEvent>,
    token: CancellationToken,
    error_action: Action,
}

impl ChannelProgress {
    /// Create a progress sink answering every per-item error with `error_action`.
    pub fn new(
        tx: mpsc::Sender<ProcessEvent>,
        token: CancellationToken,
        error_action: Action,
    ) -> Self {
        Self {
            tx,
            token,
            error_action,
        }
    }

    fn send(&self, event: ProcessEvent) {
        let _ = self.tx.blocking_send(event);
    }
}

impl ProgressContract for ChannelProgress {
    fn on_item_progress(&mut self, path: &Path) {
        self.send(ProcessEvent::Item(path.to_path_buf()));
    }

    fn on_overall_progress(&mut self, percent: f64, extra: &OperationProgress) {
        self.send(ProcessEvent::Progress {
            percent,
            progress: extra.clone(),
        });
    }

    fn should_cancel(&self) -> bool {
        self.token.is_cancelled()
    }

    fn on_error(&mut self, error: &ProcessErrorItem) -> Action {
        let mut reported = error.clone();
        reported.action = self.error_action;
        self.send(ProcessEvent::Error(reported));
        self.error_action
    }
}

/// Handle to a process running on a blocking worker.
pub struct ProcessHandle {
    /// Events from the worker, ending with [`ProcessEvent::Finished`].
    pub events: mpsc::Receiver<ProcessEvent>,
    token: CancellationToken,
    join: JoinHandle<Box<dyn Process>>,
}

impl ProcessHandle {
    /// Request cooperative cancellation; the current item finishes first.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A token that cancels this process.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the worker and take the process back.
    pub async fn join(self) -> Result<Box<dyn Process>, JoinError> {
        drop(self.events);
        self.join.await
    }
}

/// Run `process` on a blocking worker thread.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_process(mut process: Box<dyn Process>, error_action: Action) -> ProcessHandle {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let token = CancellationToken::new();
    let mut progress = ChannelProgress::new(tx.clone(), token.clone(), error_action);

    let join = tokio::task::spawn_blocking(move || {
        let result = process.start(&mut progress);
        match &result {
            Ok(summary) => tracing::info!(summary = %summary.summary(), "Process finished"),
            Err(error) => tracing::warn!(error = %error, "Process stopped"),
        }
        let _ = tx.blocking_send(ProcessEvent::Finished(result));
        process
    });

    ProcessHandle {
        events: rx,
        token,
        join,
    }
}
