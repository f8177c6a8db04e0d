//! Progress reporting types for processes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bulkfs_core::{Action, ProcessErrorItem, SizeAccount};

use crate::engine::ProcessState;
use crate::operation::OperationKind;

/// Progress information for a running process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationProgress {
    /// The operation being run.
    pub operation: OperationKind,
    /// Number of items finished (processed, skipped or failed).
    pub items_completed: usize,
    /// Number of items queued when the run started.
    pub items_total: usize,
    /// Number of bytes processed so far.
    pub bytes_processed: u64,
    /// Total bytes queued when the run started.
    pub bytes_total: SizeAccount,
    /// The item currently being processed.
    pub current_item: Option<PathBuf>,
    /// Per-item failures so far.
    pub errors: usize,
}

impl OperationProgress {
    /// Create a new progress tracker for a run.
    pub fn new(operation: OperationKind, items_total: usize, bytes_total: SizeAccount) -> Self {
        Self {
            operation,
            items_completed: 0,
            items_total,
            bytes_processed: 0,
            bytes_total,
            current_item: None,
            errors: 0,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    ///
    /// Measured in bytes when the queued total is known and non-zero,
    /// otherwise in items.
    pub fn percentage(&self) -> f64 {
        match self.bytes_total {
            SizeAccount::Known(total) if total > 0 => {
                (self.bytes_processed as f64 / total as f64 * 100.0).min(100.0)
            }
            _ if self.items_total > 0 => {
                self.items_completed as f64 / self.items_total as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    /// Update the current item being processed.
    pub fn set_current_item(&mut self, path: Option<&Path>) {
        self.current_item = path.map(Path::to_path_buf);
    }

    /// Count a finished item and the bytes it moved.
    pub fn complete_item(&mut self, bytes: u64) {
        self.items_completed += 1;
        self.bytes_processed += bytes;
    }

    /// Count a failed item.
    pub fn fail_item(&mut self) {
        self.items_completed += 1;
        self.errors += 1;
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    /// The operation that ran.
    pub operation: OperationKind,
    /// State the process ended in.
    pub state: ProcessState,
    /// Number of items processed.
    pub succeeded: usize,
    /// Number of items deliberately left alone.
    pub skipped: usize,
    /// Number of items that failed and were ignored.
    pub failed: usize,
    /// Items still queued (after cancellation).
    pub remaining: usize,
    /// Total bytes processed.
    pub bytes_processed: u64,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run stopped.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessSummary {
    /// Check if the run completed without failed items.
    pub fn is_success(&self) -> bool {
        self.state == ProcessState::Completed && self.failed == 0
    }

    /// Wall-clock duration of the run, if it started and stopped.
    pub fn elapsed(&self) -> Option<chrono::TimeDelta> {
        Some(self.finished_at? - self.started_at?)
    }

    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let verb = self.operation.verb();
        let mut text = format!("{verb} {} items", self.succeeded);
        if self.skipped > 0 {
            text.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.failed > 0 {
            text.push_str(&format!(", {} failed", self.failed));
        }
        if self.remaining > 0 {
            text.push_str(&format!(", {} not started", self.remaining));
        }
        text
    }
}

/// Callbacks a running process reports through.
///
/// Every method is called synchronously on the worker running the process,
/// one call at a time. Implementations that feed a UI do their own
/// marshaling.
pub trait ProgressContract {
    /// An item is about to be processed.
    fn on_item_progress(&mut self, _path: &Path) {}

    /// An item finished; `percent` is in `0.0..=100.0`.
    fn on_overall_progress(&mut self, _percent: f64, _extra: &OperationProgress) {}

    /// Polled before every item; returning `true` cancels the run.
    fn should_cancel(&self) -> bool {
        false
    }

    /// Decide how to continue after a per-item failure.
    fn on_error(&mut self, error: &ProcessErrorItem) -> Action {
        error.action
    }
}

/// Progress sink that ignores everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressContract for NoProgress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_by_bytes() {
        let mut progress = OperationProgress::new(OperationKind::Copy, 4, SizeAccount::Known(600));
        progress.complete_item(100);
        progress.complete_item(200);
        assert_eq!(progress.percentage(), 50.0);
    }

    #[test]
    fn test_percentage_falls_back_to_items() {
        let mut progress = OperationProgress::new(OperationKind::Delete, 4, SizeAccount::Unknown);
        progress.complete_item(10);
        assert_eq!(progress.percentage(), 25.0);

        let empty = OperationProgress::new(OperationKind::ClearTrash, 0, SizeAccount::ZERO);
        assert_eq!(empty.percentage(), 0.0);
    }

    #[test]
    fn test_summary_text() {
        let summary = ProcessSummary {
            operation: OperationKind::Copy,
            state: ProcessState::Completed,
            succeeded: 3,
            skipped: 1,
            failed: 2,
            remaining: 0,
            bytes_processed: 0,
            started_at: None,
            finished_at: None,
        };
        assert_eq!(summary.summary(), "Copied 3 items, 1 skipped, 2 failed");
        assert!(!summary.is_success());
        assert!(summary.elapsed().is_none());
    }
}
