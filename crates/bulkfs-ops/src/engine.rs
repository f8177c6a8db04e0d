//! The process state machine.
//!
//! A [`ProcessEngine`] owns everything a run mutates: the queue with its
//! size account, the error queue and the operation's own state. It loads
//! its seeds into the queue, runs the operation's pre-flight check and then
//! processes the queue strictly in order on the calling thread, reporting
//! through a [`ProgressContract`].

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use bulkfs_core::{
    Action, ErrorQueue, PathItem, PathQueue, ProcessError, ProcessErrorItem, ProcessOptions,
    SizeAccount,
};

use crate::operation::{CheckContext, Operation, OperationKind, Outcome};
use crate::preflight::{SystemVolumes, VolumeProbe};
use crate::progress::{OperationProgress, ProcessSummary, ProgressContract};

/// Lifecycle of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ProcessState {
    /// Built, not started. Options may still change.
    Idle,
    /// Running the pre-flight check.
    Checking,
    /// Processing the queue.
    Running,
    /// Cancellation observed, winding down.
    Cancelling,
    /// Stopped by the caller; unprocessed items remain queued.
    Cancelled,
    /// Every item was handled.
    Completed,
    /// Stopped by a global error or an aborted item.
    Faulted,
}

impl ProcessState {
    /// Check if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Faulted)
    }
}

/// Object-safe view of a process, whatever its operation.
pub trait Process: Send {
    /// Which operation this process runs.
    fn kind(&self) -> OperationKind;

    /// Current lifecycle state.
    fn state(&self) -> ProcessState;

    /// The process options.
    fn options(&self) -> &ProcessOptions;

    /// Mutable options; fails once the process has loaded or started.
    fn options_mut(&mut self) -> Result<&mut ProcessOptions, ProcessError>;

    /// Expand seeds into the queue. Idempotent; only valid while idle.
    fn load(&mut self) -> Result<(), ProcessError>;

    /// Run to completion, cancellation or fault.
    fn start(
        &mut self,
        progress: &mut dyn ProgressContract,
    ) -> Result<ProcessSummary, ProcessError>;

    /// Items not yet processed.
    fn queue(&self) -> &PathQueue;

    /// Per-item failures recorded so far.
    fn errors(&self) -> &ErrorQueue;

    /// The error that faulted the process, if any.
    fn fault(&self) -> Option<&ProcessError>;

    /// Counters for the run so far.
    fn summary(&self) -> ProcessSummary;
}

/// Drives one [`Operation`] over a set of seeds.
pub struct ProcessEngine<O: Operation> {
    operation: O,
    options: ProcessOptions,
    state: ProcessState,
    seeds: Vec<PathItem>,
    loaded: bool,
    queue: PathQueue,
    errors: ErrorQueue,
    /// Load-phase errors at the head of `errors` not yet shown to `on_error`.
    unreported: usize,
    volumes: Box<dyn VolumeProbe>,
    fault: Option<ProcessError>,
    progress: OperationProgress,
    skipped: usize,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl<O: Operation> ProcessEngine<O> {
    /// Build a process. Fails if the operation rejects the seed set.
    pub fn new(
        operation: O,
        options: ProcessOptions,
        seeds: Vec<PathItem>,
    ) -> Result<Self, ProcessError> {
        operation.validate(&seeds, &options)?;
        let kind = operation.kind(&options);

        Ok(Self {
            operation,
            options,
            state: ProcessState::Idle,
            seeds,
            loaded: false,
            queue: PathQueue::new(),
            errors: ErrorQueue::new(),
            unreported: 0,
            volumes: Box::new(SystemVolumes),
            fault: None,
            progress: OperationProgress::new(kind, 0, SizeAccount::ZERO),
            skipped: 0,
            started_at: None,
            finished_at: None,
        })
    }

    /// Replace the volume probe used by the pre-flight check.
    pub fn with_volume_probe(mut self, volumes: impl VolumeProbe + 'static) -> Self {
        self.volumes = Box::new(volumes);
        self
    }

    /// The operation being driven.
    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// The seeds the process was built with.
    pub fn seeds(&self) -> &[PathItem] {
        &self.seeds
    }

    /// Progress counters of the current run.
    pub fn progress(&self) -> &OperationProgress {
        &self.progress
    }

    fn transition(&mut self, next: ProcessState) {
        tracing::info!(from = %self.state, to = %next, "Process state changed");
        self.state = next;
    }

    /// Record a global failure and stop.
    fn fail(&mut self, error: ProcessError) -> ProcessError {
        let error = error.into_global();
        if self.options.clear_on_error {
            self.queue.clear();
        }
        tracing::error!(error = %error, remaining = self.queue.len(), "Process faulted");
        self.fault = Some(error.clone());
        self.finished_at = Some(Utc::now());
        self.transition(ProcessState::Faulted);
        error
    }

    /// Whether the filter accepts the item and every folder above it
    /// within its seed. The seed itself is skipped when it only contains
    /// the queued items.
    fn admitted(&self, item: &PathItem, seed: &PathItem, filter_seed: bool) -> bool {
        let mut current = Some(item);
        while let Some(entry) = current.filter(|entry| !entry.is_root()) {
            let checked = filter_seed || entry.path() != seed.path();
            if checked && !self.options.accepts(entry) {
                return false;
            }
            current = entry.parent();
        }
        true
    }

    fn load_seeds(&mut self) -> Result<(), ProcessError> {
        self.operation.validate(&self.seeds, &self.options)?;

        let mut seeds = self.seeds.clone();
        match self.operation.enumeration_order(&self.options) {
            Some(order) => seeds.sort_by_key(|seed| order.sibling_rank(seed.is_directory())),
            // Unwalked folders cover their contents, so load outer seeds first.
            None => seeds.sort_by_key(|seed| seed.path().components().count()),
        }

        let filter_seeds = self.operation.filter_seeds();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut loaded_folders: Vec<PathBuf> = Vec::new();
        for seed in &seeds {
            if seen.contains(seed.path()) {
                tracing::debug!(path = %seed.path().display(), "Skipping duplicate source");
                continue;
            }
            if let Some(folder) = loaded_folders.iter().find(|f| seed.path().starts_with(f)) {
                tracing::debug!(
                    path = %seed.path().display(),
                    folder = %folder.display(),
                    "Skipping source inside another source"
                );
                continue;
            }
            if seed.is_directory() {
                loaded_folders.push(seed.path().to_path_buf());
            }

            let expansion = self.operation.expand(seed, &self.options)?;
            for entry in expansion {
                match entry {
                    Ok(item) => {
                        if !self.admitted(&item, seed, filter_seeds) {
                            tracing::debug!(path = %item.path().display(), "Filtered out");
                            continue;
                        }
                        if !seen.insert(item.path().to_path_buf()) {
                            tracing::debug!(path = %item.path().display(), "Skipping duplicate path");
                            continue;
                        }
                        self.queue.enqueue(item);
                    }
                    Err(error_item) => {
                        tracing::warn!(error = %error_item, "Failed to load path");
                        self.errors.push_back(error_item);
                        self.unreported += 1;
                    }
                }
            }
        }

        tracing::info!(
            items = self.queue.len(),
            size = %self.queue.total_size(),
            errors = self.errors.len(),
            "Loaded process queue"
        );
        Ok(())
    }

    /// Route load-phase errors through `on_error`.
    ///
    /// These entries cannot be produced again, so a retry is treated as
    /// ignore.
    fn report_load_errors(
        &mut self,
        progress: &mut dyn ProgressContract,
    ) -> Result<(), ProcessError> {
        let unreported = std::mem::take(&mut self.unreported);
        for index in 0..unreported {
            let Some(error_item) = self.errors.get_mut(index) else {
                break;
            };
            error_item.action = match progress.on_error(error_item) {
                Action::Retry => {
                    tracing::debug!(error = %error_item, "Load error cannot be retried, ignoring");
                    Action::Ignore
                }
                action => action,
            };

            if error_item.action == Action::Abort {
                let error = error_item.error.clone();
                return Err(self.fail(error));
            }
        }
        Ok(())
    }

    fn run(&mut self, progress: &mut dyn ProgressContract) -> Result<ProcessSummary, ProcessError> {
        self.transition(ProcessState::Checking);
        self.report_load_errors(progress)?;
        let context = CheckContext {
            seeds: &self.seeds,
            total_size: self.queue.total_size(),
            options: &self.options,
            volumes: self.volumes.as_ref(),
        };
        if let Err(error) = self.operation.pre_flight_check(&context) {
            return Err(self.fail(error));
        }

        self.transition(ProcessState::Running);
        let kind = self.operation.kind(&self.options);
        self.progress = OperationProgress::new(kind, self.queue.len(), self.queue.total_size());

        loop {
            if progress.should_cancel() {
                self.transition(ProcessState::Cancelling);
                tracing::info!(remaining = self.queue.len(), "Process cancelled");
                self.finished_at = Some(Utc::now());
                self.transition(ProcessState::Cancelled);
                return Err(ProcessError::cancelled());
            }

            let Ok(item) = self.queue.peek().cloned() else {
                break;
            };
            self.progress.set_current_item(Some(item.path()));
            progress.on_item_progress(item.path());

            match self.operation.do_work(&item, &self.options) {
                Ok(outcome) => {
                    self.queue.dequeue().ok();
                    match outcome {
                        Outcome::Done(bytes) => self.progress.complete_item(bytes),
                        Outcome::Skipped => {
                            self.skipped += 1;
                            self.progress.complete_item(0);
                        }
                    }
                }
                Err(error) if error.is_error_global() => {
                    return Err(self.fail(error));
                }
                Err(error) => {
                    let mut error_item = ProcessErrorItem::new(item, error);
                    error_item.action = progress.on_error(&error_item);
                    tracing::warn!(error = %error_item, "Item failed");
                    let action = error_item.action;
                    self.errors.push_back(error_item.clone());

                    match action {
                        Action::Ignore => {
                            self.queue.dequeue().ok();
                            self.progress.fail_item();
                        }
                        Action::Retry => continue,
                        Action::Abort => return Err(self.fail(error_item.error)),
                    }
                }
            }

            progress.on_overall_progress(self.progress.percentage(), &self.progress);
        }

        if let Err(error) = self.operation.complete(&self.options) {
            return Err(self.fail(error));
        }

        self.progress.set_current_item(None);
        self.finished_at = Some(Utc::now());
        self.transition(ProcessState::Completed);
        Ok(self.summary())
    }
}

impl<O: Operation> Process for ProcessEngine<O> {
    fn kind(&self) -> OperationKind {
        self.operation.kind(&self.options)
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn options(&self) -> &ProcessOptions {
        &self.options
    }

    fn options_mut(&mut self) -> Result<&mut ProcessOptions, ProcessError> {
        if self.state != ProcessState::Idle || self.loaded {
            return Err(ProcessError::invalid_state(format!(
                "Options are frozen once a process has loaded (state: {})",
                self.state
            )));
        }
        Ok(&mut self.options)
    }

    fn load(&mut self) -> Result<(), ProcessError> {
        if self.state != ProcessState::Idle {
            return Err(ProcessError::invalid_state(format!(
                "Cannot load a process in state {}",
                self.state
            )));
        }
        if self.loaded {
            return Ok(());
        }

        if let Err(error) = self.load_seeds() {
            return Err(self.fail(error));
        }
        self.loaded = true;
        Ok(())
    }

    fn start(
        &mut self,
        progress: &mut dyn ProgressContract,
    ) -> Result<ProcessSummary, ProcessError> {
        if self.state != ProcessState::Idle {
            return Err(ProcessError::invalid_state(format!(
                "Cannot start a process in state {}",
                self.state
            )));
        }

        self.started_at = Some(Utc::now());
        self.load()?;
        self.run(progress)
    }

    fn queue(&self) -> &PathQueue {
        &self.queue
    }

    fn errors(&self) -> &ErrorQueue {
        &self.errors
    }

    fn fault(&self) -> Option<&ProcessError> {
        self.fault.as_ref()
    }

    fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            operation: self.progress.operation,
            state: self.state,
            succeeded: self
                .progress
                .items_completed
                .saturating_sub(self.progress.errors + self.skipped),
            skipped: self.skipped,
            failed: self.progress.errors,
            remaining: self.queue.len(),
            bytes_processed: self.progress.bytes_processed,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use bulkfs_walk::EnumerationOrder;

    /// Processes members of a fixed list, failing the ones named `bad*`.
    struct Listed;

    impl Operation for Listed {
        fn kind(&self, _options: &ProcessOptions) -> OperationKind {
            OperationKind::Copy
        }

        fn enumeration_order(&self, _options: &ProcessOptions) -> Option<EnumerationOrder> {
            None
        }

        fn do_work(
            &mut self,
            item: &PathItem,
            _options: &ProcessOptions,
        ) -> Result<Outcome, ProcessError> {
            if item.relative_path().starts_with("bad") {
                return Err(ProcessError::new(
                    bulkfs_core::ErrorKind::SharingViolation,
                    "locked",
                ));
            }
            Ok(Outcome::Done(item.size().unwrap_or(0)))
        }
    }

    fn seeds(names: &[&str]) -> Vec<PathItem> {
        let root = PathItem::root("/virtual").unwrap();
        names
            .iter()
            .map(|name| PathItem::with_known_size(&root, name, false, Some(10)).unwrap())
            .collect()
    }

    #[test]
    fn test_runs_to_completion() {
        let mut engine =
            ProcessEngine::new(Listed, ProcessOptions::default(), seeds(&["a", "bad", "c"]))
                .unwrap();

        let summary = engine.start(&mut NoProgress).unwrap();
        assert_eq!(engine.state(), ProcessState::Completed);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes_processed, 20);
        assert_eq!(engine.errors().len(), 1);
        assert!(engine.queue().is_empty());
    }

    #[test]
    fn test_load_is_idempotent_and_deduplicates() {
        let mut engine =
            ProcessEngine::new(Listed, ProcessOptions::default(), seeds(&["a", "b", "a"]))
                .unwrap();
        engine.load().unwrap();
        engine.load().unwrap();
        assert_eq!(engine.queue().len(), 2);
        assert_eq!(engine.queue().total_size(), 20);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut engine =
            ProcessEngine::new(Listed, ProcessOptions::default(), seeds(&["a"])).unwrap();
        engine.start(&mut NoProgress).unwrap();

        let err = engine.start(&mut NoProgress).unwrap_err();
        assert_eq!(err.kind, bulkfs_core::ErrorKind::WrongStatus);
        assert!(engine.options_mut().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessState::Completed.is_terminal());
        assert!(ProcessState::Cancelled.is_terminal());
        assert!(ProcessState::Faulted.is_terminal());
        assert!(!ProcessState::Cancelling.is_terminal());
    }

    #[test]
    fn test_nested_unwalked_seed_is_skipped() {
        let root = PathItem::root("/virtual").unwrap();
        let inner = PathItem::with_known_size(&root, "outer/inner", false, Some(5)).unwrap();
        let outer = PathItem::with_known_size(&root, "outer", true, None).unwrap();
        let other = PathItem::with_known_size(&root, "outer-2", false, Some(7)).unwrap();

        let mut engine =
            ProcessEngine::new(Listed, ProcessOptions::default(), vec![inner, outer, other])
                .unwrap();
        engine.load().unwrap();

        let queued: Vec<&str> = engine.queue().iter().map(|i| i.relative_path()).collect();
        assert_eq!(queued, vec!["outer", "outer-2"]);
    }

    /// Expands seeds named `broken*` into a load error.
    struct Partial;

    impl Operation for Partial {
        fn kind(&self, _options: &ProcessOptions) -> OperationKind {
            OperationKind::Copy
        }

        fn enumeration_order(&self, _options: &ProcessOptions) -> Option<EnumerationOrder> {
            None
        }

        fn expand(
            &mut self,
            seed: &PathItem,
            _options: &ProcessOptions,
        ) -> Result<crate::operation::Expansion, ProcessError> {
            if seed.relative_path().starts_with("broken") {
                let error = ProcessError::new(bulkfs_core::ErrorKind::AccessDenied, "unreadable");
                return Ok(Box::new(std::iter::once(Err(ProcessErrorItem::new(
                    seed.clone(),
                    error,
                )))));
            }
            Ok(Box::new(std::iter::once(Ok(seed.clone()))))
        }

        fn do_work(
            &mut self,
            _item: &PathItem,
            _options: &ProcessOptions,
        ) -> Result<Outcome, ProcessError> {
            Ok(Outcome::Done(1))
        }
    }

    /// Answers every error with a fixed action.
    struct Answer {
        action: Action,
        asked: Vec<bulkfs_core::ErrorKind>,
    }

    impl ProgressContract for Answer {
        fn on_error(&mut self, error: &ProcessErrorItem) -> Action {
            self.asked.push(error.error.kind);
            self.action
        }
    }

    #[test]
    fn test_load_errors_reach_on_error() {
        let mut engine =
            ProcessEngine::new(Partial, ProcessOptions::default(), seeds(&["a", "broken"]))
                .unwrap();
        engine.load().unwrap();
        assert_eq!(engine.errors().len(), 1);

        let mut answer = Answer {
            action: Action::Abort,
            asked: Vec::new(),
        };
        let err = engine.start(&mut answer).unwrap_err();

        assert_eq!(answer.asked, vec![bulkfs_core::ErrorKind::AccessDenied]);
        assert_eq!(err.kind, bulkfs_core::ErrorKind::AccessDenied);
        assert_eq!(engine.state(), ProcessState::Faulted);
        assert_eq!(engine.errors()[0].action, Action::Abort);
        assert_eq!(engine.summary().succeeded, 0);
    }

    #[test]
    fn test_load_error_retry_is_ignored() {
        let mut engine =
            ProcessEngine::new(Partial, ProcessOptions::default(), seeds(&["a", "broken"]))
                .unwrap();
        let mut answer = Answer {
            action: Action::Retry,
            asked: Vec::new(),
        };

        let summary = engine.start(&mut answer).unwrap();

        assert_eq!(answer.asked.len(), 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(engine.errors().len(), 1);
        assert_eq!(engine.errors()[0].action, Action::Ignore);
    }
}
