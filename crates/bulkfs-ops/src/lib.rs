//! Process engine and bulk file operations for bulkfs.
//!
//! This crate drives long-running file operations (copy, move, delete,
//! recycle, empty trash, zip extraction) item by item with recoverable
//! per-item errors and cooperative cancellation.
//!
//! # Overview
//!
//! - [`ProcessEngine`] loads seeds into a queue, runs a pre-flight check
//!   and processes the queue in order
//! - [`Operation`] is the strategy each concrete operation implements
//! - [`ProgressContract`] is how a running process reports and is cancelled
//! - [`spawn_process`] runs a process on a blocking worker and streams
//!   [`ProcessEvent`]s over a channel
//!
//! # Example
//!
//! ```rust,no_run
//! use bulkfs_core::{PathItem, ProcessOptions};
//! use bulkfs_ops::{CopyOperation, NoProgress, Process, ProcessEngine};
//!
//! let seeds = PathItem::seeds(["/data/report.txt", "/data/photos"]).unwrap();
//! let copy = CopyOperation::new("/backup").unwrap();
//! let mut engine = ProcessEngine::new(copy, ProcessOptions::default(), seeds).unwrap();
//!
//! let summary = engine.start(&mut NoProgress).unwrap();
//! println!("{}", summary.summary());
//! ```

mod conflict;
mod copy;
mod deletion;
mod engine;
mod extract;
mod operation;
mod preflight;
mod progress;
mod request;
mod worker;

pub use conflict::{ConflictResolver, ResolvedPath};
pub use copy::CopyOperation;
pub use deletion::DeleteOperation;
pub use engine::{Process, ProcessEngine, ProcessState};
pub use extract::ExtractOperation;
pub use operation::{CheckContext, Expansion, Operation, OperationKind, Outcome};
pub use preflight::{SystemVolumes, VolumeProbe, check_free_space, check_volume};
pub use progress::{NoProgress, OperationProgress, ProcessSummary, ProgressContract};
pub use request::ProcessRequest;
pub use worker::{ChannelProgress, EVENT_CHANNEL_SIZE, ProcessEvent, ProcessHandle, spawn_process};
