//! Core types for bulkfs.
//!
//! This crate provides the value types shared by the walker and the
//! process engine: path items, the pending-item queue with its size
//! account, the closed error taxonomy and process configuration.

mod config;
mod error;
mod item;
mod queue;
mod size;

pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_MAX_RENAME_ATTEMPTS, PathFilter, ProcessOptions,
    ProcessOptionsBuilder, RemoveOption, TransferMode,
};
pub use error::{Action, ErrorKind, ErrorQueue, IoSide, ProcessError, ProcessErrorItem};
pub use item::PathItem;
pub use queue::{PathQueue, QueueError};
pub use size::SizeAccount;
