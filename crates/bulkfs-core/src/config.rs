//! Process configuration types.

use std::fmt;
use std::sync::Arc;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::item::PathItem;

/// Default copy buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of names probed when auto-renaming.
pub const DEFAULT_MAX_RENAME_ATTEMPTS: u32 = 1000;

/// Whether a transfer keeps or removes its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    /// Leave sources in place.
    #[default]
    Copy,
    /// Remove each source after it has been written.
    Move,
}

/// How a deletion disposes of its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RemoveOption {
    /// Move items to the trash.
    #[default]
    Recycle,
    /// Delete items permanently.
    Delete,
    /// Empty the trash. Takes no items.
    Clear,
}

/// Predicate deciding whether a loaded path is queued.
#[derive(Clone)]
pub struct PathFilter(Arc<dyn Fn(&PathItem) -> bool + Send + Sync>);

impl PathFilter {
    /// Wrap a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&PathItem) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Check whether the item is accepted.
    pub fn accepts(&self, item: &PathItem) -> bool {
        (self.0)(item)
    }
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PathFilter(..)")
    }
}

/// Configuration for a process. Frozen once the process starts.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ProcessOptions {
    /// Predicate invoked per loaded path; rejected paths are not queued.
    #[builder(setter(custom), default)]
    #[serde(skip)]
    pub filter: Option<PathFilter>,

    /// Drop the remaining queue when the process faults.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub clear_on_error: bool,

    /// Rename conflicting destinations to `name (2).ext`, `name (3).ext`, ...
    #[builder(default = "false")]
    #[serde(default)]
    pub auto_rename_files: bool,

    /// Skip items whose destination is a file where a folder belongs, or
    /// the other way round, instead of failing them.
    #[builder(default = "false")]
    #[serde(default)]
    pub ignore_folder_file_name_conflicts: bool,

    /// Replace existing destination files.
    #[builder(default = "false")]
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Copy or move.
    #[builder(default)]
    #[serde(default)]
    pub transfer_mode: TransferMode,

    /// Recycle, delete or empty the trash.
    #[builder(default)]
    #[serde(default)]
    pub remove_option: RemoveOption,

    /// Keep the modification time of copied files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,

    /// Compare BLAKE3 hashes before removing a moved source.
    #[builder(default = "false")]
    #[serde(default)]
    pub verify_after_move: bool,

    /// Copy buffer size in bytes.
    #[builder(default = "DEFAULT_BUFFER_SIZE")]
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Upper bound on auto-rename probes.
    #[builder(default = "DEFAULT_MAX_RENAME_ATTEMPTS")]
    #[serde(default = "default_max_rename_attempts")]
    pub max_rename_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_max_rename_attempts() -> u32 {
    DEFAULT_MAX_RENAME_ATTEMPTS
}

impl ProcessOptionsBuilder {
    /// Set the per-path predicate.
    pub fn filter<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&PathItem) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Some(PathFilter::new(predicate)));
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.buffer_size == Some(0) {
            return Err("Buffer size must be greater than zero".to_string());
        }
        if self.max_rename_attempts == Some(0) {
            return Err("Rename attempts must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ProcessOptions {
    /// Create a new options builder.
    pub fn builder() -> ProcessOptionsBuilder {
        ProcessOptionsBuilder::default()
    }

    /// Check whether the filter (if any) accepts an item.
    pub fn accepts(&self, item: &PathItem) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.accepts(item))
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            filter: None,
            clear_on_error: true,
            auto_rename_files: false,
            ignore_folder_file_name_conflicts: false,
            overwrite_existing: false,
            transfer_mode: TransferMode::Copy,
            remove_option: RemoveOption::Recycle,
            preserve_timestamps: true,
            verify_after_move: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_rename_attempts: DEFAULT_MAX_RENAME_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = ProcessOptions::builder()
            .auto_rename_files(true)
            .transfer_mode(TransferMode::Move)
            .buffer_size(4096usize)
            .build()
            .unwrap();

        assert!(options.auto_rename_files);
        assert_eq!(options.transfer_mode, TransferMode::Move);
        assert_eq!(options.buffer_size, 4096);
        assert!(options.clear_on_error);
        assert!(options.preserve_timestamps);
        assert_eq!(options.max_rename_attempts, DEFAULT_MAX_RENAME_ATTEMPTS);
    }

    #[test]
    fn test_options_validation() {
        assert!(ProcessOptions::builder().buffer_size(0usize).build().is_err());
        assert!(ProcessOptions::builder().max_rename_attempts(0u32).build().is_err());
    }

    #[test]
    fn test_filter() {
        let options = ProcessOptions::builder()
            .filter(|item: &PathItem| !item.relative_path().ends_with(".tmp"))
            .build()
            .unwrap();

        let root = PathItem::root("/src").unwrap();
        let keep = PathItem::child(&root, "a.txt", false).unwrap();
        let skip = PathItem::child(&root, "b.tmp", false).unwrap();
        assert!(options.accepts(&keep));
        assert!(!options.accepts(&skip));
        assert!(ProcessOptions::default().accepts(&skip));
    }
}
