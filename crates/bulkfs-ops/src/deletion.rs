//! Delete, recycle and empty-trash operation.

use std::fs;
use std::io;
use std::path::Path;

use bulkfs_core::{ErrorKind, IoSide, PathItem, ProcessError, ProcessOptions, RemoveOption};
use bulkfs_walk::EnumerationOrder;

use crate::operation::{CheckContext, Operation, OperationKind, Outcome};
use crate::preflight::check_volume;

/// Removes seeds according to [`ProcessOptions::remove_option`].
///
/// Permanent deletion walks each seed children-first so every folder is
/// empty when it is removed. Recycling hands each seed to the trash as a
/// whole. Clearing takes no seeds and empties the trash once the (empty)
/// queue has drained.
#[derive(Debug, Default)]
pub struct DeleteOperation {
    purged: usize,
}

impl DeleteOperation {
    /// Create a deletion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trash entries purged by a clear.
    pub fn purged(&self) -> usize {
        self.purged
    }
}

impl Operation for DeleteOperation {
    fn kind(&self, options: &ProcessOptions) -> OperationKind {
        match options.remove_option {
            RemoveOption::Recycle => OperationKind::Recycle,
            RemoveOption::Delete => OperationKind::Delete,
            RemoveOption::Clear => OperationKind::ClearTrash,
        }
    }

    fn enumeration_order(&self, options: &ProcessOptions) -> Option<EnumerationOrder> {
        match options.remove_option {
            RemoveOption::Delete => Some(EnumerationOrder::ChildrenThenParent),
            RemoveOption::Recycle | RemoveOption::Clear => None,
        }
    }

    fn validate(&self, seeds: &[PathItem], options: &ProcessOptions) -> Result<(), ProcessError> {
        if options.remove_option == RemoveOption::Clear && !seeds.is_empty() {
            return Err(ProcessError::invalid_state(format!(
                "Emptying the trash takes no paths, {} given",
                seeds.len()
            )));
        }
        Ok(())
    }

    fn pre_flight_check(&mut self, context: &CheckContext<'_>) -> Result<(), ProcessError> {
        for seed in context.seeds {
            check_volume(context.volumes, seed.path())?;
        }
        Ok(())
    }

    fn do_work(
        &mut self,
        item: &PathItem,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        let bytes = item.queued_size().unwrap_or(0);
        match options.remove_option {
            RemoveOption::Delete => remove_entry(item)?,
            RemoveOption::Recycle => {
                trash::delete(item.path()).map_err(|e| trash_error(item.path(), e))?
            }
            RemoveOption::Clear => return Ok(Outcome::Skipped),
        }
        tracing::debug!(path = %item.path().display(), "Removed");
        Ok(Outcome::Done(bytes))
    }

    fn complete(&mut self, options: &ProcessOptions) -> Result<(), ProcessError> {
        if options.remove_option == RemoveOption::Clear {
            self.purged = empty_trash()?;
            tracing::info!(purged = self.purged, "Trash emptied");
        }
        Ok(())
    }
}

fn remove_entry(item: &PathItem) -> Result<(), ProcessError> {
    let path = item.path();
    let result = if item.is_directory() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied && is_read_only(path) {
            ProcessError::at(ErrorKind::FileReadOnly, path, e)
        } else {
            ProcessError::io(IoSide::Unspecified, path, &e)
        }
    })
}

fn is_read_only(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.permissions().readonly())
}

fn trash_error(path: &Path, error: trash::Error) -> ProcessError {
    let kind = match error {
        trash::Error::CouldNotAccess { .. } => ErrorKind::AccessDenied,
        _ => ErrorKind::UnknownError,
    };
    ProcessError::at(kind, path, error)
}

#[cfg(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
))]
fn empty_trash() -> Result<usize, ProcessError> {
    let items = trash::os_limited::list().map_err(|e| {
        ProcessError::new(ErrorKind::UnknownError, format!("Failed to list trash: {e}"))
    })?;
    let count = items.len();
    if count > 0 {
        trash::os_limited::purge_all(items).map_err(|e| {
            ProcessError::new(ErrorKind::UnknownError, format!("Failed to empty trash: {e}"))
        })?;
    }
    Ok(count)
}

#[cfg(not(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
)))]
fn empty_trash() -> Result<usize, ProcessError> {
    Err(ProcessError::new(
        ErrorKind::UnknownError,
        "Emptying the trash is not supported on this platform",
    ))
}
