//! Error taxonomy for bulk file processes.
//!
//! Every failure the engine reports is classified into one [`ErrorKind`].
//! Per-item failures travel as [`ProcessErrorItem`]s and carry the
//! [`Action`] that decides how the process continues; failures flagged as
//! global always fault the whole process.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use thiserror::Error;

use crate::item::PathItem;

/// Closed classification of process failures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize,
)]
pub enum ErrorKind {
    #[default]
    None,
    UnknownError,
    WrongStatus,
    CancelledByUser,
    PathNotFound,
    DriveNotReady,
    ReadProtection,
    DestinationReadProtection,
    WriteProtection,
    PathTooLong,
    NotEnoughSpace,
    FileSystemEntryAlreadyExists,
    FileRenamingFailed,
    SourceAndDestPathAreEqual,
    DestPathIsASubPath,
    DiskError,
    EncryptionFailed,
    DirectoryNotEmpty,
    ItemIsNotDirectory,
    SharingViolation,
    FileReadOnly,
    AccessDenied,
}

impl ErrorKind {
    /// Whether an error of this kind invalidates the whole process by default.
    pub fn is_global(self) -> bool {
        matches!(
            self,
            Self::WrongStatus
                | Self::CancelledByUser
                | Self::DriveNotReady
                | Self::NotEnoughSpace
                | Self::SourceAndDestPathAreEqual
                | Self::DestPathIsASubPath
        )
    }
}

/// Which side of an operation an I/O call touched.
///
/// The same OS failure means different things depending on where it
/// happened: a permission failure while reading the source is a read
/// protection, while writing the destination it is a write protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSide {
    /// Reading or inspecting a source entry.
    Source,
    /// Creating or writing a destination entry.
    Destination,
    /// Reading or inspecting an existing destination entry.
    DestinationRead,
    /// Side not meaningful (deletion, trash, archive bookkeeping).
    Unspecified,
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProcessError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Raw OS error code, when the failure came from the OS.
    pub os_code: Option<i32>,
    global: bool,
}

impl ProcessError {
    /// Create an error whose global flag follows its kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            os_code: None,
            global: kind.is_global(),
        }
    }

    /// Create an error for a path.
    pub fn at(kind: ErrorKind, path: &Path, message: impl fmt::Display) -> Self {
        Self::new(kind, format!("{}: {message}", path.display()))
    }

    /// The error reported when a process is cancelled.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::CancelledByUser, "Operation cancelled by user")
    }

    /// The error reported when an operation is invoked in the wrong state.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongStatus, message)
    }

    /// Classify an I/O error that happened at `path`.
    pub fn io(side: IoSide, path: &Path, error: &io::Error) -> Self {
        let kind = classify_io(side, error);
        Self {
            kind,
            message: format!("{}: {error}", path.display()),
            os_code: error.raw_os_error(),
            global: kind.is_global() || is_volume_failure(error),
        }
    }

    /// Mark this error as invalidating the whole process.
    pub fn into_global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Whether this error faults the process instead of being handled per item.
    pub fn is_error_global(&self) -> bool {
        self.global
    }
}

fn classify_io(side: IoSide, error: &io::Error) -> ErrorKind {
    if let Some(kind) = error.raw_os_error().and_then(classify_os_code) {
        return kind;
    }

    match error.kind() {
        io::ErrorKind::NotFound => ErrorKind::PathNotFound,
        io::ErrorKind::PermissionDenied => match side {
            IoSide::Source => ErrorKind::ReadProtection,
            IoSide::Destination => ErrorKind::WriteProtection,
            IoSide::DestinationRead => ErrorKind::DestinationReadProtection,
            IoSide::Unspecified => ErrorKind::AccessDenied,
        },
        io::ErrorKind::AlreadyExists => ErrorKind::FileSystemEntryAlreadyExists,
        io::ErrorKind::StorageFull => ErrorKind::NotEnoughSpace,
        io::ErrorKind::ReadOnlyFilesystem => ErrorKind::WriteProtection,
        io::ErrorKind::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
        io::ErrorKind::NotADirectory => ErrorKind::ItemIsNotDirectory,
        io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy => {
            ErrorKind::SharingViolation
        }
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => ErrorKind::DiskError,
        _ => ErrorKind::UnknownError,
    }
}

/// Codes whose meaning `io::ErrorKind` does not capture on stable.
#[cfg(windows)]
fn classify_os_code(code: i32) -> Option<ErrorKind> {
    match code {
        19 => Some(ErrorKind::WriteProtection),
        21 | 1167 => Some(ErrorKind::DriveNotReady),
        23 | 1117 => Some(ErrorKind::DiskError),
        32 | 33 => Some(ErrorKind::SharingViolation),
        39 | 112 => Some(ErrorKind::NotEnoughSpace),
        145 => Some(ErrorKind::DirectoryNotEmpty),
        206 => Some(ErrorKind::PathTooLong),
        267 => Some(ErrorKind::ItemIsNotDirectory),
        6000 => Some(ErrorKind::EncryptionFailed),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn classify_os_code(code: i32) -> Option<ErrorKind> {
    match code {
        5 => Some(ErrorKind::DiskError),
        6 | 19 => Some(ErrorKind::DriveNotReady),
        36 => Some(ErrorKind::PathTooLong),
        _ => None,
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn classify_os_code(code: i32) -> Option<ErrorKind> {
    match code {
        5 => Some(ErrorKind::DiskError),
        6 | 19 => Some(ErrorKind::DriveNotReady),
        63 => Some(ErrorKind::PathTooLong),
        _ => None,
    }
}

#[cfg(not(any(unix, windows)))]
fn classify_os_code(_code: i32) -> Option<ErrorKind> {
    None
}

/// Failures that mean the volume itself is gone or read-only.
fn is_volume_failure(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::ReadOnlyFilesystem {
        return true;
    }
    matches!(
        error.raw_os_error().and_then(classify_os_code),
        Some(ErrorKind::DriveNotReady | ErrorKind::WriteProtection)
    )
}

/// How the engine proceeds after a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum Action {
    /// Record the failure, drop the item and continue.
    #[default]
    Ignore,
    /// Run the same item again without re-enumerating.
    Retry,
    /// Stop the process as if the failure were global.
    Abort,
}

/// A per-item failure and the action chosen for it.
#[derive(Debug, Clone)]
pub struct ProcessErrorItem {
    /// The item that failed.
    pub item: PathItem,
    /// What went wrong.
    pub error: ProcessError,
    /// How the engine proceeds.
    pub action: Action,
}

impl ProcessErrorItem {
    /// Pair an item with an error, defaulting to [`Action::Ignore`].
    pub fn new(item: PathItem, error: ProcessError) -> Self {
        Self {
            item,
            error,
            action: Action::default(),
        }
    }
}

impl fmt::Display for ProcessErrorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.item.path().display(), self.action, self.error)
    }
}

/// Per-item failures recorded by a process, oldest first.
pub type ErrorQueue = VecDeque<ProcessErrorItem>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_depends_on_side() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let path = Path::new("/test/path");

        assert_eq!(
            ProcessError::io(IoSide::Source, path, &err).kind,
            ErrorKind::ReadProtection
        );
        assert_eq!(
            ProcessError::io(IoSide::Destination, path, &err).kind,
            ErrorKind::WriteProtection
        );
        assert_eq!(
            ProcessError::io(IoSide::DestinationRead, path, &err).kind,
            ErrorKind::DestinationReadProtection
        );
        assert_eq!(
            ProcessError::io(IoSide::Unspecified, path, &err).kind,
            ErrorKind::AccessDenied
        );
    }

    #[test]
    fn test_not_found_is_per_item() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let error = ProcessError::io(IoSide::Source, Path::new("/missing"), &err);
        assert_eq!(error.kind, ErrorKind::PathNotFound);
        assert!(!error.is_error_global());
        assert!(error.message.contains("/missing"));
    }

    #[test]
    fn test_global_kinds() {
        assert!(ProcessError::new(ErrorKind::NotEnoughSpace, "full").is_error_global());
        assert!(ProcessError::cancelled().is_error_global());
        assert!(!ProcessError::new(ErrorKind::SharingViolation, "busy").is_error_global());
        assert!(ProcessError::new(ErrorKind::DiskError, "bad").into_global().is_error_global());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_os_codes() {
        let err = io::Error::from_raw_os_error(36);
        let error = ProcessError::io(IoSide::Destination, Path::new("/x"), &err);
        assert_eq!(error.kind, ErrorKind::PathTooLong);
        assert_eq!(error.os_code, Some(36));

        let err = io::Error::from_raw_os_error(28);
        assert_eq!(
            ProcessError::io(IoSide::Destination, Path::new("/x"), &err).kind,
            ErrorKind::NotEnoughSpace
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::DestPathIsASubPath.to_string(), "DestPathIsASubPath");
        let error = ProcessError::new(ErrorKind::DiskError, "bad sector");
        assert_eq!(error.to_string(), "DiskError: bad sector");
    }
}
