//! Building processes from caller requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bulkfs_core::{
    ErrorKind, PathItem, ProcessError, ProcessOptions, RemoveOption, TransferMode,
};

use crate::copy::CopyOperation;
use crate::deletion::DeleteOperation;
use crate::engine::{Process, ProcessEngine};
use crate::extract::ExtractOperation;
use crate::operation::OperationKind;

/// A request to run one operation, as supplied by a caller: the source
/// paths as strings plus the correlation GUID of the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Unique ID of this request.
    pub id: Uuid,
    /// Correlation GUID of the operation to run.
    pub operation: Uuid,
    /// Absolute source paths.
    pub sources: Vec<String>,
    /// Absolute destination folder, for operations that write one.
    pub destination: Option<String>,
}

impl ProcessRequest {
    /// Create a request for `kind` with a fresh ID.
    pub fn new<I, S>(kind: OperationKind, sources: I, destination: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            operation: kind.guid(),
            sources: sources.into_iter().map(Into::into).collect(),
            destination,
        }
    }

    /// The operation this request names, if the GUID is known.
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::from_guid(self.operation)
    }

    /// Parse the request into a ready-to-start process.
    ///
    /// The options' transfer mode and remove option are set from the
    /// requested operation.
    pub fn into_process(
        self,
        mut options: ProcessOptions,
    ) -> Result<Box<dyn Process>, ProcessError> {
        let kind = self.kind().ok_or_else(|| {
            ProcessError::invalid_state(format!("Unknown operation {}", self.operation))
        })?;
        tracing::debug!(id = %self.id, %kind, sources = self.sources.len(), "Building process");

        let seeds = PathItem::seeds(&self.sources)?;
        let destination = match self.destination.as_deref().map(str::trim) {
            Some(destination) if !destination.is_empty() => destination.to_string(),
            _ if kind.needs_destination() => {
                return Err(ProcessError::new(
                    ErrorKind::PathNotFound,
                    format!("{kind} requires a destination"),
                ));
            }
            _ => String::new(),
        };

        let process: Box<dyn Process> = match kind {
            OperationKind::Copy | OperationKind::Move => {
                options.transfer_mode = if kind == OperationKind::Move {
                    TransferMode::Move
                } else {
                    TransferMode::Copy
                };
                let operation = CopyOperation::new(&destination)?;
                Box::new(ProcessEngine::new(operation, options, seeds)?)
            }
            OperationKind::Delete | OperationKind::Recycle | OperationKind::ClearTrash => {
                options.remove_option = match kind {
                    OperationKind::Delete => RemoveOption::Delete,
                    OperationKind::Recycle => RemoveOption::Recycle,
                    _ => RemoveOption::Clear,
                };
                Box::new(ProcessEngine::new(DeleteOperation::new(), options, seeds)?)
            }
            OperationKind::Extract => {
                let operation = ExtractOperation::new(&destination)?;
                Box::new(ProcessEngine::new(operation, options, seeds)?)
            }
        };
        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProcessState;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_guid() {
        let request = ProcessRequest {
            id: Uuid::new_v4(),
            operation: Uuid::nil(),
            sources: vec![],
            destination: None,
        };
        assert!(request.kind().is_none());
        let err = request.into_process(ProcessOptions::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::WrongStatus);
    }

    #[test]
    fn test_copy_requires_destination() {
        let request = ProcessRequest::new(OperationKind::Copy, Vec::<String>::new(), None);
        let err = request.into_process(ProcessOptions::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
    }

    #[test]
    fn test_move_request_sets_transfer_mode() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        let dest = temp.path().join("out");

        let request = ProcessRequest::new(
            OperationKind::Move,
            [file.to_string_lossy().to_string()],
            Some(dest.to_string_lossy().to_string()),
        );
        let process = request.into_process(ProcessOptions::default()).unwrap();
        assert_eq!(process.kind(), OperationKind::Move);
        assert_eq!(process.options().transfer_mode, TransferMode::Move);
        assert_eq!(process.state(), ProcessState::Idle);
    }

    #[test]
    fn test_clear_trash_with_sources_fails() {
        let temp = TempDir::new().unwrap();
        let request = ProcessRequest::new(
            OperationKind::ClearTrash,
            [temp.path().to_string_lossy().to_string()],
            None,
        );
        let err = request.into_process(ProcessOptions::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::WrongStatus);
    }
}
