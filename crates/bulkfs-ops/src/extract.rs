//! Zip archive extraction.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;
use zip::result::ZipError;

use bulkfs_core::{
    ErrorKind, IoSide, PathItem, ProcessError, ProcessErrorItem, ProcessOptions,
};
use bulkfs_walk::EnumerationOrder;

use crate::copy::copy_stream;
use crate::operation::{CheckContext, Expansion, Operation, OperationKind, Outcome};
use crate::preflight::{check_free_space, check_volume};

/// Extracts one zip archive into a destination folder that must not exist.
///
/// Loading lists the archive's central directory; each queued item is one
/// member, streamed to disk when processed. The archive stays open between
/// items and is closed when the queue drains or the operation is dropped.
pub struct ExtractOperation {
    destination: PathBuf,
    archive: Option<ZipArchive<File>>,
    /// Member name (as queued) -> index in the archive.
    members: HashMap<String, usize>,
}

impl ExtractOperation {
    /// Create an extraction into `destination`, which must be absolute.
    pub fn new(destination: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let destination = destination.as_ref();
        if !destination.is_absolute() {
            return Err(ProcessError::at(
                ErrorKind::PathNotFound,
                destination,
                "destination path must be absolute",
            ));
        }

        Ok(Self {
            destination: destination.to_path_buf(),
            archive: None,
            members: HashMap::new(),
        })
    }

    /// The destination folder.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn list_members(
        &mut self,
        seed: &PathItem,
    ) -> Result<Vec<Result<PathItem, ProcessErrorItem>>, ProcessError> {
        let path = seed.path();
        let file = File::open(path).map_err(|e| ProcessError::io(IoSide::Source, path, &e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

        let mut items = Vec::with_capacity(archive.len());
        self.members.clear();
        for index in 0..archive.len() {
            let member = archive.by_index_raw(index).map_err(|e| zip_error(path, e))?;

            let Some(name) = member.enclosed_name() else {
                let error = ProcessError::at(
                    ErrorKind::AccessDenied,
                    path,
                    format!("member {} escapes the destination", member.name()),
                );
                tracing::warn!(member = member.name(), "Unsafe archive member");
                items.push(Err(ProcessErrorItem::new(seed.clone(), error)));
                continue;
            };

            let name = name.to_string_lossy().into_owned();
            if name.is_empty() {
                continue;
            }

            match PathItem::with_known_size(seed, &name, member.is_dir(), Some(member.size())) {
                Ok(item) => {
                    self.members.insert(name, index);
                    items.push(Ok(item));
                }
                Err(error) => items.push(Err(ProcessErrorItem::new(seed.clone(), error))),
            }
        }

        tracing::debug!(archive = %path.display(), members = self.members.len(), "Listed archive");
        self.archive = Some(archive);
        Ok(items)
    }
}

impl Operation for ExtractOperation {
    fn kind(&self, _options: &ProcessOptions) -> OperationKind {
        OperationKind::Extract
    }

    fn enumeration_order(&self, _options: &ProcessOptions) -> Option<EnumerationOrder> {
        Some(EnumerationOrder::ParentThenChildren)
    }

    fn filter_seeds(&self) -> bool {
        false
    }

    fn validate(&self, seeds: &[PathItem], _options: &ProcessOptions) -> Result<(), ProcessError> {
        match seeds {
            [archive] if !archive.is_directory() => Ok(()),
            _ => Err(ProcessError::invalid_state(
                "Extraction takes exactly one archive file",
            )),
        }
    }

    fn expand(
        &mut self,
        seed: &PathItem,
        _options: &ProcessOptions,
    ) -> Result<Expansion, ProcessError> {
        let items = self.list_members(seed)?;
        Ok(Box::new(items.into_iter()))
    }

    fn pre_flight_check(&mut self, context: &CheckContext<'_>) -> Result<(), ProcessError> {
        match fs::symlink_metadata(&self.destination) {
            Ok(_) => {
                return Err(ProcessError::at(
                    ErrorKind::FileSystemEntryAlreadyExists,
                    &self.destination,
                    "extraction destination already exists",
                )
                .into_global());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(
                    ProcessError::io(IoSide::DestinationRead, &self.destination, &e).into_global(),
                );
            }
        }

        for seed in context.seeds {
            check_volume(context.volumes, seed.path())?;
        }
        let volume = check_volume(context.volumes, &self.destination)?;
        check_free_space(context.volumes, &volume, context.total_size)
    }

    fn do_work(
        &mut self,
        item: &PathItem,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        let target = self.destination.join(item.relative_path());
        if item.is_directory() {
            fs::create_dir_all(&target)
                .map_err(|e| ProcessError::io(IoSide::Destination, &target, &e))?;
            return Ok(Outcome::Done(0));
        }

        let archive_path = item.parent().map_or(item.path(), PathItem::path);
        let index = *self.members.get(item.relative_path()).ok_or_else(|| {
            ProcessError::at(ErrorKind::PathNotFound, item.path(), "not a member of the archive")
        })?;
        let archive = self
            .archive
            .as_mut()
            .ok_or_else(|| ProcessError::invalid_state("Archive is not open"))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ProcessError::io(IoSide::Destination, parent, &e))?;
        }

        let mut member = archive
            .by_index(index)
            .map_err(|e| zip_error(archive_path, e))?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| ProcessError::io(IoSide::Destination, &target, &e))?;

        let copied = copy_stream(
            &mut member,
            &mut writer,
            options.buffer_size,
            item.path(),
            &target,
        );
        drop(writer);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(error) => {
                let _ = fs::remove_file(&target);
                return Err(error);
            }
        };

        #[cfg(unix)]
        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| ProcessError::io(IoSide::Destination, &target, &e))?;
        }

        Ok(Outcome::Done(bytes))
    }

    fn complete(&mut self, _options: &ProcessOptions) -> Result<(), ProcessError> {
        self.archive = None;
        Ok(())
    }
}

/// Classify an archive library failure.
fn zip_error(path: &Path, error: ZipError) -> ProcessError {
    match error {
        ZipError::Io(e) => ProcessError::io(IoSide::Source, path, &e),
        ZipError::InvalidPassword => {
            ProcessError::at(ErrorKind::EncryptionFailed, path, "invalid archive password")
        }
        ZipError::UnsupportedArchive(detail) if detail == ZipError::PASSWORD_REQUIRED => {
            ProcessError::at(ErrorKind::EncryptionFailed, path, detail)
        }
        ZipError::FileNotFound => {
            ProcessError::at(ErrorKind::PathNotFound, path, "archive member not found")
        }
        other => ProcessError::at(ErrorKind::DiskError, path, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_archive_required() {
        let op = ExtractOperation::new("/tmp/out").unwrap();
        let options = ProcessOptions::default();
        assert_eq!(
            op.validate(&[], &options).unwrap_err().kind,
            ErrorKind::WrongStatus
        );
    }

    #[test]
    fn test_password_errors_are_encryption_failures() {
        let err = zip_error(Path::new("/a.zip"), ZipError::InvalidPassword);
        assert_eq!(err.kind, ErrorKind::EncryptionFailed);

        let err = zip_error(
            Path::new("/a.zip"),
            ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED),
        );
        assert_eq!(err.kind, ErrorKind::EncryptionFailed);
    }
}
