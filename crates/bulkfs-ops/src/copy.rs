//! Copy and move operation.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use bulkfs_core::{ErrorKind, IoSide, PathItem, ProcessError, ProcessOptions, TransferMode};
use bulkfs_walk::EnumerationOrder;

use crate::conflict::{ConflictResolver, ResolvedPath};
use crate::operation::{CheckContext, Operation, OperationKind, Outcome};
use crate::preflight::{check_free_space, check_volume};

/// Copies (or moves) seeds into a destination folder.
///
/// Folders are created before their contents. Each file is streamed
/// through a fixed buffer; a moved file is renamed when source and
/// destination share a volume and copied, verified and removed otherwise.
/// Moved source folders are removed once the queue drains.
#[derive(Debug)]
pub struct CopyOperation {
    destination: PathBuf,
    resolver: ConflictResolver,
    /// Source folder -> the folder its contents go to.
    placed: HashMap<PathBuf, PathBuf>,
    /// Source folders whose contents are skipped.
    skipped: HashSet<PathBuf>,
    /// Source folders to remove after a move.
    emptied: Vec<PathBuf>,
}

impl CopyOperation {
    /// Create a copy into `destination`, which must be absolute.
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
            resolver: ConflictResolver::new(),
            placed: HashMap::new(),
            skipped: HashSet::new(),
            emptied: Vec::new(),
        })
    }

    /// The destination folder.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where `item` lands before conflict resolution.
    fn target_for(&self, item: &PathItem) -> PathBuf {
        item.parent()
            .and_then(|parent| self.placed.get(parent.path()))
            .map(|folder| folder.join(item.relative_path()))
            .unwrap_or_else(|| self.destination.join(item.relative_to_root()))
    }

    fn in_skipped_folder(&self, item: &PathItem) -> bool {
        item.parent()
            .is_some_and(|parent| self.skipped.contains(parent.path()))
    }

    fn place_folder(
        &mut self,
        item: &PathItem,
        target: &Path,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        fs::create_dir_all(target).map_err(|e| ProcessError::io(IoSide::Destination, target, &e))?;
        self.placed
            .insert(item.path().to_path_buf(), target.to_path_buf());
        if options.transfer_mode == TransferMode::Move {
            self.emptied.push(item.path().to_path_buf());
        }
        Ok(Outcome::Done(0))
    }

    fn place_file(
        &mut self,
        item: &PathItem,
        target: &Path,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ProcessError::io(IoSide::Destination, parent, &e))?;
        }

        let bytes = match options.transfer_mode {
            TransferMode::Copy => copy_file(item.path(), target, options)?,
            TransferMode::Move => move_file(item.path(), target, options)?,
        };
        Ok(Outcome::Done(bytes))
    }
}

impl Operation for CopyOperation {
    fn kind(&self, options: &ProcessOptions) -> OperationKind {
        match options.transfer_mode {
            TransferMode::Copy => OperationKind::Copy,
            TransferMode::Move => OperationKind::Move,
        }
    }

    fn enumeration_order(&self, _options: &ProcessOptions) -> Option<EnumerationOrder> {
        Some(EnumerationOrder::FilesThenDirectories)
    }

    fn pre_flight_check(&mut self, context: &CheckContext<'_>) -> Result<(), ProcessError> {
        let destination_volume = check_volume(context.volumes, &self.destination)?;

        let mut same_volume = true;
        for seed in context.seeds {
            let source_volume = check_volume(context.volumes, seed.path())?;
            same_volume &= source_volume == destination_volume;

            let source_folder = seed.parent().map(PathItem::path);
            if source_folder == Some(self.destination.as_path())
                && !context.options.auto_rename_files
            {
                return Err(ProcessError::at(
                    ErrorKind::SourceAndDestPathAreEqual,
                    seed.path(),
                    "source is already in the destination folder",
                ));
            }
            if seed.is_directory() && self.destination.starts_with(seed.path()) {
                return Err(ProcessError::at(
                    ErrorKind::DestPathIsASubPath,
                    &self.destination,
                    format!("destination is inside {}", seed.path().display()),
                ));
            }
        }

        // Renames within one volume need no room.
        if context.options.transfer_mode == TransferMode::Move && same_volume {
            return Ok(());
        }
        check_free_space(context.volumes, &destination_volume, context.total_size)
    }

    fn do_work(
        &mut self,
        item: &PathItem,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        if self.in_skipped_folder(item) {
            if item.is_directory() {
                self.skipped.insert(item.path().to_path_buf());
            }
            return Ok(Outcome::Skipped);
        }

        let candidate = self.target_for(item);
        let resolved = self
            .resolver
            .resolve(item.is_directory(), &candidate, options)?;

        let Some(target) = resolved.path().map(Path::to_path_buf) else {
            tracing::debug!(path = %item.path().display(), "Skipping conflicting item");
            if item.is_directory() {
                self.skipped.insert(item.path().to_path_buf());
            }
            return Ok(Outcome::Skipped);
        };

        if let ResolvedPath::Rename(_) = resolved {
            tracing::info!(
                from = %candidate.display(),
                to = %target.display(),
                "Destination renamed"
            );
        }

        let outcome = if item.is_directory() {
            self.place_folder(item, &target, options)?
        } else {
            self.place_file(item, &target, options)?
        };
        self.resolver.record(&target);
        Ok(outcome)
    }

    fn complete(&mut self, options: &ProcessOptions) -> Result<(), ProcessError> {
        if options.transfer_mode != TransferMode::Move {
            return Ok(());
        }

        // Deepest first, so parents are empty by the time they are removed.
        self.emptied
            .sort_by_key(|path| std::cmp::Reverse(path.components().count()));
        for folder in self.emptied.drain(..) {
            if let Err(e) = fs::remove_dir(&folder) {
                tracing::warn!(
                    path = %folder.display(),
                    error = %e,
                    "Moved folder left in place"
                );
            }
        }
        Ok(())
    }
}

/// Stream `reader` into `writer` through a buffer of `buffer_size` bytes.
pub(crate) fn copy_stream(
    reader: &mut impl Read,
    writer: &mut impl Write,
    buffer_size: usize,
    source: &Path,
    destination: &Path,
) -> Result<u64, ProcessError> {
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProcessError::io(IoSide::Source, source, &e)),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|e| ProcessError::io(IoSide::Destination, destination, &e))?;
        total += read as u64;
    }
    writer
        .flush()
        .map_err(|e| ProcessError::io(IoSide::Destination, destination, &e))?;
    Ok(total)
}

/// Copy one file, keeping its permissions and (optionally) timestamps.
///
/// A partially written destination is removed on failure.
fn copy_file(source: &Path, destination: &Path, options: &ProcessOptions) -> Result<u64, ProcessError> {
    let metadata =
        fs::metadata(source).map_err(|e| ProcessError::io(IoSide::Source, source, &e))?;

    let result = {
        let mut reader =
            File::open(source).map_err(|e| ProcessError::io(IoSide::Source, source, &e))?;
        let mut writer = File::create(destination)
            .map_err(|e| ProcessError::io(IoSide::Destination, destination, &e))?;
        copy_stream(
            &mut reader,
            &mut writer,
            options.buffer_size,
            source,
            destination,
        )
    };

    let bytes = match result {
        Ok(bytes) => bytes,
        Err(error) => {
            let _ = fs::remove_file(destination);
            return Err(error);
        }
    };

    if options.preserve_timestamps {
        let accessed = FileTime::from_last_access_time(&metadata);
        let modified = FileTime::from_last_modification_time(&metadata);
        filetime::set_file_times(destination, accessed, modified)
            .map_err(|e| ProcessError::io(IoSide::Destination, destination, &e))?;
    }
    fs::set_permissions(destination, metadata.permissions())
        .map_err(|e| ProcessError::io(IoSide::Destination, destination, &e))?;

    Ok(bytes)
}

/// Move one file: rename when possible, otherwise copy, verify and remove.
fn move_file(source: &Path, destination: &Path, options: &ProcessOptions) -> Result<u64, ProcessError> {
    let size = fs::symlink_metadata(source)
        .map_err(|e| ProcessError::io(IoSide::Source, source, &e))?
        .len();

    match fs::rename(source, destination) {
        Ok(()) => return Ok(size),
        Err(e) => {
            tracing::debug!(
                source = %source.display(),
                error = %e,
                "Rename failed, falling back to copy"
            );
        }
    }

    let bytes = copy_file(source, destination, options)?;
    if let Err(error) = verify_copy(source, destination, bytes, options) {
        let _ = fs::remove_file(destination);
        return Err(error);
    }

    fs::remove_file(source).map_err(|e| ProcessError::io(IoSide::Source, source, &e))?;
    Ok(bytes)
}

fn verify_copy(
    source: &Path,
    destination: &Path,
    expected: u64,
    options: &ProcessOptions,
) -> Result<(), ProcessError> {
    let written = fs::metadata(destination)
        .map_err(|e| ProcessError::io(IoSide::DestinationRead, destination, &e))?
        .len();
    if written != expected {
        return Err(ProcessError::at(
            ErrorKind::DiskError,
            destination,
            format!("wrote {written} bytes, expected {expected}"),
        ));
    }

    if options.verify_after_move
        && hash_file(source, IoSide::Source)? != hash_file(destination, IoSide::DestinationRead)?
    {
        return Err(ProcessError::at(
            ErrorKind::DiskError,
            destination,
            "content differs from source after copy",
        ));
    }
    Ok(())
}

fn hash_file(path: &Path, side: IoSide) -> Result<blake3::Hash, ProcessError> {
    let mut file = File::open(path).map_err(|e| ProcessError::io(side, path, &e))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ProcessError::io(side, path, &e))?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_destination_rejected() {
        let err = CopyOperation::new("relative/dest").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
    }

    #[test]
    fn test_copy_stream_small_buffer() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut reader = data.as_slice();
        let mut out = Vec::new();

        let copied = copy_stream(&mut reader, &mut out, 7, Path::new("/a"), Path::new("/b")).unwrap();
        assert_eq!(copied, 10_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_file_keeps_mtime() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("old.txt");
        fs::write(&source, b"content").unwrap();
        let past = FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&source, past).unwrap();

        let dest = temp.path().join("copy.txt");
        let bytes = copy_file(&source, &dest, &ProcessOptions::default()).unwrap();

        assert_eq!(bytes, 7);
        let copied = fs::metadata(&dest).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied), past);
    }

    #[test]
    fn test_move_file_with_verification() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("moving.bin");
        fs::write(&source, vec![7u8; 4096]).unwrap();
        let dest = temp.path().join("moved.bin");

        let options = ProcessOptions::builder()
            .transfer_mode(TransferMode::Move)
            .verify_after_move(true)
            .build()
            .unwrap();
        let bytes = move_file(&source, &dest, &options).unwrap();

        assert_eq!(bytes, 4096);
        assert!(!source.exists());
        assert_eq!(fs::read(&dest).unwrap().len(), 4096);
    }

    #[test]
    fn test_verify_detects_changed_content() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        let dest = temp.path().join("dest.bin");
        fs::write(&source, b"abcd").unwrap();
        fs::write(&dest, b"abcx").unwrap();

        let verified = ProcessOptions::builder()
            .verify_after_move(true)
            .build()
            .unwrap();
        let err = verify_copy(&source, &dest, 4, &verified).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DiskError);

        // Without hashing only the length is compared.
        verify_copy(&source, &dest, 4, &ProcessOptions::default()).unwrap();
        let err = verify_copy(&source, &dest, 5, &ProcessOptions::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DiskError);

        fs::write(&dest, b"abcd").unwrap();
        verify_copy(&source, &dest, 4, &verified).unwrap();
    }
}
