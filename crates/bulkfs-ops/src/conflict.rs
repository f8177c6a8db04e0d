//! Conflict detection and resolution for destination paths.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bulkfs_core::{ErrorKind, IoSide, ProcessError, ProcessOptions};

/// Where an item should be written.
///
/// An unresolvable conflict is reported as an error rather than a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// Write to the candidate path (it is free, or is a folder to merge
    /// into, or a file to overwrite).
    Proceed(PathBuf),
    /// Write to a fresh name next to the candidate.
    Rename(PathBuf),
    /// Leave the item alone.
    Skip,
}

impl ResolvedPath {
    /// The path to write to, unless skipped.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Proceed(path) | Self::Rename(path) => Some(path),
            Self::Skip => None,
        }
    }
}

/// What sits at a destination path right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Existing {
    Nothing,
    File,
    Directory,
}

fn existing(path: &Path) -> Result<Existing, ProcessError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(Existing::Directory),
        Ok(_) => Ok(Existing::File),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Existing::Nothing),
        Err(e) => Err(ProcessError::io(IoSide::DestinationRead, path, &e)),
    }
}

/// Resolves destination conflicts for one process.
///
/// Remembers every path recorded as written so two items never resolve to
/// the same destination, even if the first one has since been removed.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    produced: HashSet<PathBuf>,
}

impl ConflictResolver {
    /// Create a resolver with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide where an item landing on `candidate` goes.
    pub fn resolve(
        &mut self,
        source_is_directory: bool,
        candidate: &Path,
        options: &ProcessOptions,
    ) -> Result<ResolvedPath, ProcessError> {
        let mut found = existing(candidate)?;
        if found == Existing::Nothing && self.produced.contains(candidate) {
            found = if source_is_directory {
                Existing::Directory
            } else {
                Existing::File
            };
        }

        let resolved = match (source_is_directory, found) {
            (_, Existing::Nothing) => ResolvedPath::Proceed(candidate.to_path_buf()),

            // Folders merge into folders unless every conflict is renamed.
            (true, Existing::Directory) if options.auto_rename_files => {
                ResolvedPath::Rename(self.fresh_name(candidate, true, options)?)
            }
            (true, Existing::Directory) => ResolvedPath::Proceed(candidate.to_path_buf()),

            (true, Existing::File) if options.auto_rename_files => {
                ResolvedPath::Rename(self.fresh_name(candidate, true, options)?)
            }
            (true, Existing::File) if options.ignore_folder_file_name_conflicts => {
                ResolvedPath::Skip
            }
            (true, Existing::File) => {
                return Err(ProcessError::at(
                    ErrorKind::ItemIsNotDirectory,
                    candidate,
                    "a file exists where a folder is being created",
                ));
            }

            (false, _) if options.auto_rename_files => {
                ResolvedPath::Rename(self.fresh_name(candidate, false, options)?)
            }
            (false, Existing::Directory) if options.ignore_folder_file_name_conflicts => {
                ResolvedPath::Skip
            }
            (false, Existing::File) if options.overwrite_existing => {
                ResolvedPath::Proceed(candidate.to_path_buf())
            }
            (false, _) => {
                return Err(ProcessError::at(
                    ErrorKind::FileSystemEntryAlreadyExists,
                    candidate,
                    "destination already exists",
                ));
            }
        };

        Ok(resolved)
    }

    /// Mark `path` as written, so later items never resolve onto it.
    ///
    /// Called only once the item landed; a failed attempt leaves the path
    /// free for a retry.
    pub fn record(&mut self, path: &Path) {
        self.produced.insert(path.to_path_buf());
    }

    /// Probe `name (2).ext`, `name (3).ext`, ... for a free path.
    fn fresh_name(
        &self,
        candidate: &Path,
        is_directory: bool,
        options: &ProcessOptions,
    ) -> Result<PathBuf, ProcessError> {
        let parent = candidate.parent().unwrap_or(Path::new(""));
        let (stem, extension) = split_name(candidate, is_directory);

        for index in 2..=options.max_rename_attempts.saturating_add(1) {
            let mut name = stem.clone();
            name.push(format!(" ({index})"));
            if let Some(ext) = &extension {
                name.push(".");
                name.push(ext);
            }

            let path = parent.join(&name);
            if self.produced.contains(&path) {
                continue;
            }
            if existing(&path)? == Existing::Nothing {
                tracing::debug!(from = %candidate.display(), to = %path.display(), "Auto-renamed");
                return Ok(path);
            }
        }

        Err(ProcessError::at(
            ErrorKind::FileRenamingFailed,
            candidate,
            format!(
                "no free name after {} attempts",
                options.max_rename_attempts
            ),
        ))
    }
}

/// Split a file name into stem and extension; folder names are kept whole.
fn split_name(path: &Path, is_directory: bool) -> (OsString, Option<OsString>) {
    let name = path.file_name().unwrap_or_default();
    if is_directory {
        return (name.to_os_string(), None);
    }
    let stem = path.file_stem().unwrap_or(name).to_os_string();
    let extension = path.extension().map(|e| e.to_os_string());
    (stem, extension)
}
