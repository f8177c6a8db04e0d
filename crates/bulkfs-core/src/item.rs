//! Path items taking part in a process.

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use compact_str::CompactString;

use crate::error::{ErrorKind, IoSide, ProcessError};

/// One filesystem entry (or archive member) tracked by a process.
///
/// Items are cheap to clone and immutable once built. Each item keeps a
/// link to its parent so the absolute path can be rebuilt by walking up to
/// the root; the result is cached on first use, as is the file size.
#[derive(Clone)]
pub struct PathItem(Arc<Inner>);

struct Inner {
    relative_path: CompactString,
    /// Strong link: links only point upward, so they cannot form a cycle,
    /// and a queued item must keep its ancestors alive to rebuild its path
    /// after the walker has dropped them.
    parent: Option<PathItem>,
    is_directory: bool,
    contents_listed: bool,
    size: OnceLock<Option<u64>>,
    absolute: OnceLock<PathBuf>,
}

impl PathItem {
    fn build(
        parent: Option<&PathItem>,
        relative_path: &str,
        is_directory: bool,
        contents_listed: bool,
        size: OnceLock<Option<u64>>,
    ) -> Result<Self, ProcessError> {
        if relative_path.trim().is_empty() {
            return Err(ProcessError::new(
                ErrorKind::PathNotFound,
                "Path name cannot be empty",
            ));
        }
        if parent.is_some() && Path::new(relative_path).has_root() {
            return Err(ProcessError::new(
                ErrorKind::PathNotFound,
                format!("Child path must be relative: {relative_path}"),
            ));
        }

        Ok(Self(Arc::new(Inner {
            relative_path: relative_path.into(),
            parent: parent.cloned(),
            is_directory,
            contents_listed,
            size,
            absolute: OnceLock::new(),
        })))
    }

    /// Create a root path: a volume root or the directory containing a source.
    pub fn root(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let path = path.as_ref();
        let text = path.to_string_lossy();
        Self::build(None, &text, true, false, OnceLock::new())
    }

    /// Create an item below `parent` whose size is read lazily from the OS.
    pub fn child(parent: &PathItem, name: &str, is_directory: bool) -> Result<Self, ProcessError> {
        Self::build(Some(parent), name, is_directory, false, OnceLock::new())
    }

    /// Create an item produced by walking `parent`.
    ///
    /// Directories produced by a walk have their contents queued alongside
    /// them, so they contribute no bytes of their own to a size account.
    pub fn enumerated(
        parent: &PathItem,
        name: &str,
        is_directory: bool,
    ) -> Result<Self, ProcessError> {
        Self::build(Some(parent), name, is_directory, is_directory, OnceLock::new())
    }

    /// The same entry, marked as having its contents enumerated.
    pub fn as_listed(&self) -> PathItem {
        if !self.0.is_directory || self.0.contents_listed {
            return self.clone();
        }
        Self(Arc::new(Inner {
            relative_path: self.0.relative_path.clone(),
            parent: self.0.parent.clone(),
            is_directory: true,
            contents_listed: true,
            size: OnceLock::from(None),
            absolute: OnceLock::new(),
        }))
    }

    /// Create an item whose size is already known (e.g. an archive member).
    pub fn with_known_size(
        parent: &PathItem,
        name: &str,
        is_directory: bool,
        size: Option<u64>,
    ) -> Result<Self, ProcessError> {
        let size = if is_directory { None } else { size };
        Self::build(Some(parent), name, is_directory, is_directory, OnceLock::from(size))
    }

    /// Parse an absolute source path into an item below its containing directory.
    pub fn seed(raw: &str) -> Result<Self, ProcessError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProcessError::new(
                ErrorKind::PathNotFound,
                "Source path cannot be empty",
            ));
        }

        let path = Path::new(trimmed);
        if !path.is_absolute() {
            return Err(ProcessError::at(
                ErrorKind::PathNotFound,
                path,
                "source path must be absolute",
            ));
        }

        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(ProcessError::at(
                ErrorKind::WrongStatus,
                path,
                "a volume root cannot be used as a source",
            ));
        };

        let metadata =
            fs::symlink_metadata(path).map_err(|e| ProcessError::io(IoSide::Source, path, &e))?;

        let root = Self::root(parent)?;
        Self::child(&root, &name.to_string_lossy(), metadata.is_dir())
    }

    /// Parse a list of absolute source paths.
    pub fn seeds<I, S>(raw: I) -> Result<Vec<Self>, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| Self::seed(s.as_ref())).collect()
    }

    /// The path relative to the parent (the absolute path for roots).
    pub fn relative_path(&self) -> &str {
        &self.0.relative_path
    }

    /// The parent item, if this is not a root.
    pub fn parent(&self) -> Option<&PathItem> {
        self.0.parent.as_ref()
    }

    /// Check if this item has no parent.
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Check if this item is a directory.
    pub fn is_directory(&self) -> bool {
        self.0.is_directory
    }

    /// Check if this directory's contents were enumerated next to it.
    pub fn contents_listed(&self) -> bool {
        self.0.contents_listed
    }

    /// The absolute path, built from the parent chain.
    pub fn path(&self) -> &Path {
        self.0.absolute.get_or_init(|| match &self.0.parent {
            Some(parent) => parent.path().join(self.0.relative_path.as_str()),
            None => PathBuf::from(self.0.relative_path.as_str()),
        })
    }

    /// The root this item hangs from.
    pub fn root_item(&self) -> &PathItem {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// The path below the root, e.g. `docs/a.txt` for `/src/docs/a.txt`
    /// seeded from `/src`. Empty for roots.
    pub fn relative_to_root(&self) -> PathBuf {
        let mut parts = Vec::new();
        let mut current = self;
        while let Some(parent) = current.parent() {
            parts.push(current.relative_path());
            current = parent;
        }
        parts.iter().rev().collect()
    }

    /// Number of links between this item and its root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Size in bytes, `None` for directories or when the entry cannot be read.
    pub fn size(&self) -> Option<u64> {
        if self.0.is_directory {
            return None;
        }
        *self
            .0
            .size
            .get_or_init(|| fs::symlink_metadata(self.path()).ok().map(|m| m.len()))
    }

    /// Bytes this item adds to a queue's size account; `None` means unknown.
    pub fn queued_size(&self) -> Option<u64> {
        if self.0.is_directory {
            self.0.contents_listed.then_some(0)
        } else {
            self.size()
        }
    }
}

impl PartialEq for PathItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.path() == other.path()
    }
}

impl Eq for PathItem {}

impl Hash for PathItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path().hash(state);
    }
}

impl fmt::Debug for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathItem")
            .field("path", &self.path())
            .field("is_directory", &self.0.is_directory)
            .finish()
    }
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}
