//! JWalk-based ordered directory walker.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs;

use jwalk::{DirEntry, Parallelism, WalkDirGeneric};

use bulkfs_core::{ErrorKind, IoSide, PathItem, ProcessError, ProcessErrorItem};

use crate::order::EnumerationOrder;

type Entry = DirEntry<((), ())>;
type EntryResult = Result<Entry, jwalk::Error>;

/// Lazy recursive walk of one root, yielding items in a fixed order.
///
/// The walk is one-shot: build a new enumerator to walk again. Symbolic
/// links are yielded as plain entries and never descended into. Failures
/// below the root are yielded as error items and the walk continues; a root
/// that cannot be read fails [`Enumerator::new`].
pub struct Enumerator {
    walker: Box<dyn Iterator<Item = EntryResult>>,
    order: EnumerationOrder,
    root: PathItem,
    /// Directory items on the path to the current entry, indexed by depth.
    ancestors: Vec<PathItem>,
    /// Directories waiting for their contents (post-order only).
    pending: Vec<(usize, PathItem)>,
    /// Depth of a rejected directory whose contents are dropped.
    skip_below: Option<usize>,
    ready: VecDeque<Result<PathItem, ProcessErrorItem>>,
    finished: bool,
}

impl Enumerator {
    /// Start walking `root` in the given order.
    pub fn new(root: &PathItem, order: EnumerationOrder) -> Result<Self, ProcessError> {
        let path = root.path();
        let metadata =
            fs::symlink_metadata(path).map_err(|e| ProcessError::io(IoSide::Source, path, &e))?;

        if !metadata.is_dir() {
            // Files and links are their own walk.
            let mut ready = VecDeque::new();
            ready.push_back(Ok(root.clone()));
            return Ok(Self {
                walker: Box::new(std::iter::empty()),
                order,
                root: root.clone(),
                ancestors: Vec::new(),
                pending: Vec::new(),
                skip_below: None,
                ready,
                finished: true,
            });
        }

        // Surface an unreadable root now rather than as an entry error.
        fs::read_dir(path).map_err(|e| ProcessError::io(IoSide::Source, path, &e))?;

        let walker = WalkDirGeneric::<((), ())>::new(path)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.sort_by(|a, b| compare_entries(order, a, b));
            });

        tracing::debug!(root = %path.display(), %order, "Walking directory");

        Ok(Self {
            walker: Box::new(walker.into_iter()),
            order,
            root: root.as_listed(),
            ancestors: Vec::new(),
            pending: Vec::new(),
            skip_below: None,
            ready: VecDeque::new(),
            finished: false,
        })
    }

    /// The ordering policy of this walk.
    pub fn order(&self) -> EnumerationOrder {
        self.order
    }

    fn accept(&mut self, entry: Entry) {
        let depth = entry.depth();
        let post_order = self.order.is_post_order();

        match self.skip_below {
            Some(rejected) if depth > rejected => return,
            Some(_) => self.skip_below = None,
            None => {}
        }

        if post_order {
            // Anything pending at this depth or deeper has no more descendants.
            while self.pending.last().is_some_and(|(d, _)| *d >= depth) {
                if let Some((_, dir)) = self.pending.pop() {
                    self.ready.push_back(Ok(dir));
                }
            }
        }

        let item = if depth == 0 {
            self.ancestors.clear();
            self.root.clone()
        } else {
            self.ancestors.truncate(depth);
            let Some(parent) = self.ancestors.last() else {
                return;
            };
            let name = entry.file_name().to_string_lossy();
            match PathItem::enumerated(parent, &name, entry.file_type().is_dir()) {
                Ok(item) => item,
                Err(error) => {
                    // Without an item its contents have no parent to hang from.
                    if entry.file_type().is_dir() {
                        self.skip_below = Some(depth);
                    }
                    let rejected =
                        PathItem::root(entry.path()).unwrap_or_else(|_| parent.clone());
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %error,
                        "Unusable entry name"
                    );
                    self.ready.push_back(Err(ProcessErrorItem::new(rejected, error)));
                    return;
                }
            }
        };

        if let Some(error) = entry.read_children_error.as_ref() {
            self.reject_at(&item, error);
        }

        if item.is_directory() {
            self.ancestors.push(item.clone());
            if post_order {
                self.pending.push((depth, item));
                return;
            }
        }
        self.ready.push_back(Ok(item));
    }

    fn reject(&mut self, error: jwalk::Error) {
        let item = error
            .path()
            .and_then(|path| PathItem::root(path).ok())
            .unwrap_or_else(|| self.root.clone());
        self.reject_at(&item, &error);
    }

    fn reject_at(&mut self, item: &PathItem, error: &jwalk::Error) {
        let item = item.clone();
        let process_error = match error.io_error() {
            Some(io_error) => ProcessError::io(IoSide::Source, item.path(), io_error),
            None => ProcessError::at(ErrorKind::UnknownError, item.path(), error),
        };

        tracing::warn!(path = %item.path().display(), error = %process_error, "Walk error");
        self.ready
            .push_back(Err(ProcessErrorItem::new(item, process_error)));
    }
}

impl Iterator for Enumerator {
    type Item = Result<PathItem, ProcessErrorItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(next) = self.ready.pop_front() {
                return Some(next);
            }
            if self.finished {
                return None;
            }

            match self.walker.next() {
                Some(Ok(entry)) => self.accept(entry),
                Some(Err(error)) => self.reject(error),
                None => {
                    self.finished = true;
                    while let Some((_, dir)) = self.pending.pop() {
                        self.ready.push_back(Ok(dir));
                    }
                }
            }
        }
    }
}

/// Sibling order inside one directory; read errors sort last.
fn compare_entries(order: EnumerationOrder, a: &EntryResult, b: &EntryResult) -> Ordering {
    match (a, b) {
        (Ok(a), Ok(b)) => order.compare_siblings(
            a.file_type().is_dir(),
            a.file_name(),
            b.file_type().is_dir(),
            b.file_name(),
        ),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_root_yields_itself() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.txt");
        fs::write(&file, b"hello").unwrap();

        let seed = PathItem::seed(&file.to_string_lossy()).unwrap();
        let items: Vec<_> = Enumerator::new(&seed, EnumerationOrder::ParentThenChildren)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(items, vec![seed]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let root = PathItem::root(temp.path()).unwrap();
        let missing = PathItem::child(&root, "missing", true).unwrap();

        let err = Enumerator::new(&missing, EnumerationOrder::ChildrenThenParent)
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
    }
}
