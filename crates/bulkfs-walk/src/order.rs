//! Traversal ordering policies.

use std::cmp::Ordering;
use std::ffi::OsStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Order in which a walk yields entries.
///
/// The first two policies shape sibling order and yield a directory before
/// its contents, so copies create folders before filling them. The last two
/// decide whether a directory comes before or after its descendants; deletion
/// needs `ChildrenThenParent` so a folder is empty when it is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum EnumerationOrder {
    /// Directory first, then its files, then its sub-directories.
    FilesThenDirectories,
    /// Directory first, then its sub-directories, then its files.
    DirectoriesThenFiles,
    /// Every descendant before the directory holding it.
    ChildrenThenParent,
    /// Every directory before its descendants.
    ParentThenChildren,
}

impl EnumerationOrder {
    /// Whether directories are yielded after their contents.
    pub fn is_post_order(self) -> bool {
        matches!(self, Self::ChildrenThenParent)
    }

    /// Rank of an entry among its siblings; lower goes first.
    pub fn sibling_rank(self, is_directory: bool) -> u8 {
        match (self, is_directory) {
            (Self::FilesThenDirectories, true) | (Self::DirectoriesThenFiles, false) => 1,
            _ => 0,
        }
    }

    /// Compare two siblings: rank first, then name.
    pub fn compare_siblings(
        self,
        a_is_directory: bool,
        a_name: &OsStr,
        b_is_directory: bool,
        b_name: &OsStr,
    ) -> Ordering {
        self.sibling_rank(a_is_directory)
            .cmp(&self.sibling_rank(b_is_directory))
            .then_with(|| a_name.cmp(b_name))
    }
}
