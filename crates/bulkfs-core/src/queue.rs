//! FIFO queue of pending items with incremental size accounting.

use std::collections::VecDeque;

use thiserror::Error;

use crate::item::PathItem;
use crate::size::SizeAccount;

/// Errors returned by [`PathQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue holds no items.
    #[error("Path queue is empty")]
    EmptyQueue,
}

/// Items waiting to be processed, in processing order.
///
/// The size account is updated on every enqueue and dequeue so reading it
/// never walks the queue.
#[derive(Debug, Default)]
pub struct PathQueue {
    items: VecDeque<PathItem>,
    total: SizeAccount,
}

impl PathQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item.
    pub fn enqueue(&mut self, item: PathItem) {
        self.total.add(item.queued_size());
        self.items.push_back(item);
    }

    /// Remove and return the oldest item.
    pub fn dequeue(&mut self) -> Result<PathItem, QueueError> {
        let item = self.items.pop_front().ok_or(QueueError::EmptyQueue)?;
        if self.items.is_empty() {
            self.total.clear();
        } else {
            self.total.subtract(item.queued_size());
        }
        Ok(item)
    }

    /// The oldest item, without removing it.
    pub fn peek(&self) -> Result<&PathItem, QueueError> {
        self.items.front().ok_or(QueueError::EmptyQueue)
    }

    /// Total size of the queued items.
    pub fn total_size(&self) -> SizeAccount {
        self.total
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item and reset the size account.
    pub fn clear(&mut self) {
        self.items.clear();
        self.total.clear();
    }

    /// Iterate over the queued items in processing order.
    pub fn iter(&self) -> impl Iterator<Item = &PathItem> {
        self.items.iter()
    }
}

impl Extend<PathItem> for PathQueue {
    fn extend<T: IntoIterator<Item = PathItem>>(&mut self, iter: T) {
        for item in iter {
            self.enqueue(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(root: &PathItem, name: &str, size: u64) -> PathItem {
        PathItem::with_known_size(root, name, false, Some(size)).unwrap()
    }

    #[test]
    fn test_fifo_order_and_size() {
        let root = PathItem::root("/src").unwrap();
        let mut queue = PathQueue::new();
        queue.enqueue(member(&root, "a", 100));
        queue.enqueue(member(&root, "b", 200));

        assert_eq!(queue.total_size(), 300);
        assert_eq!(queue.peek().unwrap().relative_path(), "a");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue().unwrap().relative_path(), "a");
        assert_eq!(queue.total_size(), 200);
        assert_eq!(queue.dequeue().unwrap().relative_path(), "b");
        assert_eq!(queue.total_size(), 0);
    }

    #[test]
    fn test_empty_queue_errors() {
        let mut queue = PathQueue::new();
        assert_eq!(queue.dequeue().unwrap_err(), QueueError::EmptyQueue);
        assert_eq!(queue.peek().unwrap_err(), QueueError::EmptyQueue);
    }

    #[test]
    fn test_opaque_directory_poisons_until_drained() {
        let root = PathItem::root("/src").unwrap();
        let mut queue = PathQueue::new();
        queue.enqueue(member(&root, "a", 10));
        queue.enqueue(PathItem::child(&root, "dir", true).unwrap());
        queue.enqueue(member(&root, "b", 20));
        assert_eq!(queue.total_size(), SizeAccount::Unknown);

        queue.dequeue().unwrap();
        queue.dequeue().unwrap();
        assert_eq!(queue.total_size(), SizeAccount::Unknown);

        queue.dequeue().unwrap();
        assert_eq!(queue.total_size(), 0);
    }
}
