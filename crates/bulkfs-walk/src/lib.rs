//! Ordered directory walking for bulkfs.
//!
//! This crate turns a seed [`PathItem`](bulkfs_core::PathItem) into a lazy
//! stream of items using jwalk for traversal.
//!
//! # Overview
//!
//! - **Fixed orders**: files before folders, folders before files, or a
//!   post-order walk where every directory follows its contents
//! - **No link following**: symbolic links are yielded, never entered
//! - **Recoverable errors**: an unreadable entry below the root becomes an
//!   error item and the walk carries on
//!
//! # Example
//!
//! ```rust,no_run
//! use bulkfs_core::PathItem;
//! use bulkfs_walk::{EnumerationOrder, Enumerator};
//!
//! let seed = PathItem::seed("/path/to/folder").unwrap();
//! for item in Enumerator::new(&seed, EnumerationOrder::ChildrenThenParent).unwrap() {
//!     match item {
//!         Ok(item) => println!("{}", item.path().display()),
//!         Err(err) => eprintln!("{err}"),
//!     }
//! }
//! ```

mod enumerator;
mod order;

pub use enumerator::Enumerator;
pub use order::EnumerationOrder;
