//! fmemo Watcher - Directory scanning and change watching
//!
//! This crate handles the file system side of things:
//! - Walking a memo root to build the directory tree
//! - Watching for changes and debouncing editor save bursts
//! - Re-parsing changed files and rebuilding the tree when needed
//!
//! It respects .gitignore and skips hidden entries by default.

mod classify;
mod debounce;
mod snapshot;
mod tree;
mod watcher;

pub use classify::{classify, Change, ChangeKind};
pub use debounce::{BatchState, Debouncer, SettledBatch};
pub use snapshot::SnapshotStore;
pub use tree::{TreeBuilder, TreeOptions};
pub use watcher::{ChangeSink, ChangeWatcher, WatchError, WatchOptions};
