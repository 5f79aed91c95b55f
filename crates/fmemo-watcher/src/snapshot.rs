//! Shared view of the last built directory tree.

use fmemo_core::DirectoryTree;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The most recent tree, swapped wholesale on every rebuild.
///
/// Readers clone the `Arc` and drop the lock straight away. A fresh store
/// is stale until the first tree is installed.
#[derive(Debug)]
pub struct SnapshotStore {
    tree: RwLock<Arc<DirectoryTree>>,
    stale: AtomicBool,
    generation: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self {
            tree: RwLock::new(Arc::new(DirectoryTree::default())),
            stale: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last installed tree, stale or not.
    pub fn tree(&self) -> Arc<DirectoryTree> {
        Arc::clone(&self.tree.read())
    }

    /// The last installed tree, unless it is known to be out of date.
    pub fn current(&self) -> Option<Arc<DirectoryTree>> {
        if self.is_stale() {
            None
        } else {
            Some(self.tree())
        }
    }

    /// Installs a new tree and clears the stale flag.
    pub fn replace(&self, tree: DirectoryTree) -> Arc<DirectoryTree> {
        let tree = Arc::new(tree);
        *self.tree.write() = Arc::clone(&tree);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.stale.store(false, Ordering::Release);
        tree
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// How many trees have been installed.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
