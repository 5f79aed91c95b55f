//! Change notifications pushed to live subscribers.

use crate::directory::DirectoryTree;
use crate::node::Forest;
use serde::{Deserialize, Serialize};

/// A settled change under the watched root.
///
/// Serialises with a `type` tag, e.g.
/// `{"type":"file_updated","file_path":"notes/a.md","memos":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeNotification {
    /// One file was re-parsed.
    FileUpdated {
        /// Root-relative path of the file.
        file_path: String,
        memos: Forest,
    },

    /// Files or directories were created, deleted or renamed.
    DirectoryUpdated { tree: DirectoryTree },
}

impl ChangeNotification {
    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileUpdated { .. } => "file_updated",
            Self::DirectoryUpdated { .. } => "directory_updated",
        }
    }
}
