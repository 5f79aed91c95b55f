//! Classification of settled changes.
//!
//! A path's raw event kinds are unreliable after debouncing (a save by
//! rename looks like a delete plus a create), so classification compares
//! what the last snapshot knew about a path with what is on disk now.

use fmemo_core::{DirectoryTree, ExtensionFilter};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What kind of update a settled path needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A known memo file changed in place. Re-parse just that file.
    Content,
    /// Something appeared or disappeared. Rebuild the directory tree.
    Structural,
}

/// One classified change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Absolute path as reported by the watcher.
    pub path: PathBuf,
    /// Root-relative, `/`-separated path.
    pub rel: String,
    pub kind: ChangeKind,
}

/// Classifies settled paths against the last known tree.
///
/// Paths outside the root, unsupported files, and directories that still
/// exist where the snapshot expects them are dropped.
pub fn classify(
    root: &Path,
    paths: &[PathBuf],
    snapshot: &DirectoryTree,
    filter: &ExtensionFilter,
) -> Vec<Change> {
    paths
        .iter()
        .filter_map(|path| {
            let rel_path = path.strip_prefix(root).ok()?;
            let rel = to_label(rel_path)?;
            let kind = classify_one(path, rel_path, snapshot, filter)?;
            Some(Change {
                path: path.clone(),
                rel,
                kind,
            })
        })
        .collect()
}

fn classify_one(
    path: &Path,
    rel: &Path,
    snapshot: &DirectoryTree,
    filter: &ExtensionFilter,
) -> Option<ChangeKind> {
    if rel.as_os_str().is_empty() {
        return Some(ChangeKind::Structural);
    }

    let was_file = snapshot.contains_file(rel);
    let was_dir = snapshot.contains_dir(rel);

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {
            if !filter.matches(path) {
                None
            } else if was_file {
                Some(ChangeKind::Content)
            } else {
                Some(ChangeKind::Structural)
            }
        }
        Ok(meta) if meta.is_dir() => (!was_dir).then_some(ChangeKind::Structural),
        Ok(_) => None,
        Err(_) => (was_file || was_dir).then_some(ChangeKind::Structural),
    }
}

fn to_label(rel: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = rel
        .components()
        .map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();
    parts.map(|p| p.join("/"))
}
