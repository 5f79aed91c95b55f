//! Directory scanning.
//!
//! Walks a directory to find memo files, building the DirectoryTree that
//! clients browse. Hidden entries and .gitignore patterns are skipped by
//! default, and symbolic links are never followed unless asked for.

use fmemo_core::directory::join_relative;
use fmemo_core::{parse_file, DirectoryTree, ExtensionFilter, ParsedDocument};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path};
use std::time::Instant;
use tracing::{debug, warn};

/// Options for directory scanning.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Which files count as memo files.
    pub extensions: ExtensionFilter,

    /// Follow symbolic links when walking directories.
    pub follow_symlinks: bool,

    /// Include dot-files and dot-directories.
    pub include_hidden: bool,

    /// Honour .gitignore, .ignore and git exclude files.
    pub respect_gitignore: bool,

    /// Drop directories with no memo files anywhere below them.
    pub prune_empty_dirs: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            extensions: ExtensionFilter::default(),
            follow_symlinks: false,
            include_hidden: false,
            respect_gitignore: true,
            prune_empty_dirs: true,
        }
    }
}

/// Builds directory trees and parses the files in them.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    options: TreeOptions,
}

impl TreeBuilder {
    pub fn new(options: TreeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Builds the tree rooted at `root`. Node paths are relative to it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fmemo_watcher::TreeBuilder;
    /// use std::path::Path;
    ///
    /// let tree = TreeBuilder::default().build(Path::new("./notes")).unwrap();
    /// println!("{} memo files", tree.file_count());
    /// ```
    pub fn build(&self, root: &Path) -> io::Result<DirectoryTree> {
        self.build_at(root, "")
    }

    /// Builds the tree for `dir`, labelling it with the root-relative
    /// path `label`.
    ///
    /// Fails only if `dir` itself is missing, not a directory, or
    /// unreadable. Anything that goes wrong deeper down is logged and
    /// leaves an empty node in place of the subtree.
    pub fn build_at(&self, dir: &Path, label: &str) -> io::Result<DirectoryTree> {
        let start = Instant::now();

        if !fs::metadata(dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", dir.display()),
            ));
        }
        fs::read_dir(dir)?;

        let opts = &self.options;
        let walker = WalkBuilder::new(dir)
            .hidden(!opts.include_hidden)
            .ignore(opts.respect_gitignore)
            .git_ignore(opts.respect_gitignore)
            .git_global(opts.respect_gitignore)
            .git_exclude(opts.respect_gitignore)
            .parents(opts.respect_gitignore)
            .require_git(false)
            .follow_links(opts.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        // Open directories, outermost first. The walk is depth-first, so an
        // entry at depth `d` belongs to `stack[d - 1]`.
        let mut stack = vec![DirectoryTree::new(label)];
        let mut unreadable = HashSet::new();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                    if let Some(path) = error_path(&err) {
                        if let Some(rel) = relative_label(dir, label, path) {
                            unreadable.insert(rel);
                        }
                    }
                    continue;
                }
            };

            let depth = entry.depth();
            if depth == 0 {
                continue;
            }
            self.close_dirs(&mut stack, depth, &unreadable);

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy();

            if file_type.is_dir() {
                let parent = stack.last().map(|d| d.path.as_str()).unwrap_or(label);
                let path = join_relative(parent, &name);
                stack.push(DirectoryTree::new(path));
            } else if file_type.is_file() && opts.extensions.matches(entry.path()) {
                if let Some(current) = stack.last_mut() {
                    current.files.push(name.into_owned());
                }
            }
        }

        self.close_dirs(&mut stack, 1, &unreadable);
        let tree = stack.pop().unwrap_or_else(|| DirectoryTree::new(label));

        debug!(
            "Scanned {} ({} memo files) in {:?}",
            dir.display(),
            tree.file_count(),
            start.elapsed()
        );

        Ok(tree)
    }

    /// Reads and parses one memo file.
    pub fn build_file(&self, path: &Path) -> fmemo_core::Result<ParsedDocument> {
        parse_file(path, &self.options.extensions)
    }

    /// Pops finished directories until `stack` holds exactly `depth` entries,
    /// attaching each to its parent unless it is pruned.
    fn close_dirs(
        &self,
        stack: &mut Vec<DirectoryTree>,
        depth: usize,
        unreadable: &HashSet<String>,
    ) {
        while stack.len() > depth.max(1) {
            let Some(dir) = stack.pop() else {
                break;
            };
            let keep = !self.options.prune_empty_dirs
                || !dir.files.is_empty()
                || !dir.subdirectories.is_empty()
                || unreadable.contains(&dir.path);
            if !keep {
                debug!("Pruning empty directory {}", dir.path);
                continue;
            }
            if let Some(parent) = stack.last_mut() {
                parent.subdirectories.push(dir);
            }
        }
    }
}

/// Digs the offending path out of a walk error.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

/// Converts a path under `base` into a root-relative label.
fn relative_label(base: &Path, base_label: &str, path: &Path) -> Option<String> {
    let suffix = path.strip_prefix(base).ok()?;
    let mut label = base_label.to_string();
    for component in suffix.components() {
        if let Component::Normal(name) = component {
            label = join_relative(&label, &name.to_string_lossy());
        }
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_build_empty_directory() {
        let dir = tempdir().unwrap();
        let tree = TreeBuilder::default().build(dir.path()).unwrap();
        assert_eq!(tree, DirectoryTree::new(""));
    }

    #[test]
    fn test_build_filters_and_sorts() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("zeta.md"), "# Z");
        touch(&dir.path().join("alpha.fmemo"), "# A");
        touch(&dir.path().join("main.rs"), "fn main() {}");
        touch(&dir.path().join("notes/b.md"), "# B");
        touch(&dir.path().join("notes/a.md"), "# A");
        touch(&dir.path().join("notes/deep/c.fmemo"), "# C");
        touch(&dir.path().join("assets/logo.svg"), "<svg/>");

        let tree = TreeBuilder::default().build(dir.path()).unwrap();

        assert_eq!(tree.path, "");
        assert_eq!(tree.files, vec!["alpha.fmemo", "zeta.md"]);
        assert_eq!(tree.subdirectories.len(), 1);

        let notes = &tree.subdirectories[0];
        assert_eq!(notes.path, "notes");
        assert_eq!(notes.files, vec!["a.md", "b.md"]);
        assert_eq!(notes.subdirectories[0].path, "notes/deep");
        assert_eq!(notes.subdirectories[0].files, vec!["c.fmemo"]);
        assert_eq!(tree.file_count(), 5);
    }

    #[test]
    fn test_unsupported_files_do_not_block_traversal() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("src/lib.rs"), "");
        touch(&dir.path().join("src/docs/design.md"), "# Design");

        let tree = TreeBuilder::default().build(dir.path()).unwrap();
        let src = &tree.subdirectories[0];
        assert!(src.files.is_empty());
        assert_eq!(src.subdirectories[0].files, vec!["design.md"]);
    }

    #[test]
    fn test_prune_can_be_disabled() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        touch(&dir.path().join("other/readme.txt"), "");

        let pruned = TreeBuilder::default().build(dir.path()).unwrap();
        assert!(pruned.subdirectories.is_empty());

        let builder = TreeBuilder::new(TreeOptions {
            prune_empty_dirs: false,
            ..TreeOptions::default()
        });
        let full = builder.build(dir.path()).unwrap();
        let names: Vec<_> = full.subdirectories.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(names, vec!["empty", "other"]);
    }

    #[test]
    fn test_hidden_and_ignored_entries_are_skipped() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join(".git/notes.md"), "# hidden");
        touch(&dir.path().join(".draft.md"), "# hidden");
        touch(&dir.path().join("build/out.md"), "# ignored");
        touch(&dir.path().join(".gitignore"), "build/\n");
        touch(&dir.path().join("kept.md"), "# kept");

        let tree = TreeBuilder::default().build(dir.path()).unwrap();
        assert_eq!(tree.files, vec!["kept.md"]);
        assert!(tree.subdirectories.is_empty());

        let builder = TreeBuilder::new(TreeOptions {
            include_hidden: true,
            respect_gitignore: false,
            ..TreeOptions::default()
        });
        let everything = builder.build(dir.path()).unwrap();
        assert_eq!(everything.files, vec![".draft.md", "kept.md"]);
        assert_eq!(everything.file_count(), 4);
    }

    #[test]
    fn test_build_at_labels_subtree() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("notes/inner/a.md"), "# A");

        let tree = TreeBuilder::default()
            .build_at(&dir.path().join("notes"), "notes")
            .unwrap();
        assert_eq!(tree.path, "notes");
        assert_eq!(tree.subdirectories[0].path, "notes/inner");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = TreeBuilder::default()
            .build(&dir.path().join("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        touch(&dir.path().join("file.md"), "");
        let err = TreeBuilder::default()
            .build(&dir.path().join("file.md"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        touch(&outside.path().join("linked.md"), "# Linked");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let tree = TreeBuilder::default().build(dir.path()).unwrap();
        assert_eq!(tree.file_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_degrades_to_empty_node() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        touch(&dir.path().join("ok.md"), "# Ok");
        touch(&dir.path().join("locked/secret.md"), "# Secret");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            // Running with privileges that bypass permission checks.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let tree = TreeBuilder::default().build(dir.path()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(tree.files, vec!["ok.md"]);
        assert_eq!(tree.subdirectories, vec![DirectoryTree::new("locked")]);
    }

    #[test]
    fn test_build_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        touch(&path, "# A\n## B\n");

        let builder = TreeBuilder::default();
        let doc = builder.build_file(&path).unwrap();
        assert_eq!(doc.memos[0].children[0].title, "B");

        let err = builder.build_file(&dir.path().join("gone.md")).unwrap_err();
        assert!(err.is_not_found());
    }
}
