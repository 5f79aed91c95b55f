//! Directory tree representation.
//!
//! Mirrors the part of the filesystem that holds memo files. Paths are
//! relative to the watched root and always use `/` as separator, so the
//! same tree serialises identically on every platform.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// One directory and everything memo-related below it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryTree {
    /// Root-relative path. The root itself is `""`.
    pub path: String,

    /// Names of memo files directly inside this directory, sorted.
    pub files: Vec<String>,

    /// Nested directories, sorted by name.
    pub subdirectories: Vec<DirectoryTree>,
}

impl DirectoryTree {
    /// Creates an empty node for the given root-relative path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            files: Vec::new(),
            subdirectories: Vec::new(),
        }
    }

    /// Last path segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// True if no memo file exists anywhere in this subtree.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subdirectories.iter().all(DirectoryTree::is_empty)
    }

    /// Total number of memo files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .subdirectories
                .iter()
                .map(DirectoryTree::file_count)
                .sum::<usize>()
    }

    /// Finds the directory at a root-relative path.
    pub fn find(&self, rel: &Path) -> Option<&DirectoryTree> {
        let mut current = self;
        for name in normal_components(rel)? {
            current = current.subdirectories.iter().find(|d| d.name() == name)?;
        }
        Some(current)
    }

    /// Whether the tree lists a memo file at the root-relative path.
    pub fn contains_file(&self, rel: &Path) -> bool {
        let (Some(parent), Some(name)) = (rel.parent(), rel.file_name().and_then(|n| n.to_str()))
        else {
            return false;
        };
        self.find(parent)
            .map(|dir| dir.files.iter().any(|f| f == name))
            .unwrap_or(false)
    }

    /// Whether the tree has a directory node at the root-relative path.
    pub fn contains_dir(&self, rel: &Path) -> bool {
        match normal_components(rel) {
            Some(parts) if !parts.is_empty() => self.find(rel).is_some(),
            _ => false,
        }
    }
}

/// Splits a relative path into UTF-8 names, rejecting anything that is
/// not a plain downward path.
fn normal_components(rel: &Path) -> Option<Vec<&str>> {
    rel.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect()
}

/// Joins a parent's root-relative path with a child name.
pub fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
