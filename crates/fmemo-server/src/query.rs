//! Read-side queries against the memo root.
//!
//! All filesystem work happens on the blocking pool. The directory tree is
//! served from the watcher's snapshot when it is fresh and rebuilt from disk
//! otherwise.

use chrono::{DateTime, Utc};
use fmemo_core::{parse_document, read_source, DirectoryTree, Forest, ParseError, ParseWarning};
use fmemo_watcher::{SnapshotStore, TreeBuilder, TreeOptions};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("not found: '{0}'")]
    NotFound(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported file type: '{0}'")]
    Unsupported(String),

    #[error("path escapes the memo root: '{0}'")]
    OutsideRoot(String),
}

impl QueryError {
    fn from_io(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            _ => Self::Io {
                path: path.to_string(),
                source,
            },
        }
    }

    fn from_parse(path: &str, err: ParseError) -> Self {
        match err {
            ParseError::NotFound(_) => Self::NotFound(path.to_string()),
            ParseError::UnsupportedFormat(_) => Self::Unsupported(path.to_string()),
            ParseError::InvalidEncoding(_) => Self::Io {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidData, "file is not valid UTF-8"),
            },
            ParseError::IoError { source, .. } => Self::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// The parser had to fall back on one or more degradation rules.
///
/// Not a failure: the accompanying result is still the best reading of
/// the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("parsed with {} warnings", .warnings.len())]
pub struct ParseDegraded {
    pub warnings: Vec<ParseWarning>,
}

/// One memo file, raw and parsed.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    /// Root-relative, `/`-separated path.
    pub path: String,
    pub content: String,
    pub memos: Forest,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ParseDegraded>,
}

/// Answers tree and file queries for one memo root.
#[derive(Debug, Clone)]
pub struct QueryService {
    root: PathBuf,
    builder: TreeBuilder,
    snapshot: Option<Arc<SnapshotStore>>,
}

impl QueryService {
    pub fn new(root: impl Into<PathBuf>, options: TreeOptions) -> Self {
        Self {
            root: root.into(),
            builder: TreeBuilder::new(options),
            snapshot: None,
        }
    }

    /// Serves root queries from `snapshot` while it is fresh.
    pub fn with_snapshot(mut self, snapshot: Arc<SnapshotStore>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory tree at a root-relative path. `""` is the root.
    ///
    /// Subdirectories are looked up in the tree of the whole root, so only
    /// directories the root walk lists can be returned.
    pub async fn get_tree(&self, path: &str) -> Result<Arc<DirectoryTree>, QueryError> {
        let (_, rel) = self.resolve(path)?;
        let root = self.root_tree().await?;
        if rel.is_empty() {
            return Ok(root);
        }
        root.find(Path::new(&rel))
            .map(|found| Arc::new(found.clone()))
            .ok_or(QueryError::NotFound(rel))
    }

    /// The fresh snapshot, or a rebuild from disk that refreshes a stale one.
    async fn root_tree(&self) -> Result<Arc<DirectoryTree>, QueryError> {
        if let Some(current) = self.snapshot.as_ref().and_then(|s| s.current()) {
            return Ok(current);
        }

        let builder = self.builder.clone();
        let root = self.root.clone();
        let tree = blocking(move || builder.build_at(&root, ""))
            .await?
            .map_err(|e| QueryError::from_io("", e))?;

        match &self.snapshot {
            Some(snapshot) if snapshot.is_stale() => {
                debug!("Refreshed stale snapshot of {}", self.root.display());
                Ok(snapshot.replace(tree))
            }
            _ => Ok(Arc::new(tree)),
        }
    }

    /// Reads and parses one memo file.
    pub async fn get_file(&self, path: &str) -> Result<FileContent, QueryError> {
        let (abs, rel) = self.resolve(path)?;
        if rel.is_empty() {
            return Err(QueryError::NotFound(rel));
        }

        let root = self.root.clone();
        let filter = self.builder.options().extensions.clone();
        blocking(move || -> Result<FileContent, QueryError> {
            ensure_inside(&root, &abs, &rel)?;
            let content =
                read_source(&abs, &filter).map_err(|e| QueryError::from_parse(&rel, e))?;
            let document = parse_document(&content);
            let last_modified = fs::metadata(&abs)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            let degraded = document.is_degraded().then(|| ParseDegraded {
                warnings: document.warnings.clone(),
            });
            if let Some(degraded) = &degraded {
                warn!("{}: {}", rel, degraded);
            }

            Ok(FileContent {
                path: rel,
                content,
                memos: document.memos,
                last_modified,
                degraded,
            })
        })
        .await?
    }

    /// Turns a client path into an absolute path and its normalized
    /// root-relative form. Absolute paths and `..` are rejected.
    fn resolve(&self, path: &str) -> Result<(PathBuf, String), QueryError> {
        let mut parts = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(name) => parts.push(name),
                    None => return Err(QueryError::NotFound(path.to_string())),
                },
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(QueryError::OutsideRoot(path.to_string()))
                }
            }
        }

        let abs = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));
        Ok((abs, parts.join("/")))
    }
}

/// Rejects files that resolve outside the root through a symlink.
fn ensure_inside(root: &Path, abs: &Path, rel: &str) -> Result<(), QueryError> {
    let real_root = root
        .canonicalize()
        .map_err(|e| QueryError::from_io("", e))?;
    let real = abs
        .canonicalize()
        .map_err(|e| QueryError::from_io(rel, e))?;
    if real.starts_with(&real_root) {
        Ok(())
    } else {
        Err(QueryError::OutsideRoot(rel.to_string()))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, QueryError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| QueryError::Io {
        path: String::new(),
        source: io::Error::new(io::ErrorKind::Other, e.to_string()),
    })
}
