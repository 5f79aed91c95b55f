//! Wire types for the HTTP API.
//!
//! Push messages are [`fmemo_core::ChangeNotification`] serialized as-is;
//! everything here is request/response plumbing for the query routes.

use crate::query::FileContent;
use chrono::{DateTime, Utc};
use fmemo_core::{Forest, ParseWarning};
use serde::{Deserialize, Serialize};

/// Query string of `GET /api/tree`.
#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    /// Root-relative directory. Missing or empty means the root.
    #[serde(default)]
    pub path: String,
}

/// Body of `GET /api/file/{*path}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub path: String,
    pub content: String,
    pub memos: Forest,
    pub last_modified: Option<DateTime<Utc>>,

    /// Degradations the parser applied. Empty for a clean parse.
    pub warnings: Vec<ParseWarning>,
}

impl From<FileContent> for FileResponse {
    fn from(file: FileContent) -> Self {
        Self {
            path: file.path,
            content: file.content,
            memos: file.memos,
            last_modified: file.last_modified,
            warnings: file.degraded.map(|d| d.warnings).unwrap_or_default(),
        }
    }
}

/// Body of `GET /api/files/{name}`: the memos and a Unix timestamp.
#[derive(Debug, Serialize, Deserialize)]
pub struct MemosResponse {
    pub memos: Forest,
    pub last_modified: Option<i64>,
}

impl From<FileContent> for MemosResponse {
    fn from(file: FileContent) -> Self {
        Self {
            memos: file.memos,
            last_modified: file.last_modified.map(|t| t.timestamp()),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,

    /// Whether the directory snapshot is known to be out of date.
    pub stale: bool,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
