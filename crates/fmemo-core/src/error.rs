//! Error types for reading memo files.
//!
//! Parsing text never fails; everything here is about getting the
//! text off disk in the first place.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for functions that read and parse memo files.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Things that can go wrong when loading a memo file.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The file does not exist (or vanished between listing and reading).
    #[error("file not found: '{0}'")]
    NotFound(PathBuf),

    /// Couldn't read the file from disk.
    #[error("failed to read file '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid UTF-8.
    #[error("file is not valid UTF-8: '{0}'")]
    InvalidEncoding(PathBuf),

    /// File extension isn't on the allow-list.
    #[error("unsupported file type: '{0}'")]
    UnsupportedFormat(PathBuf),
}

impl ParseError {
    /// Maps an IO error to the matching variant, keeping the path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::InvalidData => Self::InvalidEncoding(path),
            _ => Self::IoError { path, source },
        }
    }

    /// Whether the error means the file simply isn't there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
