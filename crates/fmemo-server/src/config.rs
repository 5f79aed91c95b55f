//! Server configuration.
//!
//! Stored as JSON in `.fmemo/config.json` under the memo root. Every field
//! has a default, so a partial (or empty) file is valid.

use crate::broadcast::DEFAULT_CHANNEL_CAPACITY;
use fmemo_core::ExtensionFilter;
use fmemo_watcher::{TreeOptions, WatchOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory holding fmemo's own files inside a memo root.
pub const CONFIG_DIR: &str = ".fmemo";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Memo root to serve and watch.
    pub root: PathBuf,

    /// Address of the HTTP API, which also serves push at `/ws`.
    pub http_addr: SocketAddr,

    /// Quiet period before a burst of file events is processed.
    pub debounce_ms: u64,

    /// Per-client queue of undelivered notifications.
    pub channel_capacity: usize,

    pub extensions: ExtensionFilter,
    pub include_hidden: bool,
    pub respect_gitignore: bool,
    pub prune_empty_dirs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let tree = TreeOptions::default();
        Self {
            root: PathBuf::from("."),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            debounce_ms: 300,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            extensions: tree.extensions,
            include_hidden: tree.include_hidden,
            respect_gitignore: tree.respect_gitignore,
            prune_empty_dirs: tree.prune_empty_dirs,
        }
    }
}

impl ServerConfig {
    /// Default location of the config file for a memo root.
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `root`'s config file if it has one, otherwise the defaults.
    /// Either way `root` becomes the served root.
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let path = Self::default_path(root);
        let mut config = if path.is_file() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json + "\n").map_err(write_err)
    }

    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            extensions: self.extensions.clone(),
            include_hidden: self.include_hidden,
            respect_gitignore: self.respect_gitignore,
            prune_empty_dirs: self.prune_empty_dirs,
            ..TreeOptions::default()
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            tree: self.tree_options(),
        }
    }
}
