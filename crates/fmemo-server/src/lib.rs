//! fmemo Server - HTTP queries and live change push
//!
//! This crate puts a memo root on the network:
//! - A JSON HTTP API for the directory tree and individual files
//! - WebSocket push of change notifications at `/ws` on the same port
//!
//! The server supports:
//! - Multiple concurrent push clients, each with its own bounded queue
//! - Serving queries even when the file watcher could not start
//! - Configuration from `.fmemo/config.json`

mod broadcast;
mod config;
mod http;
mod protocol;
mod query;
mod server;
mod ws;

pub use broadcast::{Subscription, SyncBroadcaster, DEFAULT_CHANNEL_CAPACITY};
pub use config::{ConfigError, ServerConfig, CONFIG_DIR, CONFIG_FILE};
pub use http::{create_router, AppState};
pub use protocol::{ErrorBody, FileResponse, HealthResponse, MemosResponse, TreeQuery};
pub use query::{FileContent, ParseDegraded, QueryError, QueryService};
pub use server::{MemoServer, ServerError};
