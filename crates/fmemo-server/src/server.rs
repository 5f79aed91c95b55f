//! Wires the watcher, broadcaster and the HTTP/WebSocket surface together.

use crate::broadcast::SyncBroadcaster;
use crate::config::ServerConfig;
use crate::http::{create_router, AppState};
use crate::query::QueryService;
use fmemo_watcher::{ChangeWatcher, SnapshotStore};
use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

/// The fmemo server: HTTP queries plus WebSocket change push.
pub struct MemoServer {
    config: ServerConfig,
    snapshot: Arc<SnapshotStore>,
    broadcaster: Arc<SyncBroadcaster>,
}

impl MemoServer {
    pub fn new(config: ServerConfig) -> Self {
        let broadcaster = Arc::new(SyncBroadcaster::new(config.channel_capacity));
        Self {
            config,
            snapshot: Arc::new(SnapshotStore::new()),
            broadcaster,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> Arc<SyncBroadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub fn snapshot(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshot)
    }

    /// Binds the configured address and serves until Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = bind(self.config.http_addr).await?;

        tokio::select! {
            result = self.serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                Ok(())
            }
        }
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let root = &self.config.root;

        // Without a watcher the query routes still work; they just rebuild
        // from disk on every request.
        match ChangeWatcher::start(
            root,
            self.config.watch_options(),
            self.broadcaster.clone(),
            self.snapshot.clone(),
        )
        .await
        {
            Ok(watcher) => {
                tokio::spawn(async move {
                    match watcher.wait().await {
                        Ok(()) => debug!("Watcher finished"),
                        Err(e) => error!("File watching stopped: {}", e),
                    }
                });
            }
            Err(e) => error!("Could not watch {}: {}", root.display(), e),
        }

        let query = QueryService::new(root.clone(), self.config.tree_options())
            .with_snapshot(self.snapshot.clone());
        let app = create_router(Arc::new(AppState {
            query,
            broadcaster: self.broadcaster.clone(),
            snapshot: Some(self.snapshot.clone()),
        }));

        info!("Serving {}", root.display());
        let addr = listener.local_addr()?;
        info!("HTTP API on http://{}", addr);
        info!("Push updates on ws://{}/ws", addr);

        axum::serve(listener, app).into_future().await?;
        Ok(())
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}
