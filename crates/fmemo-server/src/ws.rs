//! WebSocket push of change notifications at `GET /ws`.
//!
//! Clients connect and listen. Each connection is a subscriber of the
//! broadcaster for as long as the socket stays open; anything the client
//! sends besides a close frame is ignored.

use crate::broadcast::{Subscription, SyncBroadcaster};
use crate::http::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upgrades the request and hands the socket to the broadcaster.
pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let broadcaster = Arc::clone(&state.broadcaster);
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<SyncBroadcaster>) {
    let Subscription {
        id,
        mut receiver,
    } = broadcaster.subscribe();
    info!("Push client connected as {}", id);

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            notification = receiver.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                let text = match serde_json::to_string(&*notification) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {}: {}", notification.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    debug!("Send to {} failed: {}", id, e);
                    break;
                }
            }

            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Push client {} errored: {}", id, e);
                    break;
                }
            }
        }
    }

    broadcaster.unsubscribe(id);
    info!("Push client {} disconnected", id);
}
