//! Fan-out of change notifications to connected clients.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a client
//! that stops reading loses new notifications once its queue is full, and
//! nobody else notices.

use dashmap::DashMap;
use fmemo_core::ChangeNotification;
use fmemo_watcher::ChangeSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default per-subscriber queue length.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A registered receiver of change notifications.
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Arc<ChangeNotification>>,
}

/// Delivers each published notification to every current subscriber.
#[derive(Debug)]
pub struct SyncBroadcaster {
    subscribers: DashMap<Uuid, mpsc::Sender<Arc<ChangeNotification>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for SyncBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl SyncBroadcaster {
    /// Creates a broadcaster whose subscribers each queue up to `capacity`
    /// notifications.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, tx);
        debug!("Subscriber {} added ({} total)", id, self.subscribers.len());
        Subscription { id, receiver: rx }
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!("Subscriber {} removed", id);
        }
        removed
    }

    /// Sends `notification` to every subscriber without waiting.
    pub fn publish(&self, notification: ChangeNotification) {
        let notification = Arc::new(notification);
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(Arc::clone(&notification)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Subscriber {} is not keeping up, dropped {}",
                        entry.key(),
                        notification.kind()
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        for id in closed {
            self.unsubscribe(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Notifications dropped because a subscriber's queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ChangeSink for SyncBroadcaster {
    fn publish(&self, notification: ChangeNotification) {
        SyncBroadcaster::publish(self, notification)
    }
}
