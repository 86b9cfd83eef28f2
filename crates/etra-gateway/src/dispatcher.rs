use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use etra_types::FeedEvent;

/// Fans change events and presence updates out to every connected client.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events: every connection receives every
    /// event and filters by its own table subscriptions.
    broadcast_tx: broadcast::Sender<FeedEvent>,

    /// Tracked presence: user_id -> connections that called Track.
    /// A user stays present while any of their connections is tracked.
    presence: RwLock<BTreeMap<Uuid, HashSet<Uuid>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                presence: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Subscribe to feed events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: FeedEvent) {
        debug!("broadcast {:?} event", event.table());
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Add a connection to the presence set and announce the new membership.
    pub async fn track(&self, user_id: Uuid, conn_id: Uuid) {
        let user_ids = {
            let mut presence = self.inner.presence.write().await;
            presence.entry(user_id).or_default().insert(conn_id);
            presence.keys().copied().collect()
        };
        self.broadcast(FeedEvent::PresenceSync { user_ids });
    }

    /// Drop a connection from the presence set. Announces only when the
    /// connection was actually tracked.
    pub async fn untrack(&self, user_id: Uuid, conn_id: Uuid) {
        let user_ids = {
            let mut presence = self.inner.presence.write().await;
            let Some(conns) = presence.get_mut(&user_id) else {
                return;
            };
            if !conns.remove(&conn_id) {
                return;
            }
            if conns.is_empty() {
                presence.remove(&user_id);
            }
            presence.keys().copied().collect()
        };
        self.broadcast(FeedEvent::PresenceSync { user_ids });
    }

    /// Currently tracked identities, in stable order.
    pub async fn presence_state(&self) -> Vec<Uuid> {
        self.inner.presence.read().await.keys().copied().collect()
    }
}
