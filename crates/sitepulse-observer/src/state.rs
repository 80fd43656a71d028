//! Shared application state for the Observer API server.
//!
//! [`AppState`] owns the [`SiteStore`] and the [`SnapshotBroadcaster`] the
//! store publishes through. Every committed mutation lands on the
//! broadcast channel, and each `WebSocket` connection holds one receiver.

use std::sync::Arc;

use sitepulse_core::{Publisher, SiteStore, StoreSnapshot};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the broadcast channel for store snapshots.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// [`Publisher`] that fans snapshots out over a Tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct SnapshotBroadcaster {
    tx: broadcast::Sender<Arc<StoreSnapshot>>,
}

impl SnapshotBroadcaster {
    /// Create a broadcaster with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Subscribe to every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreSnapshot>> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SnapshotBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for SnapshotBroadcaster {
    fn publish(&self, snapshot: Arc<StoreSnapshot>) {
        let version = snapshot.version;
        // send returns Err only when there are zero receivers,
        // which is normal when no WebSocket clients are connected.
        let receivers = self.tx.send(snapshot).unwrap_or(0);
        debug!(version, receivers, "Snapshot broadcast sent");
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The site store. All REST and `WebSocket` mutations go through it.
    pub store: Arc<SiteStore>,
    /// The publisher wired into `store`.
    pub broadcaster: SnapshotBroadcaster,
    /// K used by `GET /api/top` when the query omits it.
    pub default_top_k: usize,
}

impl AppState {
    /// Create an empty store wired to a fresh broadcaster.
    pub fn new(default_top_k: usize) -> Self {
        let broadcaster = SnapshotBroadcaster::new();
        let store = Arc::new(SiteStore::new(Arc::new(broadcaster.clone())));
        Self {
            store,
            broadcaster,
            default_top_k,
        }
    }

    /// Subscribe to the snapshot broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreSnapshot>> {
        self.broadcaster.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_mutations_reach_subscribers() {
        let state = AppState::new(3);
        let mut rx = state.subscribe();

        state.store.add_site("Google", "logo", 3.2).unwrap();
        state.store.set_value("Google", 3.3).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.get("Google").unwrap().primary.len(), 6);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let state = AppState::new(3);
        assert_eq!(state.broadcaster.receiver_count(), 0);
        state.store.add_site("Google", "logo", 3.2).unwrap();
        assert_eq!(state.store.len().unwrap(), 1);
    }
}
