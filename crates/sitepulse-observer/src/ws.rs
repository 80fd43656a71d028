//! `WebSocket` handler for real-time snapshot streaming.
//!
//! Clients connect to `GET /ws/sites`. The current snapshot is sent
//! right away, followed by every snapshot the store publishes. Each
//! outbound frame is a JSON `update_data` event.
//!
//! Clients may also send mutation requests as text frames
//! (`add_site`, `remove_site`, `set_value`). Accepted requests need no
//! reply because their effect arrives as the next `update_data`; rejected
//! ones are answered with a `rejected` event on the same socket.
//!
//! Snapshots are published after the store lock is released, so two
//! publishes may reach the channel out of order. The handler tracks the
//! last version it sent and drops anything older.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use sitepulse_core::{SiteStore, StoreError, StoreSnapshot};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::handlers::AddSiteRequest;
use crate::state::AppState;

/// Messages pushed to clients.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// A full store snapshot.
    UpdateData(&'a StoreSnapshot),
    /// A client request was refused.
    Rejected {
        /// Why the request was refused.
        message: String,
    },
}

/// Mutation requests a client may send.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Add a new site.
    AddSite(AddSiteRequest),
    /// Remove a site by exact name.
    RemoveSite {
        /// Site name.
        name: String,
    },
    /// Append a new traffic value to a site.
    SetValue {
        /// Site name.
        name: String,
        /// New traffic value, in billions.
        value: f64,
    },
}

impl ClientRequest {
    /// Apply the request to the store.
    ///
    /// # Errors
    ///
    /// Propagates the store's rejection.
    pub fn apply(&self, store: &SiteStore) -> Result<(), StoreError> {
        match self {
            Self::AddSite(request) => request.apply(store),
            Self::RemoveSite { name } => store.remove_site(name).map(|_removed| ()),
            Self::SetValue { name, value } => store.set_value(name, *value),
        }
    }
}

/// Parse and apply one client text frame.
///
/// Returns the JSON reply to send back, if any. Only malformed or
/// rejected requests produce a reply.
pub fn handle_client_text(store: &SiteStore, text: &str) -> Option<String> {
    let message = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => match request.apply(store) {
            Ok(()) => return None,
            Err(e) => {
                warn!(?request, error = %e, "WebSocket request rejected");
                e.to_string()
            }
        },
        Err(e) => {
            debug!(error = %e, "Malformed WebSocket request");
            format!("malformed request: {e}")
        }
    };
    serde_json::to_string(&ServerMessage::Rejected { message }).ok()
}

/// Encode a snapshot as an `update_data` frame.
///
/// # Errors
///
/// Returns the serialization error if the snapshot cannot be encoded.
pub fn encode_snapshot(snapshot: &StoreSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerMessage::UpdateData(snapshot))
}

/// Whether `snapshot` is newer than the last version sent to a client.
pub const fn is_newer(last_sent: u64, snapshot: &StoreSnapshot) -> bool {
    snapshot.version > last_sent
}

/// Wait for the next snapshot newer than `last_sent`.
///
/// Stale snapshots are dropped. A lagged receiver skips ahead to the oldest
/// snapshot still buffered. Returns `None` once the channel is closed.
async fn next_fresh(
    rx: &mut broadcast::Receiver<Arc<StoreSnapshot>>,
    last_sent: u64,
) -> Option<Arc<StoreSnapshot>> {
    loop {
        match rx.recv().await {
            Ok(snapshot) if is_newer(last_sent, &snapshot) => return Some(snapshot),
            Ok(snapshot) => {
                debug!(version = snapshot.version, last_sent, "Skipping stale snapshot");
            }
            Err(RecvError::Lagged(n)) => {
                debug!(skipped = n, "WebSocket client lagged, skipping ahead");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming snapshots.
///
/// # Route
///
/// `GET /ws/sites`
pub async fn ws_sites(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Serialize and send a snapshot. Returns `false` once the client is gone.
async fn send_snapshot(socket: &mut WebSocket, snapshot: &StoreSnapshot) -> bool {
    let json = match encode_snapshot(snapshot) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize snapshot: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handle the `WebSocket` lifecycle: send the current snapshot, then
/// forward published snapshots and apply inbound requests.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    // Subscribe before capturing the initial snapshot so nothing published
    // in between is lost; the version check discards the overlap.
    let mut rx = state.subscribe();

    let mut last_sent = match state.store.snapshot() {
        Ok(snapshot) => {
            if !send_snapshot(&mut socket, &snapshot).await {
                debug!("WebSocket client disconnected (initial send failed)");
                return;
            }
            snapshot.version
        }
        Err(e) => {
            warn!(error = %e, "Cannot read store for new WebSocket client");
            return;
        }
    };

    loop {
        tokio::select! {
            // Receive a snapshot from the store's publisher.
            next = next_fresh(&mut rx, last_sent) => {
                let Some(snapshot) = next else {
                    debug!("Broadcast channel closed, shutting down WebSocket");
                    return;
                };
                if !send_snapshot(&mut socket, &snapshot).await {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
                last_sent = snapshot.version;
            }
            // Client frames: mutation requests, pings, close.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_text(&state.store, text.as_str())
                            && socket.send(Message::Text(reply.into())).await.is_err()
                        {
                            debug!("WebSocket client disconnected (reply failed)");
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Ignore binary and pong frames.
                    }
                }
            }
        }
    }
}
