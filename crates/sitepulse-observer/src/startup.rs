//! Observer server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which binds the listening socket and then
//! runs the Observer HTTP + `WebSocket` server on a background Tokio task,
//! alongside the drift task and the console.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sitepulse_observer::server::ServerConfig;
//! use sitepulse_observer::startup::spawn_observer;
//! use sitepulse_observer::state::AppState;
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::new(3));
//! let handle = spawn_observer(&ServerConfig::default(), state).await?;
//! // The server is now running. The handle can be awaited on shutdown.
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the Observer server and serve it on a background Tokio task.
///
/// The bind happens before the task is spawned, so an address already in
/// use is reported to the caller instead of only being logged. Returns
/// the bound address (useful with port `0`) and the task handle.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), StartupError> {
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("cannot read bound address: {e}")))?;

    let handle = tokio::spawn(async move {
        let result = server::serve(listener, state).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Observer server exited with error");
        }
        result
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok((addr, handle))
}
