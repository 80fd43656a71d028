//! Observer API server for `SitePulse`.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/sites`) that pushes every store
//!   snapshot via [`tokio::sync::broadcast`] and accepts add/remove/set
//!   requests from clients
//! - **REST endpoints** for reading the snapshot, mutating sites, and
//!   querying the top-K ranking
//!
//! # Architecture
//!
//! The [`SiteStore`] publishes through a [`SnapshotBroadcaster`] after
//! each committed mutation, outside its lock. `WebSocket` clients each hold
//! a broadcast receiver with automatic lag handling, so a slow client
//! never blocks a producer.
//!
//! [`SiteStore`]: sitepulse_core::SiteStore
//! [`SnapshotBroadcaster`]: state::SnapshotBroadcaster

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{spawn_observer, StartupError};
pub use state::{AppState, SnapshotBroadcaster};
