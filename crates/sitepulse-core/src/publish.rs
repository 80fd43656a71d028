//! The publish capability the store calls after every committed mutation.
//!
//! The store never knows how snapshots reach observers. The observer crate
//! plugs in a broadcast-channel publisher; tests use a recording one or
//! [`NoopPublisher`].

use std::sync::Arc;

use crate::snapshot::StoreSnapshot;

/// Receives a full snapshot after each committed mutation.
///
/// Called after the store lock is released, so a slow delivery never
/// stalls producers.
pub trait Publisher: Send + Sync {
    /// Deliver a snapshot. No acknowledgment is expected.
    fn publish(&self, snapshot: Arc<StoreSnapshot>);
}

/// Publisher that discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _snapshot: Arc<StoreSnapshot>) {}
}
