//! Periodic simulated traffic drift.
//!
//! Every interval, each site's latest value is nudged by an independent
//! uniform random delta in `[-max_delta, +max_delta]` (clamped at zero by
//! the store). Each round is one [`SiteStore::apply_drift`] batch, so
//! observers see the whole round at once.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info};

use crate::config::DriftConfig;
use crate::store::{SiteStore, StoreError};

/// Apply one drift round with uniform random deltas.
///
/// Returns the number of sites drifted. A zero or non-finite `max_delta`
/// repeats every latest value unchanged.
///
/// # Errors
///
/// Propagates any [`StoreError`] from [`SiteStore::apply_drift`].
pub fn drift_once(store: &SiteStore, max_delta: f64) -> Result<usize, StoreError> {
    if !max_delta.is_finite() || max_delta <= 0.0 {
        return store.apply_drift(|_| 0.0);
    }
    let mut rng = rand::rng();
    store.apply_drift(|_| rng.random_range(-max_delta..=max_delta))
}

/// Run drift rounds forever at the configured interval.
///
/// Waits `start_delay_ms` first. Only returns on a store error, which is
/// treated as fatal for the drift task: an empty window means a store
/// invariant was broken, a poisoned lock means a writer panicked, and an
/// invalid value means a site drifted past the largest storable value.
///
/// # Errors
///
/// Returns the [`StoreError`] that stopped the loop.
pub async fn run_drift(store: Arc<SiteStore>, config: DriftConfig) -> Result<(), StoreError> {
    let interval = Duration::from_millis(config.interval_ms);
    info!(
        interval_ms = config.interval_ms,
        start_delay_ms = config.start_delay_ms,
        max_delta = config.max_delta,
        "Drift task starting"
    );

    tokio::time::sleep(Duration::from_millis(config.start_delay_ms)).await;

    let mut rounds: u64 = 0;
    loop {
        tokio::time::sleep(interval).await;

        match drift_once(&store, config.max_delta) {
            Ok(sites) => {
                rounds = rounds.saturating_add(1);
                debug!(round = rounds, sites, "Drift round applied");
            }
            Err(e) => {
                error!(error = %e, round = rounds, "Drift task stopping");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::publish::NoopPublisher;

    fn store_with_sites() -> Arc<SiteStore> {
        let store = Arc::new(SiteStore::new(Arc::new(NoopPublisher)));
        store.add_site("Google", "", 3.2).unwrap();
        store.add_site("Reddit", "", 0.001).unwrap();
        store
    }

    #[test]
    fn drift_stays_within_bounds() {
        let store = store_with_sites();
        for _ in 0..30 {
            let before = store.snapshot().unwrap();
            assert_eq!(drift_once(&store, 0.003).unwrap(), 2);
            let after = store.snapshot().unwrap();
            for (old, new) in before.sites.iter().zip(&after.sites) {
                let old = old.latest().unwrap();
                let new = new.latest().unwrap();
                assert!(new >= 0.0);
                assert!((new - old).abs() <= 0.003 + 1e-12, "{old} -> {new}");
            }
        }
    }

    #[test]
    fn zero_delta_keeps_values() {
        let store = store_with_sites();
        drift_once(&store, 0.0).unwrap();
        let snap = store.snapshot().unwrap();
        let google = snap.get("Google").unwrap();
        assert_eq!(google.primary.len(), 6);
        assert!((google.latest().unwrap() - 3.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn run_drift_applies_rounds_until_aborted() {
        let store = store_with_sites();
        let start_version = store.snapshot().unwrap().version;
        let config = DriftConfig {
            enabled: true,
            interval_ms: 5,
            start_delay_ms: 0,
            max_delta: 0.01,
        };

        let handle = tokio::spawn(run_drift(Arc::clone(&store), config));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let snap = store.snapshot().unwrap();
        assert!(snap.version > start_version);
        let lens: Vec<usize> = snap.sites.iter().map(|s| s.primary.len()).collect();
        assert!(lens.iter().all(|len| *len == lens[0]));
    }
}
