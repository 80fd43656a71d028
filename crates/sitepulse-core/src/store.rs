//! The shared site store.
//!
//! [`SiteStore`] is the single owner of every [`SiteRecord`]. All reads and
//! writes go through one mutex, so a mutation is always observed whole and
//! two writers never interleave their appends on the same window. Each
//! committed mutation bumps the store version and captures a snapshot while
//! the lock is held; the snapshot is handed to the [`Publisher`] only after
//! the lock is released.
//!
//! Rejected requests (`DuplicateName`, `NotFound`, `InvalidValue`,
//! `InvalidName`) are detected before anything is touched and never
//! publish.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use crate::publish::Publisher;
use crate::ranking::{self, RankedSite};
use crate::site::{SiteRecord, INTERACTION_FACTOR};
use crate::snapshot::StoreSnapshot;
use crate::window::WindowError;

/// Errors returned by [`SiteStore`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A site with the same name (ignoring case) already exists.
    #[error("site already exists: {0}")]
    DuplicateName(String),

    /// No site has this exact name.
    #[error("site not found: {0}")]
    NotFound(String),

    /// The value is negative, not a finite number, or so large that a
    /// derived metric would overflow.
    #[error("invalid value {value} for site {name}: must be a finite number >= 0")]
    InvalidValue {
        /// Site the value was submitted for.
        name: String,
        /// The rejected value.
        value: f64,
    },

    /// The site name is empty after trimming.
    #[error("site name must not be blank")]
    InvalidName,

    /// A record had no samples to drift from. Seeding makes this
    /// unreachable; seeing it means a store invariant was broken.
    #[error("site {name} has an empty metric window")]
    EmptyWindow {
        /// The offending site.
        name: String,
    },

    /// Another thread panicked while holding the store lock.
    #[error("site store lock poisoned")]
    Poisoned,
}

/// Mutable state behind the store lock.
#[derive(Debug, Default)]
struct StoreInner {
    sites: Vec<SiteRecord>,
    version: u64,
}

impl StoreInner {
    fn position(&self, name: &str) -> Option<usize> {
        self.sites.iter().position(|site| site.name() == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut SiteRecord> {
        self.sites.iter_mut().find(|site| site.name() == name)
    }

    fn capture(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: self.version,
            captured_at: Utc::now(),
            sites: self.sites.iter().map(SiteRecord::to_snapshot).collect(),
        }
    }

    /// Bump the version and capture the post-mutation snapshot.
    fn commit(&mut self) -> Arc<StoreSnapshot> {
        self.version = self.version.saturating_add(1);
        Arc::new(self.capture())
    }
}

/// Thread-safe store of tracked sites.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct SiteStore {
    inner: Mutex<StoreInner>,
    publisher: Arc<dyn Publisher>,
}

impl std::fmt::Debug for SiteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteStore").finish_non_exhaustive()
    }
}

impl SiteStore {
    /// Create an empty store that reports mutations to `publisher`.
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            publisher,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_poisoned| StoreError::Poisoned)
    }

    fn publish(&self, snapshot: Arc<StoreSnapshot>) {
        debug!(
            version = snapshot.version,
            sites = snapshot.len(),
            "Publishing store snapshot"
        );
        self.publisher.publish(snapshot);
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Add a site seeded with a five-point ramp ending at `initial_value`.
    ///
    /// The name is trimmed before storing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] if the name is blank.
    /// - [`StoreError::InvalidValue`] if `initial_value` is negative or not
    ///   finite.
    /// - [`StoreError::DuplicateName`] if a site with the same name exists,
    ///   ignoring case.
    pub fn add_site(
        &self,
        name: &str,
        logo_ref: &str,
        initial_value: f64,
    ) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        check_value(name, initial_value)?;

        let snapshot = {
            let mut inner = self.lock()?;
            if inner
                .sites
                .iter()
                .any(|site| site.name_matches_ignore_case(name))
            {
                return Err(StoreError::DuplicateName(name.to_owned()));
            }
            inner.sites.push(SiteRecord::seeded(
                name.to_owned(),
                logo_ref.to_owned(),
                initial_value,
            ));
            inner.commit()
        };

        info!(site = name, initial_value, "Site added");
        self.publish(snapshot);
        Ok(())
    }

    /// Remove the site with this exact name.
    ///
    /// Returns `Ok(false)` without publishing when no such site exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn remove_site(&self, name: &str) -> Result<bool, StoreError> {
        let snapshot = {
            let mut inner = self.lock()?;
            let Some(index) = inner.position(name) else {
                return Ok(false);
            };
            inner.sites.remove(index);
            inner.commit()
        };

        info!(site = name, "Site removed");
        self.publish(snapshot);
        Ok(true)
    }

    /// Append a new primary value (and its derived values) to one site.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidValue`] if `value` is negative or not finite.
    /// - [`StoreError::NotFound`] if no site has this exact name.
    pub fn set_value(&self, name: &str, value: f64) -> Result<(), StoreError> {
        check_value(name, value)?;

        let snapshot = {
            let mut inner = self.lock()?;
            let site = inner
                .get_mut(name)
                .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;
            site.append(value);
            inner.commit()
        };

        debug!(site = name, value, "Site value set");
        self.publish(snapshot);
        Ok(())
    }

    /// Apply several overrides as one atomic batch with a single publish.
    ///
    /// Every entry is validated before anything is appended; one bad entry
    /// rejects the whole batch. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidValue`] for the first bad value, otherwise
    /// [`StoreError::NotFound`] for the first unknown name.
    pub fn set_values(&self, batch: &[(String, f64)]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        for (name, value) in batch {
            check_value(name, *value)?;
        }

        let snapshot = {
            let mut inner = self.lock()?;
            if let Some((missing, _)) = batch
                .iter()
                .find(|(name, _)| inner.position(name).is_none())
            {
                return Err(StoreError::NotFound(missing.clone()));
            }
            for (name, value) in batch {
                if let Some(site) = inner.get_mut(name) {
                    site.append(*value);
                }
            }
            inner.commit()
        };

        info!(sites = batch.len(), "Site values overridden");
        self.publish(snapshot);
        Ok(())
    }

    /// Drift every site by a caller-chosen delta, as one batch.
    ///
    /// For each site, `delta(name)` is added to the latest primary value
    /// and the result, clamped at zero, is appended. The whole batch is
    /// committed under one lock and published once, even when the store is
    /// empty. Returns the number of sites drifted.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptyWindow`] if any site has no samples.
    /// - [`StoreError::InvalidValue`] if a drifted value is NaN or too
    ///   large, as [`SiteStore::set_value`] would reject it.
    ///
    /// On error nothing is appended and nothing is published.
    pub fn apply_drift<F>(&self, mut delta: F) -> Result<usize, StoreError>
    where
        F: FnMut(&str) -> f64,
    {
        let (count, snapshot) = {
            let mut inner = self.lock()?;
            let next_values = inner
                .sites
                .iter()
                .map(|site| -> Result<f64, StoreError> {
                    let current = site.latest().map_err(|WindowError::EmptyWindow| {
                        StoreError::EmptyWindow {
                            name: site.name().to_owned(),
                        }
                    })?;
                    let raw = current + delta(site.name());
                    // NaN fails the comparison and is rejected below.
                    let next = if raw < 0.0 { 0.0 } else { raw };
                    check_value(site.name(), next)?;
                    Ok(next)
                })
                .collect::<Result<Vec<f64>, StoreError>>()?;

            for (site, value) in inner.sites.iter_mut().zip(next_values) {
                site.append(value);
            }
            (inner.sites.len(), inner.commit())
        };

        debug!(sites = count, version = snapshot.version, "Drift batch applied");
        self.publish(snapshot);
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Capture a consistent copy of every site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.lock()?.capture())
    }

    /// Rank sites by their latest primary value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn top_k(&self, k: usize) -> Result<Vec<RankedSite>, StoreError> {
        let pairs = self.snapshot()?.latest_values();
        Ok(ranking::top_k(&pairs, k))
    }

    /// Whether a site with this exact name exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn contains(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.position(name).is_some())
    }

    /// Number of sites.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.sites.len())
    }

    /// Whether the store has no sites.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.sites.is_empty())
    }
}

/// Reject negative and non-finite values, and values whose largest
/// derived metric would overflow to infinity.
fn check_value(name: &str, value: f64) -> Result<(), StoreError> {
    if value >= 0.0 && (value * INTERACTION_FACTOR).is_finite() {
        Ok(())
    } else {
        Err(StoreError::InvalidValue {
            name: name.to_owned(),
            value,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::*;
    use crate::publish::NoopPublisher;
    use crate::window::WINDOW_CAPACITY;

    /// Publisher that keeps every snapshot it receives.
    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Arc<StoreSnapshot>>>,
    }

    impl RecordingPublisher {
        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }

        fn last(&self) -> Option<Arc<StoreSnapshot>> {
            self.published.lock().unwrap().last().cloned()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, snapshot: Arc<StoreSnapshot>) {
            self.published.lock().unwrap().push(snapshot);
        }
    }

    fn store() -> (SiteStore, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = SiteStore::new(Arc::clone(&publisher) as Arc<dyn Publisher>);
        store.add_site("Google", "logo-g", 3.2).unwrap();
        store.add_site("GitHub", "logo-gh", 0.42).unwrap();
        (store, publisher)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn add_site_seeds_five_points() {
        let (store, publisher) = store();
        let snap = store.snapshot().unwrap();
        let google = snap.get("Google").unwrap();
        for window in [&google.primary, &google.search, &google.transaction, &google.interaction] {
            assert_eq!(window.len(), 5);
        }
        assert_eq!(google.latest(), Some(3.2));
        assert_eq!(google.labels.len(), 5);
        assert_eq!(publisher.count(), 2);
    }

    #[test]
    fn duplicate_name_is_rejected_case_insensitively() {
        let (store, publisher) = store();
        let before = store.snapshot().unwrap();

        let err = store.add_site("google", "other", 9.0).unwrap_err();
        assert_eq!(err, StoreError::DuplicateName(String::from("google")));
        let err = store.add_site("Google", "other", 9.0).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));

        let after = store.snapshot().unwrap();
        assert_eq!(after.sites, before.sites);
        assert_eq!(after.version, before.version);
        assert_eq!(publisher.count(), 2);
    }

    #[test]
    fn blank_name_and_bad_initial_value_are_rejected() {
        let (store, publisher) = store();
        assert_eq!(store.add_site("   ", "x", 1.0), Err(StoreError::InvalidName));
        assert!(matches!(
            store.add_site("Bing", "x", -1.0),
            Err(StoreError::InvalidValue { .. })
        ));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(publisher.count(), 2);
    }

    #[test]
    fn set_value_appends_and_publishes() {
        let (store, publisher) = store();
        store.set_value("Google", 4.0).unwrap();
        let snap = publisher.last().unwrap();
        let google = snap.get("Google").unwrap();
        assert_eq!(google.primary.len(), 6);
        assert_eq!(google.latest(), Some(4.0));
        assert_close(*google.search.last().unwrap(), 8.0);
        assert_close(*google.transaction.last().unwrap(), 0.4);
        assert_close(*google.interaction.last().unwrap(), 20.0);
        assert_eq!(publisher.count(), 3);
    }

    #[test]
    fn set_value_rejections_do_not_publish() {
        let (store, publisher) = store();
        assert_eq!(
            store.set_value("Bing", 1.0),
            Err(StoreError::NotFound(String::from("Bing")))
        );
        // Lookup is exact-name.
        assert!(matches!(store.set_value("google", 1.0), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.set_value("Google", -0.5),
            Err(StoreError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set_value("Google", f64::NAN),
            Err(StoreError::InvalidValue { .. })
        ));
        assert_eq!(publisher.count(), 2);
        assert_eq!(store.snapshot().unwrap().get("Google").unwrap().primary.len(), 5);
    }

    #[test]
    fn windows_stay_bounded_and_evict_fifo() {
        let (store, _publisher) = store();
        for i in 0..50_u32 {
            store.set_value("GitHub", f64::from(i)).unwrap();
            let snap = store.snapshot().unwrap();
            let github = snap.get("GitHub").unwrap();
            assert!(github.primary.len() <= WINDOW_CAPACITY);
            assert_eq!(github.primary.len(), github.search.len());
            assert_eq!(github.primary.len(), github.transaction.len());
            assert_eq!(github.primary.len(), github.interaction.len());
            assert_eq!(github.primary.len(), github.labels.len());
        }
        let snap = store.snapshot().unwrap();
        let expected: Vec<f64> = (30..50_u32).map(f64::from).collect();
        assert_eq!(snap.get("GitHub").unwrap().primary, expected);
    }

    #[test]
    fn remove_site_is_exact_and_absent_is_noop() {
        let (store, publisher) = store();
        let before = store.snapshot().unwrap();

        assert!(!store.remove_site("Bing").unwrap());
        assert!(!store.remove_site("google").unwrap());
        assert_eq!(publisher.count(), 2);
        assert_eq!(store.snapshot().unwrap().sites, before.sites);

        assert!(store.remove_site("Google").unwrap());
        assert_eq!(publisher.count(), 3);
        assert!(!store.contains("Google").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn removed_name_can_be_added_again() {
        let (store, _publisher) = store();
        store.remove_site("Google").unwrap();
        store.add_site("GOOGLE", "logo", 1.0).unwrap();
        let names: Vec<String> = store
            .snapshot()
            .unwrap()
            .sites
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["GitHub", "GOOGLE"]);
    }

    #[test]
    fn set_values_is_all_or_nothing() {
        let (store, publisher) = store();
        let bad = vec![(String::from("Google"), 5.0), (String::from("Bing"), 1.0)];
        assert!(matches!(store.set_values(&bad), Err(StoreError::NotFound(_))));
        assert_eq!(store.snapshot().unwrap().get("Google").unwrap().latest(), Some(3.2));
        assert_eq!(publisher.count(), 2);

        let good = vec![(String::from("Google"), 5.0), (String::from("GitHub"), 1.0)];
        store.set_values(&good).unwrap();
        assert_eq!(publisher.count(), 3);
        let snap = publisher.last().unwrap();
        assert_eq!(snap.get("Google").unwrap().latest(), Some(5.0));
        assert_eq!(snap.get("GitHub").unwrap().latest(), Some(1.0));
    }

    #[test]
    fn drift_publishes_once_and_clamps_at_zero() {
        let (store, publisher) = store();
        let drifted = store
            .apply_drift(|name| if name == "Google" { 0.5 } else { -10.0 })
            .unwrap();
        assert_eq!(drifted, 2);
        assert_eq!(publisher.count(), 3);

        let snap = publisher.last().unwrap();
        assert_close(snap.get("Google").unwrap().latest().unwrap(), 3.7);
        assert_eq!(snap.get("GitHub").unwrap().latest(), Some(0.0));
    }

    #[test]
    fn drift_on_empty_store_still_publishes_once() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = SiteStore::new(Arc::clone(&publisher) as Arc<dyn Publisher>);
        assert_eq!(store.apply_drift(|_| 1.0).unwrap(), 0);
        assert_eq!(publisher.count(), 1);
        let snap = publisher.last().unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn values_that_overflow_derived_metrics_are_rejected() {
        let (store, publisher) = store();

        assert!(matches!(
            store.set_value("Google", f64::MAX),
            Err(StoreError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.add_site("Big", "", 1e308),
            Err(StoreError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set_values(&[(String::from("GitHub"), f64::INFINITY)]),
            Err(StoreError::InvalidValue { .. })
        ));

        assert!(!store.contains("Big").unwrap());
        assert_eq!(store.snapshot().unwrap().get("Google").unwrap().latest(), Some(3.2));
        assert_eq!(publisher.count(), 2);
    }

    #[test]
    fn largest_accepted_value_serializes_as_numbers() {
        let (store, _publisher) = store();
        store.set_value("Google", f64::MAX / 10.0).unwrap();

        let json = serde_json::to_value(store.snapshot().unwrap()).unwrap();
        let google = &json["sites"][0];
        for key in ["access", "search", "transaction", "interaction"] {
            assert!(
                google[key].as_array().unwrap().iter().all(serde_json::Value::is_f64),
                "{key} has a non-numeric entry"
            );
        }
    }

    #[test]
    fn drift_rejects_non_finite_results_without_appending() {
        let (store, publisher) = store();

        for bad in [f64::INFINITY, f64::NAN] {
            let err = store.apply_drift(|_| bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidValue { .. }));
        }
        assert_eq!(publisher.count(), 2);
        assert_eq!(store.snapshot().unwrap().get("Google").unwrap().primary.len(), 5);

        // Negative infinity is a huge drop, which clamps at zero.
        store.apply_drift(|_| f64::NEG_INFINITY).unwrap();
        let snap = publisher.last().unwrap();
        assert_eq!(snap.get("Google").unwrap().latest(), Some(0.0));
        assert_eq!(snap.get("GitHub").unwrap().latest(), Some(0.0));
    }

    #[test]
    fn versions_increase_per_commit() {
        let (store, publisher) = store();
        store.set_value("Google", 1.0).unwrap();
        store.apply_drift(|_| 0.0).unwrap();
        let versions: Vec<u64> = publisher
            .published
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn store_top_k_uses_latest_values() {
        let (store, _publisher) = store();
        store.add_site("YouTube", "logo-y", 3.15).unwrap();
        let ranked = store.top_k(2).unwrap();
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Google", "YouTube"]);
    }

    #[test]
    fn drift_batches_are_atomic_to_readers() {
        let store = Arc::new(SiteStore::new(Arc::new(NoopPublisher)));
        for name in ["A", "B", "C", "D", "E"] {
            store.add_site(name, "", 1.0).unwrap();
        }

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..500 {
                    store.apply_drift(|_| 1.0).unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            let snap = store.snapshot().unwrap();
            let latest: Vec<f64> = snap.sites.iter().filter_map(|s| s.latest()).collect();
            let first = latest.first().copied().unwrap();
            assert!(latest.iter().all(|v| *v == first), "torn batch: {latest:?}");
        }
        writer.join().unwrap();

        let snap = store.snapshot().unwrap();
        assert!(snap.sites.iter().all(|s| s.latest() == Some(501.0)));
    }

    #[test]
    fn concurrent_set_value_keeps_windows_consistent() {
        let (store, _publisher) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..4_u32)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100_u32 {
                        store.set_value("Google", f64::from(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = store.snapshot().unwrap();
        let google = snap.get("Google").unwrap();
        assert_eq!(google.primary.len(), WINDOW_CAPACITY);
        for (i, p) in google.primary.iter().enumerate() {
            assert_close(google.search[i], p * 2.0);
            assert_close(google.interaction[i], p * 5.0);
        }
        assert_eq!(snap.version, 2 + 400);
    }
}
