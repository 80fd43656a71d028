//! A single tracked site and its four metric windows.
//!
//! The primary metric (access traffic) is the only value ever supplied by
//! callers. The search, transaction, and interaction metrics are derived
//! from it at append time, so all four windows always grow and evict in
//! lockstep.

use crate::snapshot::SiteSnapshot;
use crate::window::{MetricWindow, WindowError};

/// Multiplier from primary traffic to the derived search metric.
pub const SEARCH_FACTOR: f64 = 2.0;

/// Multiplier from primary traffic to the derived transaction metric.
pub const TRANSACTION_FACTOR: f64 = 0.1;

/// Multiplier from primary traffic to the derived interaction metric.
pub const INTERACTION_FACTOR: f64 = 5.0;

/// Fractions of the initial value used to fabricate a short history for
/// a newly added site. The last point anchors at the submitted value.
pub const SEED_RAMP: [f64; 5] = [0.90, 0.95, 0.98, 1.00, 1.00];

/// Label shown under the most recent sample.
pub const NOW_LABEL: &str = "Now";

/// One site's identity plus its primary and derived metric windows.
///
/// Fields are private: the only way to change the windows is
/// [`SiteRecord::append`], which keeps the derived metrics consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    name: String,
    logo_ref: String,
    primary: MetricWindow,
    search: MetricWindow,
    transaction: MetricWindow,
    interaction: MetricWindow,
}

impl SiteRecord {
    /// Create a record seeded with the [`SEED_RAMP`] scaled by
    /// `initial_value`.
    pub fn seeded(name: String, logo_ref: String, initial_value: f64) -> Self {
        let mut record = Self {
            name,
            logo_ref,
            primary: MetricWindow::new(),
            search: MetricWindow::new(),
            transaction: MetricWindow::new(),
            interaction: MetricWindow::new(),
        };
        for fraction in SEED_RAMP {
            record.append(fraction * initial_value);
        }
        record
    }

    /// The site's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque logo reference (usually a URL).
    pub fn logo_ref(&self) -> &str {
        &self.logo_ref
    }

    /// Whether `other` names this site, ignoring case.
    pub fn name_matches_ignore_case(&self, other: &str) -> bool {
        self.name.to_lowercase() == other.to_lowercase()
    }

    /// Append a primary sample and its derived values to all four windows.
    pub fn append(&mut self, primary: f64) {
        self.primary.append(primary);
        self.search.append(primary * SEARCH_FACTOR);
        self.transaction.append(primary * TRANSACTION_FACTOR);
        self.interaction.append(primary * INTERACTION_FACTOR);
    }

    /// Most recent primary value.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::EmptyWindow`] if the record was never seeded.
    pub fn latest(&self) -> Result<f64, WindowError> {
        self.primary.latest()
    }

    /// Number of samples in each window.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Whether the windows are empty.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Display labels aligned with the window positions.
    ///
    /// Every position is blank except the newest, which reads
    /// [`NOW_LABEL`].
    pub fn labels(&self) -> Vec<String> {
        let len = self.len();
        (0..len)
            .map(|i| {
                if i.saturating_add(1) == len {
                    String::from(NOW_LABEL)
                } else {
                    String::new()
                }
            })
            .collect()
    }

    /// Copy the record into an immutable snapshot.
    pub fn to_snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            name: self.name.clone(),
            logo_ref: self.logo_ref.clone(),
            primary: self.primary.values().collect(),
            search: self.search.values().collect(),
            transaction: self.transaction.values().collect(),
            interaction: self.interaction.values().collect(),
            labels: self.labels(),
        }
    }
}

/// Build a logo URL for a site that was submitted without one.
///
/// The name is trimmed and lowercased; `.com` is appended when it has no
/// domain suffix.
pub fn auto_logo_ref(name: &str) -> String {
    let mut domain = name.trim().to_lowercase();
    if !domain.contains('.') {
        domain.push_str(".com");
    }
    format!("https://logo.clearbit.com/{domain}")
}
