//! Immutable, point-in-time copies of the site store.
//!
//! A [`StoreSnapshot`] is what publishers and readers see. It is captured
//! inside the store's serialized section, so it never mixes state from
//! before and after a mutation.
//!
//! The serialized field names (`logo`, `access`) match what the dashboard
//! client consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a single site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    /// Site name.
    pub name: String,
    /// Logo reference.
    #[serde(rename = "logo")]
    pub logo_ref: String,
    /// Primary (access) metric window, oldest first.
    #[serde(rename = "access")]
    pub primary: Vec<f64>,
    /// Derived search metric window.
    pub search: Vec<f64>,
    /// Derived transaction metric window.
    pub transaction: Vec<f64>,
    /// Derived interaction metric window.
    pub interaction: Vec<f64>,
    /// Display labels, one per window position.
    pub labels: Vec<String>,
}

impl SiteSnapshot {
    /// Most recent primary value, if any.
    pub fn latest(&self) -> Option<f64> {
        self.primary.last().copied()
    }
}

/// Snapshot of the whole store at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Store version at capture time. Increases by one per committed
    /// mutation, so consumers can discard snapshots that arrive late.
    pub version: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    /// Sites in first-added order.
    pub sites: Vec<SiteSnapshot>,
}

impl StoreSnapshot {
    /// `(name, latest primary value)` pairs in store order, the input
    /// shape expected by [`crate::ranking::top_k`].
    pub fn latest_values(&self) -> Vec<(String, f64)> {
        self.sites
            .iter()
            .filter_map(|site| site.latest().map(|value| (site.name.clone(), value)))
            .collect()
    }

    /// Look up a site by exact name.
    pub fn get(&self, name: &str) -> Option<&SiteSnapshot> {
        self.sites.iter().find(|site| site.name == name)
    }

    /// Sites whose name contains `query`, ignoring case.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a SiteSnapshot> + 'a {
        let needle = query.trim().to_lowercase();
        self.sites
            .iter()
            .filter(move |site| site.name.to_lowercase().contains(&needle))
    }

    /// Number of sites captured.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether no sites were captured.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::site::SiteRecord;

    fn snapshot() -> StoreSnapshot {
        let sites = ["Google", "YouTube", "GitHub"]
            .iter()
            .zip([3.2, 3.15, 0.42])
            .map(|(name, value)| {
                SiteRecord::seeded((*name).to_owned(), String::new(), value).to_snapshot()
            })
            .collect();
        StoreSnapshot {
            version: 3,
            captured_at: Utc::now(),
            sites,
        }
    }

    #[test]
    fn latest_values_keep_store_order() {
        let names: Vec<String> = snapshot()
            .latest_values()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Google", "YouTube", "GitHub"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let snap = snapshot();
        let hits: Vec<&str> = snap.search("TUB").map(|s| s.name.as_str()).collect();
        assert_eq!(hits, vec!["YouTube"]);
        assert_eq!(snap.search("g").count(), 2);
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let json = serde_json::to_value(snapshot()).unwrap();
        let first = &json["sites"][0];
        assert_eq!(first["name"], "Google");
        assert!(first["access"].is_array());
        assert!(first["logo"].is_string());
        assert_eq!(first["labels"][4], "Now");
        assert_eq!(json["version"], 3);
    }
}
