//! Shared site metric store and ranking for `SitePulse`.
//!
//! This crate owns the state every other part of the system reads and
//! writes: a small set of named sites, each with a bounded history of
//! traffic and three metrics derived from it.
//!
//! # Modules
//!
//! - [`window`] -- [`MetricWindow`], the fixed-capacity FIFO series.
//! - [`site`] -- [`SiteRecord`], one site's four windows kept in lockstep.
//! - [`store`] -- [`SiteStore`], the mutex-guarded owner of all records and
//!   the only place mutations happen.
//! - [`snapshot`] -- immutable point-in-time copies handed to readers.
//! - [`publish`] -- the [`Publisher`] capability called after each commit.
//! - [`ranking`] -- bounded-heap top-K over `(name, value)` pairs.
//! - [`drift`] -- the periodic random-drift producer.
//! - [`config`] -- `sitepulse-config.yaml` loading.
//! - [`format`] -- B/M/K traffic formatting for display.
//!
//! [`MetricWindow`]: window::MetricWindow
//! [`SiteRecord`]: site::SiteRecord
//! [`SiteStore`]: store::SiteStore
//! [`Publisher`]: publish::Publisher

pub mod config;
pub mod drift;
pub mod format;
pub mod publish;
pub mod ranking;
pub mod site;
pub mod snapshot;
pub mod store;
pub mod window;

pub use publish::{NoopPublisher, Publisher};
pub use ranking::{top_k, RankedSite};
pub use site::{auto_logo_ref, SiteRecord};
pub use snapshot::{SiteSnapshot, StoreSnapshot};
pub use store::{SiteStore, StoreError};
pub use window::{MetricWindow, WindowError, WINDOW_CAPACITY};
