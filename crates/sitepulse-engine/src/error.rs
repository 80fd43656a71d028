//! Error types for the `SitePulse` engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and while the engine runs.

use sitepulse_core::config::ConfigError;
use sitepulse_core::StoreError;
use sitepulse_observer::StartupError;

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Seeding or mutating the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: StartupError,
    },

    /// The console thread could not be started.
    #[error("console error: {message}")]
    Console {
        /// Description of the console failure.
        message: String,
    },
}
