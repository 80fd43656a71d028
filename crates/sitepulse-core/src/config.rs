//! Configuration loading and typed config structures for `SitePulse`.
//!
//! The configuration lives in `sitepulse-config.yaml` in the working
//! directory. Every section and field has a default, so an empty or missing
//! file yields a runnable setup tracking the seven default sites.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PulseConfig {
    /// Observer HTTP/WebSocket server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Periodic drift simulation.
    #[serde(default)]
    pub drift: DriftConfig,

    /// Interactive console.
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sites added at startup, in order.
    #[serde(default = "default_sites")]
    pub sites: Vec<SeedSite>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            drift: DriftConfig::default(),
            console: ConsoleConfig::default(),
            logging: LoggingConfig::default(),
            sites: default_sites(),
        }
    }
}

impl PulseConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override the server address:
    /// - `SITEPULSE_HOST` overrides `server.host`
    /// - `SITEPULSE_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.server.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drift.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "drift.interval_ms",
                reason: String::from("must be greater than zero"),
            });
        }
        if !self.drift.max_delta.is_finite() || self.drift.max_delta < 0.0 {
            return Err(ConfigError::Invalid {
                field: "drift.max_delta",
                reason: format!("must be a finite number >= 0, got {}", self.drift.max_delta),
            });
        }
        if self.console.default_top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "console.default_top_k",
                reason: String::from("must be at least 1"),
            });
        }
        Ok(())
    }
}

/// Observer server bind address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind (e.g. `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    /// Override the bind address with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `SITEPULSE_PORT` is not a port
    /// number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("SITEPULSE_HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("SITEPULSE_PORT") {
            self.port = val.parse().map_err(|e| ConfigError::Invalid {
                field: "server.port",
                reason: format!("SITEPULSE_PORT={val}: {e}"),
            })?;
        }
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Periodic drift simulation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriftConfig {
    /// Whether the drift task runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Milliseconds between drift batches.
    #[serde(default = "default_drift_interval_ms")]
    pub interval_ms: u64,

    /// Milliseconds to wait before the first batch.
    #[serde(default = "default_drift_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Largest absolute per-site change per batch, in billions.
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_drift_interval_ms(),
            start_delay_ms: default_drift_start_delay_ms(),
            max_delta: default_max_delta(),
        }
    }
}

/// Interactive console settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsoleConfig {
    /// Whether to read commands from stdin.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// K used by top-K queries that do not specify one.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_top_k: default_top_k(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn,
    /// error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A site added at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedSite {
    /// Site name.
    pub name: String,

    /// Logo reference; generated from the name when omitted.
    #[serde(default)]
    pub logo: Option<String>,

    /// Initial traffic, in billions.
    pub initial_value: f64,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

fn default_host() -> String {
    String::from("127.0.0.1")
}

const fn default_port() -> u16 {
    5000
}

const fn default_drift_interval_ms() -> u64 {
    2000
}

const fn default_drift_start_delay_ms() -> u64 {
    2000
}

const fn default_max_delta() -> f64 {
    0.003
}

const fn default_top_k() -> usize {
    3
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_sites() -> Vec<SeedSite> {
    [
        ("Google", 3.2),
        ("YouTube", 3.15),
        ("Facebook", 2.98),
        ("Instagram", 2.05),
        ("TikTok", 1.68),
        ("GitHub", 0.42),
        ("Reddit", 0.38),
    ]
    .into_iter()
    .map(|(name, initial_value)| SeedSite {
        name: name.to_owned(),
        logo: None,
        initial_value,
    })
    .collect()
}
