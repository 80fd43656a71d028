//! `SitePulse` engine binary.
//!
//! This is the main entry point that wires together the site store, the
//! observer server, the drift task, and the operator console. It loads
//! configuration, seeds the store, starts every producer, and runs until
//! the operator exits or the process is signalled.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `sitepulse-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the store and seed the configured sites
//! 4. Start the Observer HTTP + `WebSocket` server
//! 5. Start the drift task
//! 6. Start the operator console on its own thread
//! 7. Wait for Ctrl-C, console exit, or server failure

mod console;
mod error;

use std::io;
use std::path::Path;
use std::sync::Arc;

use sitepulse_core::config::{LoggingConfig, PulseConfig, SeedSite};
use sitepulse_core::{auto_logo_ref, drift, SiteStore};
use sitepulse_observer::server::ServerConfig;
use sitepulse_observer::state::AppState;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::{Console, ConsoleExit};
use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_FILE: &str = "sitepulse-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, seeding fails, the
/// server cannot bind, or the server stops with an error.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is configured from it, so this runs first.
    let config_path = Path::new(CONFIG_FILE);
    let config_found = config_path.exists();
    let config = load_config(config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("sitepulse-engine starting");
    if config_found {
        info!(path = CONFIG_FILE, "Configuration loaded");
    } else {
        info!("Config file not found, using defaults");
    }

    // 3. Create the store and seed it.
    let app_state = Arc::new(AppState::new(config.console.default_top_k));
    seed_sites(&app_state.store, &config.sites)?;

    // 4. Start Observer API server.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let (addr, mut server_handle) =
        sitepulse_observer::spawn_observer(&server_config, Arc::clone(&app_state)).await?;
    info!(%addr, "Observer API server started");

    // 5. Start the drift task.
    let drift_handle = if config.drift.enabled {
        Some(tokio::spawn(drift::run_drift(
            Arc::clone(&app_state.store),
            config.drift.clone(),
        )))
    } else {
        info!("Drift disabled");
        None
    };

    // 6. Start the operator console.
    let exit_requested = Arc::new(Notify::new());
    if config.console.enabled {
        spawn_console(
            Arc::clone(&app_state.store),
            config.console.default_top_k,
            Arc::clone(&exit_requested),
        )?;
    } else {
        info!("Console disabled");
    }

    // 7. Run until something asks us to stop.
    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        () = exit_requested.notified() => {
            info!("Exit requested from console");
            Ok(())
        }
        joined = &mut server_handle => match joined {
            Ok(Ok(())) => {
                warn!("Observer server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
    };

    if let Some(handle) = drift_handle {
        handle.abort();
    }
    server_handle.abort();

    info!(
        sites = app_state.store.len().unwrap_or(0),
        "sitepulse-engine shutdown complete"
    );

    outcome
}

/// Load the configuration from `path`, or defaults when it does not exist.
fn load_config(path: &Path) -> Result<PulseConfig, EngineError> {
    if path.exists() {
        Ok(PulseConfig::from_file(path)?)
    } else {
        // Still parsed so environment overrides apply.
        Ok(PulseConfig::parse("")?)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so they
/// do not interleave with console prompts on stdout.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Add every configured site in order.
///
/// Sites without a logo get one generated from their name.
fn seed_sites(store: &SiteStore, sites: &[SeedSite]) -> Result<(), EngineError> {
    for site in sites {
        let logo = site
            .logo
            .clone()
            .unwrap_or_else(|| auto_logo_ref(&site.name));
        store.add_site(&site.name, &logo, site.initial_value)?;
    }
    info!(count = sites.len(), "Sites seeded");
    Ok(())
}

/// Run the console on a dedicated OS thread reading stdin.
///
/// Stdin reads block, so the console stays off the async runtime. The
/// thread is detached: process exit ends it.
fn spawn_console(
    store: Arc<SiteStore>,
    default_top_k: usize,
    exit_requested: Arc<Notify>,
) -> Result<(), EngineError> {
    std::thread::Builder::new()
        .name(String::from("console"))
        .spawn(move || {
            let mut console = Console::new(store, default_top_k, io::stdin().lock(), io::stdout());
            match console.run() {
                Ok(ConsoleExit::ExitRequested) => exit_requested.notify_one(),
                Ok(ConsoleExit::InputClosed) => {
                    info!("Console input closed, server keeps running");
                }
                Err(e) => error!(error = %e, "Console stopped"),
            }
        })
        .map(|_detached| ())
        .map_err(|e| EngineError::Console {
            message: format!("failed to spawn console thread: {e}"),
        })
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
