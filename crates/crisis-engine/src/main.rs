//! Service binary for the Nexus crisis-response service.
//!
//! Loads configuration, connects the record store, cache and event bus,
//! starts the broadcast dispatcher and serves the HTTP and `WebSocket` API
//! until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`CRISIS_CONFIG`, first argument, or
//!    `crisis-config.yaml`; environment variables override the file)
//! 2. Initialize structured logging (tracing)
//! 3. Connect `PostgreSQL` and run migrations, or fall back to memory
//! 4. Connect Dragonfly and NATS when configured
//! 5. Build shared state and spawn the broadcast dispatcher
//! 6. Serve the API until a shutdown signal arrives
//! 7. Drain the dispatcher

mod backends;
mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crisis_core::{CrisisConfig, LogFormat};
use crisis_observer::AppState;
use crisis_observer::server::ServerConfig;
use crisis_observer::startup::{spawn_dispatcher, spawn_observer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "crisis-config.yaml";

/// How long the dispatcher may keep delivering queued events after it is
/// told to stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the configured database
/// is unusable, or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config);
    info!("crisis-engine starting");
    info!(
        source = %config_source,
        port = config.server.port,
        queue_capacity = config.realtime.queue_capacity,
        ws_enabled = config.realtime.ws_enabled,
        broadcast_enabled = config.alerts.broadcast_enabled,
        "Configuration loaded"
    );

    // 3-4. Connect backends.
    let store = backends::connect_store(&config).await?;
    let cache = backends::connect_cache(&config).await;
    let bus = backends::connect_bus(&config).await;
    info!(
        store = store.backend(),
        cache_enabled = cache.is_enabled(),
        event_bus = bus.backend(),
        "Backends ready"
    );

    // 5. Shared state and dispatcher.
    let server_config = ServerConfig::from(&config.server);
    let (state, dispatcher) = AppState::new(config, store, cache, bus);
    let (stop_dispatcher, dispatcher_stopped) = oneshot::channel::<()>();
    let mut dispatcher = spawn_dispatcher(dispatcher, async move {
        if dispatcher_stopped.await.is_err() {
            debug!("dispatcher stop handle dropped");
        }
    });

    // 6. Serve until shutdown.
    let server = spawn_observer(server_config, Arc::new(state), shutdown_signal())?;
    server.await.map_err(|e| EngineError::Task {
        message: format!("server task failed: {e}"),
    })??;

    // 7. Drain queued events. WebSocket tasks can outlive the server and
    // keep hub clones alive, so the dispatcher is stopped explicitly.
    if stop_dispatcher.send(()).is_err() {
        warn!("dispatcher exited before shutdown");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut dispatcher)
        .await
        .is_err()
    {
        warn!("dispatcher did not drain in time, aborting");
        dispatcher.abort();
    }

    info!("crisis-engine shutdown complete");
    Ok(())
}

/// Resolve the config path and load it.
///
/// A missing file is not an error: defaults plus environment overrides
/// are used instead.
fn load_config() -> Result<(CrisisConfig, String), EngineError> {
    let path = std::env::var("CRISIS_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| std::env::args().nth(1))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    if path.exists() {
        let config = CrisisConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        Ok((CrisisConfig::from_env()?, "defaults".to_owned()))
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(config: &CrisisConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
