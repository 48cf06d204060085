//! Background-task helpers for the engine binary.
//!
//! The engine needs two long-lived tasks: the broadcast [`Dispatcher`] and
//! the HTTP server. Both are spawned here so the binary only wires
//! configuration and shutdown.
//!
//! ```rust,ignore
//! let (state, dispatcher) = AppState::new(config, store, cache, bus);
//! let state = Arc::new(state);
//! let dispatcher = spawn_dispatcher(dispatcher, stop_dispatcher);
//! let server = spawn_observer(ServerConfig::from(&state.config.server), state, shutdown)?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::hub::Dispatcher;
use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors from spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Run the broadcast dispatcher on its own task until `shutdown` resolves.
///
/// The task finishes once the events queued before shutdown are delivered.
pub fn spawn_dispatcher<F>(dispatcher: Dispatcher, shutdown: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(dispatcher.run_until(shutdown))
}

/// Spawn the HTTP server on a background task.
///
/// The address is validated before spawning so obvious misconfigurations
/// surface here rather than in the task's log.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if `host:port` is not a valid address.
pub fn spawn_observer<F>(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<JoinHandle<Result<(), ServerError>>, StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.socket_addr()?;
    let port = config.port;

    let handle = tokio::spawn(async move {
        let result = crate::server::start_server(&config, state, shutdown).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Crisis API exited with error");
        }
        result
    });

    tracing::info!(port, "Crisis API spawned on background task");
    Ok(handle)
}
