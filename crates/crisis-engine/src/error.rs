//! Error types for the service binary.
//!
//! [`EngineError`] wraps every failure that can stop the service during
//! startup or while the API is serving.

/// Top-level error for the service binary.
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
        source: crisis_core::ConfigError,
    },

    /// The configured `PostgreSQL` database could not be used.
    #[error("database error: {source}")]
    Database {
        /// The underlying data-layer error.
        #[from]
        source: crisis_db::DbError,
    },

    /// The API server could not be spawned.
    #[error("startup error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: crisis_observer::startup::StartupError,
    },

    /// The API server stopped with an error.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: crisis_observer::server::ServerError,
    },

    /// A background task panicked or was aborted.
    #[error("task error: {message}")]
    Task {
        /// Description of the task failure.
        message: String,
    },
}
