//! Error types for the Verdant engine binary.
//!
//! [`EngineError`] wraps every startup failure so `main` can propagate
//! with `?`. Once the driver is running, failures are reported per cycle
//! instead.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: verdant_core::config::ConfigError,
    },

    /// A persistence backend could not be reached or migrated.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying database error.
        #[from]
        source: verdant_db::DbError,
    },

    /// The activity source or feedback generator could not be built.
    #[error("remote error: {source}")]
    Remote {
        /// The underlying remote error.
        #[from]
        source: verdant_remote::RemoteError,
    },

    /// Observer API server failed.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the observer failure.
        message: String,
    },
}
