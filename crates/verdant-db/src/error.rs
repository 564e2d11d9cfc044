//! Error types for the persistence layer.
//!
//! [`DbError`] wraps driver failures from [`sqlx`] and [`fred`]. The state
//! stores hand it to the reconciler as [`StoreError::Unavailable`]; version
//! conflicts and undecodable records are reported by the stores directly.

use verdant_core::store::StoreError;

/// A persistence backend failure.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Query or connection failure on `PostgreSQL`.
    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Applying the embedded migrations failed.
    #[error("postgres migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Command or connection failure on `Dragonfly`.
    #[error("dragonfly: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored JSON document could not be encoded or decoded.
    #[error("record encoding: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A connection URL could not be parsed.
    #[error("connection config: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}
