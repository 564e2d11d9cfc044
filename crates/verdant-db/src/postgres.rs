//! `PostgreSQL` connection pool for the `tracked_state` table.
//!
//! Queries are built at runtime (not compile-time checked) so the crate
//! builds without a live database. Every query is parameterized.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use verdant_core::config::StorageConfig;

use crate::error::DbError;
use crate::tracked_store::PostgresStateStore;

/// How long to wait for a pooled connection before failing a query.
///
/// Kept short: a reconciliation cycle that cannot reach the store fails
/// and is retried on the next trigger.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections are closed after this long. Cycles are far apart, so
/// most of the time the pool is empty.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection pool handle to `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Connect using the `storage` section (`postgres_url`,
    /// `max_connections`).
    ///
    /// # Errors
    ///
    /// See [`connect_url`](Self::connect_url).
    pub async fn connect(config: &StorageConfig) -> Result<Self, DbError> {
        Self::connect_url(&config.postgres_url, config.max_connections).await
    }

    /// Connect to `url` with at most `max_connections` pooled connections.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Postgres`] if no connection can be opened.
    pub async fn connect_url(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Apply the embedded `migrations/` (creates `tracked_state`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// The underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A state store sharing this pool.
    pub fn state_store(&self) -> PostgresStateStore {
        PostgresStateStore::new(self.pool.clone())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
