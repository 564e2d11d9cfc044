//! Runtime selection of the state store.
//!
//! [`StateStore`] uses `impl Future` returns and is therefore not
//! dyn-compatible, so the configured backend is wrapped in an enum and
//! dispatched by `match`.

use verdant_core::config::{StorageBackend, StorageConfig};
use verdant_core::store::{InMemoryStateStore, StateStore, StoreError, Versioned};
use verdant_db::{DragonflyPool, DragonflyStateStore, PostgresPool, PostgresStateStore};
use verdant_types::{AccountId, TrackedState};

use crate::error::EngineError;

/// The state store chosen by `storage.backend`.
pub enum AnyStateStore {
    /// Process-local map.
    Memory(InMemoryStateStore),
    /// `PostgreSQL` `tracked_state` table.
    Postgres(PostgresStateStore),
    /// `Dragonfly` JSON records.
    Dragonfly(DragonflyStateStore),
}

impl AnyStateStore {
    /// Connect to the configured backend, applying migrations for
    /// `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the backend cannot be reached or
    /// migrated.
    pub async fn connect(config: &StorageConfig) -> Result<Self, EngineError> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory state store, progress is lost on restart");
                Ok(Self::Memory(InMemoryStateStore::new()))
            }
            StorageBackend::Postgres => {
                let pool = PostgresPool::connect(config).await?;
                pool.run_migrations().await?;
                tracing::info!("PostgreSQL state store ready");
                Ok(Self::Postgres(pool.state_store()))
            }
            StorageBackend::Dragonfly => {
                let pool = DragonflyPool::connect(&config.dragonfly_url).await?;
                tracing::info!("Dragonfly state store ready");
                Ok(Self::Dragonfly(DragonflyStateStore::new(pool)))
            }
        }
    }

    /// Backend label for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
            Self::Dragonfly(_) => "dragonfly",
        }
    }
}

impl StateStore for AnyStateStore {
    async fn load(&self, account: &AccountId) -> Result<Option<Versioned<TrackedState>>, StoreError> {
        match self {
            Self::Memory(store) => store.load(account).await,
            Self::Postgres(store) => store.load(account).await,
            Self::Dragonfly(store) => store.load(account).await,
        }
    }

    async fn save(
        &self,
        account: &AccountId,
        state: TrackedState,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        match self {
            Self::Memory(store) => store.save(account, state, expected).await,
            Self::Postgres(store) => store.save(account, state, expected).await,
            Self::Dragonfly(store) => store.save(account, state, expected).await,
        }
    }
}
