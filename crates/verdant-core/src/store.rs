//! Persistence seam for [`TrackedState`].
//!
//! A store holds one versioned record per account. Every write replaces
//! the whole record (stage and anchor together) and is conditional on the
//! version the writer last read, so two processes sharing a backend can
//! never both apply a transition from the same starting point.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;
use verdant_types::{AccountId, TrackedState};

/// Errors from a state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or the operation failed.
    #[error("state store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// Another writer changed the record since it was read.
    #[error("version conflict for {account}: expected {expected:?}")]
    Conflict {
        /// Account whose record moved.
        account: AccountId,
        /// Version the writer expected (`None` meant "no record yet").
        expected: Option<u64>,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record for {account}: {reason}")]
    Corrupt {
        /// Account whose record is unreadable.
        account: AccountId,
        /// What was wrong with it.
        reason: String,
    },
}

/// A value together with the version it was stored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The stored value.
    pub value: T,
    /// Monotonic per-record version, starting at 1 on first insert.
    pub version: u64,
}

/// Durable storage for per-account [`TrackedState`].
///
/// Implementations must make each `save` a single atomic record
/// replacement.
pub trait StateStore: Send + Sync {
    /// Read the record for `account`, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails or the record is corrupt.
    fn load(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<Option<Versioned<TrackedState>>, StoreError>> + Send;

    /// Write `state` for `account` if the stored version still equals
    /// `expected` (`None` means the record must not exist yet).
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the version moved, or another
    /// [`StoreError`] when the backend fails.
    fn save(
        &self,
        account: &AccountId,
        state: TrackedState,
        expected: Option<u64>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Process-local store backed by a map.
///
/// Used by tests and by `storage.backend = memory`. Contents are lost on
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<AccountId, Versioned<TrackedState>>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with version-1 records.
    pub fn seeded(records: impl IntoIterator<Item = (AccountId, TrackedState)>) -> Self {
        let records = records
            .into_iter()
            .map(|(account, value)| (account, Versioned { value, version: 1 }))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Copy of the current record for `account`.
    pub async fn snapshot(&self, account: &AccountId) -> Option<Versioned<TrackedState>> {
        self.records.read().await.get(account).copied()
    }
}

impl StateStore for InMemoryStateStore {
    async fn load(
        &self,
        account: &AccountId,
    ) -> Result<Option<Versioned<TrackedState>>, StoreError> {
        Ok(self.snapshot(account).await)
    }

    async fn save(
        &self,
        account: &AccountId,
        state: TrackedState,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let current = records.get(account).map(|record| record.version);
        if current != expected {
            return Err(StoreError::Conflict {
                account: account.clone(),
                expected,
            });
        }
        let version = current.map_or(1, |v| v.saturating_add(1));
        records.insert(
            account.clone(),
            Versioned {
                value: state,
                version,
            },
        );
        Ok(version)
    }
}
