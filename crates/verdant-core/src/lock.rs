//! Keyed async mutexes serializing reconciliation per account.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use verdant_types::AccountId;

/// One async mutex per account, created on first use.
///
/// Holding the guard returned by [`acquire`](Self::acquire) excludes every
/// other holder for the same account. Different accounts never contend.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account`.
    pub async fn acquire(&self, account: &AccountId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(account.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Whether `account` is currently held (`false` if it was never locked).
    pub async fn is_held(&self, account: &AccountId) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(account)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
