//! Activity source seam.
//!
//! A source returns the events of one account that happened strictly after
//! a floor timestamp, newest first. The reconciler treats the result as an
//! opaque batch: it only cares whether it is empty and what the first
//! description is.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use verdant_types::{AccountId, ActivityEvent};

/// Errors from an activity source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The account is not known to this source.
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// Credentials were rejected.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Detail from the remote side.
        message: String,
    },

    /// The remote rate limit is exhausted.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Seconds until the limit resets, when the remote says.
        retry_after_secs: Option<u64>,
    },

    /// The remote answered with an unexpected status.
    #[error("http status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// Transport failure (DNS, connect, timeout).
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },
}

/// Supplies activity events for an account.
pub trait ActivitySource: Send + Sync {
    /// Fetch the events of `account` that occurred strictly after `floor`,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the events cannot be fetched.
    fn fetch_since(
        &self,
        account: &AccountId,
        floor: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityEvent>, SourceError>> + Send;
}

#[derive(Debug, Default)]
struct Script {
    events: Vec<ActivityEvent>,
    failures: VecDeque<SourceError>,
}

/// In-process source fed by the caller.
///
/// Timestamped events are returned whenever they fall after the requested
/// floor. Events pushed without a timestamp are delivered once and then
/// dropped, since there is nothing to filter them by. Queued failures are
/// returned (one per fetch) before any events.
#[derive(Debug, Default)]
pub struct ScriptedActivitySource {
    scripts: Mutex<HashMap<AccountId, Script>>,
}

impl ScriptedActivitySource {
    /// Create a source with no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for `account`.
    pub async fn push(&self, account: &AccountId, event: ActivityEvent) {
        self.scripts
            .lock()
            .await
            .entry(account.clone())
            .or_default()
            .events
            .push(event);
    }

    /// Make the next fetch for `account` fail with `error`.
    pub async fn fail_next(&self, account: &AccountId, error: SourceError) {
        self.scripts
            .lock()
            .await
            .entry(account.clone())
            .or_default()
            .failures
            .push_back(error);
    }
}

impl ActivitySource for ScriptedActivitySource {
    async fn fetch_since(
        &self,
        account: &AccountId,
        floor: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, SourceError> {
        let mut scripts = self.scripts.lock().await;
        let Some(script) = scripts.get_mut(account) else {
            return Ok(Vec::new());
        };

        if let Some(error) = script.failures.pop_front() {
            return Err(error);
        }

        let mut batch: Vec<ActivityEvent> = script
            .events
            .iter()
            .filter(|event| event.occurred_at.is_none_or(|at| at > floor))
            .cloned()
            .collect();
        script.events.retain(|event| event.occurred_at.is_some());

        // Newest first. Undated events sort ahead of dated ones, latest push first.
        batch.reverse();
        batch.sort_by_key(|event| Reverse(event.occurred_at.unwrap_or(DateTime::<Utc>::MAX_UTC)));
        Ok(batch)
    }
}
