//! `Dragonfly` (Redis-compatible) connection and [`StateStore`].
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `account:{id}:tracked` | JSON | `{stage, last_activity_at, version}` |
//! | `account:{id}:version` | Integer | Check-and-set token for the record |
//!
//! Both keys are written by one Lua script, so a reader never sees a
//! record whose version disagrees with the token.

use chrono::{DateTime, Utc};
use fred::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use verdant_core::store::{StateStore, StoreError, Versioned};
use verdant_types::{AccountId, Stage, TrackedState};

use crate::error::DbError;

/// Compare `KEYS[1]` with `ARGV[1]` (empty means "absent"); on a match
/// write the new token and the JSON record.
const CHECK_AND_SET: &str = r"
local current = redis.call('GET', KEYS[1])
if (current or '') ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
return 1
";

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Read the value at `key` and deserialize from JSON, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s).map_err(DbError::from))
            .transpose()
    }

    /// Delete every key on the instance (integration tests only).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// JSON document stored at `account:{id}:tracked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Current stage.
    pub stage: Stage,
    /// Anchor of the decay window.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Version this document was written at.
    pub version: u64,
}

impl From<StoredRecord> for Versioned<TrackedState> {
    fn from(record: StoredRecord) -> Self {
        Self {
            value: TrackedState::new(record.stage, record.last_activity_at),
            version: record.version,
        }
    }
}

/// Key holding the JSON record for `account`.
pub fn tracked_key(account: &AccountId) -> String {
    format!("account:{account}:tracked")
}

/// Key holding the check-and-set token for `account`.
pub fn version_key(account: &AccountId) -> String {
    format!("account:{account}:version")
}

/// [`StateStore`] over `Dragonfly` keys.
#[derive(Clone)]
pub struct DragonflyStateStore {
    pool: DragonflyPool,
}

impl DragonflyStateStore {
    /// Create a store on an existing connection.
    pub const fn new(pool: DragonflyPool) -> Self {
        Self { pool }
    }

    async fn check_and_set(
        &self,
        account: &AccountId,
        expected: Option<u64>,
        record: &StoredRecord,
    ) -> Result<bool, DbError> {
        let json = serde_json::to_string(record)?;
        let keys = vec![version_key(account), tracked_key(account)];
        let args = vec![
            expected.map(|v| v.to_string()).unwrap_or_default(),
            record.version.to_string(),
            json,
        ];
        let applied: i64 = self.pool.client().eval(CHECK_AND_SET, keys, args).await?;
        Ok(applied == 1)
    }
}

impl StateStore for DragonflyStateStore {
    async fn load(
        &self,
        account: &AccountId,
    ) -> Result<Option<Versioned<TrackedState>>, StoreError> {
        let record: Option<StoredRecord> =
            self.pool
                .get_json(&tracked_key(account))
                .await
                .map_err(|e| match e {
                    DbError::Serialization(err) => StoreError::Corrupt {
                        account: account.clone(),
                        reason: err.to_string(),
                    },
                    other => other.into(),
                })?;
        Ok(record.map(Versioned::from))
    }

    async fn save(
        &self,
        account: &AccountId,
        state: TrackedState,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let conflict = || StoreError::Conflict {
            account: account.clone(),
            expected,
        };
        let version = expected.map_or(Some(1), |v| v.checked_add(1)).ok_or_else(conflict)?;
        let record = StoredRecord {
            stage: state.stage,
            last_activity_at: state.last_activity_at,
            version,
        };

        if self.check_and_set(account, expected, &record).await? {
            tracing::debug!(%account, version, stage = %state.stage, "Saved tracked state");
            Ok(version)
        } else {
            tracing::debug!(%account, ?expected, "Dragonfly check-and-set rejected");
            Err(conflict())
        }
    }
}
