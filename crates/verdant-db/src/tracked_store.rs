//! `tracked_state` table: the `PostgreSQL` [`StateStore`].
//!
//! Each write is a single statement. Inserts use `ON CONFLICT DO NOTHING`
//! and updates are guarded by `WHERE version = $expected`; zero affected
//! rows means another writer got there first and surfaces as
//! [`StoreError::Conflict`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use verdant_core::store::{StateStore, StoreError, Versioned};
use verdant_types::{AccountId, Stage, TrackedState};

use crate::error::DbError;

/// Row shape of the `tracked_state` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedStateRow {
    /// Account identifier (primary key).
    pub account_id: String,
    /// Canonical lowercase stage name.
    pub stage: String,
    /// Anchor of the decay window.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version.
    pub version: i64,
    /// Wall-clock time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl TrackedStateRow {
    /// Decode the row into a versioned state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for an unknown stage name or a
    /// negative version.
    pub fn into_versioned(self) -> Result<Versioned<TrackedState>, StoreError> {
        let account = AccountId::new(self.account_id);
        let stage: Stage = self.stage.parse().map_err(|e: verdant_types::StageParseError| {
            StoreError::Corrupt {
                account: account.clone(),
                reason: e.to_string(),
            }
        })?;
        let version = u64::try_from(self.version).map_err(|e| StoreError::Corrupt {
            account: account.clone(),
            reason: format!("version {}: {e}", self.version),
        })?;
        Ok(Versioned {
            value: TrackedState::new(stage, self.last_activity_at),
            version,
        })
    }
}

/// [`StateStore`] over the `tracked_state` table.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All rows, ordered by account id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list(&self) -> Result<Vec<TrackedStateRow>, DbError> {
        let rows = sqlx::query_as::<_, TrackedStateRow>(
            r"SELECT account_id, stage, last_activity_at, version, updated_at
              FROM tracked_state
              ORDER BY account_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, account: &AccountId, state: TrackedState) -> Result<u64, DbError> {
        sqlx::query(
            r"INSERT INTO tracked_state (account_id, stage, last_activity_at, version, updated_at)
              VALUES ($1, $2, $3, 1, now())
              ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account.as_str())
        .bind(state.stage.as_str())
        .bind(state.last_activity_at)
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(DbError::from)
    }

    async fn update(
        &self,
        account: &AccountId,
        state: TrackedState,
        expected: i64,
    ) -> Result<u64, DbError> {
        sqlx::query(
            r"UPDATE tracked_state
              SET stage = $2, last_activity_at = $3, version = version + 1, updated_at = now()
              WHERE account_id = $1 AND version = $4",
        )
        .bind(account.as_str())
        .bind(state.stage.as_str())
        .bind(state.last_activity_at)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(DbError::from)
    }
}

impl StateStore for PostgresStateStore {
    async fn load(
        &self,
        account: &AccountId,
    ) -> Result<Option<Versioned<TrackedState>>, StoreError> {
        let row = sqlx::query_as::<_, TrackedStateRow>(
            r"SELECT account_id, stage, last_activity_at, version, updated_at
              FROM tracked_state
              WHERE account_id = $1",
        )
        .bind(account.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(TrackedStateRow::into_versioned).transpose()
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

        let (affected, version) = match expected {
            None => (self.insert(account, state).await?, 1),
            Some(current) => {
                let current_i64 = i64::try_from(current).ok().ok_or_else(conflict)?;
                let next = current.checked_add(1).ok_or_else(conflict)?;
                (self.update(account, state, current_i64).await?, next)
            }
        };

        if affected == 0 {
            tracing::debug!(%account, ?expected, "tracked_state write lost the version race");
            return Err(conflict());
        }
        tracing::debug!(%account, version, stage = %state.stage, "Saved tracked state");
        Ok(version)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn row(stage: &str, version: i64) -> TrackedStateRow {
        TrackedStateRow {
            account_id: "acct".to_owned(),
            stage: stage.to_owned(),
            last_activity_at: Utc.with_ymd_and_hms(2026, 2, 2, 2, 0, 0).single(),
            version,
            updated_at: Utc.with_ymd_and_hms(2026, 2, 2, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn row_decodes_into_versioned_state() {
        let decoded = row("established", 4).into_versioned().unwrap();
        assert_eq!(decoded.version, 4);
        assert_eq!(decoded.value.stage, Stage::Established);
    }

    #[test]
    fn unknown_stage_is_corrupt() {
        let err = row("shrub", 1).into_versioned().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn negative_version_is_corrupt() {
        let err = row("dormant", -1).into_versioned().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
