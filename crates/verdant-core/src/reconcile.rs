//! Per-account reconciliation of stored state with external activity.
//!
//! One call to [`Reconciler::reconcile`] is one check cycle:
//!
//! 1. Take the account lock, load the record (bootstrapping it as
//!    `Dormant` anchored at `now` if it does not exist yet).
//! 2. Staleness: a non-`Dormant` stage whose anchor is at least the decay
//!    threshold old regresses one rank, and the record is re-anchored at
//!    `now` in the same write.
//! 3. Fetch events strictly after the (possibly re-anchored) floor.
//! 4. A non-empty batch advances one rank, however many events it holds,
//!    and re-anchors at `now` or at the newest event time if that is
//!    later, so no counted event is fetched again.
//!
//! Every write is conditional on the version read in step 1, so a
//! concurrent writer in another process turns into a store conflict
//! instead of a double transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use verdant_types::{AccountId, FailureKind, ReconcileResult, Stage, TrackedState};

use crate::decay::DecayPolicy;
use crate::lock::AccountLocks;
use crate::source::{ActivitySource, SourceError};
use crate::store::{StateStore, StoreError};

/// Errors that abort a reconciliation cycle.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Loading or saving the record failed. Nothing after the failing
    /// step was attempted.
    #[error("state store unavailable for {account}: {source}")]
    StoreUnavailable {
        /// Account being reconciled.
        account: AccountId,
        /// The store failure.
        source: StoreError,
    },

    /// Fetching activity failed after the staleness step was persisted.
    #[error("activity source unavailable for {account}: {source}")]
    SourceUnavailable {
        /// Account being reconciled.
        account: AccountId,
        /// Stage persisted when the fetch failed.
        stage: Stage,
        /// Anchor persisted when the fetch failed.
        last_activity_at: Option<DateTime<Utc>>,
        /// Whether the staleness step regressed the stage this cycle.
        regressed: bool,
        /// The source failure.
        source: SourceError,
    },
}

impl ReconcileError {
    /// Failure category for reports.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::StoreUnavailable { .. } => FailureKind::StoreUnavailable,
            Self::SourceUnavailable { .. } => FailureKind::SourceUnavailable,
        }
    }

    /// Stage known to be persisted, when the failure left one.
    pub const fn persisted_stage(&self) -> Option<Stage> {
        match self {
            Self::StoreUnavailable { .. } => None,
            Self::SourceUnavailable { stage, .. } => Some(*stage),
        }
    }

    /// Anchor known to be persisted, when the failure left one.
    pub const fn persisted_anchor(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::StoreUnavailable { .. } => None,
            Self::SourceUnavailable {
                last_activity_at, ..
            } => *last_activity_at,
        }
    }
}

/// Reconciles one account.
#[derive(Debug)]
pub struct Reconciler<S, A> {
    account: AccountId,
    store: Arc<S>,
    source: Arc<A>,
    policy: DecayPolicy,
    locks: Arc<AccountLocks>,
}

impl<S, A> Clone for Reconciler<S, A> {
    fn clone(&self) -> Self {
        Self {
            account: self.account.clone(),
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            policy: self.policy,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: StateStore, A: ActivitySource> Reconciler<S, A> {
    /// Bind a reconciler to `account`.
    ///
    /// Reconcilers for the same account must share `locks` for the
    /// in-process exclusion to hold.
    pub const fn new(
        account: AccountId,
        store: Arc<S>,
        source: Arc<A>,
        policy: DecayPolicy,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            account,
            store,
            source,
            policy,
            locks,
        }
    }

    /// The account this reconciler is bound to.
    pub const fn account(&self) -> &AccountId {
        &self.account
    }

    /// Run one reconciliation cycle with check time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::StoreUnavailable`] if a load or save
    /// fails (including a version conflict), and
    /// [`ReconcileError::SourceUnavailable`] if the activity fetch fails.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileResult, ReconcileError> {
        let _guard = self.locks.acquire(&self.account).await;

        let (mut state, mut version) = self.load_or_bootstrap(now).await?;
        let stage_before = state.stage;

        // --- Staleness ---
        let mut regressed = false;
        if !state.stage.is_bottom() && self.policy.is_stale(state.last_activity_at, now) {
            let lower = state.stage.regress();
            let touched = state.anchored(lower, now);
            version = self.persist(touched, version).await?;
            info!(
                account = %self.account,
                from = %state.stage,
                to = %lower,
                "Stage regressed after inactivity"
            );
            state = touched;
            regressed = true;
        }

        // --- Fetch ---
        let floor = state.last_activity_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let events = match self.source.fetch_since(&self.account, floor).await {
            Ok(events) => events,
            Err(source) => {
                warn!(
                    account = %self.account,
                    stage = %state.stage,
                    error = %source,
                    "Activity fetch failed"
                );
                return Err(ReconcileError::SourceUnavailable {
                    account: self.account.clone(),
                    stage: state.stage,
                    last_activity_at: state.last_activity_at,
                    regressed,
                    source,
                });
            }
        };

        // --- Advance ---
        let mut advanced = false;
        if events.is_empty() {
            let stale_in_secs = (!state.stage.is_bottom())
                .then(|| self.policy.time_until_stale(state.last_activity_at, now))
                .flatten()
                .map(|left| left.num_seconds());
            debug!(
                account = %self.account,
                stage = %state.stage,
                %floor,
                stale_in_secs,
                "No new activity"
            );
        } else {
            let higher = state.stage.advance();
            let newest_at = events.iter().filter_map(|event| event.occurred_at).max();
            let next = state.anchored(higher, newest_at.map_or(now, |at| at.max(now)));
            self.persist(next, version).await?;
            advanced = higher != state.stage;
            if advanced {
                info!(
                    account = %self.account,
                    from = %state.stage,
                    to = %higher,
                    events = events.len(),
                    "Stage advanced on new activity"
                );
            } else {
                debug!(
                    account = %self.account,
                    stage = %state.stage,
                    events = events.len(),
                    "New activity at top stage, anchor refreshed"
                );
            }
            state = next;
        }

        Ok(ReconcileResult {
            account: self.account.clone(),
            stage_before,
            stage_after: state.stage,
            regressed,
            advanced,
            events_observed: events.len(),
            newest_event: events.into_iter().next().map(|event| event.description),
            checked_at: now,
            last_activity_at: state.last_activity_at,
        })
    }

    async fn load_or_bootstrap(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(TrackedState, u64), ReconcileError> {
        let loaded = self
            .store
            .load(&self.account)
            .await
            .map_err(|source| self.store_failure(source))?;

        if let Some(record) = loaded {
            return Ok((record.value, record.version));
        }

        let state = TrackedState::bootstrap(now);
        let version = self
            .store
            .save(&self.account, state, None)
            .await
            .map_err(|source| self.store_failure(source))?;
        info!(account = %self.account, stage = %state.stage, "Bootstrapped tracked state");
        Ok((state, version))
    }

    async fn persist(&self, state: TrackedState, version: u64) -> Result<u64, ReconcileError> {
        self.store
            .save(&self.account, state, Some(version))
            .await
            .map_err(|source| self.store_failure(source))
    }

    fn store_failure(&self, source: StoreError) -> ReconcileError {
        warn!(account = %self.account, error = %source, "State store failure");
        ReconcileError::StoreUnavailable {
            account: self.account.clone(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{Duration, TimeZone};
    use verdant_types::ActivityEvent;

    use super::*;
    use crate::source::ScriptedActivitySource;
    use crate::store::{InMemoryStateStore, Versioned};

    /// Store wrapper whose operations can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStateStore,
        fail_loads: AtomicBool,
        fail_saves: AtomicBool,
    }

    impl StateStore for FlakyStore {
        async fn load(
            &self,
            account: &AccountId,
        ) -> Result<Option<Versioned<TrackedState>>, StoreError> {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable {
                    message: "load refused".to_owned(),
                });
            }
            self.inner.load(account).await
        }

        async fn save(
            &self,
            account: &AccountId,
            state: TrackedState,
            expected: Option<u64>,
        ) -> Result<u64, StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable {
                    message: "save refused".to_owned(),
                });
            }
            self.inner.save(account, state, expected).await
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 9, 30, 0).unwrap()
    }

    fn account() -> AccountId {
        AccountId::new("octo/garden")
    }

    fn reconciler_with<S: StateStore>(
        store: &Arc<S>,
        source: &Arc<ScriptedActivitySource>,
    ) -> Reconciler<S, ScriptedActivitySource> {
        Reconciler::new(
            account(),
            Arc::clone(store),
            Arc::clone(source),
            DecayPolicy::new(Duration::hours(24)),
            Arc::new(AccountLocks::new()),
        )
    }

    fn seeded(state: TrackedState) -> Arc<InMemoryStateStore> {
        Arc::new(InMemoryStateStore::seeded([(account(), state)]))
    }

    #[tokio::test]
    async fn first_run_bootstraps_dormant_at_now() {
        let store = Arc::new(InMemoryStateStore::new());
        let source = Arc::new(ScriptedActivitySource::new());
        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert_eq!(result.stage_before, Stage::Dormant);
        assert_eq!(result.stage_after, Stage::Dormant);
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::bootstrap(now()));
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn stale_stage_regresses_and_touches_anchor() {
        let store = seeded(TrackedState::new(
            Stage::Emerging,
            Some(now() - Duration::hours(25)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert!(result.regressed);
        assert!(!result.advanced);
        assert_eq!(result.stage_after, Stage::Dormant);
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::new(Stage::Dormant, Some(now())));
    }

    #[tokio::test]
    async fn dormant_without_anchor_advances_on_activity() {
        let store = seeded(TrackedState::new(Stage::Dormant, None));
        let source = Arc::new(ScriptedActivitySource::new());
        source.push(&account(), ActivityEvent::new("fix bug")).await;

        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert!(result.advanced);
        assert_eq!(result.newest_event.as_deref(), Some("fix bug"));
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::new(Stage::Emerging, Some(now())));
    }

    #[tokio::test]
    async fn mature_activity_refreshes_anchor_only() {
        let store = seeded(TrackedState::new(
            Stage::Mature,
            Some(now() - Duration::hours(1)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        source.push(&account(), ActivityEvent::new("refactor")).await;

        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert!(!result.advanced);
        assert_eq!(result.events_observed, 1);
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::new(Stage::Mature, Some(now())));
    }

    #[tokio::test]
    async fn dormant_without_anchor_and_no_activity_is_untouched() {
        let store = seeded(TrackedState::new(Stage::Dormant, None));
        let source = Arc::new(ScriptedActivitySource::new());

        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert!(!result.stage_changed());
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value.last_activity_at, None);
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn burst_of_events_is_one_step() {
        let store = seeded(TrackedState::new(
            Stage::Emerging,
            Some(now() - Duration::hours(2)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        for minute in 1..=5 {
            source
                .push(
                    &account(),
                    ActivityEvent::new(format!("commit {minute}"))
                        .with_occurred_at(now() - Duration::minutes(60 - minute)),
                )
                .await;
        }

        let result = reconciler_with(&store, &source).reconcile(now()).await.unwrap();

        assert_eq!(result.events_observed, 5);
        assert_eq!(result.stage_after, Stage::Established);
        assert_eq!(result.newest_event.as_deref(), Some("commit 5"));
    }

    #[tokio::test]
    async fn back_to_back_cycles_are_idempotent() {
        let store = seeded(TrackedState::new(
            Stage::Emerging,
            Some(now() - Duration::hours(2)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        source
            .push(
                &account(),
                ActivityEvent::new("feat").with_occurred_at(now() - Duration::minutes(10)),
            )
            .await;
        let reconciler = reconciler_with(&store, &source);

        let first = reconciler.reconcile(now()).await.unwrap();
        let second = reconciler.reconcile(now()).await.unwrap();

        assert!(first.advanced);
        assert!(!second.advanced);
        assert!(!second.regressed);
        assert_eq!(second.stage_after, Stage::Established);
        assert_eq!(store.snapshot(&account()).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn event_dated_after_check_time_counts_once() {
        let store = seeded(TrackedState::new(
            Stage::Dormant,
            Some(now() - Duration::hours(1)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        let pushed_at = now() + Duration::seconds(3);
        source
            .push(
                &account(),
                ActivityEvent::new("one commit").with_occurred_at(pushed_at),
            )
            .await;
        let reconciler = reconciler_with(&store, &source);

        let first = reconciler.reconcile(now()).await.unwrap();
        let second = reconciler
            .reconcile(now() + Duration::hours(1))
            .await
            .unwrap();

        assert!(first.advanced);
        assert_eq!(first.last_activity_at, Some(pushed_at));
        assert!(!second.advanced);
        assert_eq!(second.events_observed, 0);
        assert_eq!(second.stage_after, Stage::Emerging);
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::new(Stage::Emerging, Some(pushed_at)));
    }

    #[tokio::test]
    async fn backwards_clock_never_rewinds_anchor() {
        let store = seeded(TrackedState::new(Stage::Emerging, Some(now())));
        let source = Arc::new(ScriptedActivitySource::new());
        source.push(&account(), ActivityEvent::new("late")).await;

        let earlier = now() - Duration::minutes(5);
        reconciler_with(&store, &source).reconcile(earlier).await.unwrap();

        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value.last_activity_at, Some(now()));
    }

    #[tokio::test]
    async fn source_failure_keeps_persisted_regression() {
        let store = seeded(TrackedState::new(
            Stage::Established,
            Some(now() - Duration::hours(30)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        source
            .fail_next(
                &account(),
                SourceError::Network {
                    message: "connection reset".to_owned(),
                },
            )
            .await;

        let err = reconciler_with(&store, &source)
            .reconcile(now())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::SourceUnavailable);
        assert_eq!(err.persisted_stage(), Some(Stage::Emerging));
        assert_eq!(err.persisted_anchor(), Some(now()));
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value, TrackedState::new(Stage::Emerging, Some(now())));
    }

    #[tokio::test]
    async fn store_failure_aborts_without_writing() {
        let store = Arc::new(FlakyStore::default());
        store
            .inner
            .save(
                &account(),
                TrackedState::new(Stage::Emerging, Some(now() - Duration::hours(30))),
                None,
            )
            .await
            .unwrap();
        store.fail_loads.store(true, Ordering::SeqCst);
        let source = Arc::new(ScriptedActivitySource::new());
        source.push(&account(), ActivityEvent::new("fix bug")).await;

        let err = reconciler_with(&store, &source)
            .reconcile(now())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::StoreUnavailable);
        assert_eq!(err.persisted_stage(), None);
        assert_eq!(err.persisted_anchor(), None);
        let record = store.inner.snapshot(&account()).await.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.value.stage, Stage::Emerging);
    }

    #[tokio::test]
    async fn failed_save_reports_store_unavailable() {
        let store = Arc::new(FlakyStore::default());
        store.fail_saves.store(true, Ordering::SeqCst);
        let source = Arc::new(ScriptedActivitySource::new());

        let err = reconciler_with(&store, &source)
            .reconcile(now())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));
        assert!(store.inner.snapshot(&account()).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_cycles_never_double_advance() {
        let store = seeded(TrackedState::new(
            Stage::Dormant,
            Some(now() - Duration::hours(1)),
        ));
        let source = Arc::new(ScriptedActivitySource::new());
        source
            .push(
                &account(),
                ActivityEvent::new("feat").with_occurred_at(now() - Duration::minutes(30)),
            )
            .await;
        let reconciler = reconciler_with(&store, &source);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = reconciler.clone();
                tokio::spawn(async move { reconciler.reconcile(now()).await })
            })
            .collect();
        let mut advances = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().advanced {
                advances += 1;
            }
        }

        assert_eq!(advances, 1);
        let record = store.snapshot(&account()).await.unwrap();
        assert_eq!(record.value.stage, Stage::Emerging);
    }
}
