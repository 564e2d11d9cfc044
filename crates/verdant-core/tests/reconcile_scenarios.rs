//! Multi-day scenarios exercising the reconciler through its public API.
//!
//! Each scenario drives one account through a sequence of check times with
//! a scripted activity source and an in-memory store, checking the stage
//! and anchor after every cycle.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use verdant_core::decay::DecayPolicy;
use verdant_core::lock::AccountLocks;
use verdant_core::reconcile::Reconciler;
use verdant_core::source::ScriptedActivitySource;
use verdant_core::store::InMemoryStateStore;
use verdant_types::{AccountId, ActivityEvent, Stage};

struct Harness {
    id: AccountId,
    store: Arc<InMemoryStateStore>,
    source: Arc<ScriptedActivitySource>,
    reconciler: Reconciler<InMemoryStateStore, ScriptedActivitySource>,
}

impl Harness {
    fn new() -> Self {
        let id = AccountId::new("maple");
        let store = Arc::new(InMemoryStateStore::new());
        let source = Arc::new(ScriptedActivitySource::new());
        let reconciler = Reconciler::new(
            id.clone(),
            Arc::clone(&store),
            Arc::clone(&source),
            DecayPolicy::new(Duration::hours(24)),
            Arc::new(AccountLocks::new()),
        );
        Self {
            id,
            store,
            source,
            reconciler,
        }
    }

    async fn commit(&self, message: &str, at: DateTime<Utc>) {
        self.source
            .push(&self.id, ActivityEvent::new(message).with_occurred_at(at))
            .await;
    }

    async fn check(&self, at: DateTime<Utc>) -> Stage {
        self.reconciler.reconcile(at).await.unwrap().stage_after
    }

    async fn anchor(&self) -> Option<DateTime<Utc>> {
        self.store
            .snapshot(&self.id)
            .await
            .unwrap()
            .value
            .last_activity_at
    }
}

/// `hours` after the first check.
fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap() + Duration::hours(hours)
}

#[tokio::test]
async fn twice_daily_commits_grow_to_mature_and_saturate() {
    let h = Harness::new();
    assert_eq!(h.check(at(0)).await, Stage::Dormant);

    let mut expected = Stage::Dormant;
    for k in 1..=5 {
        h.commit("work", at(12 * k - 1)).await;
        expected = expected.advance();
        assert_eq!(h.check(at(12 * k)).await, expected);
        assert_eq!(h.anchor().await, Some(at(12 * k)));
    }
    assert_eq!(expected, Stage::Mature);
}

#[tokio::test]
async fn silence_decays_one_rank_per_elapsed_window() {
    let h = Harness::new();
    h.check(at(0)).await;
    for k in 1..=3 {
        h.commit("work", at(12 * k - 1)).await;
        h.check(at(12 * k)).await;
    }
    assert_eq!(h.check(at(40)).await, Stage::Mature);
    assert_eq!(h.anchor().await, Some(at(36)));

    // Each check a full window after the last touch drops exactly one rank.
    assert_eq!(h.check(at(60)).await, Stage::Established);
    assert_eq!(h.check(at(70)).await, Stage::Established);
    assert_eq!(h.check(at(84)).await, Stage::Emerging);
    assert_eq!(h.check(at(108)).await, Stage::Dormant);
    assert_eq!(h.check(at(160)).await, Stage::Dormant);
    assert_eq!(h.anchor().await, Some(at(108)));
}

#[tokio::test]
async fn commit_before_regression_is_not_counted_after_touch() {
    let h = Harness::new();
    h.check(at(0)).await;
    h.commit("first", at(3)).await;
    assert_eq!(h.check(at(4)).await, Stage::Emerging);

    // The regression moves the floor to the check time, so a commit made
    // between the old anchor and this check is skipped.
    h.commit("late night", at(27)).await;
    assert_eq!(h.check(at(29)).await, Stage::Dormant);
    assert_eq!(h.anchor().await, Some(at(29)));
}

#[tokio::test]
async fn event_after_check_time_counts_despite_regression() {
    let h = Harness::new();
    h.check(at(0)).await;
    h.commit("a", at(1)).await;
    h.check(at(2)).await;
    h.commit("b", at(3)).await;
    assert_eq!(h.check(at(4)).await, Stage::Established);

    // Source clock ahead of ours: the event lands after the touched floor.
    h.commit("c", at(50)).await;
    let result = h.reconciler.reconcile(at(48)).await.unwrap();
    assert!(result.regressed);
    assert!(result.advanced);
    assert_eq!(result.stage_before, Stage::Established);
    assert_eq!(result.stage_after, Stage::Established);
    assert_eq!(result.newest_event.as_deref(), Some("c"));

    // The anchor lands on the event, so the next check does not see it again.
    assert_eq!(h.anchor().await, Some(at(50)));
    let next = h.reconciler.reconcile(at(51)).await.unwrap();
    assert!(!next.advanced);
    assert_eq!(next.events_observed, 0);
    assert_eq!(next.stage_after, Stage::Established);
}
