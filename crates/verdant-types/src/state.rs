//! Persisted state and per-cycle results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::AccountId;
use crate::stage::Stage;

/// The persisted aggregate for one tracked account.
///
/// `stage` and `last_activity_at` are always written together as one
/// record. `last_activity_at` is the anchor of the decay window: it is set
/// to the check time when a staleness regression "touches" the record, and
/// to the later of the check time and the newest dated event when new
/// activity is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrackedState {
    /// Current progression rank.
    pub stage: Stage,
    /// Anchor of the decay window, or `None` if nothing was ever observed.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl TrackedState {
    /// State written on first use: `Dormant`, anchored at `now`.
    ///
    /// The anchor is a bootstrap, not an activity observation.
    pub const fn bootstrap(now: DateTime<Utc>) -> Self {
        Self {
            stage: Stage::INITIAL,
            last_activity_at: Some(now),
        }
    }

    /// Build a state from explicit parts (restoration and tests).
    pub const fn new(stage: Stage, last_activity_at: Option<DateTime<Utc>>) -> Self {
        Self {
            stage,
            last_activity_at,
        }
    }

    /// Replace stage and anchor together.
    ///
    /// The anchor never moves backwards: if `at` is earlier than the
    /// current anchor (wall clock stepped back), the current anchor is kept.
    #[must_use]
    pub fn anchored(self, stage: Stage, at: DateTime<Utc>) -> Self {
        let anchor = self.last_activity_at.map_or(at, |prev| prev.max(at));
        Self {
            stage,
            last_activity_at: Some(anchor),
        }
    }
}

/// One externally observed activity event (a commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActivityEvent {
    /// Opaque description, e.g. the commit message.
    pub description: String,
    /// When the event happened, if the source reported it.
    ///
    /// The source filters on it; the reconciler only uses it to keep the
    /// anchor at or after every event it counted.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ActivityEvent {
    /// Event with a description and no timestamp.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            occurred_at: None,
        }
    }

    /// Attach the occurrence time.
    #[must_use]
    pub const fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// What one reconciliation cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReconcileResult {
    /// Account the cycle ran for.
    pub account: AccountId,
    /// Stage read at the start of the cycle.
    pub stage_before: Stage,
    /// Stage persisted at the end of the cycle.
    pub stage_after: Stage,
    /// Whether the staleness check regressed the stage.
    pub regressed: bool,
    /// Whether new activity advanced the stage.
    pub advanced: bool,
    /// Number of new events fetched this cycle.
    pub events_observed: usize,
    /// Newest fetched event description, if any events arrived.
    pub newest_event: Option<String>,
    /// Check time the cycle ran with.
    pub checked_at: DateTime<Utc>,
    /// Anchor persisted at the end of the cycle.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl ReconcileResult {
    /// Whether the stage differs between start and end of the cycle.
    pub fn stage_changed(&self) -> bool {
        self.stage_before != self.stage_after
    }
}
