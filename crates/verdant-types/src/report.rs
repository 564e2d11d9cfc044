//! Cycle reports handed from the driver to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{AccountId, CycleId};
use crate::stage::Stage;
use crate::state::ReconcileResult;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CycleTrigger {
    /// The first pass right after startup.
    Startup,
    /// The fixed interval elapsed.
    Scheduled,
    /// An explicit "check now" request.
    OnDemand,
}

/// Feedback text attached to a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Feedback {
    /// No new event, or feedback is disabled.
    NotRequested,
    /// The generator produced a suggestion for the newest event.
    Suggested {
        /// Suggestion text.
        text: String,
    },
    /// The generator failed. The state transition stands regardless.
    Unavailable {
        /// Why generation failed.
        reason: String,
    },
}

/// Which condition made a cycle fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FailureKind {
    /// Persistence read or write failed.
    StoreUnavailable,
    /// The activity fetch failed.
    SourceUnavailable,
}

/// Outcome of one cycle for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CycleOutcome {
    /// Reconciliation finished and its writes are committed.
    Completed {
        /// What the reconciler did.
        result: ReconcileResult,
        /// Feedback for the newest event.
        feedback: Feedback,
    },
    /// Reconciliation aborted.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Last persisted stage, when it is known.
        stage: Option<Stage>,
        /// Last persisted anchor, when it is known.
        last_activity_at: Option<DateTime<Utc>>,
        /// Human-readable reason.
        reason: String,
    },
}

impl CycleOutcome {
    /// Stage to display after this cycle, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Completed { result, .. } => Some(result.stage_after),
            Self::Failed { stage, .. } => *stage,
        }
    }

    /// Whether the cycle completed.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Report of one cycle, as surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CycleReport {
    /// Cycle identifier (appears in logs).
    pub cycle_id: CycleId,
    /// Account the cycle ran for.
    pub account: AccountId,
    /// What started the cycle.
    pub trigger: CycleTrigger,
    /// Check time handed to the reconciler.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time the cycle (including feedback) finished.
    pub finished_at: DateTime<Utc>,
    /// Result.
    pub outcome: CycleOutcome,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn feedback_is_tagged_by_status() {
        let json = serde_json::to_value(Feedback::Suggested {
            text: "add tests".to_owned(),
        })
        .unwrap();
        assert_eq!(json["status"], "suggested");
        assert_eq!(json["text"], "add tests");
    }

    #[test]
    fn failed_outcome_reports_known_stage() {
        let outcome = CycleOutcome::Failed {
            kind: FailureKind::SourceUnavailable,
            stage: Some(Stage::Emerging),
            last_activity_at: None,
            reason: "timeout".to_owned(),
        };
        assert_eq!(outcome.stage(), Some(Stage::Emerging));
        assert!(!outcome.is_completed());
    }
}
