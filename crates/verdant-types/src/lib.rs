//! Shared type definitions for the Verdant activity tracker.
//!
//! Types defined here flow to every other crate in the workspace and to
//! `TypeScript` via `ts-rs` for the presentation layer.
//!
//! # Modules
//!
//! - [`stage`] -- The four-rank progression and its transitions
//! - [`state`] -- Persisted [`TrackedState`], [`ActivityEvent`], and
//!   [`ReconcileResult`]
//! - [`ids`] -- Account and cycle identifiers
//! - [`report`] -- Cycle reports surfaced after each reconciliation

pub mod ids;
pub mod report;
pub mod stage;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use ids::{AccountId, CycleId};
pub use report::{CycleOutcome, CycleReport, CycleTrigger, Feedback, FailureKind};
pub use stage::{Stage, StageParseError};
pub use state::{ActivityEvent, ReconcileResult, TrackedState};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files under `bindings/` relative to the crate
        // root when `export_all` is called.
        use ts_rs::TS;

        let _ = crate::stage::Stage::export_all();
        let _ = crate::ids::AccountId::export_all();
        let _ = crate::ids::CycleId::export_all();
        let _ = crate::state::TrackedState::export_all();
        let _ = crate::state::ActivityEvent::export_all();
        let _ = crate::state::ReconcileResult::export_all();
        let _ = crate::report::CycleReport::export_all();
    }
}
