//! Cycle callback that feeds the Observer API state.
//!
//! [`CycleCallback::on_cycle`] is synchronous, so reports are queued on an
//! unbounded channel and folded into [`AppState`] by a separate task. No
//! report is dropped when an HTTP reader holds the lock.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use verdant_core::driver::CycleCallback;
use verdant_observer::AppState;
use verdant_types::{CycleOutcome, CycleReport, Feedback};

/// Callback that bridges the cycle driver to the Observer API.
pub struct ObserverCallback {
    tx: mpsc::UnboundedSender<CycleReport>,
}

impl ObserverCallback {
    /// Create the callback and spawn the task applying its reports to
    /// `state`. The task ends once the callback is dropped.
    pub fn spawn(state: Arc<AppState>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<CycleReport>();
        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                state.record(&report).await;
            }
            debug!("Observer update task finished");
        });
        (Self { tx }, handle)
    }
}

impl CycleCallback for ObserverCallback {
    fn on_cycle(&mut self, report: &CycleReport) {
        present(report);
        if self.tx.send(report.clone()).is_err() {
            warn!(account = %report.account, "Observer update task gone, report not recorded");
        }
    }
}

/// Surface a report to the operator through the log.
fn present(report: &CycleReport) {
    match &report.outcome {
        CycleOutcome::Completed { result, feedback } => {
            info!(
                account = %report.account,
                trigger = ?report.trigger,
                stage = result.stage_after.domain_name(),
                changed = result.stage_changed(),
                events = result.events_observed,
                "Account checked"
            );
            match feedback {
                Feedback::Suggested { text } => info!(
                    account = %report.account,
                    commit = result.newest_event.as_deref().unwrap_or_default(),
                    suggestion = %text,
                    "Feedback"
                ),
                Feedback::Unavailable { reason } => {
                    warn!(account = %report.account, %reason, "Feedback unavailable");
                }
                Feedback::NotRequested => {}
            }
        }
        CycleOutcome::Failed {
            kind, stage, reason, ..
        } => warn!(
            account = %report.account,
            ?kind,
            last_stage = stage.map(verdant_types::Stage::domain_name),
            %reason,
            "Account check failed"
        ),
    }
}
