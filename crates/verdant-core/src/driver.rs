//! Cycle driver: runs every account's reconciler on a schedule and on
//! demand.
//!
//! The driver owns the periodic loop. Each pass reconciles all accounts
//! concurrently, asks the feedback generator about the newest event of
//! each completed cycle, and hands one [`CycleReport`] per account to the
//! [`CycleCallback`]. Feedback failures never change a committed
//! transition; they only mark the report's feedback as unavailable.
//!
//! [`DriverControl`] is shared with the HTTP surface so a request handler
//! can ask for an immediate pass or a clean stop without touching the
//! loop directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use verdant_types::{
    CycleId, CycleOutcome, CycleReport, CycleTrigger, Feedback, ReconcileResult,
};

use crate::config::ScheduleConfig;
use crate::feedback::FeedbackGenerator;
use crate::reconcile::Reconciler;
use crate::source::ActivitySource;
use crate::store::StateStore;

/// Shortest interval the driver accepts; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Shared control handle for a running [`CycleDriver`].
#[derive(Debug, Default)]
pub struct DriverControl {
    check_notify: Notify,
    stop_notify: Notify,
    stop_requested: AtomicBool,
    checks_requested: AtomicU64,
}

impl DriverControl {
    /// Create a control handle with nothing requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for an immediate pass over every account.
    ///
    /// Requests made while a pass is running coalesce into one follow-up
    /// pass.
    pub fn request_check(&self) {
        self.checks_requested.fetch_add(1, Ordering::Relaxed);
        self.check_notify.notify_one();
    }

    /// Ask the driver loop to exit after the current pass.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Total on-demand checks requested since creation.
    pub fn checks_requested(&self) -> u64 {
        self.checks_requested.load(Ordering::Relaxed)
    }

    async fn check_requested(&self) {
        self.check_notify.notified().await;
    }

    async fn stopped(&self) {
        while !self.is_stop_requested() {
            self.stop_notify.notified().await;
        }
    }
}

/// Receives the report of every cycle.
pub trait CycleCallback: Send {
    /// Called once per account after each pass.
    fn on_cycle(&mut self, report: &CycleReport);
}

/// A callback that ignores reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl CycleCallback for NoOpCallback {
    fn on_cycle(&mut self, _report: &CycleReport) {}
}

/// Drives reconciliation for a set of accounts.
pub struct CycleDriver<S, A, F> {
    reconcilers: Vec<Reconciler<S, A>>,
    feedback: Option<Arc<F>>,
    control: Arc<DriverControl>,
    interval: Duration,
    check_on_start: bool,
}

impl<S, A, F> CycleDriver<S, A, F>
where
    S: StateStore,
    A: ActivitySource,
    F: FeedbackGenerator,
{
    /// Create a driver for `reconcilers` with the given schedule and no
    /// feedback generator.
    pub fn new(
        reconcilers: Vec<Reconciler<S, A>>,
        control: Arc<DriverControl>,
        schedule: &ScheduleConfig,
    ) -> Self {
        Self {
            reconcilers,
            feedback: None,
            control,
            interval: schedule.interval().max(MIN_INTERVAL),
            check_on_start: schedule.check_on_start,
        }
    }

    /// Attach a feedback generator.
    #[must_use]
    pub fn with_feedback(mut self, generator: Arc<F>) -> Self {
        self.feedback = Some(generator);
        self
    }

    /// The control handle shared with this driver.
    pub fn control(&self) -> Arc<DriverControl> {
        Arc::clone(&self.control)
    }

    /// Run one pass over every account and return the reports in account
    /// order.
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Vec<CycleReport> {
        let passes = self
            .reconcilers
            .iter()
            .map(|reconciler| self.run_account(reconciler, trigger));
        futures::future::join_all(passes).await
    }

    /// Run until [`DriverControl::request_stop`] is called.
    ///
    /// Returns the number of passes executed.
    pub async fn run(&self, callback: &mut dyn CycleCallback) -> u64 {
        info!(
            accounts = self.reconcilers.len(),
            interval_secs = self.interval.as_secs(),
            check_on_start = self.check_on_start,
            feedback = self.feedback.is_some(),
            "Cycle driver starting"
        );

        let mut passes: u64 = 0;
        if self.check_on_start && !self.control.is_stop_requested() {
            self.dispatch(CycleTrigger::Startup, callback).await;
            passes = passes.saturating_add(1);
        }

        let first_tick = Instant::now()
            .checked_add(self.interval)
            .unwrap_or_else(Instant::now);
        let mut ticker = tokio::time::interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                biased;
                () = self.control.stopped() => break,
                () = self.control.check_requested() => CycleTrigger::OnDemand,
                _ = ticker.tick() => CycleTrigger::Scheduled,
            };
            self.dispatch(trigger, callback).await;
            passes = passes.saturating_add(1);
        }

        info!(passes, "Cycle driver stopped");
        passes
    }

    async fn dispatch(&self, trigger: CycleTrigger, callback: &mut dyn CycleCallback) {
        debug!(?trigger, "Cycle pass starting");
        for report in self.run_cycle(trigger).await {
            callback.on_cycle(&report);
        }
    }

    async fn run_account(&self, reconciler: &Reconciler<S, A>, trigger: CycleTrigger) -> CycleReport {
        let cycle_id = CycleId::new();
        let started_at = Utc::now();

        let outcome = match reconciler.reconcile(started_at).await {
            Ok(result) => {
                let feedback = self.feedback_for(&result).await;
                CycleOutcome::Completed { result, feedback }
            }
            Err(err) => {
                warn!(
                    %cycle_id,
                    account = %reconciler.account(),
                    kind = ?err.kind(),
                    error = %err,
                    "Cycle failed"
                );
                CycleOutcome::Failed {
                    kind: err.kind(),
                    stage: err.persisted_stage(),
                    last_activity_at: err.persisted_anchor(),
                    reason: err.to_string(),
                }
            }
        };

        debug!(
            %cycle_id,
            account = %reconciler.account(),
            stage = ?outcome.stage(),
            completed = outcome.is_completed(),
            "Cycle finished"
        );

        CycleReport {
            cycle_id,
            account: reconciler.account().clone(),
            trigger,
            started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }

    async fn feedback_for(&self, result: &ReconcileResult) -> Feedback {
        let (Some(generator), Some(event)) = (&self.feedback, &result.newest_event) else {
            return Feedback::NotRequested;
        };
        match generator.describe(event).await {
            Ok(text) => Feedback::Suggested { text },
            Err(err) => {
                warn!(account = %result.account, error = %err, "Feedback generation failed");
                Feedback::Unavailable {
                    reason: err.to_string(),
                }
            }
        }
    }
}
