//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds an in-memory view of every tracked account. The
//! engine seeds it from the state store at startup and folds in each
//! [`CycleReport`] as cycles finish, so reads never touch the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use verdant_core::decay::DecayPolicy;
use verdant_core::driver::DriverControl;
use verdant_types::{AccountId, CycleOutcome, CycleReport, Stage, TrackedState};

/// What the API reports for one account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccountView {
    /// Account identifier.
    pub account: AccountId,
    /// Last known stage (`None` until the first load or cycle).
    pub stage: Option<Stage>,
    /// Display name of the stage (e.g. `sapling`).
    pub stage_name: Option<&'static str>,
    /// Last known activity anchor.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Seconds left before the stage decays, as of the last read.
    ///
    /// `None` for `Dormant`, an unknown stage, or a missing anchor.
    pub stale_in_secs: Option<i64>,
    /// Cycles observed since startup.
    pub cycles: u64,
    /// Most recent cycle report.
    pub last_report: Option<CycleReport>,
}

impl AccountView {
    /// An account with nothing known about it yet.
    pub const fn unknown(account: AccountId) -> Self {
        Self {
            account,
            stage: None,
            stage_name: None,
            last_activity_at: None,
            stale_in_secs: None,
            cycles: 0,
            last_report: None,
        }
    }

    /// A view seeded from a persisted record.
    pub fn from_state(account: AccountId, state: TrackedState) -> Self {
        let mut view = Self::unknown(account);
        view.set_stage(Some(state.stage));
        view.last_activity_at = state.last_activity_at;
        view
    }

    /// Fold in a cycle report.
    ///
    /// A completed cycle carries the persisted anchor. A failed cycle
    /// updates stage and anchor only when it knows what was persisted.
    pub fn apply(&mut self, report: &CycleReport) {
        match &report.outcome {
            CycleOutcome::Completed { result, .. } => {
                self.last_activity_at = result.last_activity_at;
            }
            CycleOutcome::Failed {
                last_activity_at: Some(anchor),
                ..
            } => self.last_activity_at = Some(*anchor),
            CycleOutcome::Failed { .. } => {}
        }
        if let Some(stage) = report.outcome.stage() {
            self.set_stage(Some(stage));
        }
        self.cycles = self.cycles.saturating_add(1);
        self.last_report = Some(report.clone());
    }

    /// Copy of this view with `stale_in_secs` computed for `now`.
    #[must_use]
    pub fn as_of(&self, policy: &DecayPolicy, now: DateTime<Utc>) -> Self {
        let stale_in_secs = self
            .stage
            .filter(|stage| !stage.is_bottom())
            .and_then(|_| policy.time_until_stale(self.last_activity_at, now))
            .map(|left| left.num_seconds());
        Self {
            stale_in_secs,
            ..self.clone()
        }
    }

    fn set_stage(&mut self, stage: Option<Stage>) {
        self.stage = stage;
        self.stage_name = stage.map(Stage::domain_name);
    }
}

/// Account views keyed by account.
pub type AccountsSnapshot = BTreeMap<AccountId, AccountView>;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone, Default)]
pub struct AppState {
    /// Account views (updated after every cycle).
    pub accounts: Arc<RwLock<AccountsSnapshot>>,
    /// Driver control handle (present when a driver is running).
    pub control: Option<Arc<DriverControl>>,
    /// Decay policy used to report the time left before a stage decays.
    pub policy: DecayPolicy,
}

impl AppState {
    /// Create a state with no accounts and no driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state with a driver control handle attached.
    pub fn with_control(control: Arc<DriverControl>) -> Self {
        Self {
            control: Some(control),
            ..Self::default()
        }
    }

    /// Replace the decay policy (the default is one day).
    #[must_use]
    pub const fn with_policy(mut self, policy: DecayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every account view as of `now`, ordered by id.
    pub async fn views(&self, now: DateTime<Utc>) -> Vec<AccountView> {
        self.accounts
            .read()
            .await
            .values()
            .map(|view| view.as_of(&self.policy, now))
            .collect()
    }

    /// One account view as of `now`.
    pub async fn view(&self, account: &AccountId, now: DateTime<Utc>) -> Option<AccountView> {
        self.accounts
            .read()
            .await
            .get(account)
            .map(|view| view.as_of(&self.policy, now))
    }

    /// Add or replace the view for an account.
    pub async fn register(&self, view: AccountView) {
        self.accounts
            .write()
            .await
            .insert(view.account.clone(), view);
    }

    /// Fold a cycle report into its account's view, creating it if needed.
    pub async fn record(&self, report: &CycleReport) {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(report.account.clone())
            .or_insert_with(|| AccountView::unknown(report.account.clone()))
            .apply(report);
    }
}
