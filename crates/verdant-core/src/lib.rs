//! Growth state engine for the Verdant activity tracker.
//!
//! This crate owns the reconciliation cycle that maps external activity
//! onto a [`Stage`](verdant_types::Stage): staleness first, then fetch,
//! then at most one advance per cycle.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `verdant-config.yaml` into
//!   strongly-typed structs.
//! - [`decay`] -- The staleness rule ([`is_stale`], [`DecayPolicy`]).
//! - [`store`] -- [`StateStore`] trait and [`InMemoryStateStore`].
//! - [`source`] -- [`ActivitySource`] trait and [`ScriptedActivitySource`].
//! - [`feedback`] -- [`FeedbackGenerator`] trait and
//!   [`CannedFeedbackGenerator`].
//! - [`lock`] -- Per-account exclusion ([`AccountLocks`]).
//! - [`reconcile`] -- One check cycle for one account ([`Reconciler`]).
//! - [`driver`] -- Scheduled and on-demand passes over all accounts
//!   ([`CycleDriver`]).
//!
//! [`is_stale`]: decay::is_stale
//! [`DecayPolicy`]: decay::DecayPolicy
//! [`StateStore`]: store::StateStore
//! [`InMemoryStateStore`]: store::InMemoryStateStore
//! [`ActivitySource`]: source::ActivitySource
//! [`ScriptedActivitySource`]: source::ScriptedActivitySource
//! [`FeedbackGenerator`]: feedback::FeedbackGenerator
//! [`CannedFeedbackGenerator`]: feedback::CannedFeedbackGenerator
//! [`AccountLocks`]: lock::AccountLocks
//! [`Reconciler`]: reconcile::Reconciler
//! [`CycleDriver`]: driver::CycleDriver

pub mod config;
pub mod decay;
pub mod driver;
pub mod feedback;
pub mod lock;
pub mod reconcile;
pub mod source;
pub mod store;
