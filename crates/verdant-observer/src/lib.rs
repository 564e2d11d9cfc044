//! Observer API server for Verdant.
//!
//! An Axum HTTP server exposing each tracked account's stage, activity
//! anchor and latest cycle report, plus two control endpoints that drive
//! the [`CycleDriver`](verdant_core::driver::CycleDriver) through its
//! shared [`DriverControl`](verdant_core::driver::DriverControl).
//!
//! Reads are served from an in-memory [`AccountsSnapshot`] that the engine
//! updates after every cycle, so the API never blocks reconciliation.
//!
//! [`AccountsSnapshot`]: state::AccountsSnapshot

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::{AccountView, AccountsSnapshot, AppState};
