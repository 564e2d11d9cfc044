//! Durable state stores for Verdant (`PostgreSQL` + `Dragonfly`).
//!
//! Both stores implement [`verdant_core::store::StateStore`] with
//! optimistic concurrency: every record carries a version and a write
//! succeeds only against the version its writer read.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`tracked_store`] -- The `tracked_state` table store
//! - [`dragonfly`] -- `Dragonfly` connection and key-value store
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod postgres;
pub mod tracked_store;

// Re-export primary types for convenience.
pub use dragonfly::{DragonflyPool, DragonflyStateStore};
pub use error::DbError;
pub use postgres::PostgresPool;
pub use tracked_store::{PostgresStateStore, TrackedStateRow};
