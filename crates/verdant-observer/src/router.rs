//! Axum router construction for the Observer API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the Observer server.
///
/// CORS allows any origin so a local dashboard can poll the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/accounts", get(handlers::list_accounts))
        .route("/api/accounts/{id}", get(handlers::get_account))
        .route("/api/check", post(handlers::request_check))
        .route("/api/stop", post(handlers::request_stop))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
