//! REST API endpoint handlers for the Observer server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `GET` | `/api/accounts` | List all accounts |
//! | `GET` | `/api/accounts/{id}` | Single account |
//! | `POST` | `/api/check` | Request an immediate cycle |
//! | `POST` | `/api/stop` | Request driver shutdown |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use verdant_core::driver::DriverControl;
use verdant_types::AccountId;

use crate::error::ObserverError;
use crate::state::AppState;

/// Response body for the control endpoints.
#[derive(Debug, serde::Serialize)]
struct ControlResponse {
    /// Whether the request was accepted.
    ok: bool,
    /// Human-readable message.
    message: String,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api/accounts` -- every account, ordered by id.
pub async fn list_accounts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let views = state.views(Utc::now()).await;
    Json(serde_json::json!({
        "count": views.len(),
        "accounts": views,
    }))
}

/// `GET /api/accounts/{id}`
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    state
        .view(&AccountId::new(id.as_str()), Utc::now())
        .await
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("account {id}")))
}

/// `POST /api/check` -- ask the driver for an immediate pass.
pub async fn request_check(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let control = control(&state)?;
    control.request_check();
    Ok((
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            ok: true,
            message: "Check requested".to_owned(),
        }),
    ))
}

/// `POST /api/stop` -- ask the driver to exit after the current pass.
pub async fn request_stop(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let control = control(&state)?;
    control.request_stop();
    tracing::info!("Stop requested over HTTP");
    Ok((
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            ok: true,
            message: "Stop requested".to_owned(),
        }),
    ))
}

fn control(state: &AppState) -> Result<&DriverControl, ObserverError> {
    state
        .control
        .as_deref()
        .ok_or_else(|| ObserverError::Unavailable("no cycle driver attached".to_owned()))
}
