//! Integration tests for the Observer API endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` without
//! starting a TCP server.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;
use verdant_core::decay::DecayPolicy;
use verdant_core::driver::DriverControl;
use verdant_observer::router::build_router;
use verdant_observer::state::{AccountView, AppState};
use verdant_types::{
    AccountId, CycleId, CycleOutcome, CycleReport, CycleTrigger, Feedback, ReconcileResult, Stage,
    TrackedState,
};

async fn make_test_state(control: Option<Arc<DriverControl>>) -> Arc<AppState> {
    let state = control.map_or_else(AppState::new, AppState::with_control);
    let anchor = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();

    state
        .register(AccountView::from_state(
            AccountId::new("bo"),
            TrackedState::new(Stage::Established, Some(anchor)),
        ))
        .await;
    state
        .register(AccountView::unknown(AccountId::new("ana")))
        .await;

    let checked_at = Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap();
    state
        .record(&CycleReport {
            cycle_id: CycleId::new(),
            account: AccountId::new("ana"),
            trigger: CycleTrigger::OnDemand,
            started_at: checked_at,
            finished_at: checked_at,
            outcome: CycleOutcome::Completed {
                result: ReconcileResult {
                    account: AccountId::new("ana"),
                    stage_before: Stage::Dormant,
                    stage_after: Stage::Emerging,
                    regressed: false,
                    advanced: true,
                    events_observed: 1,
                    newest_event: Some("Add watering schedule".to_owned()),
                    checked_at,
                    last_activity_at: Some(checked_at),
                },
                feedback: Feedback::Suggested {
                    text: "Cover the schedule with a test.".to_owned(),
                },
            },
        })
        .await;

    Arc::new(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_health() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_list_accounts_sorted_by_id() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(Request::get("/api/accounts").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["accounts"][0]["account"], "ana");
    assert_eq!(json["accounts"][0]["stage"], "emerging");
    assert_eq!(json["accounts"][0]["cycles"], 1);
    assert_eq!(json["accounts"][1]["account"], "bo");
    assert_eq!(json["accounts"][1]["stage"], "established");
    assert!(json["accounts"][1]["last_report"].is_null());
}

#[tokio::test]
async fn test_get_account_includes_last_report() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(Request::get("/api/accounts/ana").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["last_activity_at"], "2026-05-04T20:00:00Z");
    let outcome = &json["last_report"]["outcome"];
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["result"]["newest_event"], "Add watering schedule");
    assert_eq!(outcome["feedback"]["status"], "suggested");
}

#[tokio::test]
async fn test_get_account_reports_time_left_before_decay() {
    let state = AppState::new().with_policy(DecayPolicy::new(Duration::hours(24)));
    let anchor = Utc::now() - Duration::hours(6);
    state
        .register(AccountView::from_state(
            AccountId::new("cy"),
            TrackedState::new(Stage::Established, Some(anchor)),
        ))
        .await;
    state
        .register(AccountView::from_state(
            AccountId::new("di"),
            TrackedState::new(Stage::Dormant, Some(anchor)),
        ))
        .await;
    let router = build_router(Arc::new(state));

    let response = router
        .clone()
        .oneshot(Request::get("/api/accounts/cy").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    let left = json["stale_in_secs"].as_i64().unwrap();
    assert!(left > 17 * 3600 && left <= 18 * 3600);

    let response = router
        .oneshot(Request::get("/api/accounts/di").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert!(json["stale_in_secs"].is_null());
}

#[tokio::test]
async fn test_get_account_not_found() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(
            Request::get("/api/accounts/nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
    assert!(json["error"].as_str().unwrap().contains("nobody"));
}

#[tokio::test]
async fn test_check_signals_driver() {
    let control = Arc::new(DriverControl::new());
    let router = build_router(make_test_state(Some(Arc::clone(&control))).await);

    let response = router
        .oneshot(Request::post("/api/check").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(control.checks_requested(), 1);
    assert!(!control.is_stop_requested());
}

#[tokio::test]
async fn test_stop_signals_driver() {
    let control = Arc::new(DriverControl::new());
    let router = build_router(make_test_state(Some(Arc::clone(&control))).await);

    let response = router
        .oneshot(Request::post("/api/stop").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], true);
    assert!(control.is_stop_requested());
}

#[tokio::test]
async fn test_control_without_driver_is_unavailable() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(Request::post("/api/check").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let router = build_router(make_test_state(None).await);

    let response = router
        .oneshot(Request::get("/api/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
