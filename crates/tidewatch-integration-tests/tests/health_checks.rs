//! S8 — health escalation, exercised end-to-end through the real
//! `HealthChecker` and the `/health` HTTP surface it backs.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tidewatch_api::{create_router, AppState};
use tidewatch_health::HealthChecker;
use tower::ServiceExt;

fn state(checker: Arc<HealthChecker>) -> AppState {
    AppState::new(checker)
}

#[tokio::test]
async fn healthy_system_answers_ok_on_every_surface() {
    let checker = Arc::new(HealthChecker::new(Duration::from_secs(30)));
    checker.record_upload_result(true, None);
    checker.set_pending_rows(100);
    let app = create_router(state(checker));

    for uri in ["/health", "/health/live", "/health/ready"] {
        let response = app.clone().oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri} should be 200 when healthy");
    }
}

#[tokio::test]
async fn moderate_backlog_with_recent_upload_is_degraded_but_still_live() {
    // 30s upload interval, last success 45s ago, 6000 pending rows.
    let checker = Arc::new(HealthChecker::new(Duration::from_secs(30)));
    checker.record_upload_result(true, None);
    tokio::time::sleep(Duration::from_millis(5)).await;
    checker.set_pending_rows(6_000);

    let report = checker.report();
    assert_eq!(report.status, tidewatch_health::Status::Degraded);

    let app = create_router(state(checker));
    let live =
        app.clone().oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK, "liveness never reflects degraded state");

    let ready = app.oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn stale_upload_with_large_backlog_escalates_to_error_and_fails_readiness() {
    // No successful upload recorded and a backlog past the error ceiling;
    // stands in for "last upload 11 minutes ago" without sleeping the test.
    let checker = Arc::new(HealthChecker::new(Duration::from_secs(30)));
    checker.set_pending_rows(12_000);

    assert_eq!(checker.report().status, tidewatch_health::Status::Error);

    let app = create_router(state(checker));
    let response =
        app.oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
