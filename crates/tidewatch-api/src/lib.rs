//! # Tidewatch API
//!
//! The health HTTP surface (`/health`, `/health/live`, `/health/ready`)
//! plus the shared, validated configuration types the rest of the process
//! is wired up from.

pub mod config;
pub mod errors;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

pub use config::ServiceConfig;
pub use errors::{ConfigError, ServiceError};
use tidewatch_health::{HealthChecker, HealthReport, Status};

/// Shared state for the health HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(health_checker: Arc<HealthChecker>) -> Self {
        Self { health_checker }
    }
}

/// Builds the health HTTP router. Self-observability rides the normal
/// store/upload pipeline (via the meta-metrics exporter task in
/// `tidewatch-service`) rather than a second `/metrics` scrape endpoint, so
/// this surface only ever answers liveness/readiness probes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/health/live", get(handle_liveness))
        .route("/health/ready", get(handle_readiness))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
        .with_state(state)
}

/// Starts the health HTTP server and runs it until `shutdown` resolves.
pub async fn serve(
    config: &config::HttpConfig,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServiceError> {
    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| ServiceError::BindFailed {
            address: format!("{}:{}", config.host, config.port),
            message: e.to_string(),
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed { address: addr.to_string(), message: e.to_string() })?;

    info!(%addr, "starting health HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed { message: e.to_string() })
}

#[instrument(skip_all)]
async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health_checker.report())
}

/// Always 200: the process is running if it can answer at all.
#[instrument(skip_all)]
async fn handle_liveness() -> StatusCode {
    StatusCode::OK
}

/// 200 iff overall status is `ok`, enabling an orchestrator to pause
/// traffic or restart on anything worse.
#[instrument(skip_all)]
async fn handle_readiness(State(state): State<AppState>) -> StatusCode {
    match state.health_checker.report().status {
        Status::Ok => StatusCode::OK,
        Status::Degraded | Status::Error => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Convenience constructor used by `tidewatch-service`; keeps the
/// health-threshold resolution (config -> `HealthThresholds`) in one place.
pub fn build_health_checker(config: &ServiceConfig, upload_interval: Duration) -> HealthChecker {
    HealthChecker::with_thresholds(upload_interval, config.health.resolve())
}
