//! Health and metrics endpoints for the detector
//!
//! - `/healthz`: worst status over `sampler`, `baseline` and `alert_sink`.
//!   A degraded sampler (placeholder fields) or a failing alert sink still
//!   answers 200; an unloadable baseline answers 503.
//! - `/readyz`: 200 only while the detection loop is RUNNING and no
//!   component is unhealthy.
//! - `/metrics`: the process-global `hostwatch_*` Prometheus families.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hostwatch_lib::{health::HealthRegistry, observability::AgentMetrics};
use prometheus::{Encoder, TextEncoder};
use tracing::{info, warn};

async fn healthz(State(health): State<HealthRegistry>) -> Response {
    let report = health.health().await;
    let status_code = if report.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(report)).into_response()
}

async fn readyz(State(health): State<HealthRegistry>) -> Response {
    let readiness = health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness)).into_response()
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Router over the shared health registry
///
/// Registers the detector metrics up front so a scrape that arrives before
/// the first cycle still lists every family.
pub fn create_router(health: HealthRegistry) -> Router {
    AgentMetrics::new();

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(health)
}

/// Serve the endpoints on all interfaces until the process exits
pub async fn serve(port: u16, health: HealthRegistry) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Serving health and metrics");

    axum::serve(listener, create_router(health)).await?;
    Ok(())
}
