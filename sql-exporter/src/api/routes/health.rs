//! Health check routes.
//!
//! These read the exporter metrics only and never start a scrape.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::server::AppState;
use crate::metrics::ExporterHealth;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

fn current_health(state: &AppState) -> ExporterHealth {
    ExporterHealth::from_snapshot(
        &state.exporter.metrics().snapshot(),
        state.start_time.elapsed(),
        state.exporter.definitions().len(),
    )
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<ExporterHealth> {
    Json(current_health(&state))
}

/// Readiness check.
/// Returns HTTP 503 if the last scrape could not reach the database.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if current_health(&state).is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Liveness check - is the process responsive?
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
