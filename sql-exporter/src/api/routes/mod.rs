//! HTTP route modules.

pub mod health;
pub mod landing;
pub mod metrics;

use axum::Router;
use axum::routing::get;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route("/", get(landing::landing_page))
        .route(&telemetry_path, get(metrics::metrics))
        .nest("/health", health::router())
        .with_state(state)
}
