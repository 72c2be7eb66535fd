//! Telemetry route.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::server::AppState;
use crate::metrics::prometheus::CONTENT_TYPE;

/// Run one scrape cycle and render it.
///
/// Scrape failures are reported through the exporter metrics, so this
/// always answers 200.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let scrape = state.exporter.scrape().await;
    let body = state.renderer.export(&scrape.observations, &scrape.exporter);
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}
