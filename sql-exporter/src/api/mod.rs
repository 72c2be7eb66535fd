//! HTTP surface of the exporter.
//!
//! Serves the landing page, the telemetry path and the health endpoints.

pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
