//! Metrics and monitoring module.
//!
//! - [`emitter`] turns result rows into typed observations.
//! - [`collector`] holds the exporter's own counters and gauges.
//! - [`prometheus`] renders a scrape in the Prometheus text format.
//! - [`health`] derives a health report from the exporter metrics.

pub mod collector;
pub mod emitter;
pub mod health;
pub mod prometheus;

pub use collector::{ExporterMetrics, ExporterSnapshot};
pub use emitter::{Observation, build_fq_name, emit, parse_value, sanitize_name};
pub use health::{ExporterHealth, HealthStatus};
pub use prometheus::PrometheusExporter;
