//! Health check implementation.
//!
//! Derives the exporter's health from its own metrics, without touching
//! the database: the last scrape cycle decides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collector::ExporterSnapshot;

/// Health status of the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The last scrape reached the database.
    Healthy,
    /// The last scrape could not reach the database.
    Unhealthy,
    /// No scrape has completed yet.
    #[default]
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health report served on the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    /// Timestamp of the report (RFC 3339).
    pub timestamp: String,
    /// Number of configured metric definitions.
    pub definitions: usize,
    pub scrapes_total: u64,
    /// Start of the last scrape (RFC 3339).
    pub last_scrape: Option<String>,
    pub last_scrape_duration_seconds: f64,
    pub last_scrape_error: bool,
}

impl ExporterHealth {
    pub fn from_snapshot(
        snapshot: &ExporterSnapshot,
        uptime: Duration,
        definitions: usize,
    ) -> Self {
        let status = if snapshot.scrapes_completed == 0 {
            HealthStatus::Unknown
        } else if snapshot.up {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime.as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            definitions,
            scrapes_total: snapshot.scrapes_total,
            last_scrape: snapshot.last_scrape_at.map(|t| t.to_rfc3339()),
            last_scrape_duration_seconds: snapshot.last_scrape_duration_seconds,
            last_scrape_error: snapshot.last_scrape_error,
        }
    }

    /// Ready unless the last scrape found the database down.
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
