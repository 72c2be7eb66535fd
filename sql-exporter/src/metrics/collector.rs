//! Exporter self-monitoring.
//!
//! Tracks the fixed metrics published next to the user-defined ones:
//! scrape count, per-definition error count, last scrape duration, last
//! scrape error flag and database `up` status.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Metrics collector for the exporter itself.
#[derive(Debug)]
pub struct ExporterMetrics {
    scrapes_total: AtomicU64,
    scrapes_completed: AtomicU64,
    scrape_errors: DashMap<String, AtomicU64>,
    // f64 bits
    last_scrape_duration: AtomicU64,
    last_scrape_error: AtomicU64,
    up: AtomicU64,
    // Unix millis, 0 before the first scrape.
    last_scrape_at: AtomicI64,
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self {
            scrapes_total: AtomicU64::new(0),
            scrapes_completed: AtomicU64::new(0),
            scrape_errors: DashMap::new(),
            last_scrape_duration: AtomicU64::new(0f64.to_bits()),
            last_scrape_error: AtomicU64::new(0),
            up: AtomicU64::new(0),
            last_scrape_at: AtomicI64::new(0),
        }
    }

    /// Record the start of a scrape cycle.
    pub fn record_scrape_started(&self) {
        self.scrapes_total.fetch_add(1, Ordering::Relaxed);
        self.last_scrape_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Publish the outcome of a finished scrape cycle.
    ///
    /// `up` and the error flag only change here, so readers never see a
    /// cycle that is still running.
    pub fn record_scrape_finished(&self, duration: Duration, up: bool, failed: bool) {
        self.set_last_scrape_duration(duration);
        self.set_up(up);
        self.set_last_scrape_error(failed);
        self.scrapes_completed.fetch_add(1, Ordering::Release);
    }

    /// Record a failed metric definition.
    pub fn record_scrape_error(&self, context: impl Into<String>) {
        let context = context.into();
        self.scrape_errors
            .entry(context)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_scrape_duration(&self, duration: Duration) {
        self.last_scrape_duration
            .store(duration.as_secs_f64().to_bits(), Ordering::Relaxed);
    }

    pub fn set_last_scrape_error(&self, failed: bool) {
        self.last_scrape_error
            .store(u64::from(failed), Ordering::Relaxed);
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(u64::from(up), Ordering::Relaxed);
    }

    pub fn scrapes_total(&self) -> u64 {
        self.scrapes_total.load(Ordering::Relaxed)
    }

    pub fn scrapes_completed(&self) -> u64 {
        self.scrapes_completed.load(Ordering::Acquire)
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed) == 1
    }

    /// Error count for one definition context.
    pub fn scrape_errors(&self, context: &str) -> u64 {
        self.scrape_errors
            .get(context)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> ExporterSnapshot {
        let last_scrape_at = match self.last_scrape_at.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        };

        ExporterSnapshot {
            scrapes_total: self.scrapes_total.load(Ordering::Relaxed),
            scrapes_completed: self.scrapes_completed(),
            scrape_errors: self
                .scrape_errors
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            last_scrape_duration_seconds: f64::from_bits(
                self.last_scrape_duration.load(Ordering::Relaxed),
            ),
            last_scrape_error: self.last_scrape_error.load(Ordering::Relaxed) == 1,
            up: self.is_up(),
            last_scrape_at,
        }
    }
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of the exporter metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterSnapshot {
    pub scrapes_total: u64,
    /// Cycles that ran to the end; lags `scrapes_total` while one runs.
    pub scrapes_completed: u64,
    /// Errors by definition context, sorted.
    pub scrape_errors: BTreeMap<String, u64>,
    pub last_scrape_duration_seconds: f64,
    pub last_scrape_error: bool,
    pub up: bool,
    pub last_scrape_at: Option<DateTime<Utc>>,
}
