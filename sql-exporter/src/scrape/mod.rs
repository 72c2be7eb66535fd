//! Scrape orchestration.
//!
//! A scrape cycle probes the database (reconnecting once if needed), then
//! runs every metric definition in declaration order. A failing definition
//! is logged and counted under its context and the cycle moves on to the
//! next one. Cycles are serialized by a mutex held for the whole cycle, so
//! the single database handle is never used concurrently.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ExporterConfig, MetricDefinition};
use crate::database::{ConnectionManager, ConnectionState, Connector, execute};
use crate::metrics::{ExporterMetrics, ExporterSnapshot, Observation, emit};
use crate::{Error, Result};

/// Result of one scrape cycle.
#[derive(Debug, Clone)]
pub struct Scrape {
    /// Observations of every definition, in definition order.
    pub observations: Vec<Observation>,
    /// Exporter metrics as they stood at the end of the cycle.
    pub exporter: ExporterSnapshot,
}

/// Turns configured SQL queries into observations.
pub struct Exporter {
    config: ExporterConfig,
    definitions: Vec<MetricDefinition>,
    connection: Mutex<ConnectionManager>,
    metrics: Arc<ExporterMetrics>,
}

impl Exporter {
    pub fn new(
        config: ExporterConfig,
        definitions: Vec<MetricDefinition>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let connection =
            ConnectionManager::new(connector, config.probe_query.clone(), config.query_timeout);
        Self {
            config,
            definitions,
            connection: Mutex::new(connection),
            metrics: Arc::new(ExporterMetrics::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        &self.metrics
    }

    /// Connectivity as left by the last cycle. Waits for a running cycle.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.lock().await.state()
    }

    /// Open the connection ahead of the first scrape.
    pub async fn connect(&self) -> Result<()> {
        self.connection.lock().await.ensure_connected().await
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.connection.lock().await.close().await;
    }

    /// Run one full scrape cycle.
    pub async fn scrape(&self) -> Scrape {
        let mut connection = self.connection.lock().await;

        self.metrics.record_scrape_started();
        let started = Instant::now();
        let mut observations = Vec::new();

        let (up, failed) = match connection.ensure_connected().await {
            Err(e) => {
                error!(error = %e, "Unable to connect to database");
                (false, true)
            }
            Ok(()) => self.scrape_definitions(&mut connection, &mut observations).await,
        };

        let elapsed = started.elapsed();
        self.metrics.record_scrape_finished(elapsed, up, failed);

        debug!(
            observations = observations.len(),
            duration_ms = elapsed.as_millis() as u64,
            up,
            failed,
            "Scrape finished"
        );

        Scrape {
            observations,
            exporter: self.metrics.snapshot(),
        }
    }

    /// Run every definition in order. Returns `(up, failed)`.
    ///
    /// A timed-out statement leaves its handle busy, so the handle is
    /// discarded and the next definition runs on a fresh one. If that
    /// cannot be opened the database counts as down and the remaining
    /// definitions are skipped.
    async fn scrape_definitions(
        &self,
        connection: &mut ConnectionManager,
        observations: &mut Vec<Observation>,
    ) -> (bool, bool) {
        let mut failed = false;

        for definition in &self.definitions {
            if !connection.is_open()
                && let Err(e) = connection.ensure_connected().await
            {
                error!(error = %e, "Unable to reopen database connection");
                return (false, true);
            }

            if let Err(e) = self
                .scrape_definition(connection, definition, observations)
                .await
            {
                error!(
                    context = %definition.context,
                    error = %e,
                    "Error scraping metric definition"
                );
                self.metrics.record_scrape_error(&definition.context);
                failed = true;

                if e.is_timeout() {
                    connection.discard().await;
                }
            }
        }
        (true, failed)
    }

    /// Run one definition, appending what it emits to `observations`.
    ///
    /// Observations emitted before a failure are kept.
    async fn scrape_definition(
        &self,
        connection: &mut ConnectionManager,
        definition: &MetricDefinition,
        observations: &mut Vec<Observation>,
    ) -> Result<usize> {
        let conn = connection.connection()?;
        let mut cursor = execute(conn, &definition.request, self.config.query_timeout).await?;

        let mut emitted = 0;
        while let Some(row) = cursor.next().await {
            let row = row?;
            let batch = emit(&self.config.namespace, definition, &row);
            emitted += batch.len();
            observations.extend(batch);
        }

        if emitted == 0 {
            if definition.ignore_zero_result {
                debug!(context = %definition.context, "No metrics emitted, ignored");
            } else {
                return Err(Error::ZeroResult);
            }
        }
        Ok(emitted)
    }
}

/// Open the connection at startup, logging instead of failing.
pub async fn warm_up(exporter: &Exporter) {
    match exporter.connect().await {
        Ok(()) => info!("Connected to database"),
        Err(e) => warn!(error = %e, "Initial database connection failed, retrying on next scrape"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricType, parse_metrics};
    use crate::database::mock::{MockConnector, MockDatabase, Outcome, row};
    use std::time::Duration;

    const DEFINITIONS: &str = r#"
[[metric]]
context = "sessions"
labels = ["state"]
metricsdesc = { count = "Sessions by state." }
request = "SELECT state, count FROM sessions"

[[metric]]
context = "names_only"
labels = ["name"]
metricsdesc = { value = "Never numeric." }
request = "SELECT name, value FROM names"

[[metric]]
context = "tablespace"
metricsdesc = { used = "Used pages." }
metricstype = { used = "counter" }
fieldtoappend = "tbspname"
request = "SELECT tbspname, used FROM tbsp"
"#;

    fn exporter(db: &Arc<MockDatabase>, definitions: &str) -> Exporter {
        let config = ExporterConfig::new("mock://db")
            .with_namespace("ibmdb2")
            .with_query_timeout(Duration::from_secs(1));
        Exporter::new(
            config,
            parse_metrics(definitions, "test").unwrap(),
            Arc::new(MockConnector::new(db.clone())),
        )
    }

    fn seed(db: &MockDatabase) {
        db.on(
            "SELECT state, count FROM sessions",
            Outcome::Rows(vec![
                row(&[("state", "active"), ("count", "3")]),
                row(&[("state", "idle"), ("count", "7")]),
            ]),
        );
        db.on(
            "SELECT name, value FROM names",
            Outcome::Rows(vec![row(&[("name", "a"), ("value", "n/a")])]),
        );
        db.on(
            "SELECT tbspname, used FROM tbsp",
            Outcome::Rows(vec![row(&[("tbspname", "MY TBS (1)"), ("used", "42")])]),
        );
    }

    fn names(scrape: &Scrape) -> Vec<&str> {
        scrape.observations.iter().map(|o| o.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let db = MockDatabase::new();
        seed(&db);
        let exporter = exporter(&db, DEFINITIONS);

        let scrape = exporter.scrape().await;

        assert_eq!(
            names(&scrape),
            vec![
                "ibmdb2_sessions_count",
                "ibmdb2_sessions_count",
                "ibmdb2_tablespace_my_tbs_1"
            ]
        );
        let tbs = &scrape.observations[2];
        assert_eq!(tbs.value, 42.0);
        assert_eq!(tbs.metric_type, MetricType::Counter);
        assert!(tbs.labels.is_empty());

        assert!(scrape.exporter.up);
        assert_eq!(scrape.exporter.scrapes_total, 1);
        assert_eq!(exporter.connection_state().await, ConnectionState::Up);
    }

    #[tokio::test]
    async fn test_zero_result_is_counted_and_isolated() {
        let db = MockDatabase::new();
        seed(&db);
        let exporter = exporter(&db, DEFINITIONS);

        let scrape = exporter.scrape().await;

        assert_eq!(scrape.exporter.scrape_errors.get("names_only"), Some(&1));
        assert_eq!(scrape.exporter.scrape_errors.len(), 1);
        // The definition after the failing one still ran.
        assert!(names(&scrape).contains(&"ibmdb2_tablespace_my_tbs_1"));
        assert!(scrape.exporter.last_scrape_error);
    }

    #[tokio::test]
    async fn test_ignore_zero_result() {
        let db = MockDatabase::new();
        db.on(
            "SELECT name, value FROM names",
            Outcome::Rows(vec![row(&[("name", "a"), ("value", "n/a")])]),
        );
        let exporter = exporter(
            &db,
            r#"
[[metric]]
context = "names_only"
labels = ["name"]
metricsdesc = { value = "Never numeric." }
ignorezeroresult = true
request = "SELECT name, value FROM names"
"#,
        );

        let scrape = exporter.scrape().await;
        assert!(scrape.observations.is_empty());
        assert!(scrape.exporter.scrape_errors.is_empty());
        assert!(!scrape.exporter.last_scrape_error);
    }

    #[tokio::test]
    async fn test_execution_error_is_isolated() {
        let db = MockDatabase::new();
        seed(&db);
        db.on(
            "SELECT state, count FROM sessions",
            Outcome::Fail("table not found".into()),
        );
        let exporter = exporter(&db, DEFINITIONS);

        let scrape = exporter.scrape().await;
        assert_eq!(scrape.exporter.scrape_errors.get("sessions"), Some(&1));
        assert_eq!(names(&scrape), vec!["ibmdb2_tablespace_my_tbs_1"]);
        assert!(scrape.exporter.up);
    }

    #[tokio::test]
    async fn test_scan_error_keeps_earlier_rows() {
        let db = MockDatabase::new();
        seed(&db);
        db.on(
            "SELECT state, count FROM sessions",
            Outcome::BrokenAfter(
                vec![row(&[("state", "active"), ("count", "3")])],
                "invalid utf-8".into(),
            ),
        );
        let exporter = exporter(&db, DEFINITIONS);

        let scrape = exporter.scrape().await;
        assert_eq!(scrape.exporter.scrape_errors.get("sessions"), Some(&1));
        assert_eq!(
            names(&scrape),
            vec!["ibmdb2_sessions_count", "ibmdb2_tablespace_my_tbs_1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_isolated() {
        let db = MockDatabase::new();
        seed(&db);
        db.on(
            "SELECT state, count FROM sessions",
            Outcome::Slow(
                Duration::from_secs(5),
                vec![row(&[("state", "active"), ("count", "3")])],
            ),
        );
        let exporter = exporter(&db, DEFINITIONS);

        let started = tokio::time::Instant::now();
        let scrape = exporter.scrape().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(scrape.exporter.scrape_errors.get("sessions"), Some(&1));
        assert_eq!(scrape.exporter.scrape_errors.get("tablespace"), None);
        assert!(names(&scrape).contains(&"ibmdb2_tablespace_my_tbs_1"));
        assert!(scrape.exporter.up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_handle_is_replaced() {
        let db = MockDatabase::new();
        db.on(
            "SELECT v FROM slow",
            Outcome::Slow(Duration::from_secs(30), vec![row(&[("v", "1")])]),
        );
        db.on("SELECT v FROM fast", Outcome::Rows(vec![row(&[("v", "2")])]));
        let exporter = exporter(
            &db,
            r#"
[[metric]]
context = "slow"
metricsdesc = { v = "Slow." }
request = "SELECT v FROM slow"

[[metric]]
context = "fast"
metricsdesc = { v = "Fast." }
request = "SELECT v FROM fast"
"#,
        );

        let started = tokio::time::Instant::now();
        let scrape = exporter.scrape().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(scrape.exporter.scrape_errors.get("slow"), Some(&1));
        assert_eq!(scrape.exporter.scrape_errors.get("fast"), None);
        assert_eq!(names(&scrape), vec!["ibmdb2_fast_v"]);
        // The busy handle was dropped, not closed.
        assert_eq!(db.connects.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(db.closes.load(std::sync::atomic::Ordering::SeqCst), 0);

        // The next cycle probes the fresh handle and stays within its bound.
        let started = tokio::time::Instant::now();
        let scrape = exporter.scrape().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(scrape.exporter.up);
        assert_eq!(scrape.exporter.scrape_errors.get("slow"), Some(&2));
        assert_eq!(scrape.exporter.scrape_errors.get("fast"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reopen_after_timeout_marks_down() {
        let db = MockDatabase::new();
        db.on(
            "SELECT v FROM slow",
            Outcome::Slow(Duration::from_secs(30), vec![row(&[("v", "1")])]),
        );
        let exporter = exporter(
            &db,
            r#"
[[metric]]
context = "slow"
metricsdesc = { v = "Slow." }
request = "SELECT v FROM slow"

[[metric]]
context = "after"
metricsdesc = { v = "Never reached." }
request = "SELECT v FROM after"
"#,
        );
        exporter.connect().await.unwrap();

        // Runs when the timed-out handle is replaced.
        let down = db.clone();
        let scrape = tokio::select! {
            scrape = exporter.scrape() => scrape,
            _ = async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                down.set_down(true);
                std::future::pending::<()>().await
            } => unreachable!(),
        };

        assert!(!scrape.exporter.up);
        assert!(scrape.exporter.last_scrape_error);
        assert_eq!(scrape.exporter.scrape_errors.get("after"), None);
        assert!(!db.executed().contains(&"SELECT v FROM after".to_string()));
        assert_eq!(exporter.connection_state().await, ConnectionState::Down);
    }

    #[tokio::test]
    async fn test_database_down_skips_definitions() {
        let db = MockDatabase::new();
        seed(&db);
        db.set_down(true);
        let exporter = exporter(&db, DEFINITIONS);

        let scrape = exporter.scrape().await;
        assert!(scrape.observations.is_empty());
        assert!(!scrape.exporter.up);
        assert!(scrape.exporter.last_scrape_error);
        assert!(scrape.exporter.scrape_errors.is_empty());
        assert!(db.executed().is_empty());
        assert_eq!(exporter.connection_state().await, ConnectionState::Down);

        db.set_down(false);
        let scrape = exporter.scrape().await;
        assert!(scrape.exporter.up);
        assert_eq!(scrape.exporter.scrapes_total, 2);
        assert_eq!(exporter.connection_state().await, ConnectionState::Up);
        assert!(names(&scrape).contains(&"ibmdb2_sessions_count"));
    }

    #[tokio::test]
    async fn test_lost_connection_reconnects() {
        let db = MockDatabase::new();
        seed(&db);
        let exporter = exporter(&db, DEFINITIONS);
        exporter.scrape().await;

        db.set_down(true);
        db.clear_executed();
        let scrape = exporter.scrape().await;
        assert!(!scrape.exporter.up);
        // Only the probe on the stale handle ran; the reconnect never got a handle.
        assert_eq!(db.executed(), vec!["SELECT 1".to_string()]);

        db.set_down(false);
        let scrape = exporter.scrape().await;
        assert!(scrape.exporter.up);
    }

    #[tokio::test]
    async fn test_concurrent_scrapes_are_serialized() {
        let db = MockDatabase::new();
        seed(&db);
        let exporter = Arc::new(exporter(&db, DEFINITIONS));

        let (a, b) = tokio::join!(exporter.scrape(), exporter.scrape());
        let mut totals = [a.exporter.scrapes_total, b.exporter.scrapes_total];
        totals.sort();
        assert_eq!(totals, [1, 2]);
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let db = MockDatabase::new();
        let exporter = exporter(&db, DEFINITIONS);

        exporter.connect().await.unwrap();
        assert_eq!(exporter.connection_state().await, ConnectionState::Up);

        exporter.close().await;
        assert_eq!(db.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
