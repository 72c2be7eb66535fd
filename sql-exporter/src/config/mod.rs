//! Exporter configuration.
//!
//! [`ExporterConfig`] is built once at startup and handed to the
//! [`Exporter`](crate::scrape::Exporter); nothing reads configuration from
//! global state afterwards.

pub mod schema;

use std::time::Duration;

use url::Url;

use crate::{Error, Result};

pub use schema::{MetricDefinition, MetricType, load_definitions, load_metrics_file, parse_metrics};

/// Default metric namespace.
pub const DEFAULT_NAMESPACE: &str = "sql";

/// Default liveness query.
pub const DEFAULT_PROBE_QUERY: &str = "SELECT 1";

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime configuration of the scrape engine.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Database connection string.
    pub dsn: String,
    /// First segment of every metric name.
    pub namespace: String,
    /// Deadline applied to every query, probe included.
    pub query_timeout: Duration,
    /// Query used to check the connection is alive.
    pub probe_query: String,
}

impl ExporterConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            probe_query: DEFAULT_PROBE_QUERY.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_probe_query(mut self, probe_query: impl Into<String>) -> Self {
        self.probe_query = probe_query.into();
        self
    }

    /// Reject values the scrape engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(Error::config("a database DSN is required"));
        }
        if self.query_timeout.is_zero() {
            return Err(Error::config("query timeout must be greater than zero"));
        }
        if self.probe_query.trim().is_empty() {
            return Err(Error::config("probe query must not be empty"));
        }
        if !self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(format!(
                "invalid metric namespace '{}'",
                self.namespace
            )));
        }
        Ok(())
    }

    /// DSN with credentials hidden, safe to log.
    pub fn masked_dsn(&self) -> String {
        mask_dsn(&self.dsn)
    }
}

/// Parse a query timeout given in whole seconds.
pub fn parse_query_timeout(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid query timeout '{}': {}", raw, e)))?;
    if secs == 0 {
        return Err(Error::config("query timeout must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// Hide the password of a URL-style or `KEY=value;` style DSN.
pub fn mask_dsn(dsn: &str) -> String {
    if let Ok(mut url) = Url::parse(dsn)
        && url.has_host()
    {
        if url.password().is_some() {
            // Only fails for cannot-be-a-base URLs, which have no host.
            let _ = url.set_password(Some("***"));
        }
        return url.to_string();
    }

    if dsn.contains('=') {
        return dsn
            .split(';')
            .map(|part| match part.split_once('=') {
                Some((key, _)) if is_password_key(key) => format!("{}=***", key),
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(";");
    }

    dsn.to_string()
}

fn is_password_key(key: &str) -> bool {
    matches!(
        key.trim().to_ascii_uppercase().as_str(),
        "PWD" | "PASSWORD"
    )
}
