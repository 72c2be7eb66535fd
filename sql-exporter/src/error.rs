//! Exporter-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Exporter-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Exporter-wide error type.
///
/// Only [`Error::Configuration`] is fatal; every other variant is recovered
/// inside a scrape cycle and surfaces through the exporter's own metrics.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query timed out after {}s", .0.as_secs_f64())]
    QueryTimeout(Duration),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Row scan error: {0}")]
    RowScan(String),

    #[error("No metrics found while parsing")]
    ZeroResult,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn row_scan(msg: impl Into<String>) -> Self {
        Self::RowScan(msg.into())
    }

    /// Whether a statement was abandoned at its deadline. The driver may
    /// still be running it on the connection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::QueryTimeout(_))
    }

    /// Whether this error belongs to a single metric definition rather than
    /// to the exporter as a whole.
    pub fn is_definition_scoped(&self) -> bool {
        matches!(
            self,
            Self::QueryTimeout(_) | Self::Execution(_) | Self::RowScan(_) | Self::ZeroResult
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_execution() {
        let timeout = Error::QueryTimeout(Duration::from_secs(1));
        assert!(matches!(timeout, Error::QueryTimeout(_)));
        assert_eq!(timeout.to_string(), "Query timed out after 1s");

        let exec = Error::execution("syntax error");
        assert!(!matches!(exec, Error::QueryTimeout(_)));

        assert!(timeout.is_timeout());
        assert!(!exec.is_timeout());
    }

    #[test]
    fn test_definition_scope() {
        assert!(Error::ZeroResult.is_definition_scoped());
        assert!(Error::row_scan("bad row").is_definition_scoped());
        assert!(!Error::connection("refused").is_definition_scoped());
        assert!(!Error::config("bad type").is_definition_scoped());
    }
}
