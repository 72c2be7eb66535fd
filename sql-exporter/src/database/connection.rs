//! Ownership and health of the single database handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::executor::execute;
use super::{Connector, DbConnection};
use crate::{Error, Result};

/// Connectivity as seen by the last scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No cycle has run yet.
    #[default]
    Unknown,
    Up,
    Down,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unknown => write!(f, "unknown"),
            ConnectionState::Up => write!(f, "up"),
            ConnectionState::Down => write!(f, "down"),
        }
    }
}

/// Owns the live handle, probes it and reopens it after a failure.
///
/// Reconnection is one-shot: a failed probe leads to exactly one fresh
/// open-and-probe attempt. If that fails too, the state becomes
/// [`ConnectionState::Down`] until the next call.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    handle: Option<Box<dyn DbConnection>>,
    state: ConnectionState,
    probe_query: String,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        probe_query: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            handle: None,
            state: ConnectionState::Unknown,
            probe_query: probe_query.into(),
            timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The live handle, if the last check succeeded.
    pub fn connection(&mut self) -> Result<&mut (dyn DbConnection + 'static)> {
        match self.state {
            ConnectionState::Up => self
                .handle
                .as_deref_mut()
                .ok_or_else(|| Error::connection("no open connection")),
            _ => Err(Error::connection(format!("connection is {}", self.state))),
        }
    }

    /// Whether a handle is open. False after [`discard`](Self::discard)
    /// until the next [`ensure_connected`](Self::ensure_connected).
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Probe the current handle and reconnect once if it is not usable.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if let Some(conn) = self.handle.as_deref_mut() {
            match probe(conn, &self.probe_query, self.timeout).await {
                Ok(()) => {
                    self.state = ConnectionState::Up;
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Error pinging database");
                    if let Some(conn) = self.handle.take() {
                        release(conn, e.is_timeout(), self.timeout).await;
                    }
                }
            }
            info!("Try to reconnect...");
        }

        match self.reconnect().await {
            Ok(()) => {
                self.state = ConnectionState::Up;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Down;
                Err(e)
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        let mut conn = self.connector.connect().await?;

        if let Err(e) = probe(conn.as_mut(), &self.probe_query, self.timeout).await {
            release(conn, e.is_timeout(), self.timeout).await;
            return Err(Error::connection(format!("probe failed: {}", e)));
        }

        debug!("Database connection established");
        self.handle = Some(conn);
        Ok(())
    }

    /// Close the current handle, if any, waiting at most the query timeout.
    pub async fn close(&mut self) {
        if let Some(conn) = self.handle.take() {
            release(conn, false, self.timeout).await;
        }
    }

    /// Drop the current handle after a statement on it was abandoned.
    ///
    /// The handle is not closed gracefully: that would wait for the
    /// abandoned statement. The next [`ensure_connected`](Self::ensure_connected)
    /// opens a fresh one.
    pub async fn discard(&mut self) {
        if let Some(conn) = self.handle.take() {
            warn!("Discarding database connection with an abandoned statement");
            release(conn, true, self.timeout).await;
        }
    }
}

/// Close `conn` within `timeout`, or just drop it when `abandoned`.
async fn release(conn: Box<dyn DbConnection>, abandoned: bool, timeout: Duration) {
    if abandoned {
        drop(conn);
        return;
    }
    match tokio::time::timeout(timeout, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to close database connection"),
        Err(_) => warn!(
            timeout_secs = timeout.as_secs_f64(),
            "Timed out closing database connection"
        ),
    }
}

/// Run the probe query to completion. Errors are returned unchanged.
async fn probe<C>(conn: &mut C, sql: &str, timeout: Duration) -> Result<()>
where
    C: DbConnection + ?Sized,
{
    execute(conn, sql, timeout).await?.drain().await.map(|_| ())
}
