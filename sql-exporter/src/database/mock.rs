//! In-memory database used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::time::Instant;

use super::{Connector, DbConnection, Row};
use crate::{Error, Result};

/// Scripted outcome of a query.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Rows(Vec<Row>),
    Fail(String),
    /// Yields the rows, then a scan error.
    BrokenAfter(Vec<Row>, String),
    /// Keeps the handle busy for the duration, then yields the rows.
    Slow(Duration, Vec<Row>),
}

/// Shared state of every connection opened by a [`MockConnector`].
#[derive(Default)]
pub(crate) struct MockDatabase {
    outcomes: Mutex<HashMap<String, Outcome>>,
    down: AtomicBool,
    executed: Mutex<Vec<String>>,
    pub(crate) connects: AtomicUsize,
    pub(crate) closes: AtomicUsize,
}

impl MockDatabase {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, sql: &str, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(sql.to_string(), outcome);
    }

    /// While down, connecting fails and every query on an open handle fails.
    pub(crate) fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn clear_executed(&self) {
        self.executed.lock().unwrap().clear();
    }
}

pub(crate) fn row(fields: &[(&str, &str)]) -> Row {
    fields.iter().copied().collect()
}

pub(crate) struct MockConnector {
    db: Arc<MockDatabase>,
}

impl MockConnector {
    pub(crate) fn new(db: Arc<MockDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn DbConnection>> {
        self.db.connects.fetch_add(1, Ordering::SeqCst);
        if self.db.down.load(Ordering::SeqCst) {
            return Err(Error::connection("connection refused"));
        }
        Ok(Box::new(MockConnection::new(self.db.clone())))
    }
}

/// A handle runs one statement at a time, like a real driver connection:
/// dropping the row stream of a slow statement does not stop it, and
/// later statements and `close` wait until it is done.
pub(crate) struct MockConnection {
    db: Arc<MockDatabase>,
    busy_until: Option<Instant>,
}

impl MockConnection {
    pub(crate) fn new(db: Arc<MockDatabase>) -> Self {
        Self {
            db,
            busy_until: None,
        }
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<Row>> {
        self.db.executed.lock().unwrap().push(sql.to_string());

        if self.db.down.load(Ordering::SeqCst) {
            return stream::once(async { Err(Error::execution("connection reset by peer")) })
                .boxed();
        }

        let outcome = self
            .db
            .outcomes
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or(Outcome::Rows(vec![row(&[("1", "1")])]));

        let now = Instant::now();
        let mut ready_at = self.busy_until.map_or(now, |t| t.max(now));

        let rows: BoxStream<'static, Result<Row>> = match outcome {
            Outcome::Rows(rows) => stream::iter(rows.into_iter().map(Ok)).boxed(),
            Outcome::Fail(msg) => stream::once(async move { Err(Error::execution(msg)) }).boxed(),
            Outcome::BrokenAfter(rows, msg) => stream::iter(rows.into_iter().map(Ok))
                .chain(stream::once(async move { Err(Error::row_scan(msg)) }))
                .boxed(),
            Outcome::Slow(delay, rows) => {
                ready_at += delay;
                self.busy_until = Some(ready_at);
                stream::iter(rows.into_iter().map(Ok)).boxed()
            }
        };

        stream::once(async move {
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
            rows
        })
        .flatten()
        .boxed()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.db.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(busy_until) = self.busy_until {
            tokio::time::sleep_until(busy_until).await;
        }
        Ok(())
    }
}
