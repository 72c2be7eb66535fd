//! Query execution under a deadline.
//!
//! The deadline is fixed when [`execute`] is called and bounds both the
//! statement and the streaming of its rows. Waiting goes through
//! `tokio::time::timeout_at`, so an elapsed deadline drops the pending
//! driver future and releases whatever it held.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use super::{DbConnection, Row};
use crate::{Error, Result};

/// Lazy, single-pass cursor over the rows of one query.
///
/// At most one row is held at a time. After the first error the cursor is
/// exhausted.
pub struct RowCursor<'a> {
    stream: BoxStream<'a, Result<Row>>,
    pending: Option<Row>,
    deadline: Instant,
    timeout: Duration,
    done: bool,
}

impl RowCursor<'_> {
    /// Next row, `None` once the result set is exhausted.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if let Some(row) = self.pending.take() {
            return Some(Ok(row));
        }
        if self.done {
            return None;
        }

        let item = match timeout_at(self.deadline, self.stream.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(Error::QueryTimeout(self.timeout))),
        };
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }

    /// Consume the remaining rows, returning how many there were.
    pub async fn drain(mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(row) = self.next().await {
            row?;
            count += 1;
        }
        Ok(count)
    }
}

/// Run `sql` on `conn` with a deadline of `timeout` from now.
///
/// Statement failures and a deadline elapsing before the first row are
/// returned here; later failures come out of the cursor.
pub async fn execute<'a, C>(
    conn: &'a mut C,
    sql: &'a str,
    timeout: Duration,
) -> Result<RowCursor<'a>>
where
    C: DbConnection + ?Sized,
{
    let deadline = Instant::now() + timeout;
    trace!(sql = %sql, timeout_secs = timeout.as_secs_f64(), "Executing query");

    let mut cursor = RowCursor {
        stream: conn.fetch(sql),
        pending: None,
        deadline,
        timeout,
        done: false,
    };

    match cursor.next().await {
        Some(Ok(row)) => cursor.pending = Some(row),
        Some(Err(e)) => return Err(e),
        None => {}
    }
    Ok(cursor)
}
