//! Database access for the scrape engine.
//!
//! The engine talks to the database through two small traits so the
//! orchestration logic does not depend on a driver:
//!
//! - [`Connector`] opens a fresh connection from the configured DSN.
//! - [`DbConnection`] streams the rows of one statement and closes itself.
//!
//! The production implementation is [`SqlxConnector`], backed by
//! `sqlx::AnyConnection` with the PostgreSQL, MySQL and SQLite drivers.

pub mod any;
pub mod connection;
pub mod executor;
pub mod row;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

pub use any::{SqlxConnection, SqlxConnector};
pub use connection::{ConnectionManager, ConnectionState};
pub use executor::{RowCursor, execute};
pub use row::{NULL, Row};

/// A live database handle.
#[async_trait]
pub trait DbConnection: Send {
    /// Stream the rows produced by `sql`.
    ///
    /// Failures before the first row are reported as
    /// [`Error::Execution`](crate::Error::Execution); failures while reading
    /// later rows as [`Error::RowScan`](crate::Error::RowScan).
    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<Row>>;

    /// Close the handle and release its resources.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens database handles.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DbConnection>>;
}
