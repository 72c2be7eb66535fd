//! sqlx-backed connections.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::Connection;
use sqlx::AnyConnection;
use tracing::debug;

use super::row::{Row, map_any_row};
use super::{Connector, DbConnection};
use crate::config::mask_dsn;
use crate::{Error, Result};

/// Opens [`SqlxConnection`]s for a DSN understood by `sqlx::any`.
pub struct SqlxConnector {
    dsn: String,
}

impl SqlxConnector {
    pub fn new(dsn: impl Into<String>) -> Self {
        sqlx::any::install_default_drivers();
        Self { dsn: dsn.into() }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self) -> Result<Box<dyn DbConnection>> {
        let conn = AnyConnection::connect(&self.dsn).await.map_err(|e| {
            Error::connection(format!("failed to connect to {}: {}", mask_dsn(&self.dsn), e))
        })?;
        debug!(backend = conn.backend_name(), "Database connection opened");
        Ok(Box::new(SqlxConnection { conn }))
    }
}

/// A single `sqlx::AnyConnection`.
pub struct SqlxConnection {
    conn: AnyConnection,
}

#[async_trait]
impl DbConnection for SqlxConnection {
    fn fetch<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<Row>> {
        let mut streamed = false;
        sqlx::raw_sql(sql)
            .fetch(&mut self.conn)
            .map(move |item| match item {
                Ok(row) => {
                    streamed = true;
                    map_any_row(&row)
                }
                Err(e) if streamed => Err(Error::row_scan(e.to_string())),
                Err(e) => Err(Error::execution(e.to_string())),
            })
            .boxed()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::connection(format!("failed to close connection: {}", e)))
    }
}
