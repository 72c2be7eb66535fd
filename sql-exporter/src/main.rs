mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use sql_exporter::api::ApiServer;
use sql_exporter::config::load_definitions;
use sql_exporter::database::SqlxConnector;
use sql_exporter::{Exporter, logging, scrape};

use crate::cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = logging::init_logging(args.log_dir.as_deref())?;

    let config = args.exporter_config()?;
    let server_config = args.server_config()?;

    let definitions = load_definitions(&args.default_metrics, args.custom_metrics.as_deref())
        .context("Failed to load metric definitions")?;

    tracing::info!(
        dsn = %config.masked_dsn(),
        namespace = %config.namespace,
        query_timeout_secs = config.query_timeout.as_secs(),
        "Starting sql-exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    let connector = Arc::new(SqlxConnector::new(config.dsn.clone()));
    let exporter = Arc::new(Exporter::new(config, definitions, connector));
    scrape::warm_up(&exporter).await;

    let cancel_token = CancellationToken::new();
    if let Some(log_dir) = &args.log_dir {
        logging::start_retention_cleanup(log_dir.clone(), cancel_token.clone());
    }

    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let server = ApiServer::new(server_config, exporter.clone()).with_cancel_token(cancel_token);
    let result = server.run().await;

    exporter.close().await;
    tracing::info!("sql-exporter stopped");

    result.context("HTTP server failed")
}
