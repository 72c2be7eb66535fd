//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use sql_exporter::api::ApiServerConfig;
use sql_exporter::config::{
    DEFAULT_NAMESPACE, DEFAULT_PROBE_QUERY, ExporterConfig, parse_query_timeout,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for the web interface and telemetry
    #[arg(long = "web.listen-address", env = "LISTEN_ADDRESS", default_value = "0.0.0.0:9161")]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", env = "TELEMETRY_PATH", default_value = "/metrics")]
    pub telemetry_path: String,

    /// File with the default metric definitions
    #[arg(
        long = "default.metrics",
        env = "DEFAULT_METRICS",
        default_value = "default-metrics.toml"
    )]
    pub default_metrics: PathBuf,

    /// File with additional metric definitions
    #[arg(long = "custom.metrics", env = "CUSTOM_METRICS")]
    pub custom_metrics: Option<PathBuf>,

    /// Query timeout in seconds
    #[arg(long = "query.timeout", env = "QUERY_TIMEOUT", default_value = "5")]
    pub query_timeout: String,

    /// Database connection string
    #[arg(long, env = "DB_DSN", hide_env_values = true)]
    pub dsn: String,

    /// Prefix of every exposed metric
    #[arg(long, env = "EXPORTER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Query used to check the connection before each scrape
    #[arg(long = "probe.query", env = "PROBE_QUERY", default_value = DEFAULT_PROBE_QUERY)]
    pub probe_query: String,

    /// Directory for daily rotated log files (console only when unset)
    #[arg(long = "log.dir", env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    pub fn exporter_config(&self) -> sql_exporter::Result<ExporterConfig> {
        let config = ExporterConfig::new(self.dsn.clone())
            .with_namespace(self.namespace.clone())
            .with_query_timeout(parse_query_timeout(&self.query_timeout)?)
            .with_probe_query(self.probe_query.clone());
        config.validate()?;
        Ok(config)
    }

    pub fn server_config(&self) -> sql_exporter::Result<ApiServerConfig> {
        let config = ApiServerConfig {
            listen_address: self.listen_address.clone(),
            telemetry_path: self.telemetry_path.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}
