//! HTTP server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::metrics::PrometheusExporter;
use crate::scrape::Exporter;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to listen on. A bare `:port` binds every interface.
    pub listen_address: String,
    /// Path serving the metrics.
    pub telemetry_path: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9161".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

impl ApiServerConfig {
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        let path = &self.telemetry_path;
        if !path.starts_with('/') || path == "/" {
            return Err(Error::config(format!(
                "telemetry path must start with '/' and must not be the root path, got '{}'",
                path
            )));
        }
        if path == "/health" || path.starts_with("/health/") {
            return Err(Error::config(format!(
                "telemetry path '{}' clashes with the health endpoints",
                path
            )));
        }
        Ok(())
    }

    /// Resolve the listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let address = self.listen_address.trim();
        let address = if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_string()
        };
        address.parse().map_err(|e| {
            Error::config(format!(
                "invalid listen address '{}': {}",
                self.listen_address, e
            ))
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub exporter: Arc<Exporter>,
    pub renderer: Arc<PrometheusExporter>,
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(exporter: Arc<Exporter>, telemetry_path: impl Into<String>) -> Self {
        let renderer = Arc::new(PrometheusExporter::new(exporter.namespace()));
        Self {
            start_time: Instant::now(),
            exporter,
            renderer,
            telemetry_path: telemetry_path.into(),
        }
    }
}

fn is_health_check(req: &Request) -> bool {
    req.uri().path().starts_with("/health")
}

/// HTTP server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, exporter: Arc<Exporter>) -> Self {
        let state = AppState::new(exporter, config.telemetry_path.clone());
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use an existing cancellation token for graceful shutdown.
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    ///
    /// Requests are traced in an `http_request` span, except health checks.
    pub fn build_router(&self) -> Router {
        let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
            if is_health_check(req) {
                Span::none()
            } else {
                tracing::info_span!("http_request", method = %req.method(), uri = %req.uri())
            }
        });
        routes::create_router(self.state.clone()).layer(trace)
    }

    /// Start the server and serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Api(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(
            "Listening on http://{}{}",
            addr,
            self.config.telemetry_path
        );

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("HTTP server shutting down...");
            })
            .await
            .map_err(|e| Error::Api(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
