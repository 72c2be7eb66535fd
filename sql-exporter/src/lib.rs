//! sql-exporter library crate.
//!
//! Runs user-defined SQL queries against a database and exposes the
//! numeric columns of their results as Prometheus metrics.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod scrape;

pub use error::{Error, Result};
pub use scrape::{Exporter, Scrape};
