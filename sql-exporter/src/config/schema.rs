//! Declarative metric definitions loaded from TOML files.
//!
//! A metrics file holds one `[[metric]]` table per definition:
//!
//! ```toml
//! [[metric]]
//! context = "tablespace"
//! labels = ["tbsp_type"]
//! metricsdesc = { used = "Used pages in the tablespace." }
//! metricstype = { used = "gauge" }
//! request = "SELECT tbsp_type, used FROM ..."
//! ```
//!
//! Files are merged by concatenating their definition lists in load order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Value type of an emitted metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            other => Err(Error::config(format!("unknown metric type '{}'", other))),
        }
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One SQL-backed metric family.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricDefinition {
    /// Namespace segment placed between the exporter namespace and the metric.
    #[serde(default, alias = "Context")]
    pub context: String,

    /// Label columns, in label order.
    #[serde(default, alias = "Labels")]
    pub labels: Vec<String>,

    /// Metric column -> help text. Keys are lowercased on load.
    #[serde(
        default,
        rename = "metricsdesc",
        alias = "metricsDesc",
        alias = "MetricsDesc"
    )]
    pub metrics_desc: BTreeMap<String, String>,

    /// Metric column -> value type. Absent entries are gauges.
    #[serde(
        default,
        rename = "metricstype",
        alias = "metricsType",
        alias = "MetricsType"
    )]
    pub metrics_type: BTreeMap<String, MetricType>,

    /// Column whose value is folded into the metric name instead of labels.
    #[serde(
        default,
        rename = "fieldtoappend",
        alias = "fieldToAppend",
        alias = "FieldToAppend",
        deserialize_with = "empty_as_none"
    )]
    pub field_to_append: Option<String>,

    /// Accept a query that produces no metric without counting an error.
    #[serde(
        default,
        rename = "ignorezeroresult",
        alias = "ignoreZeroResult",
        alias = "IgnoreZeroResult"
    )]
    pub ignore_zero_result: bool,

    /// SQL text executed on every scrape.
    #[serde(alias = "Request")]
    pub request: String,
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

impl MetricDefinition {
    /// Value type for a metric key, gauge when not declared.
    pub fn metric_type(&self, metric: &str) -> MetricType {
        self.metrics_type
            .get(&metric.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    /// Lowercase the metric keys and check the definition is usable.
    fn normalize(mut self) -> Result<Self> {
        if self.request.trim().is_empty() {
            return Err(Error::config(format!(
                "metric '{}' has an empty request",
                self.context
            )));
        }

        let mut metrics_desc = BTreeMap::new();
        for (key, help) in std::mem::take(&mut self.metrics_desc) {
            let lowered = key.to_lowercase();
            if metrics_desc.insert(lowered.clone(), help).is_some() {
                return Err(Error::config(format!(
                    "metric '{}' declares '{}' more than once",
                    self.context, lowered
                )));
            }
        }
        self.metrics_desc = metrics_desc;

        // Every key of a field-append definition maps to the same series.
        if let Some(field) = &self.field_to_append
            && self.metrics_desc.len() > 1
        {
            return Err(Error::config(format!(
                "metric '{}' appends '{}' to the metric name and must declare a single metric, found {}",
                self.context,
                field,
                self.metrics_desc.len()
            )));
        }

        self.metrics_type = std::mem::take(&mut self.metrics_type)
            .into_iter()
            .map(|(key, ty)| (key.to_lowercase(), ty))
            .collect();

        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct MetricsFile {
    #[serde(default, alias = "Metric")]
    metric: Vec<MetricDefinition>,
}

/// Parse the content of one metrics file.
///
/// `origin` only names the source in error messages.
pub fn parse_metrics(content: &str, origin: &str) -> Result<Vec<MetricDefinition>> {
    let file: MetricsFile = toml::from_str(content)
        .map_err(|e| Error::config(format!("failed to parse {}: {}", origin, e)))?;

    file.metric
        .into_iter()
        .map(MetricDefinition::normalize)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| match e {
            Error::Configuration(msg) => Error::config(format!("{}: {}", origin, msg)),
            other => other,
        })
}

/// Load one metrics file from disk.
pub fn load_metrics_file(path: &Path) -> Result<Vec<MetricDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let definitions = parse_metrics(&content, &path.display().to_string())?;
    debug!(
        path = %path.display(),
        count = definitions.len(),
        "Loaded metrics file"
    );
    Ok(definitions)
}

/// Load the default metrics file and append the custom one, if any.
pub fn load_definitions(
    default_path: &Path,
    custom_path: Option<&Path>,
) -> Result<Vec<MetricDefinition>> {
    let mut definitions = load_metrics_file(default_path)?;

    if let Some(custom_path) = custom_path {
        definitions.extend(load_metrics_file(custom_path)?);
    }

    info!(count = definitions.len(), "Metric definitions loaded");
    Ok(definitions)
}
