//! Prometheus metrics exporter.
//!
//! Renders one scrape in the Prometheus text exposition format (0.0.4).

use std::collections::HashMap;

use tracing::warn;

use super::collector::ExporterSnapshot;
use super::emitter::Observation;
use crate::config::MetricType;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus text renderer.
pub struct PrometheusExporter {
    namespace: String,
}

impl PrometheusExporter {
    /// Create a renderer for the given metric namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Render user-defined observations followed by the exporter metrics.
    pub fn export(&self, observations: &[Observation], snapshot: &ExporterSnapshot) -> String {
        let mut output = String::new();

        for family in group_families(observations) {
            let first = family[0];
            write_header(&mut output, &first.name, &first.help, first.metric_type);
            for obs in family {
                write_sample(&mut output, &obs.name, &obs.labels, obs.value);
            }
        }

        self.write_exporter_metrics(&mut output, snapshot);
        output
    }

    fn write_exporter_metrics(&self, output: &mut String, snapshot: &ExporterSnapshot) {
        let exporter = format!("{}_exporter", self.namespace);

        self.write_single(
            output,
            &format!("{}_last_scrape_duration_seconds", exporter),
            "Duration of the last scrape of metrics from the database.",
            MetricType::Gauge,
            snapshot.last_scrape_duration_seconds,
        );

        self.write_single(
            output,
            &format!("{}_scrapes_total", exporter),
            "Total number of times the database was scraped for metrics.",
            MetricType::Counter,
            snapshot.scrapes_total as f64,
        );

        self.write_single(
            output,
            &format!("{}_last_scrape_error", exporter),
            "Whether the last scrape of metrics from the database resulted in an error (1 for error, 0 for success).",
            MetricType::Gauge,
            if snapshot.last_scrape_error { 1.0 } else { 0.0 },
        );

        if !snapshot.scrape_errors.is_empty() {
            let name = format!("{}_scrape_errors_total", exporter);
            write_header(
                output,
                &name,
                "Total number of times an error occurred scraping a metric definition.",
                MetricType::Counter,
            );
            for (context, count) in &snapshot.scrape_errors {
                write_sample(
                    output,
                    &name,
                    &[("collector".to_string(), context.clone())],
                    *count as f64,
                );
            }
        }

        self.write_single(
            output,
            &format!("{}_up", self.namespace),
            "Whether the database server is up.",
            MetricType::Gauge,
            if snapshot.up { 1.0 } else { 0.0 },
        );
    }

    fn write_single(
        &self,
        output: &mut String,
        name: &str,
        help: &str,
        metric_type: MetricType,
        value: f64,
    ) {
        write_header(output, name, help, metric_type);
        write_sample(output, name, &[], value);
    }
}

/// Group observations by name, keeping the order in which names first appear.
///
/// A family takes its type from its first observation. Later observations
/// of another type, or repeating a label set already in the family, are
/// dropped.
fn group_families(observations: &[Observation]) -> Vec<Vec<&Observation>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut families: Vec<Vec<&Observation>> = Vec::new();

    for obs in observations {
        let Some(&i) = index.get(obs.name.as_str()) else {
            index.insert(obs.name.as_str(), families.len());
            families.push(vec![obs]);
            continue;
        };

        let family = &mut families[i];
        if family[0].metric_type != obs.metric_type {
            warn!(
                metric = %obs.name,
                expected = %family[0].metric_type,
                found = %obs.metric_type,
                "Dropping sample with conflicting metric type"
            );
        } else if family.iter().any(|other| other.labels == obs.labels) {
            warn!(metric = %obs.name, "Dropping duplicate sample");
        } else {
            family.push(obs);
        }
    }
    families
}

fn write_header(output: &mut String, name: &str, help: &str, metric_type: MetricType) {
    output.push_str(&format!("# HELP {} {}\n", name, escape_help(help)));
    output.push_str(&format!("# TYPE {} {}\n", name, metric_type));
}

fn write_sample(output: &mut String, name: &str, labels: &[(String, String)], value: f64) {
    if labels.is_empty() {
        output.push_str(&format!("{} {}\n", name, format_value(value)));
        return;
    }

    let labels_str = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",");

    output.push_str(&format!(
        "{}{{{}}} {}\n",
        name,
        labels_str,
        format_value(value)
    ));
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
