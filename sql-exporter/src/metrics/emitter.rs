//! Row to observation mapping.

use serde::Serialize;

use crate::config::{MetricDefinition, MetricType};
use crate::database::Row;

/// One sample produced from one row for one metric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    /// Fully-qualified metric name.
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub value: f64,
    /// Label name/value pairs, in declared label order.
    pub labels: Vec<(String, String)>,
}

/// Parse a raw column value as a sample value.
///
/// Surrounding whitespace is ignored. Anything that is not a float yields
/// `None` and the metric is skipped for that row; label columns, text
/// columns and `NULL` all end up here and none of them is an error.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

/// Make a column value usable as a metric name segment.
///
/// Spaces become underscores, parentheses and slashes are dropped and the
/// result is lowercased.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            '(' | ')' | '/' => None,
            c => Some(c),
        })
        .collect::<String>()
        .to_lowercase()
}

/// Join the non-empty segments with `_`.
pub fn build_fq_name(segments: &[&str]) -> String {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Turn one row into observations according to `definition`.
///
/// Metrics are visited in key order. Without `fieldtoappend` every
/// observation carries the declared labels; with it, the sanitized field
/// value becomes the last name segment and no label is attached.
pub fn emit(namespace: &str, definition: &MetricDefinition, row: &Row) -> Vec<Observation> {
    let labels: Vec<(String, String)> = match definition.field_to_append {
        Some(_) => Vec::new(),
        None => definition
            .labels
            .iter()
            .map(|label| {
                let value = row.get(label).unwrap_or_default();
                (label.clone(), value.to_string())
            })
            .collect(),
    };

    let mut observations = Vec::with_capacity(definition.metrics_desc.len());
    for (metric, help) in &definition.metrics_desc {
        let Some(value) = row.get(metric).and_then(parse_value) else {
            continue;
        };

        let name = match &definition.field_to_append {
            None => build_fq_name(&[namespace, &definition.context, metric]),
            Some(field) => {
                let suffix = sanitize_name(row.get(field).unwrap_or_default());
                build_fq_name(&[namespace, &definition.context, &suffix])
            }
        };

        observations.push(Observation {
            name,
            help: help.clone(),
            metric_type: definition.metric_type(metric),
            value,
            labels: labels.clone(),
        });
    }
    observations
}
