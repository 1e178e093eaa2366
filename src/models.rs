//! Runtime types shared across the scrape pipeline: a single sample
//! (`MetricRecord`) and the named, typed group of samples a metric or
//! query produces (`MetricData`), matching spec.md §3's core nouns.

use std::fmt;

/// One Prometheus sample: a value plus its label set, as produced by
/// [`crate::projection::project_rows`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    pub value: f64,
    pub labels: Vec<String>,
    pub label_values: Vec<String>,
}

impl MetricRecord {
    pub fn label_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }
}

/// Prometheus metric kind, mirrored from the config's `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
}

impl MetricType {
    /// Parses a descriptor's `metric_type` string case-insensitively,
    /// defaulting anything other than `counter` to `Gauge` instead of
    /// failing (spec.md §4.H, "unknown types map to gauge").
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "counter" => MetricType::Counter,
            _ => MetricType::Gauge,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Counter => write!(f, "counter"),
        }
    }
}

/// One metric's worth of samples, ready for the collector adapter
/// (spec.md §4.E/§4.F output, §4.H input).
#[derive(Debug, Clone)]
pub struct MetricData {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub records: Vec<MetricRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_pairs_zips_in_order() {
        let record = MetricRecord {
            value: 1.0,
            labels: vec!["a".into(), "b".into()],
            label_values: vec!["x".into(), "y".into()],
        };
        let pairs: Vec<_> = record.label_pairs().collect();
        assert_eq!(pairs, vec![("a", "x"), ("b", "y")]);
    }

    #[test]
    fn metric_type_display() {
        assert_eq!(MetricType::Gauge.to_string(), "gauge");
        assert_eq!(MetricType::Counter.to_string(), "counter");
    }
}
