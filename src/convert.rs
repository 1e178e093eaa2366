//! `convert` subcommand (SPEC_FULL.md §3): turns a JSON map of
//! `sql -> {enabled, hana_version_range, metrics[]}` into the TOML
//! `[[queries]]` shape `config::Config` loads. Grounded on the richer of
//! the two converter variants found in `original_source`, per spec.md
//! §9's resolution of that duplication.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Config, QueryChildMetric, QueryConfig};

#[derive(Debug, Deserialize)]
struct JsonMetric {
    name: String,
    description: String,
    #[serde(default)]
    labels: Vec<String>,
    value: String,
    #[serde(default)]
    unit: String,
    #[serde(rename = "type")]
    metric_type: String,
}

#[derive(Debug, Deserialize)]
struct JsonQuery {
    enabled: bool,
    #[serde(default)]
    hana_version_range: Vec<String>,
    #[serde(default)]
    metrics: Vec<JsonMetric>,
}

/// Reads the input JSON, converts every enabled entry, and writes the
/// resulting TOML to `output`. Disabled entries are dropped silently,
/// matching the original's `if !queryConfig.Enabled { continue }`.
pub fn convert_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(input.as_ref())
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", input.as_ref().display()))?;
    let parsed: BTreeMap<String, JsonQuery> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("parsing {}: {e}", input.as_ref().display()))?;

    let queries: Vec<QueryConfig> = parsed
        .into_iter()
        .filter(|(_, q)| q.enabled)
        .map(|(sql, q)| convert_query(sql, q))
        .collect();

    let config = Config {
        queries,
        ..Config::default()
    };
    write_queries_toml(&config, output.as_ref())
}

fn convert_query(sql: String, query: JsonQuery) -> QueryConfig {
    QueryConfig {
        sql,
        schema_filter: Vec::new(),
        tag_filter: Vec::new(),
        version_filter: process_version_range(&query.hana_version_range),
        disabled: false,
        metrics: query.metrics.into_iter().map(convert_metric).collect(),
    }
}

fn convert_metric(metric: JsonMetric) -> QueryChildMetric {
    QueryChildMetric {
        name: metric.name,
        help: metric.description,
        metric_type: crate::models::MetricType::parse_lenient(&metric.metric_type),
        labels: metric.labels,
        value_column: metric.value,
        unit: metric.unit,
        disabled: false,
    }
}

/// A 1-element range becomes `>=min`; a 2-element range becomes
/// `>=min <=max` after swapping if given in reverse order; anything else
/// yields an empty filter (the original logs and falls through).
fn process_version_range(range: &[String]) -> String {
    match range.len() {
        2 => {
            let (mut min, mut max) = (range[0].clone(), range[1].clone());
            if compare_dotted(&min, &max) > 0 {
                std::mem::swap(&mut min, &mut max);
            }
            format!(">={min} <={max}")
        }
        1 => format!(">={}", range[0]),
        _ => String::new(),
    }
}

fn compare_dotted(a: &str, b: &str) -> i32 {
    let a_parts: Vec<u64> = a.split('.').filter_map(|p| p.parse().ok()).collect();
    let b_parts: Vec<u64> = b.split('.').filter_map(|p| p.parse().ok()).collect();
    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        if x > y {
            return 1;
        }
        if x < y {
            return -1;
        }
    }
    0
}

/// Minimal serializable shape for writing just the `[[queries]]` table —
/// `Config` itself isn't `Serialize`, and the converter only ever emits
/// queries, never tenants or metrics.
#[derive(Serialize)]
struct QueriesOnly<'a> {
    queries: &'a [QueryConfig],
}

fn write_queries_toml(config: &Config, output: &Path) -> anyhow::Result<()> {
    let shape = QueriesOnly { queries: &config.queries };
    let rendered = toml::to_string_pretty(&shape)
        .map_err(|e| anyhow::anyhow!("marshaling TOML: {e}"))?;
    std::fs::write(output, rendered)
        .map_err(|e| anyhow::anyhow!("writing {}: {e}", output.display()))?;
    Ok(())
}
