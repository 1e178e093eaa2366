//! Exporter configuration: typed descriptors loaded from TOML, matching
//! spec.md §3's data model and §6's `Configuration (TOML)` surface.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::MetricType;

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: u64,
    pub ip: String,
    pub port: u16,
    pub log_level: String,
    pub log_file: String,
    /// Opt-in fix for the documented lexicographic-version-comparison
    /// quirk (spec.md §9); default preserves the original behavior.
    pub component_aware_versions: bool,
    pub tenants: Vec<TenantConfig>,
    pub metrics: Vec<MetricConfig>,
    pub queries: Vec<QueryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            ip: default_ip(),
            port: default_port(),
            log_level: default_log_level(),
            log_file: default_log_file(),
            component_aware_versions: false,
            tenants: Vec::new(),
            metrics: Vec::new(),
            queries: Vec::new(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9888
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_log_file() -> String {
    "log.log".to_string()
}

/// Deserializes a `metric_type` string case-insensitively, defaulting
/// anything other than `counter` to `Gauge` rather than failing the whole
/// config load (spec.md §4.H, "unknown types map to gauge") — mirrors
/// `MetricType::parse_lenient`, the same fallback `convert.rs` applies on
/// the JSON→TOML path.
fn deserialize_metric_type<'de, D>(deserializer: D) -> Result<MetricType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(MetricType::parse_lenient(&raw))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    pub conn_str: String,
    pub user: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, deserialize_with = "deserialize_metric_type")]
    pub metric_type: MetricType,
    pub sql: String,
    #[serde(default)]
    pub schema_filter: Vec<String>,
    #[serde(default)]
    pub tag_filter: Vec<String>,
    #[serde(default)]
    pub version_filter: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub value_column: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    pub sql: String,
    #[serde(default)]
    pub schema_filter: Vec<String>,
    #[serde(default)]
    pub tag_filter: Vec<String>,
    #[serde(default)]
    pub version_filter: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub metrics: Vec<QueryChildMetric>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryChildMetric {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, deserialize_with = "deserialize_metric_type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub value_column: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Raw shape of the TOML file: the five scalar fields a CLI flag can also
/// fill stay `Option` here so [`Config::load`] can tell "the file set this"
/// apart from "the file omitted this" before applying [`CliOverrides`] or
/// the hardcoded default — matching `cmd/web.go`'s
/// `if config.Timeout == 0 { take the flag }` fallback order (spec.md §6).
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    timeout: Option<u64>,
    ip: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
    log_file: Option<String>,
    #[serde(default)]
    component_aware_versions: bool,
    #[serde(default)]
    tenants: Vec<TenantConfig>,
    #[serde(default)]
    metrics: Vec<MetricConfig>,
    #[serde(default)]
    queries: Vec<QueryConfig>,
}

/// CLI flags that only fill a hole the config file left empty. The file
/// always wins when it sets a value (spec.md §6, "CLI flags fill holes
/// left by the file").
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub timeout: Option<u64>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl Config {
    /// Loads and parses the TOML config file, then fills any field the file
    /// left unset from `overrides`, and anything still unset from the
    /// documented CLI defaults. Unlike the `convert` subcommand's
    /// best-effort loading, a missing or unparseable file here is fatal at
    /// startup (spec.md §7, `ConfigInvalid`) — the caller is expected to
    /// propagate this as a nonzero exit code.
    pub fn load(path: impl AsRef<Path>, overrides: &CliOverrides) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let file: FileConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(Self::merge(file, overrides))
    }

    /// File value wins whenever it's set; a CLI override only fills a hole
    /// the file left empty; the hardcoded default fills whatever's left.
    fn merge(file: FileConfig, overrides: &CliOverrides) -> Self {
        Self {
            timeout: file.timeout.or(overrides.timeout).unwrap_or_else(default_timeout),
            ip: file.ip.or_else(|| overrides.ip.clone()).unwrap_or_else(default_ip),
            port: file.port.or(overrides.port).unwrap_or_else(default_port),
            log_level: file
                .log_level
                .or_else(|| overrides.log_level.clone())
                .unwrap_or_else(default_log_level),
            log_file: file
                .log_file
                .or_else(|| overrides.log_file.clone())
                .unwrap_or_else(default_log_file),
            component_aware_versions: file.component_aware_versions,
            tenants: file.tenants,
            metrics: file.metrics,
            queries: file.queries,
        }
    }

    /// Adds `sys` to every metric's and query's schema filter when empty,
    /// matching `AdaptSchemaFilter` (spec.md §4.D, run once before
    /// preparation).
    pub fn adapt_schema_filters(&mut self) {
        for metric in &mut self.metrics {
            if metric.schema_filter.is_empty() {
                metric.schema_filter.push("sys".to_string());
            }
        }
        for query in &mut self.queries {
            if query.schema_filter.is_empty() {
                query.schema_filter.push("sys".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_documented_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.ip, "0.0.0.0");
        assert_eq!(config.port, 9888);
        assert_eq!(config.timeout, 30);
    }

    #[test]
    fn adapt_schema_filters_fills_empty_with_sys() {
        let mut config = Config {
            metrics: vec![MetricConfig {
                name: "m".into(),
                help: String::new(),
                metric_type: MetricType::Gauge,
                sql: "select 1".into(),
                schema_filter: vec![],
                tag_filter: vec![],
                version_filter: String::new(),
                labels: vec![],
                value_column: String::new(),
                unit: String::new(),
                disabled: false,
            }],
            ..Config::default()
        };
        config.adapt_schema_filters();
        assert_eq!(config.metrics[0].schema_filter, vec!["sys".to_string()]);
    }

    #[test]
    fn adapt_schema_filters_leaves_non_empty_untouched() {
        let mut config = Config {
            queries: vec![QueryConfig {
                sql: "select 1".into(),
                schema_filter: vec!["app1".into()],
                tag_filter: vec![],
                version_filter: String::new(),
                disabled: false,
                metrics: vec![],
            }],
            ..Config::default()
        };
        config.adapt_schema_filters();
        assert_eq!(config.queries[0].schema_filter, vec!["app1".to_string()]);
    }

    fn parse(toml: &str) -> FileConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            timeout = 15

            [[tenants]]
            name = "acme"
            conn_str = "hana.acme.internal:30015"
            user = "MON_USER"
            tags = ["prod"]

            [[metrics]]
            name = "hana_cpu_used"
            sql = "select cpu_used from <SCHEMA>.load"
        "#;
        let config = Config::merge(parse(toml), &CliOverrides::default());
        assert_eq!(config.timeout, 15);
        assert_eq!(config.tenants.len(), 1);
        assert_eq!(config.metrics[0].name, "hana_cpu_used");
    }

    #[test]
    fn file_set_value_wins_over_cli_override() {
        let overrides = CliOverrides {
            timeout: Some(99),
            ..CliOverrides::default()
        };
        let config = Config::merge(parse("timeout = 15\n"), &overrides);
        assert_eq!(config.timeout, 15);
    }

    #[test]
    fn cli_override_fills_hole_file_left_empty() {
        let overrides = CliOverrides {
            timeout: Some(99),
            ip: Some("10.0.0.1".to_string()),
            ..CliOverrides::default()
        };
        let config = Config::merge(parse(""), &overrides);
        assert_eq!(config.timeout, 99);
        assert_eq!(config.ip, "10.0.0.1");
        assert_eq!(config.port, default_port());
    }

    #[test]
    fn unknown_metric_type_string_defaults_to_gauge_instead_of_failing_load() {
        let toml = r#"
            [[metrics]]
            name = "hana_x"
            metric_type = "histogram"
            sql = "select 1 from <SCHEMA>.t"
        "#;
        let config = Config::merge(parse(toml), &CliOverrides::default());
        assert_eq!(config.metrics[0].metric_type, MetricType::Gauge);
    }
}
