//! Single-metric engine (spec.md §4.E): for each configured metric,
//! queries every prepared tenant in parallel and projects the rows each
//! matched schema returns.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::MetricConfig;
use crate::driver::TenantConnection;
use crate::engine::{metric_name_with_unit, parallel_map_with_deadline};
use crate::filter::{check_version_requirement, matched_schemas, sub_slice_in_slice, validate_select_only};
use crate::models::{MetricData, MetricRecord};
use crate::projection::{self, ProjectionInput, SharedMetadata};
use crate::tenant::Tenant;

/// Everything a worker needs from a `Tenant`, cheaply cloneable so one
/// fan-out round doesn't need shared ownership of the tenant list
/// itself — `Tenant` owns its connection uniquely, but the connection
/// handle behind the trait object is designed to be shared (spec.md §5,
/// "A single tenant connection is shared across all concurrent tasks
/// targeting that tenant within one scrape").
#[derive(Clone)]
pub struct TenantQuerySnapshot {
    pub name: String,
    pub tags: Vec<String>,
    pub usage: String,
    pub schemas: Vec<String>,
    pub sid: String,
    pub instance_number: String,
    pub database_name: String,
    pub version: String,
    pub conn: Arc<dyn TenantConnection>,
}

impl TenantQuerySnapshot {
    pub fn from_tenant(tenant: &Tenant) -> Self {
        Self {
            name: tenant.name.clone(),
            tags: tenant.tags.clone(),
            usage: tenant.usage.clone(),
            schemas: tenant.schemas.clone(),
            sid: tenant.sid.clone(),
            instance_number: tenant.instance_number.clone(),
            database_name: tenant.database_name.clone(),
            version: tenant.version.clone(),
            conn: tenant.connection(),
        }
    }
}

/// Queries one tenant for one metric across every matched schema,
/// returning the accumulated samples. Per-schema failures are logged and
/// isolated; other schemas proceed (spec.md §7, `QueryFailed`/
/// `RowConvertFailed`).
pub async fn get_metric_data(
    metric: &MetricConfig,
    tenant: &TenantQuerySnapshot,
    timeout: Duration,
    component_aware_versions: bool,
) -> Vec<MetricRecord> {
    if metric.disabled {
        return Vec::new();
    }
    if !metric.version_filter.is_empty()
        && !check_version_requirement(&tenant.version, &metric.version_filter, component_aware_versions)
    {
        return Vec::new();
    }
    if !sub_slice_in_slice(&metric.tag_filter, &tenant.tags) {
        return Vec::new();
    }
    if !validate_select_only(&metric.sql) {
        error!(metric = %metric.name, tenant = %tenant.name, "only SELECT statements are allowed, skipping");
        return Vec::new();
    }
    let schemas = matched_schemas(&metric.schema_filter, &tenant.schemas);
    if schemas.is_empty() {
        error!(metric = %metric.name, tenant = %tenant.name, "metric schema filter must include at least one tenant schema");
        return Vec::new();
    }

    let meta = SharedMetadata {
        tenant: tenant.name.clone(),
        usage: tenant.usage.clone(),
        sid: tenant.sid.clone(),
        insnr: tenant.instance_number.clone(),
        database_name: tenant.database_name.clone(),
    };

    let mut accumulated = Vec::new();
    for schema in &schemas {
        let sql = metric.sql.replace("<SCHEMA>", schema);
        let result_set = match tenant.conn.query(&sql, timeout).await {
            Ok(rs) => rs,
            Err(err) => {
                warn!(metric = %metric.name, tenant = %tenant.name, schema = %schema, %err, "query failed, skipping schema");
                continue;
            }
        };
        let input = ProjectionInput {
            metric_name: &metric.name,
            rows: &result_set.rows,
            columns: &result_set.columns,
            labels: &metric.labels,
            value_column: &metric.value_column,
        };
        let metric_name = &metric.name;
        let tenant_name = &tenant.name;
        let mut records = projection::project_rows(&input, &meta, |msg| {
            warn!(metric = %metric_name, tenant = %tenant_name, "{msg}");
        });
        projection::set_schema_label(&mut records, schema);
        accumulated.extend(records);
    }
    accumulated
}

/// Fans out `get_metric_data` across every tenant, within `deadline`.
pub async fn collect_metric(
    metric: MetricConfig,
    tenants: &[TenantQuerySnapshot],
    deadline: Duration,
    component_aware_versions: bool,
) -> Vec<MetricRecord> {
    let results = parallel_map_with_deadline(tenants.to_vec(), deadline, move |tenant| {
        let metric = metric.clone();
        async move { get_metric_data(&metric, &tenant, deadline, component_aware_versions).await }
    })
    .await;
    results.into_iter().flatten().collect()
}

/// Collects every configured metric across every tenant, one task per
/// metric, skipping metrics whose final collection produced no samples.
/// A panic inside one metric's task is caught and reported without
/// affecting other metrics (spec.md §7, "Panic in metric worker").
pub async fn collect_metrics(
    metrics: &[MetricConfig],
    tenants: &[Tenant],
    deadline: Duration,
    component_aware_versions: bool,
) -> Vec<MetricData> {
    let snapshots: Vec<TenantQuerySnapshot> =
        tenants.iter().map(TenantQuerySnapshot::from_tenant).collect();

    let mut tasks = Vec::with_capacity(metrics.len());
    for metric in metrics.iter().cloned() {
        let snapshots = snapshots.clone();
        tasks.push(tokio::spawn(async move {
            let name = metric.name.clone();
            let help = metric.help.clone();
            let metric_type = metric.metric_type;
            let unit = metric.unit.clone();
            let records = collect_metric(metric, &snapshots, deadline, component_aware_versions).await;
            (name, help, metric_type, unit, records)
        }));
    }

    let mut out = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok((name, help, metric_type, unit, records)) => {
                if records.is_empty() {
                    continue;
                }
                out.push(MetricData {
                    name: metric_name_with_unit(&name, &unit),
                    help,
                    metric_type,
                    records,
                });
            }
            Err(err) => {
                error!(%err, "metric worker panicked");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, ResultSet};
    use crate::models::MetricType;
    use async_trait::async_trait;

    fn metric(sql: &str, disabled: bool) -> MetricConfig {
        MetricConfig {
            name: "m".into(),
            help: String::new(),
            metric_type: MetricType::Gauge,
            sql: sql.into(),
            schema_filter: vec!["sys".into()],
            tag_filter: vec![],
            version_filter: String::new(),
            labels: vec![],
            value_column: String::new(),
            unit: String::new(),
            disabled,
        }
    }

    struct EmptyConn;
    #[async_trait]
    impl TenantConnection for EmptyConn {
        async fn query(&self, _sql: &str, _timeout: Duration) -> Result<ResultSet, DriverError> {
            Ok(ResultSet { columns: vec![], rows: vec![] })
        }
        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn snapshot(schemas: &[&str]) -> TenantQuerySnapshot {
        TenantQuerySnapshot {
            name: "t".into(),
            tags: vec![],
            usage: "production".into(),
            schemas: schemas.iter().map(|s| s.to_string()).collect(),
            sid: "HDB".into(),
            instance_number: "00".into(),
            database_name: "HDB_DB".into(),
            version: "2.00.050".into(),
            conn: Arc::new(EmptyConn),
        }
    }

    #[tokio::test]
    async fn disabled_metric_returns_empty() {
        let m = metric("select 1 from <SCHEMA>.t", true);
        let s = snapshot(&["sys"]);
        let records = get_metric_data(&m, &s, Duration::from_secs(1), false).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn non_select_sql_returns_empty() {
        let m = metric("delete from t", false);
        let s = snapshot(&["sys"]);
        let records = get_metric_data(&m, &s, Duration::from_secs(1), false).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn no_matched_schema_returns_empty() {
        let m = metric("select 1 from <SCHEMA>.t", false);
        let s = snapshot(&["app1"]);
        let records = get_metric_data(&m, &s, Duration::from_secs(1), false).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn collect_metrics_skips_empty_results() {
        let metrics = vec![metric("select 1 from <SCHEMA>.t", false)];
        let tenants: Vec<Tenant> = vec![];
        let data = collect_metrics(&metrics, &tenants, Duration::from_secs(1), false).await;
        assert!(data.is_empty());
    }
}
