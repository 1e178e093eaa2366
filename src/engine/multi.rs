//! Multi-metric query engine (spec.md §4.F): same outer shape as the
//! single-metric engine, but each query's SQL executes once per
//! (tenant, matched schema) and the resulting rows are projected once
//! per enabled child metric.

use std::time::Duration;

use tracing::{error, warn};

use crate::config::{QueryChildMetric, QueryConfig};
use crate::engine::single::TenantQuerySnapshot;
use crate::engine::{metric_name_with_unit, parallel_map_with_deadline};
use crate::filter::{check_version_requirement, matched_schemas, sub_slice_in_slice, validate_select_only};
use crate::models::{MetricData, MetricRecord, MetricType};
use crate::projection::{self, ProjectionInput, SharedMetadata};
use crate::tenant::Tenant;

/// Per-child accumulator, keyed by position in `query.metrics`.
struct ChildAccumulator {
    name: String,
    help: String,
    metric_type: MetricType,
    unit: String,
    records: Vec<MetricRecord>,
}

/// Runs one query against one tenant across every matched schema and
/// projects the shared result set through every enabled child metric. If
/// every child is disabled the SQL is never executed (spec.md §4.F).
pub async fn get_query_metric_data(
    query: &QueryConfig,
    tenant: &TenantQuerySnapshot,
    timeout: Duration,
    component_aware_versions: bool,
) -> Vec<MetricData> {
    if query.metrics.iter().all(|m| m.disabled) {
        return Vec::new();
    }
    if !query.version_filter.is_empty()
        && !check_version_requirement(&tenant.version, &query.version_filter, component_aware_versions)
    {
        return Vec::new();
    }
    if !sub_slice_in_slice(&query.tag_filter, &tenant.tags) {
        return Vec::new();
    }
    if !validate_select_only(&query.sql) {
        error!(tenant = %tenant.name, "only SELECT statements are allowed, skipping query");
        return Vec::new();
    }
    let schemas = matched_schemas(&query.schema_filter, &tenant.schemas);
    if schemas.is_empty() {
        error!(tenant = %tenant.name, "query schema filter must include at least one tenant schema");
        return Vec::new();
    }

    let meta = SharedMetadata {
        tenant: tenant.name.clone(),
        usage: tenant.usage.clone(),
        sid: tenant.sid.clone(),
        insnr: tenant.instance_number.clone(),
        database_name: tenant.database_name.clone(),
    };

    let mut accumulators: Vec<ChildAccumulator> = query
        .metrics
        .iter()
        .map(|child| ChildAccumulator {
            name: child.name.clone(),
            help: child.help.clone(),
            metric_type: child.metric_type,
            unit: child.unit.clone(),
            records: Vec::new(),
        })
        .collect();

    for schema in &schemas {
        let sql = query.sql.replace("<SCHEMA>", schema);
        let result_set = match tenant.conn.query(&sql, timeout).await {
            Ok(rs) => rs,
            Err(err) => {
                warn!(tenant = %tenant.name, schema = %schema, %err, "query failed, skipping schema");
                continue;
            }
        };

        for (child, acc) in query.metrics.iter().zip(accumulators.iter_mut()) {
            if child.disabled {
                continue;
            }
            project_child(child, &result_set, &meta, schema, tenant, acc);
        }
    }

    accumulators
        .into_iter()
        .filter(|acc| !acc.records.is_empty())
        .map(|acc| MetricData {
            name: metric_name_with_unit(&acc.name, &acc.unit),
            help: acc.help,
            metric_type: acc.metric_type,
            records: acc.records,
        })
        .collect()
}

fn project_child(
    child: &QueryChildMetric,
    result_set: &crate::driver::ResultSet,
    meta: &SharedMetadata,
    schema: &str,
    tenant: &TenantQuerySnapshot,
    acc: &mut ChildAccumulator,
) {
    let input = ProjectionInput {
        metric_name: &child.name,
        rows: &result_set.rows,
        columns: &result_set.columns,
        labels: &child.labels,
        value_column: &child.value_column,
    };
    let child_name = &child.name;
    let tenant_name = &tenant.name;
    let mut records = projection::project_rows(&input, meta, |msg| {
        warn!(metric = %child_name, tenant = %tenant_name, "{msg}");
    });
    projection::set_schema_label(&mut records, schema);
    acc.records.extend(records.drain(..));
}

/// Fans out `get_query_metric_data` across every tenant, within
/// `deadline`, flattening each tenant's per-child `MetricData` list.
pub async fn collect_query_metric(
    query: QueryConfig,
    tenants: &[TenantQuerySnapshot],
    deadline: Duration,
    component_aware_versions: bool,
) -> Vec<MetricData> {
    let results = parallel_map_with_deadline(tenants.to_vec(), deadline, move |tenant| {
        let query = query.clone();
        async move { get_query_metric_data(&query, &tenant, deadline, component_aware_versions).await }
    })
    .await;
    results.into_iter().flatten().collect()
}

/// Collects every configured query, one task per query, matching
/// `collect_metrics`'s structure in §4.E but merging per-tenant child
/// results instead of one flat record list.
pub async fn collect_query_metrics(
    queries: &[QueryConfig],
    tenants: &[Tenant],
    deadline: Duration,
    component_aware_versions: bool,
) -> Vec<MetricData> {
    let snapshots: Vec<TenantQuerySnapshot> =
        tenants.iter().map(TenantQuerySnapshot::from_tenant).collect();

    let mut tasks = Vec::with_capacity(queries.len());
    for query in queries.iter().cloned() {
        let snapshots = snapshots.clone();
        tasks.push(tokio::spawn(async move {
            collect_query_metric(query, &snapshots, deadline, component_aware_versions).await
        }));
    }

    let mut out = Vec::new();
    for task in tasks {
        match task.await {
            Ok(data) => out.extend(data),
            Err(err) => error!(%err, "query worker panicked"),
        }
    }
    out
}
