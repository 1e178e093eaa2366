//! Scrape coordinator (spec.md §4.G): runs the single-metric and
//! multi-metric engines concurrently, merges their results, and
//! deduplicates by final metric name with first-arrival winning.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::engine::{multi, single};
use crate::models::MetricData;
use crate::tenant::Tenant;

/// Runs one complete scrape: both engines launch concurrently, bounded
/// by `config.timeout`. On deadline, whatever was collected so far is
/// returned — possibly empty (spec.md §4.G, step 4).
pub async fn run_scrape(config: &Config, tenants: &[Tenant]) -> Vec<MetricData> {
    let deadline = Duration::from_secs(config.timeout);
    let component_aware = config.component_aware_versions;

    let (single_results, multi_results) = tokio::join!(
        single::collect_metrics(&config.metrics, tenants, deadline, component_aware),
        multi::collect_query_metrics(&config.queries, tenants, deadline, component_aware),
    );

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(single_results.len() + multi_results.len());
    for data in single_results.into_iter().chain(multi_results) {
        if seen.insert(data.name.clone()) {
            out.push(data);
        } else {
            warn!(metric = %data.name, "duplicate metric name in this scrape, dropping");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_config_produces_empty_scrape() {
        let config = Config::default();
        let tenants: Vec<Tenant> = vec![];
        let data = run_scrape(&config, &tenants).await;
        assert!(data.is_empty());
    }

    #[test]
    fn dedup_keeps_first_arrival() {
        let first = MetricData {
            name: "hana_x".into(),
            help: "first".into(),
            metric_type: crate::models::MetricType::Gauge,
            records: vec![],
        };
        let second = MetricData {
            name: "hana_x".into(),
            help: "second".into(),
            metric_type: crate::models::MetricType::Gauge,
            records: vec![],
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for data in [first, second] {
            if seen.insert(data.name.clone()) {
                out.push(data);
            }
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].help, "first");
    }
}
