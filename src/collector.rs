//! Collector adapter (spec.md §4.H): bridges the scrape coordinator to
//! the `prometheus` registry's synchronous `Collector` trait.
//!
//! Every sample's label set is only known after a scrape runs, so this
//! mirrors the original's `Describe = DescribeByCollect` idiom rather
//! than declaring a fixed, ahead-of-time label schema: `desc()` returns
//! nothing and every `MetricFamily` is constructed fresh inside
//! `collect()`, one `Desc` per distinct (metric name, label name set)
//! pair actually observed that scrape.

use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType as ProtoMetricType};
use tokio::sync::RwLock;
use tracing::error;

use crate::config::Config;
use crate::models::{MetricData, MetricType};
use crate::tenant::Tenant;

pub struct ExporterCollector {
    config: Arc<Config>,
    tenants: Arc<RwLock<Vec<Tenant>>>,
}

impl ExporterCollector {
    pub fn new(config: Arc<Config>, tenants: Arc<RwLock<Vec<Tenant>>>) -> Self {
        Self { config, tenants }
    }

    async fn scrape(&self) -> Vec<MetricData> {
        let tenants = self.tenants.read().await;
        crate::scrape::run_scrape(&self.config, &tenants).await
    }
}

impl Collector for ExporterCollector {
    fn desc(&self) -> Vec<&Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let data = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.scrape())
        });
        build_families(&data)
    }
}

fn build_families(data: &[MetricData]) -> Vec<MetricFamily> {
    let mut families = Vec::new();
    for metric in data {
        families.extend(build_metric_families(metric));
    }
    families
}

/// Groups a metric's samples by their label-name set, since the adapter
/// must tolerate samples for the same name carrying different label
/// sets (spec.md §4.H) — each group becomes its own `MetricFamily`
/// sharing the same name, help, and type.
fn build_metric_families(data: &MetricData) -> Vec<MetricFamily> {
    let mut groups: Vec<(Vec<String>, Vec<Metric>)> = Vec::new();
    let proto_type = match data.metric_type {
        MetricType::Gauge => ProtoMetricType::GAUGE,
        MetricType::Counter => ProtoMetricType::COUNTER,
    };

    for record in &data.records {
        let metric = const_metric(data.metric_type, record);
        match groups.iter_mut().find(|(labels, _)| labels == &record.labels) {
            Some((_, metrics)) => metrics.push(metric),
            None => groups.push((record.labels.clone(), vec![metric])),
        }
    }

    groups
        .into_iter()
        .map(|(_, metrics)| {
            let mut family = MetricFamily::default();
            family.set_name(data.name.clone());
            family.set_help(data.help.clone());
            family.set_field_type(proto_type);
            *family.mut_metric() = metrics.into();
            family
        })
        .collect()
}

fn const_metric(metric_type: MetricType, record: &crate::models::MetricRecord) -> Metric {
    let mut metric = Metric::default();
    let labels: Vec<LabelPair> = record
        .label_pairs()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_owned());
            pair.set_value(value.to_owned());
            pair
        })
        .collect();
    metric.set_label(labels);

    match metric_type {
        MetricType::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(record.value);
            metric.set_gauge(gauge);
        }
        MetricType::Counter => {
            let mut counter = Counter::default();
            counter.set_value(record.value);
            metric.set_counter(counter);
        }
    }
    metric
}

/// Registers default process metrics with the registry only at debug log
/// level, matching the teacher's conditional instrumentation and
/// carrying over the original's "suppress noisy default collectors
/// outside debug" behavior (SPEC_FULL.md §3).
pub fn maybe_register_process_collector(registry: &prometheus::Registry, log_level: &str) {
    if !log_level.eq_ignore_ascii_case("debug") {
        return;
    }
    #[cfg(feature = "process")]
    {
        if let Err(err) = registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self())) {
            error!(%err, "failed to register process collector");
        }
    }
}
