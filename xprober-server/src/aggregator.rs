//! Metric aggregator: raw results -> exported gauges
//!
//! Each pass scans one raw store, drops results older than the staleness
//! window, and publishes the mean of the remaining values per
//! (metric, source region, target) key. Accumulators are rebuilt every pass.

use crate::metrics::ProberMetrics;
use crate::store::{is_stale, RawResultStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xprober_common::metrics::{
    self, HTTP_CONNECT_DURATION, HTTP_INTERFACE_SUCCESS, HTTP_PROCESSING_DURATION,
    HTTP_RESOLVE_DURATION, HTTP_TLS_DURATION, HTTP_TRANSFER_DURATION, PING_LATENCY,
    PING_PACKAGE_DROP,
};
use xprober_common::{unix_now, ProbeResult, ProberType};

/// Which gauges a store feeds and which field labels the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFamily {
    Icmp,
    Http,
}

impl ProbeFamily {
    /// Gauge name for a metric type segment, `None` when this family has no such gauge
    pub fn gauge_for(&self, metric_type: &str) -> Option<&'static str> {
        match (self, metric_type) {
            (ProbeFamily::Icmp, "latency") => Some(PING_LATENCY),
            (ProbeFamily::Icmp, "packageDrop") => Some(PING_PACKAGE_DROP),
            (ProbeFamily::Http, "resolveDuration") => Some(HTTP_RESOLVE_DURATION),
            (ProbeFamily::Http, "tlsDuration") => Some(HTTP_TLS_DURATION),
            (ProbeFamily::Http, "connectDuration") => Some(HTTP_CONNECT_DURATION),
            (ProbeFamily::Http, "processingDuration") => Some(HTTP_PROCESSING_DURATION),
            (ProbeFamily::Http, "transferDuration") => Some(HTTP_TRANSFER_DURATION),
            (ProbeFamily::Http, "interface") => Some(HTTP_INTERFACE_SUCCESS),
            _ => None,
        }
    }

    /// ICMP series are labeled by target region, HTTP series by address
    pub fn target_label<'a>(&self, result: &'a ProbeResult) -> &'a str {
        match self {
            ProbeFamily::Icmp => &result.target_region,
            ProbeFamily::Http => &result.target_address,
        }
    }
}

impl From<ProberType> for ProbeFamily {
    fn from(t: ProberType) -> Self {
        match t {
            ProberType::Icmp => ProbeFamily::Icmp,
            ProberType::Http => ProbeFamily::Http,
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct AggregationKey {
    pub gauge: &'static str,
    pub source_region: String,
    pub target: String,
}

/// What one pass did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassReport {
    pub scanned: usize,
    pub expired: usize,
    pub skipped: usize,
    pub published: usize,
    pub removed: usize,
}

pub struct Aggregator {
    family: ProbeFamily,
    store: RawResultStore,
    metrics: ProberMetrics,
    staleness_secs: i64,
    published: Mutex<HashSet<AggregationKey>>,
}

impl Aggregator {
    pub fn new(
        family: ProbeFamily,
        store: RawResultStore,
        metrics: ProberMetrics,
        staleness: Duration,
    ) -> Self {
        Self {
            family,
            store,
            metrics,
            staleness_secs: staleness.as_secs() as i64,
            published: Mutex::new(HashSet::new()),
        }
    }

    /// Run one pass with `now` as the current unix time
    pub fn run_pass(&self, now: i64) -> PassReport {
        let mut report = PassReport::default();
        let mut expired = Vec::new();
        let mut accumulators: HashMap<AggregationKey, Vec<f64>> = HashMap::new();

        for result in self.store.snapshot() {
            report.scanned += 1;

            if is_stale(&result, now, self.staleness_secs) {
                expired.push(result.identity());
                continue;
            }

            let Some(gauge) = metrics::metric_type(&result.metric_name)
                .and_then(|metric_type| self.family.gauge_for(metric_type))
            else {
                report.skipped += 1;
                continue;
            };

            let key = AggregationKey {
                gauge,
                source_region: result.source_region.clone(),
                target: self.family.target_label(&result).to_string(),
            };
            accumulators.entry(key).or_default().push(result.value);
        }

        report.expired = self.store.expire(&expired, now, self.staleness_secs);

        for (key, values) in &accumulators {
            let Some(gauge) = self.metrics.gauge(key.gauge) else {
                continue;
            };
            gauge
                .with_label_values(&[key.source_region.as_str(), key.target.as_str()])
                .set(mean(values));
            report.published += 1;
        }

        let current: HashSet<AggregationKey> = accumulators.into_keys().collect();
        let mut published = self.published.lock();
        for gone in published.difference(&current) {
            let Some(gauge) = self.metrics.gauge(gone.gauge) else {
                continue;
            };
            match gauge.remove_label_values(&[gone.source_region.as_str(), gone.target.as_str()]) {
                Ok(()) => report.removed += 1,
                Err(e) => debug!(gauge = gone.gauge, error = %e, "series already gone"),
            }
        }
        *published = current;

        report
    }

    /// Run a pass every `interval` until `cancel` fires
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(family = ?self.family, interval = ?interval, "aggregator started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; results need a push cycle to arrive
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_pass(unix_now());
                    if report.skipped > 0 {
                        warn!(family = ?self.family, skipped = report.skipped, "results with unknown metric names");
                    }
                    debug!(family = ?self.family, ?report, "aggregation pass");
                }
            }
        }

        info!(family = ?self.family, "aggregator stopped");
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icmp(worker: &str, metric: &str, value: f64, timestamp: i64) -> ProbeResult {
        ProbeResult {
            metric_name: metric.to_string(),
            worker_identity: worker.to_string(),
            source_region: "us-east".to_string(),
            target_region: "eu-west".to_string(),
            target_address: format!("10.1.0.{}", worker.len()),
            probe_type: "icmp".to_string(),
            timestamp,
            value,
        }
    }

    fn gauge_value(metrics: &ProberMetrics, name: &str, labels: &[&str]) -> f64 {
        metrics.gauge(name).unwrap().with_label_values(labels).get()
    }

    fn setup(family: ProbeFamily) -> (RawResultStore, ProberMetrics, Aggregator) {
        let store = RawResultStore::new();
        let metrics = ProberMetrics::new().unwrap();
        let aggregator = Aggregator::new(
            family,
            store.clone(),
            metrics.clone(),
            Duration::from_secs(300),
        );
        (store, metrics, aggregator)
    }

    #[test]
    fn test_mean_per_key() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", PING_LATENCY, 10.0, 1000));
        store.insert(icmp("bb", PING_LATENCY, 20.0, 1000));
        store.insert(icmp("ccc", PING_LATENCY, 30.0, 1000));

        let report = aggregator.run_pass(1000);
        assert_eq!(report.published, 1);
        assert_eq!(
            gauge_value(&metrics, PING_LATENCY, &["us-east", "eu-west"]),
            20.0
        );
    }

    #[test]
    fn test_staleness_window() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        let now = 10_000;
        store.insert(icmp("a", PING_LATENCY, 5.0, now));
        store.insert(icmp("old", PING_LATENCY, 500.0, now - 301));

        let report = aggregator.run_pass(now);
        assert_eq!(report.expired, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(gauge_value(&metrics, PING_LATENCY, &["us-east", "eu-west"]), 5.0);
    }

    #[test]
    fn test_extreme_timestamp_is_expired() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", PING_LATENCY, 42.0, i64::MIN));

        let report = aggregator.run_pass(1_700_000_000);
        assert_eq!(report.expired, 1);
        assert_eq!(report.published, 0);
        assert!(store.is_empty());
        assert!(!metrics.encode().unwrap().contains("ping_latency_millonseconds{"));
    }

    #[test]
    fn test_last_write_wins_through_pass() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", PING_PACKAGE_DROP, 0.5, 100));
        store.insert(icmp("a", PING_PACKAGE_DROP, 0.1, 101));

        aggregator.run_pass(101);
        assert_eq!(
            gauge_value(&metrics, PING_PACKAGE_DROP, &["us-east", "eu-west"]),
            0.1
        );
    }

    #[test]
    fn test_http_labels_by_address() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Http);
        store.insert(ProbeResult {
            metric_name: HTTP_CONNECT_DURATION.to_string(),
            worker_identity: "10.0.0.1".to_string(),
            source_region: "us-east".to_string(),
            target_region: "us-east".to_string(),
            target_address: "https://a.example".to_string(),
            probe_type: "http".to_string(),
            timestamp: 50,
            value: 7.0,
        });

        aggregator.run_pass(60);
        assert_eq!(
            gauge_value(
                &metrics,
                HTTP_CONNECT_DURATION,
                &["us-east", "https://a.example"]
            ),
            7.0
        );
    }

    #[test]
    fn test_unknown_metric_type_is_skipped() {
        let (store, _metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", "ping_jitter_millonseconds", 1.0, 10));
        store.insert(icmp("b", "nounderscore", 1.0, 10));

        let report = aggregator.run_pass(10);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.published, 0);
    }

    #[test]
    fn test_removed_counts_only_existing_series() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", PING_LATENCY, 10.0, 0));
        aggregator.run_pass(0);

        // dropped out from under the aggregator
        metrics.gauge(PING_LATENCY).unwrap().reset();

        let report = aggregator.run_pass(400);
        assert_eq!(report.expired, 1);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_series_removed_when_data_expires() {
        let (store, metrics, aggregator) = setup(ProbeFamily::Icmp);
        store.insert(icmp("a", PING_LATENCY, 10.0, 0));
        aggregator.run_pass(0);
        assert!(metrics.encode().unwrap().contains("ping_latency_millonseconds{"));

        let report = aggregator.run_pass(400);
        assert_eq!(report.removed, 1);
        assert!(!metrics.encode().unwrap().contains("ping_latency_millonseconds{"));
    }
}
