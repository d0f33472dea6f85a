//! Agent target reconciler
//!
//! Converts a desired target set into a running worker set:
//! - identities desired but not running get a new worker
//! - identities running but no longer desired are stopped and removed
//! - identities in both are left alone, so measurement is not interrupted
//!
//! The diff and the map mutation happen under one lock, so two
//! reconciliations never interleave. A stopped worker's cache entry is
//! dropped only once its task has exited, unless a new worker for the same
//! identity was started in the meantime.

use crate::metadata::AgentIdentity;
use crate::probe::{Probe, ProberRegistry};
use crate::result_cache::ResultCache;
use crate::worker::LocalWorker;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use xprober_common::{ProberType, ProbeTarget, TargetDescriptor, WorkerIdentity};

/// What one reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: usize,
    pub stopped: usize,
    pub kept: usize,
    /// Addresses skipped because no probe handles their prober type
    pub unsupported: usize,
}

pub struct Reconciler {
    registry: ProberRegistry,
    agent: Arc<AgentIdentity>,
    cache: ResultCache,
    probe_interval: Duration,
    workers: Arc<Mutex<HashMap<WorkerIdentity, LocalWorker>>>,
    cancel: CancellationToken,
    /// Shutdown-then-evict tasks for workers removed by a reconciliation
    retiring: TaskTracker,
}

impl Reconciler {
    /// Worker tokens are children of `cancel`, so cancelling it stops every worker.
    pub fn new(
        registry: ProberRegistry,
        agent: Arc<AgentIdentity>,
        cache: ResultCache,
        probe_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            agent,
            cache,
            probe_interval,
            workers: Arc::new(Mutex::new(HashMap::new())),
            cancel,
            retiring: TaskTracker::new(),
        }
    }

    /// Make the running worker set match `desired`
    pub fn reconcile(&self, desired: &[TargetDescriptor]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut wanted: HashMap<WorkerIdentity, (ProbeTarget, Arc<dyn Probe>)> = HashMap::new();

        for descriptor in desired {
            let probe = ProberType::from_tag(&descriptor.prober_type)
                .and_then(|prober_type| self.registry.get(prober_type));
            let Some(probe) = probe else {
                debug!(
                    prober_type = %descriptor.prober_type,
                    region = %descriptor.region,
                    "no probe registered for prober type, skipping"
                );
                summary.unsupported += descriptor.addresses.len();
                continue;
            };

            for target in descriptor.probe_targets() {
                wanted
                    .entry(target.identity())
                    .or_insert_with(|| (target, probe.clone()));
            }
        }

        let mut workers = self.workers.lock();

        let removed: Vec<WorkerIdentity> = workers
            .keys()
            .filter(|identity| !wanted.contains_key(*identity))
            .cloned()
            .collect();
        for identity in removed {
            if let Some(worker) = workers.remove(&identity) {
                worker.stop();
                self.retire(worker);
                info!(uid = %identity, "stopped worker for removed target");
                summary.stopped += 1;
            }
        }

        for (identity, (target, probe)) in wanted {
            if workers.contains_key(&identity) {
                summary.kept += 1;
                continue;
            }

            let worker = LocalWorker::spawn(
                target,
                probe,
                self.agent.clone(),
                self.cache.clone(),
                self.probe_interval,
                self.cancel.child_token(),
            );
            workers.insert(identity, worker);
            summary.started += 1;
        }

        info!(
            started = summary.started,
            stopped = summary.stopped,
            kept = summary.kept,
            unsupported = summary.unsupported,
            active = workers.len(),
            "reconciled targets"
        );

        summary
    }

    /// Wait for `worker` to exit, then drop its cached batch.
    ///
    /// The worker may finish a probe after being stopped and write one last
    /// batch, so eviction cannot happen before the task is joined.
    fn retire(&self, worker: LocalWorker) {
        let workers = self.workers.clone();
        let cache = self.cache.clone();
        self.retiring.spawn(async move {
            let identity = worker.identity().clone();
            worker.shutdown().await;

            let workers = workers.lock();
            if !workers.contains_key(&identity) {
                cache.remove(&identity);
            }
        });
    }

    /// Wait until every removed worker has exited and been evicted
    pub async fn wait_retired(&self) {
        self.retiring.close();
        self.retiring.wait().await;
        self.retiring.reopen();
    }

    /// Reconcile each desired set handed off by the fetch loop
    pub async fn run(
        self: Arc<Self>,
        mut desired_rx: mpsc::Receiver<Vec<TargetDescriptor>>,
        cancel: CancellationToken,
    ) {
        info!("reconcile loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                desired = desired_rx.recv() => match desired {
                    Some(desired) => {
                        self.reconcile(&desired);
                    }
                    None => break,
                },
            }
        }

        info!("reconcile loop exited");
    }

    /// Identities of all running workers, sorted
    pub fn active_identities(&self) -> Vec<WorkerIdentity> {
        let mut ids: Vec<WorkerIdentity> = self.workers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stop every worker and wait for the loops to exit
    pub async fn shutdown(&self) {
        let workers: Vec<LocalWorker> = self.workers.lock().drain().map(|(_, w)| w).collect();
        let count = workers.len();

        for worker in workers {
            worker.shutdown().await;
        }
        self.wait_retired().await;

        info!(workers = count, "all workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use async_trait::async_trait;

    struct Constant;

    #[async_trait]
    impl Probe for Constant {
        async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
            ProbeOutcome::Batch(vec![agent.result(target, "ping_latency_millonseconds", 1.0)])
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(
            ProberRegistry::new()
                .register(ProberType::Icmp, Constant)
                .register(ProberType::Http, Constant),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            ResultCache::new(),
            Duration::from_secs(15),
            CancellationToken::new(),
        )
    }

    fn icmp(region: &str, addrs: &[&str]) -> TargetDescriptor {
        TargetDescriptor::mesh(region, addrs.iter().map(|a| a.to_string()).collect())
    }

    fn ids(targets: &[TargetDescriptor]) -> Vec<WorkerIdentity> {
        let mut ids: Vec<WorkerIdentity> = targets
            .iter()
            .flat_map(|t| t.probe_targets())
            .map(|t| t.identity())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_set_matches_latest_desired() {
        let r = reconciler();
        let d1 = vec![icmp("eu", &["a", "b", "c"]), icmp("ap", &["x"])];
        let d2 = vec![icmp("eu", &["b", "d"])];

        let first = r.reconcile(&d1);
        assert_eq!(first.started, 4);
        assert_eq!(r.active_identities(), ids(&d1));

        let second = r.reconcile(&d2);
        assert_eq!(second.started, 1);
        assert_eq!(second.stopped, 3);
        assert_eq!(second.kept, 1);
        assert_eq!(r.active_identities(), ids(&d2));

        r.shutdown().await;
        assert_eq!(r.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_targets_are_not_restarted() {
        let r = reconciler();
        let desired = vec![icmp("eu", &["a"])];

        r.reconcile(&desired);
        let summary = r.reconcile(&desired);

        assert_eq!(summary, ReconcileSummary { kept: 1, ..Default::default() });
        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_unregistered_types_are_dropped() {
        let r = Reconciler::new(
            ProberRegistry::new().register(ProberType::Icmp, Constant),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            ResultCache::new(),
            Duration::from_secs(15),
            CancellationToken::new(),
        );
        let desired = vec![
            icmp("eu", &["a"]),
            TargetDescriptor::new("eu", "http", vec!["http://example.com".into()]),
            TargetDescriptor::new("eu", "dns", vec!["example.com".into(), "example.org".into()]),
        ];

        let summary = r.reconcile(&desired);

        assert_eq!(summary.started, 1);
        assert_eq!(summary.unsupported, 3);
        assert_eq!(r.active_count(), 1);
        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_addresses_spawn_one_worker() {
        let r = reconciler();
        let summary = r.reconcile(&[icmp("eu", &["a", "a"]), icmp("eu", &["a"])]);

        assert_eq!(summary.started, 1);
        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_worker_cache_entry_is_dropped() {
        let r = reconciler();
        r.reconcile(&[icmp("eu", &["a"])]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(r.cache.len(), 1);

        r.reconcile(&[icmp("eu", &["b"])]);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let cached = r.cache.flatten();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].target_address, "b");
        r.shutdown().await;
    }

    /// Blocks its thread for the whole measurement, so a stop is only seen
    /// after the batch is produced
    struct Blocking(Duration);

    #[async_trait]
    impl Probe for Blocking {
        async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
            std::thread::sleep(self.0);
            ProbeOutcome::Batch(vec![agent.result(target, "ping_latency_millonseconds", 1.0)])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_written_after_stop_is_evicted() {
        let r = Reconciler::new(
            ProberRegistry::new().register(ProberType::Icmp, Blocking(Duration::from_millis(300))),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            ResultCache::new(),
            Duration::from_secs(15),
            CancellationToken::new(),
        );

        r.reconcile(&[icmp("eu", &["a"])]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // "a" is mid-measurement and will still write its batch
        r.reconcile(&[icmp("eu", &["b"])]);
        r.wait_retired().await;

        assert!(r.cache.flatten().iter().all(|res| res.target_address == "b"));
        assert_eq!(r.active_identities(), ids(&[icmp("eu", &["b"])]));

        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_readded_target_keeps_its_cache_entry() {
        let r = reconciler();
        r.reconcile(&[icmp("eu", &["a"])]);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // removed and re-added before the old worker is joined
        r.reconcile(&[]);
        r.reconcile(&[icmp("eu", &["a"])]);
        r.wait_retired().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(r.cache.len(), 1);
        assert_eq!(r.active_count(), 1);
        r.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconciles_leave_one_desired_set() {
        let r = Arc::new(reconciler());
        let d1 = vec![icmp("eu", &["a", "b", "c"]), icmp("ap", &["x"])];
        let d2 = vec![icmp("eu", &["b", "d"]), icmp("sa", &["y", "z"])];

        for _ in 0..50 {
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = [d1.clone(), d2.clone()]
                .into_iter()
                .map(|desired| {
                    let r = r.clone();
                    let barrier = barrier.clone();
                    tokio::task::spawn_blocking(move || {
                        barrier.wait();
                        r.reconcile(&desired);
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }

            let active = r.active_identities();
            assert!(
                active == ids(&d1) || active == ids(&d2),
                "leaked or missing workers: {active:?}"
            );
        }

        r.wait_retired().await;
        let active = r.active_identities();
        for result in r.cache.flatten() {
            let identity = WorkerIdentity::new(&result.target_region, &result.target_address, ProberType::Icmp);
            assert!(active.contains(&identity), "orphaned cache entry {identity}");
        }

        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_consumes_handoff_queue() {
        let r = Arc::new(reconciler());
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(r.clone().run(rx, cancel.clone()));

        tx.send(vec![icmp("eu", &["a", "b"])]).await.unwrap();
        tx.send(vec![icmp("eu", &["b"])]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(r.active_identities(), ids(&[icmp("eu", &["b"])]));

        cancel.cancel();
        handle.await.unwrap();
        r.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_cancel_reaches_workers() {
        let cancel = CancellationToken::new();
        let r = Reconciler::new(
            ProberRegistry::new().register(ProberType::Icmp, Constant),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            ResultCache::new(),
            Duration::from_secs(15),
            cancel.clone(),
        );
        r.reconcile(&[icmp("eu", &["a"])]);

        cancel.cancel();
        assert!(r.workers.lock().values().all(|w| w.is_stopped()));
        r.shutdown().await;
    }
}
