//! Local prober worker: the periodic loop for one target
//!
//! A worker is created and stopped only by the reconciler. It never removes
//! itself; its loop ends when its cancellation token fires.

use crate::metadata::AgentIdentity;
use crate::probe::{Probe, ProbeOutcome};
use crate::result_cache::ResultCache;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xprober_common::{ProbeTarget, WorkerIdentity};

/// Handle to a running worker task
pub struct LocalWorker {
    identity: WorkerIdentity,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LocalWorker {
    /// Spawn the worker loop. `cancel` should be a token owned by this worker alone.
    pub fn spawn(
        target: ProbeTarget,
        probe: Arc<dyn Probe>,
        agent: Arc<AgentIdentity>,
        cache: ResultCache,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let identity = target.identity();
        let handle = tokio::spawn(run(
            identity.clone(),
            target,
            probe,
            agent,
            cache,
            interval,
            cancel.clone(),
        ));

        Self {
            identity,
            cancel,
            handle,
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Signal the loop to exit at its next suspension point
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signal and wait for the loop to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(uid = %self.identity, error = %e, "worker task ended abnormally");
        }
    }
}

async fn run(
    identity: WorkerIdentity,
    target: ProbeTarget,
    probe: Arc<dyn Probe>,
    agent: Arc<AgentIdentity>,
    cache: ResultCache,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(uid = %identity, "worker started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = run_probe(probe.as_ref(), &agent, &target) => outcome,
        };

        match outcome {
            ProbeOutcome::Batch(batch) if !batch.is_empty() => {
                debug!(uid = %identity, results = batch.len(), "probe cycle complete");
                cache.insert(identity.clone(), batch);
            }
            ProbeOutcome::Batch(_) => {
                debug!(uid = %identity, "probe returned no results, keeping previous batch");
            }
            ProbeOutcome::Failed(reason) => {
                warn!(uid = %identity, reason = %reason, "probe failed, keeping previous batch");
            }
        }
    }

    info!(uid = %identity, "worker received stop signal");
}

/// Run one probe, turning a panic inside it into a failed outcome
async fn run_probe(probe: &dyn Probe, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
    match AssertUnwindSafe(probe.probe(agent, target)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => ProbeOutcome::Failed(format!("probe panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use xprober_common::ProberType;

    /// Yields a scripted outcome per call, then repeats the last one
    struct Scripted {
        calls: AtomicUsize,
        script: Vec<Option<f64>>,
    }

    impl Scripted {
        fn new(script: Vec<Option<f64>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script,
            }
        }
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script[n.min(self.script.len() - 1)] {
                Some(v) if v < 0.0 => panic!("scripted fault"),
                Some(v) => ProbeOutcome::Batch(vec![agent.result(target, "ping_latency_millonseconds", v)]),
                None => ProbeOutcome::Failed("scripted failure".into()),
            }
        }
    }

    fn setup(script: Vec<Option<f64>>) -> (Arc<Scripted>, ResultCache, ProbeTarget) {
        (
            Arc::new(Scripted::new(script)),
            ResultCache::new(),
            ProbeTarget::new("eu-west", ProberType::Icmp, "10.1.0.1"),
        )
    }

    fn cached_value(cache: &ResultCache, target: &ProbeTarget) -> Option<f64> {
        cache.get(&target.identity()).map(|batch| batch[0].value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_previous_batch() {
        let (probe, cache, target) = setup(vec![Some(5.0), None, Some(-1.0), Some(7.0)]);
        let worker = LocalWorker::spawn(
            target.clone(),
            probe.clone(),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            cache.clone(),
            Duration::from_secs(15),
            CancellationToken::new(),
        );

        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cached_value(&cache, &target), Some(5.0));

        // Failure, then a panic: both keep the last good batch
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(cached_value(&cache, &target), Some(5.0));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(cached_value(&cache, &target), Some(5.0));

        // The loop survived the panic
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(cached_value(&cache, &target), Some(7.0));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_loop() {
        let (probe, cache, target) = setup(vec![Some(1.0)]);
        let worker = LocalWorker::spawn(
            target,
            probe.clone(),
            Arc::new(AgentIdentity::new("10.0.0.1", "us-east")),
            cache,
            Duration::from_secs(15),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        worker.stop();
        assert!(worker.is_stopped());
        worker.shutdown().await;

        let calls = probe.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
    }
}
