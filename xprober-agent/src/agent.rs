//! Agent orchestration: wires the reconciler, cache, and periodic loops
//! together under one root cancellation token.

use crate::client::ControlPlane;
use crate::heartbeat::run_heartbeat_loop;
use crate::metadata::AgentIdentity;
use crate::probe::ProberRegistry;
use crate::pusher::run_push_loop;
use crate::reconciler::Reconciler;
use crate::result_cache::ResultCache;
use crate::target_fetcher::run_fetch_loop;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cadences and limits for the agent's loops
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub probe_interval: Duration,
    pub push_interval: Duration,
    pub fetch_interval: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    /// Capacity of the fetch -> reconcile hand-off queue
    pub handoff_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
            push_interval: Duration::from_secs(15),
            fetch_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
            rpc_timeout: Duration::from_secs(5),
            handoff_capacity: 1,
        }
    }
}

pub struct Agent {
    identity: Arc<AgentIdentity>,
    settings: AgentSettings,
    plane: Arc<dyn ControlPlane>,
    reconciler: Arc<Reconciler>,
    cache: ResultCache,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    pub fn new(
        identity: AgentIdentity,
        settings: AgentSettings,
        plane: Arc<dyn ControlPlane>,
        registry: ProberRegistry,
    ) -> Self {
        let identity = Arc::new(identity);
        let cache = ResultCache::new();
        let cancel = CancellationToken::new();
        let reconciler = Arc::new(Reconciler::new(
            registry,
            identity.clone(),
            cache.clone(),
            settings.probe_interval,
            cancel.child_token(),
        ));

        Self {
            identity,
            settings,
            plane,
            reconciler,
            cache,
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Spawn the fetch, reconcile, push, and heartbeat loops
    pub fn start(&mut self) {
        let (desired_tx, desired_rx) = mpsc::channel(self.settings.handoff_capacity.max(1));

        self.tasks.push(tokio::spawn(run_heartbeat_loop(
            self.plane.clone(),
            self.identity.clone(),
            self.settings.heartbeat_interval,
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(
            self.reconciler.clone().run(desired_rx, self.cancel.clone()),
        ));
        self.tasks.push(tokio::spawn(run_fetch_loop(
            self.plane.clone(),
            self.identity.clone(),
            desired_tx,
            self.settings.fetch_interval,
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(run_push_loop(
            self.plane.clone(),
            self.cache.clone(),
            self.settings.push_interval,
            self.cancel.clone(),
        )));

        info!(
            ip = %self.identity.address,
            region = %self.identity.region,
            "agent started"
        );
    }

    /// Cancel every loop and worker, then wait for them to exit
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "agent task ended abnormally");
            }
        }
        self.reconciler.shutdown().await;

        info!("agent stopped");
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }
}
