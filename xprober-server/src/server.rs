//! Server assembly: listeners, target pool refresh, and aggregation loops

use crate::aggregator::{Aggregator, ProbeFamily};
use crate::config::{listen_socket_addr, Config};
use crate::grpc_server::{self, ControlService};
use crate::metrics::{serve as serve_metrics, ProberMetrics};
use crate::roster::AgentRoster;
use crate::store::ResultStores;
use crate::target_pool::{TargetPool, TargetPoolManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use xprober_common::{ProberType, Result};

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Target pool refresh period (config and roster)
    pub refresh_interval: Duration,
    pub aggregation_interval: Duration,
    /// Results older than this are excluded and purged
    pub staleness: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            aggregation_interval: Duration::from_secs(15),
            staleness: Duration::from_secs(300),
        }
    }
}

pub struct ProberServer {
    pool: TargetPool,
    roster: AgentRoster,
    stores: ResultStores,
    metrics: ProberMetrics,
    rpc_addr: SocketAddr,
    metrics_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ProberServer {
    /// Bind both listeners and spawn every server loop
    pub async fn start(
        config: &Config,
        config_path: impl Into<PathBuf>,
        settings: ServerSettings,
    ) -> Result<Self> {
        let pool = TargetPool::new();
        let roster = AgentRoster::new();
        let stores = ResultStores::new();
        let metrics = ProberMetrics::new()?;
        let cancel = CancellationToken::new();

        pool.refresh_from_config(config);

        let rpc_listener = TcpListener::bind(listen_socket_addr(&config.rpc_listen_addr)?).await?;
        let rpc_addr = rpc_listener.local_addr()?;
        let metrics_listener =
            TcpListener::bind(listen_socket_addr(&config.metrics_listen_addr)?).await?;
        let metrics_addr = metrics_listener.local_addr()?;

        let mut tasks = Vec::new();

        let service = ControlService::new(pool.clone(), roster.clone(), stores.clone());
        let rpc_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = grpc_server::serve(service, rpc_listener, rpc_cancel).await {
                tracing::error!(error = %e, "gRPC server error");
            }
        }));

        tasks.push(tokio::spawn(serve_metrics(
            metrics.clone(),
            metrics_listener,
            cancel.clone(),
        )));

        let manager = Arc::new(TargetPoolManager::new(
            pool.clone(),
            roster.clone(),
            config_path,
            settings.refresh_interval,
        ));
        tasks.push(tokio::spawn(manager.run(cancel.clone())));

        for prober_type in ProberType::ALL {
            let aggregator = Arc::new(Aggregator::new(
                ProbeFamily::from(prober_type),
                stores.for_type(prober_type).clone(),
                metrics.clone(),
                settings.staleness,
            ));
            tasks.push(tokio::spawn(
                aggregator.run(settings.aggregation_interval, cancel.clone()),
            ));
        }

        info!(rpc = %rpc_addr, metrics = %metrics_addr, "prober server started");

        Ok(Self {
            pool,
            roster,
            stores,
            metrics,
            rpc_addr,
            metrics_addr,
            cancel,
            tasks,
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn pool(&self) -> &TargetPool {
        &self.pool
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn stores(&self) -> &ResultStores {
        &self.stores
    }

    pub fn metrics(&self) -> &ProberMetrics {
        &self.metrics
    }

    /// Cancel every loop and wait for them to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "server task ended abnormally");
            }
        }
        info!("prober server stopped");
    }
}
