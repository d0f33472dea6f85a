//! Periodic announcement of this agent's address and region

use crate::client::ControlPlane;
use crate::metadata::AgentIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn run_heartbeat_loop(
    plane: Arc<dyn ControlPlane>,
    agent: Arc<AgentIdentity>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?interval, "heartbeat loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                report_once(plane.as_ref(), &agent).await;
            }
        }
    }

    info!("heartbeat loop exited");
}

pub async fn report_once(plane: &dyn ControlPlane, agent: &AgentIdentity) -> bool {
    match plane.report_agent(&agent.address, &agent.region).await {
        Ok(()) => {
            debug!(ip = %agent.address, region = %agent.region, "reported agent address");
            true
        }
        Err(e) => {
            warn!(error = %e, ip = %agent.address, "could not report agent address");
            false
        }
    }
}
