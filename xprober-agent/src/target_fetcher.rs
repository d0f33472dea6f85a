//! Periodic fetch of the desired target set
//!
//! The fetch loop only hands desired sets to the reconciler through a bounded
//! queue; it never touches workers itself.

use crate::client::ControlPlane;
use crate::metadata::AgentIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xprober_common::TargetDescriptor;

/// How a single fetch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    HandedOff(usize),
    Empty,
    Failed,
    Cancelled,
}

pub async fn run_fetch_loop(
    plane: Arc<dyn ControlPlane>,
    agent: Arc<AgentIdentity>,
    desired_tx: mpsc::Sender<Vec<TargetDescriptor>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?interval, "target fetch loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if fetch_once(plane.as_ref(), &agent, &desired_tx, &cancel).await == FetchOutcome::Cancelled {
                    break;
                }
            }
        }
    }

    info!("target fetch loop exited");
}

/// Fetch once and hand a non-empty result to the reconciler
pub async fn fetch_once(
    plane: &dyn ControlPlane,
    agent: &AgentIdentity,
    desired_tx: &mpsc::Sender<Vec<TargetDescriptor>>,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let targets = match plane.get_targets(&agent.region, &agent.address).await {
        Ok(targets) => targets,
        Err(e) => {
            warn!(error = %e, region = %agent.region, "could not fetch targets");
            return FetchOutcome::Failed;
        }
    };

    // An empty answer is treated as "no change" rather than "stop everything".
    if targets.is_empty() {
        info!("received empty target list, keeping current workers");
        return FetchOutcome::Empty;
    }

    let count = targets.len();
    debug!(groups = count, "fetched targets");

    tokio::select! {
        _ = cancel.cancelled() => FetchOutcome::Cancelled,
        sent = desired_tx.send(targets) => match sent {
            Ok(()) => FetchOutcome::HandedOff(count),
            Err(_) => {
                warn!("reconciler is gone, dropping fetched targets");
                FetchOutcome::Cancelled
            }
        },
    }
}
