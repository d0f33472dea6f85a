//! Periodic upload of the result cache
//!
//! No retry queue: a failed push is logged and dropped, and the next cycle
//! sends whatever the cache holds by then.

use crate::client::ControlPlane;
use crate::result_cache::ResultCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn run_push_loop(
    plane: Arc<dyn ControlPlane>,
    cache: ResultCache,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?interval, "result push loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                push_once(plane.as_ref(), &cache).await;
            }
        }
    }

    info!("result push loop exited");
}

/// Push the flattened cache. Returns the accepted count, or `None` when
/// nothing was sent or the push failed.
pub async fn push_once(plane: &dyn ControlPlane, cache: &ResultCache) -> Option<u32> {
    let results = cache.flatten();
    if results.is_empty() {
        debug!("result cache empty, nothing to push");
        return None;
    }

    let count = results.len();
    match plane.push_results(results).await {
        Ok(accepted) => {
            debug!(sent = count, accepted, "pushed results");
            Some(accepted)
        }
        Err(e) => {
            warn!(error = %e, results = count, "could not push results");
            None
        }
    }
}
