//! Target pool: the target lists handed to agents
//!
//! Two views per region:
//! - mesh: ICMP targets built from agent addresses. Merged by set union and
//!   never pruned, so an address survives a roster gap.
//! - configured: operator targets from the config file. Replaced wholesale
//!   per region on every config refresh.

use crate::config::Config;
use crate::roster::AgentRoster;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xprober_common::{ProberType, TargetDescriptor};

#[derive(Clone, Default)]
pub struct TargetPool {
    mesh: Arc<DashMap<String, BTreeSet<String>>>,
    configured: Arc<DashMap<String, Vec<TargetDescriptor>>>,
}

impl TargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `addresses` into the mesh view for `region`
    pub fn merge_mesh<I, S>(&self, region: &str, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entry = self.mesh.entry(region.to_string()).or_default();
        entry.extend(addresses.into_iter().map(Into::into));
    }

    /// Replace the configured view for `region`
    pub fn replace_configured(&self, region: &str, descriptors: Vec<TargetDescriptor>) {
        self.configured.insert(region.to_string(), descriptors);
    }

    /// Apply the config file's target list.
    ///
    /// ICMP entries merge into the mesh; every other entry replaces the
    /// configured view of its region. Regions absent from the config keep
    /// their previous view.
    pub fn refresh_from_config(&self, config: &Config) {
        let descriptors = config.target_descriptors();
        if descriptors.is_empty() {
            debug!("config has no usable prober targets");
            return;
        }

        let mut by_region: BTreeMap<String, Vec<TargetDescriptor>> = BTreeMap::new();
        for descriptor in descriptors {
            if ProberType::from_tag(&descriptor.prober_type) == Some(ProberType::Icmp) {
                self.merge_mesh(&descriptor.region, descriptor.addresses);
            } else {
                by_region
                    .entry(descriptor.region.clone())
                    .or_default()
                    .push(descriptor);
            }
        }

        for (region, descriptors) in by_region {
            self.replace_configured(&region, descriptors);
        }
    }

    /// Merge the roster's agents into the mesh view, region by region
    pub fn refresh_from_roster(&self, roster: &AgentRoster) {
        for (region, addresses) in roster.by_region() {
            self.merge_mesh(&region, addresses);
        }
    }

    /// Targets for an agent in `source_region`.
    ///
    /// Mesh targets of the caller's own region are excluded; configured
    /// targets are returned regardless of region.
    pub fn targets_for(&self, source_region: &str) -> Vec<TargetDescriptor> {
        let mut targets: Vec<TargetDescriptor> = self
            .mesh
            .iter()
            .filter(|entry| entry.key() != source_region && !entry.value().is_empty())
            .map(|entry| {
                TargetDescriptor::mesh(entry.key().clone(), entry.value().iter().cloned().collect())
            })
            .collect();

        for entry in self.configured.iter() {
            targets.extend(entry.value().iter().cloned());
        }

        targets
    }

    /// Snapshot of the mesh view, region -> addresses
    pub fn mesh_view(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.mesh
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the configured view, region -> descriptors
    pub fn configured_view(&self) -> BTreeMap<String, Vec<TargetDescriptor>> {
        self.configured
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// Periodic driver for both refresh paths
pub struct TargetPoolManager {
    pool: TargetPool,
    roster: AgentRoster,
    config_path: PathBuf,
    interval: Duration,
}

impl TargetPoolManager {
    pub fn new(
        pool: TargetPool,
        roster: AgentRoster,
        config_path: impl Into<PathBuf>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            roster,
            config_path: config_path.into(),
            interval,
        }
    }

    /// Reload the config file and apply it. A failed load keeps the pool as is.
    pub fn refresh_config(&self) -> bool {
        match Config::load(&self.config_path) {
            Ok(config) => {
                self.pool.refresh_from_config(&config);
                true
            }
            Err(e) => {
                warn!(path = %self.config_path.display(), error = %e, "config reload failed, keeping previous targets");
                false
            }
        }
    }

    pub fn refresh_roster(&self) {
        self.pool.refresh_from_roster(&self.roster);
        debug!(agents = self.roster.len(), "mesh refreshed from roster");
    }

    /// Run both refresh loops until `cancel` fires. Each refreshes immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval = ?self.interval, "target pool manager started");

        let config_loop = {
            let manager = self.clone();
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(manager.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            manager.refresh_config();
                        }
                    }
                }
            }
        };

        let roster_loop = {
            let manager = self.clone();
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(manager.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => manager.refresh_roster(),
                    }
                }
            }
        };

        tokio::join!(config_loop, roster_loop);
        info!("target pool manager stopped");
    }
}
