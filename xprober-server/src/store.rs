//! Raw result stores, one per probe family
//!
//! Keyed by `ResultIdentity`; a later push for the same identity replaces
//! the earlier one.

use dashmap::DashMap;
use std::sync::Arc;
use xprober_common::{ProbeResult, ProberType, ResultIdentity};

/// Older than the window at `now`. Timestamps come off the wire, so any i64 is possible.
pub fn is_stale(result: &ProbeResult, now: i64, staleness_secs: i64) -> bool {
    now.saturating_sub(result.timestamp) > staleness_secs
}

#[derive(Clone, Default)]
pub struct RawResultStore {
    results: Arc<DashMap<ResultIdentity, ProbeResult>>,
}

impl RawResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, result: ProbeResult) {
        self.results.insert(result.identity(), result);
    }

    pub fn get(&self, identity: &ResultIdentity) -> Option<ProbeResult> {
        self.results.get(identity).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Copy out every stored result
    pub fn snapshot(&self) -> Vec<ProbeResult> {
        self.results.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove `identities` whose entry is still stale at removal time.
    ///
    /// A fresh push that landed between the scan and the removal survives.
    pub fn expire(&self, identities: &[ResultIdentity], now: i64, staleness_secs: i64) -> usize {
        identities
            .iter()
            .filter(|&identity| {
                self.results
                    .remove_if(identity, |_, r| is_stale(r, now, staleness_secs))
                    .is_some()
            })
            .count()
    }
}

/// The two raw stores, selected by a result's `probe_type`
#[derive(Clone, Default)]
pub struct ResultStores {
    pub icmp: RawResultStore,
    pub http: RawResultStore,
}

impl ResultStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(&self, prober_type: ProberType) -> &RawResultStore {
        match prober_type {
            ProberType::Icmp => &self.icmp,
            ProberType::Http => &self.http,
        }
    }

    /// Store one result. Returns false when its probe type is unknown.
    pub fn store(&self, result: ProbeResult) -> bool {
        match ProberType::from_tag(&result.probe_type) {
            Some(prober_type) => {
                self.for_type(prober_type).insert(result);
                true
            }
            None => false,
        }
    }
}
