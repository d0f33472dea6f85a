//! Agent roster: agent address -> declared region
//!
//! Refreshed by heartbeats. Entries never expire; a departed agent stays
//! until another heartbeat reuses its address.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AgentRoster {
    inner: Arc<DashMap<String, String>>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat, replacing any previous region for `ip`
    pub fn report(&self, ip: impl Into<String>, region: impl Into<String>) {
        self.inner.insert(ip.into(), region.into());
    }

    pub fn region_of(&self, ip: &str) -> Option<String> {
        self.inner.get(ip).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot grouped as region -> sorted addresses
    pub fn by_region(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.inner.iter() {
            grouped
                .entry(entry.value().clone())
                .or_default()
                .push(entry.key().clone());
        }
        for addresses in grouped.values_mut() {
            addresses.sort();
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_overwrites_region() {
        let roster = AgentRoster::new();
        roster.report("10.0.0.1", "us-east");
        roster.report("10.0.0.1", "us-west");

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.region_of("10.0.0.1").as_deref(), Some("us-west"));
    }

    #[test]
    fn test_by_region_groups_addresses() {
        let roster = AgentRoster::new();
        roster.report("10.0.0.2", "us-east");
        roster.report("10.0.0.1", "us-east");
        roster.report("10.1.0.1", "eu-west");

        let grouped = roster.by_region();
        assert_eq!(grouped["us-east"], vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(grouped["eu-west"], vec!["10.1.0.1"]);
    }
}
