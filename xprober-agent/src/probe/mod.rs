//! Probe capabilities and the registry that dispatches to them
//!
//! A probe turns one target into zero or more results. It enforces its own
//! timeout and reports faults as `ProbeOutcome::Failed`; the worker treats a
//! failure and an empty batch alike and keeps the previous cached batch.

pub mod http;
pub mod icmp;

use crate::metadata::AgentIdentity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use xprober_common::{ProbeResult, ProbeTarget, ProberType};

pub use http::HttpProbe;
pub use icmp::IcmpProbe;

/// Result of one probe invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Batch(Vec<ProbeResult>),
    Failed(String),
}

/// A measurement capability for one prober type
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome;
}

/// Closed mapping from prober type to the probe that runs it
#[derive(Clone, Default)]
pub struct ProberRegistry {
    probes: HashMap<ProberType, Arc<dyn Probe>>,
}

impl ProberRegistry {
    /// Registry with no probes; every target is dropped
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTTP and ICMP probes
    pub fn with_defaults() -> Self {
        Self::new()
            .register(ProberType::Http, HttpProbe::default())
            .register(ProberType::Icmp, IcmpProbe::default())
    }

    pub fn register(mut self, prober_type: ProberType, probe: impl Probe + 'static) -> Self {
        self.probes.insert(prober_type, Arc::new(probe));
        self
    }

    pub fn get(&self, prober_type: ProberType) -> Option<Arc<dyn Probe>> {
        self.probes.get(&prober_type).cloned()
    }

    pub fn supports(&self, prober_type: ProberType) -> bool {
        self.probes.contains_key(&prober_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl Probe for Silent {
        async fn probe(&self, _agent: &AgentIdentity, _target: &ProbeTarget) -> ProbeOutcome {
            ProbeOutcome::Batch(Vec::new())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProberRegistry::new().register(ProberType::Icmp, Silent);

        assert!(registry.supports(ProberType::Icmp));
        assert!(!registry.supports(ProberType::Http));
        assert!(registry.get(ProberType::Http).is_none());
    }

    #[test]
    fn test_default_registry_covers_all_types() {
        let registry = ProberRegistry::with_defaults();
        for prober_type in ProberType::ALL {
            assert!(registry.supports(prober_type));
        }
    }
}
