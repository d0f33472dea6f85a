//! Conversions between domain types and `xprober-proto` messages

use crate::{ProbeResult, TargetDescriptor};
use xprober_proto::{ProberResult, Targets};

impl From<ProbeResult> for ProberResult {
    fn from(r: ProbeResult) -> Self {
        Self {
            worker_name: r.worker_identity,
            metric_name: r.metric_name,
            source_region: r.source_region,
            target_region: r.target_region,
            target_addr: r.target_address,
            probe_type: r.probe_type,
            timestamp: r.timestamp,
            value: r.value,
        }
    }
}

impl From<ProberResult> for ProbeResult {
    fn from(r: ProberResult) -> Self {
        Self {
            metric_name: r.metric_name,
            worker_identity: r.worker_name,
            source_region: r.source_region,
            target_region: r.target_region,
            target_address: r.target_addr,
            probe_type: r.probe_type,
            timestamp: r.timestamp,
            value: r.value,
        }
    }
}

impl From<TargetDescriptor> for Targets {
    fn from(t: TargetDescriptor) -> Self {
        Self {
            prober_type: t.prober_type,
            region: t.region,
            target: t.addresses,
        }
    }
}

impl From<Targets> for TargetDescriptor {
    fn from(t: Targets) -> Self {
        Self {
            region: t.region,
            prober_type: t.prober_type,
            addresses: t.target,
        }
    }
}
