//! Discovery of this agent's own region and address
//!
//! Both values stamp every result the agent produces and are announced to the
//! server by the heartbeat reporter.

use if_addrs::get_if_addrs;
use std::time::Duration;
use tracing::{debug, info};
use xprober_common::{unix_now, ProbeResult, ProbeTarget, Result, XproberError};

/// Instance-metadata endpoint returning the availability zone, e.g. `us-east-1a`
const ZONE_METADATA_URL: &str =
    "http://169.254.169.254/latest/meta-data/placement/availability-zone";

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Who this agent is: its reachable address and the region it probes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub address: String,
    pub region: String,
}

impl AgentIdentity {
    pub fn new(address: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            region: region.into(),
        }
    }

    /// Build a result for `target`, timestamped now
    pub fn result(&self, target: &ProbeTarget, metric_name: &str, value: f64) -> ProbeResult {
        ProbeResult {
            metric_name: metric_name.to_string(),
            worker_identity: self.address.clone(),
            source_region: self.region.clone(),
            target_region: target.region.clone(),
            target_address: target.address.clone(),
            probe_type: target.prober_type.as_str().to_string(),
            timestamp: unix_now(),
            value,
        }
    }
}

/// Resolve region and address, preferring explicit overrides
pub async fn discover(
    region_override: Option<String>,
    address_override: Option<String>,
) -> Result<AgentIdentity> {
    let region = match region_override {
        Some(region) => region,
        None => region_from_instance_metadata().await?,
    };

    let address = match address_override {
        Some(address) => address,
        None => first_ipv4_address()?,
    };

    info!(address = %address, region = %region, "agent metadata resolved");
    Ok(AgentIdentity { address, region })
}

async fn region_from_instance_metadata() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()
        .map_err(|e| XproberError::MetadataError(format!("building HTTP client: {e}")))?;

    let response = client
        .get(ZONE_METADATA_URL)
        .send()
        .await
        .map_err(|e| XproberError::MetadataError(format!("querying instance metadata: {e}")))?;

    if !response.status().is_success() {
        return Err(XproberError::MetadataError(format!(
            "instance metadata returned {}",
            response.status()
        )));
    }

    let zone = response
        .text()
        .await
        .map_err(|e| XproberError::MetadataError(format!("reading instance metadata: {e}")))?;
    debug!(zone = %zone.trim(), "availability zone from instance metadata");

    region_from_zone(&zone)
        .ok_or_else(|| XproberError::MetadataError(format!("unusable availability zone {zone:?}")))
}

/// `us-east-1a` -> `us-east-1`
fn region_from_zone(zone: &str) -> Option<String> {
    let zone = zone.trim();
    let region = match zone.chars().last() {
        Some(c) if c.is_ascii_lowercase() => &zone[..zone.len() - 1],
        _ => zone,
    };

    if region.is_empty() {
        None
    } else {
        Some(region.to_string())
    }
}

fn first_ipv4_address() -> Result<String> {
    let interfaces = get_if_addrs()?;

    interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .find(|ip| ip.is_ipv4())
        .map(|ip| ip.to_string())
        .ok_or_else(|| XproberError::MetadataError("no non-loopback IPv4 address found".into()))
}
