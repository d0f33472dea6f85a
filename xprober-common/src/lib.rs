//! Shared types between xprober agents and the server
//!
//! This crate defines the records that cross every boundary:
//! - `ProbeResult`: one measurement, immutable once produced
//! - `TargetDescriptor`: a region/prober-type group of addresses
//! - `ProbeTarget`: one address a single worker measures
//! - `WorkerIdentity` / `ResultIdentity`: the keys both sides index by

pub mod error;
pub mod logging;
pub mod metrics;
pub mod signal;
pub mod wire;

pub use error::{Result, XproberError};

use std::fmt;

/// The closed set of probe kinds an agent knows how to run
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ProberType {
    Http,
    Icmp,
}

impl ProberType {
    pub const ALL: [ProberType; 2] = [ProberType::Http, ProberType::Icmp];

    /// Wire tag for this prober type
    pub fn as_str(&self) -> &'static str {
        match self {
            ProberType::Http => "http",
            ProberType::Icmp => "icmp",
        }
    }

    /// Parse a wire tag. Unknown tags yield `None` so callers can drop them.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "http" => Some(ProberType::Http),
            "icmp" => Some(ProberType::Icmp),
            _ => None,
        }
    }
}

impl fmt::Display for ProberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group of addresses to probe in one region with one prober type.
///
/// `prober_type` stays a plain string: the server forwards whatever the
/// operator configured and each agent decides what it can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub region: String,
    pub prober_type: String,
    pub addresses: Vec<String>,
}

impl TargetDescriptor {
    pub fn new(
        region: impl Into<String>,
        prober_type: impl Into<String>,
        addresses: Vec<String>,
    ) -> Self {
        Self {
            region: region.into(),
            prober_type: prober_type.into(),
            addresses,
        }
    }

    /// Mesh descriptor: ICMP targets derived from agent addresses
    pub fn mesh(region: impl Into<String>, addresses: Vec<String>) -> Self {
        Self::new(region, ProberType::Icmp.as_str(), addresses)
    }

    /// Expand into one `ProbeTarget` per address.
    ///
    /// Returns an empty list when the prober type is not one this build knows.
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        let Some(prober_type) = ProberType::from_tag(&self.prober_type) else {
            return Vec::new();
        };

        self.addresses
            .iter()
            .map(|address| ProbeTarget {
                region: self.region.clone(),
                prober_type,
                address: address.clone(),
            })
            .collect()
    }
}

/// One address measured by one worker
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ProbeTarget {
    pub region: String,
    pub prober_type: ProberType,
    pub address: String,
}

impl ProbeTarget {
    pub fn new(region: impl Into<String>, prober_type: ProberType, address: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            prober_type,
            address: address.into(),
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity::new(&self.region, &self.address, self.prober_type)
    }
}

/// Key of one running worker: target region, address, prober type.
///
/// Compared field by field; the `region/address/type` form is for display only.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct WorkerIdentity(String, String, ProberType);

impl WorkerIdentity {
    pub fn new(region: &str, address: &str, prober_type: ProberType) -> Self {
        Self(region.to_string(), address.to_string(), prober_type)
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.0, self.1, self.2)
    }
}

/// A single measurement.
///
/// `worker_identity` names the producing agent (its address), so results for
/// the same target from different agents never overwrite each other.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub metric_name: String,
    pub worker_identity: String,
    pub source_region: String,
    pub target_region: String,
    pub target_address: String,
    pub probe_type: String,
    /// Unix seconds
    pub timestamp: i64,
    pub value: f64,
}

impl ProbeResult {
    /// Storage key on the server. Last write for a key wins.
    pub fn identity(&self) -> ResultIdentity {
        ResultIdentity {
            worker_identity: self.worker_identity.clone(),
            metric_name: self.metric_name.clone(),
            source_region: self.source_region.clone(),
            target_region: self.target_region.clone(),
            probe_type: self.probe_type.clone(),
            target_address: self.target_address.clone(),
        }
    }
}

/// Structured form of the result key; field-wise equality rules out the
/// collisions a plain string concatenation would allow.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ResultIdentity {
    pub worker_identity: String,
    pub metric_name: String,
    pub source_region: String,
    pub target_region: String,
    pub probe_type: String,
    pub target_address: String,
}

/// Current wall-clock time in unix seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
