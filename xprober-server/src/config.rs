//! Server configuration file
//!
//! ```yaml
//! rpc_listen_addr: ":6001"
//! metrics_listen_addr: ":6002"
//! prober_targets:
//!   - prober_type: http
//!     region: us-east-1
//!     target: ["https://example.com"]
//! ```
//!
//! Unknown fields at any level are a load error. Individual bad entries in
//! `prober_targets` are skipped with a warning.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tracing::warn;
use xprober_common::{Result, TargetDescriptor, XproberError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the control RPC server binds (`:port` binds all interfaces)
    pub rpc_listen_addr: String,

    /// Address the `/metrics` endpoint binds
    pub metrics_listen_addr: String,

    #[serde(default)]
    pub prober_targets: Vec<TargetConfig>,
}

/// One operator-configured target group
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub prober_type: String,
    pub region: String,
    #[serde(default)]
    pub target: Vec<String>,
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            XproberError::ConfigError(format!("reading config file {}: {}", path.display(), e))
        })?;

        Self::parse(&data).map_err(|e| match e {
            XproberError::ConfigError(msg) => {
                XproberError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)
            .map_err(|e| XproberError::ConfigError(format!("parsing YAML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_listen_addr.trim().is_empty() {
            return Err(XproberError::ConfigError("rpc_listen_addr is required".into()));
        }
        if self.metrics_listen_addr.trim().is_empty() {
            return Err(XproberError::ConfigError(
                "metrics_listen_addr is required".into(),
            ));
        }
        Ok(())
    }

    /// Usable target groups; malformed entries are dropped
    pub fn target_descriptors(&self) -> Vec<TargetDescriptor> {
        self.prober_targets
            .iter()
            .filter_map(|entry| {
                if entry.region.trim().is_empty() || entry.prober_type.trim().is_empty() {
                    warn!(?entry, "skipping target entry without region or prober_type");
                    return None;
                }

                let addresses: Vec<String> = entry
                    .target
                    .iter()
                    .map(|a| a.trim())
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
                if addresses.is_empty() {
                    warn!(region = %entry.region, prober_type = %entry.prober_type, "skipping target entry without addresses");
                    return None;
                }

                Some(TargetDescriptor::new(
                    entry.region.clone(),
                    entry.prober_type.clone(),
                    addresses,
                ))
            })
            .collect()
    }
}

/// Parse a listen address, handling the `:port` shorthand
pub fn listen_socket_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let bind = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    bind.parse().map_err(|e: std::net::AddrParseError| XproberError::InvalidAddress {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}
