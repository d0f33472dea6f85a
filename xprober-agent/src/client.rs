//! Agent side of the control RPC surface
//!
//! `ControlPlane` is what the agent loops depend on; `RpcClient` implements it
//! over a tonic channel. A channel multiplexes calls over pooled HTTP/2
//! connections, so cloning the client per call is cheap.

use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::info;
use xprober_common::{ProbeResult, Result, TargetDescriptor, XproberError};
use xprober_proto::{
    GetProberTargetsRequest, ProberAgentIpReportRequest, ProberControlClient, ProberResult,
    PushProberResultsRequest,
};

/// Operations the agent needs from the server
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Targets an agent in `source_region` should probe
    async fn get_targets(&self, source_region: &str, source_ip: &str)
        -> Result<Vec<TargetDescriptor>>;

    /// Upload results; returns how many the server accepted
    async fn push_results(&self, results: Vec<ProbeResult>) -> Result<u32>;

    /// Announce this agent's address and region
    async fn report_agent(&self, ip: &str, region: &str) -> Result<()>;
}

/// tonic-backed `ControlPlane`
#[derive(Clone)]
pub struct RpcClient {
    client: ProberControlClient<Channel>,
}

impl RpcClient {
    /// Connect to the server. Every call is bounded by `timeout`.
    pub async fn connect(server_address: &str, timeout: Duration) -> Result<Self> {
        let uri = normalize_server_address(server_address);
        let channel = Endpoint::from_shared(uri.clone())?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await?;

        info!(server = %uri, "connected to server");
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: ProberControlClient::new(channel),
        }
    }
}

#[async_trait]
impl ControlPlane for RpcClient {
    async fn get_targets(
        &self,
        source_region: &str,
        source_ip: &str,
    ) -> Result<Vec<TargetDescriptor>> {
        let response = self
            .client
            .clone()
            .get_prober_targets(GetProberTargetsRequest {
                source_region: source_region.to_string(),
                source_ip: source_ip.to_string(),
            })
            .await?
            .into_inner();

        Ok(response.targets.into_iter().map(TargetDescriptor::from).collect())
    }

    async fn push_results(&self, results: Vec<ProbeResult>) -> Result<u32> {
        let results: Vec<ProberResult> = results.into_iter().map(ProberResult::from).collect();
        let response = self
            .client
            .clone()
            .push_prober_results(PushProberResultsRequest { results })
            .await?
            .into_inner();

        u32::try_from(response.accepted).map_err(|_| {
            XproberError::RpcError(tonic::Status::internal(format!(
                "server reported negative accepted count {}",
                response.accepted
            )))
        })
    }

    async fn report_agent(&self, ip: &str, region: &str) -> Result<()> {
        let response = self
            .client
            .clone()
            .prober_agent_ip_report(ProberAgentIpReportRequest {
                ip: ip.to_string(),
                region: region.to_string(),
            })
            .await?
            .into_inner();

        if response.ok {
            Ok(())
        } else {
            Err(XproberError::RpcError(tonic::Status::unknown(
                "server rejected agent report",
            )))
        }
    }
}

/// `:6001` -> `http://127.0.0.1:6001`; bare `host:port` gains `http://`
pub fn normalize_server_address(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else if addr.starts_with(':') {
        format!("http://127.0.0.1{addr}")
    } else {
        format!("http://{addr}")
    }
}
