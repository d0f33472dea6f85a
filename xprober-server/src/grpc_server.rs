//! gRPC server implementation
//!
//! Implements `ProberControl`: target hand-out, result ingestion, and agent
//! heartbeats.

use crate::roster::AgentRoster;
use crate::store::ResultStores;
use crate::target_pool::TargetPool;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use xprober_common::ProbeResult;
use xprober_proto::{
    GetProberTargetsRequest, GetProberTargetsResponse, ProberAgentIpReportRequest,
    ProberAgentIpReportResponse, ProberControl, ProberControlServer, PushProberResultsRequest,
    PushProberResultsResponse, Targets,
};

/// gRPC service implementation
#[derive(Clone)]
pub struct ControlService {
    pool: TargetPool,
    roster: AgentRoster,
    stores: ResultStores,
}

impl ControlService {
    pub fn new(pool: TargetPool, roster: AgentRoster, stores: ResultStores) -> Self {
        Self {
            pool,
            roster,
            stores,
        }
    }

    pub fn into_server(self) -> ProberControlServer<Self> {
        ProberControlServer::new(self)
    }
}

#[tonic::async_trait]
impl ProberControl for ControlService {
    async fn get_prober_targets(
        &self,
        request: Request<GetProberTargetsRequest>,
    ) -> Result<Response<GetProberTargetsResponse>, Status> {
        let req = request.into_inner();
        let targets: Vec<Targets> = self
            .pool
            .targets_for(&req.source_region)
            .into_iter()
            .map(Targets::from)
            .collect();

        debug!(
            source_region = %req.source_region,
            source_ip = %req.source_ip,
            groups = targets.len(),
            "handing out targets"
        );

        Ok(Response::new(GetProberTargetsResponse { targets }))
    }

    async fn push_prober_results(
        &self,
        request: Request<PushProberResultsRequest>,
    ) -> Result<Response<PushProberResultsResponse>, Status> {
        let results = request.into_inner().results;
        let accepted = results.len();

        let mut unknown = 0usize;
        for result in results {
            if !self.stores.store(ProbeResult::from(result)) {
                unknown += 1;
            }
        }
        if unknown > 0 {
            warn!(unknown, "dropped results with unknown probe type");
        }

        Ok(Response::new(PushProberResultsResponse {
            accepted: i32::try_from(accepted).unwrap_or(i32::MAX),
        }))
    }

    async fn prober_agent_ip_report(
        &self,
        request: Request<ProberAgentIpReportRequest>,
    ) -> Result<Response<ProberAgentIpReportResponse>, Status> {
        let req = request.into_inner();
        if req.ip.trim().is_empty() || req.region.trim().is_empty() {
            return Err(Status::invalid_argument("ip and region are required"));
        }

        debug!(ip = %req.ip, region = %req.region, "agent heartbeat");
        self.roster.report(req.ip, req.region);

        Ok(Response::new(ProberAgentIpReportResponse { ok: true }))
    }
}

/// Serve `service` on `listener` until `cancel` fires
pub async fn serve(
    service: ControlService,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "gRPC server started");
    }

    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            cancel.cancelled().await
        })
        .await
}
