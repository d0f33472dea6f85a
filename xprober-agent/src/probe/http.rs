//! HTTP reachability with a per-phase timing breakdown
//!
//! Phases are measured separately: name resolution, a raw TCP connect to the
//! resolved address, then a GET pinned to that address. For https the TLS
//! handshake cannot be observed directly, so it is estimated as the
//! first request's time-to-headers minus the connect time minus the
//! time-to-headers of a second request on the kept-alive connection.

use super::{Probe, ProbeOutcome};
use crate::metadata::AgentIdentity;
use async_trait::async_trait;
use reqwest::Url;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};
use xprober_common::metrics::{
    HTTP_CONNECT_DURATION, HTTP_INTERFACE_SUCCESS, HTTP_PROCESSING_DURATION,
    HTTP_RESOLVE_DURATION, HTTP_TLS_DURATION, HTTP_TRANSFER_DURATION,
};
use xprober_common::{ProbeResult, ProbeTarget};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe issuing a GET against the target URL
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
        let mut batch = Vec::new();
        let measured = tokio::time::timeout(self.timeout, measure(agent, target, &mut batch)).await;

        match measured {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                info!(address = %target.address, reason = %reason, "http probe failed");
                batch.push(agent.result(target, HTTP_INTERFACE_SUCCESS, 0.0));
            }
            Err(_) => {
                info!(address = %target.address, timeout = ?self.timeout, "http probe timed out");
                batch.retain(|r| r.metric_name == HTTP_RESOLVE_DURATION);
                batch.push(agent.result(target, HTTP_INTERFACE_SUCCESS, 0.0));
            }
        }

        ProbeOutcome::Batch(batch)
    }
}

/// Fill `batch` with timings. On error, `batch` holds whatever was measured so far.
async fn measure(
    agent: &AgentIdentity,
    target: &ProbeTarget,
    batch: &mut Vec<ProbeResult>,
) -> Result<(), String> {
    let url = target_url(&target.address)?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| format!("no host in {url}"))?;
    let port = url.port_or_known_default().unwrap_or(80);
    let is_tls = url.scheme() == "https";

    let started = Instant::now();
    let addr = resolve(&host, port).await?;
    batch.push(agent.result(target, HTTP_RESOLVE_DURATION, millis(started.elapsed())));

    let started = Instant::now();
    TcpStream::connect(addr)
        .await
        .map_err(|e| format!("connecting to {addr}: {e}"))?;
    let connect = started.elapsed();

    let client = reqwest::Client::builder()
        .resolve(&host, addr)
        .build()
        .map_err(|e| format!("building client: {e}"))?;

    let started = Instant::now();
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let first_headers = started.elapsed();

    let status = response.status();
    if status.as_u16() > 300 {
        return Err(format!("unexpected status {status}"));
    }

    let started = Instant::now();
    response
        .bytes()
        .await
        .map_err(|e| format!("reading body: {e}"))?;
    let transfer = started.elapsed();

    let (tls, processing) = if is_tls {
        match warm_headers(&client, url).await {
            Some(warm) => (first_headers.saturating_sub(connect).saturating_sub(warm), warm),
            None => (Duration::ZERO, first_headers.saturating_sub(connect)),
        }
    } else {
        (Duration::ZERO, first_headers.saturating_sub(connect))
    };

    debug!(
        address = %target.address,
        ?connect,
        ?tls,
        ?processing,
        ?transfer,
        "http timings"
    );

    batch.push(agent.result(target, HTTP_INTERFACE_SUCCESS, 1.0));
    batch.push(agent.result(target, HTTP_TLS_DURATION, millis(tls)));
    batch.push(agent.result(target, HTTP_CONNECT_DURATION, millis(connect)));
    batch.push(agent.result(target, HTTP_PROCESSING_DURATION, millis(processing)));
    batch.push(agent.result(target, HTTP_TRANSFER_DURATION, millis(transfer)));
    Ok(())
}

/// Time-to-headers of a request reusing the pooled connection
async fn warm_headers(client: &reqwest::Client, url: Url) -> Option<Duration> {
    let started = Instant::now();
    let response = client.get(url).send().await.ok()?;
    let elapsed = started.elapsed();
    let _ = response.bytes().await;
    Some(elapsed)
}

/// Prefer an IPv4 address, fall back to whatever resolved first
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("resolving {host}: {e}"))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| format!("{host} resolved to no addresses"))
}

fn target_url(address: &str) -> Result<Url, String> {
    let raw = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    Url::parse(&raw).map_err(|e| format!("parsing target URL {raw:?}: {e}"))
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
