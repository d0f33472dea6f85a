//! Exported gauges and the `/metrics` endpoint

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use xprober_common::metrics::{
    HTTP_CONNECT_DURATION, HTTP_INTERFACE_SUCCESS, HTTP_PROCESSING_DURATION,
    HTTP_RESOLVE_DURATION, HTTP_TLS_DURATION, HTTP_TRANSFER_DURATION, PING_LATENCY,
    PING_PACKAGE_DROP,
};
use xprober_common::{Result, XproberError};

pub const ICMP_LABELS: [&str; 2] = ["source_region", "target_region"];
pub const HTTP_LABELS: [&str; 2] = ["source_region", "addr"];

const GAUGES: [(&str, &str, [&str; 2]); 8] = [
    (PING_LATENCY, "Duration of ping prober", ICMP_LABELS),
    (PING_PACKAGE_DROP, "Rate of ping package drop", ICMP_LABELS),
    (HTTP_INTERFACE_SUCCESS, "Whether the http probe succeeded", HTTP_LABELS),
    (HTTP_RESOLVE_DURATION, "Domain resolve time", HTTP_LABELS),
    (HTTP_TLS_DURATION, "TLS handshake time", HTTP_LABELS),
    (HTTP_CONNECT_DURATION, "HTTP connect time", HTTP_LABELS),
    (HTTP_PROCESSING_DURATION, "HTTP processing time", HTTP_LABELS),
    (HTTP_TRANSFER_DURATION, "HTTP transfer time", HTTP_LABELS),
];

/// The registry holding one gauge vector per probe metric
#[derive(Clone)]
pub struct ProberMetrics {
    registry: Registry,
    gauges: Arc<HashMap<&'static str, GaugeVec>>,
}

impl ProberMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();

        for (name, help, labels) in GAUGES {
            let gauge = GaugeVec::new(Opts::new(name, help), &labels)
                .map_err(|e| XproberError::MetricsError(format!("creating {name}: {e}")))?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(|e| XproberError::MetricsError(format!("registering {name}: {e}")))?;
            gauges.insert(name, gauge);
        }

        Ok(Self {
            registry,
            gauges: Arc::new(gauges),
        })
    }

    pub fn gauge(&self, name: &str) -> Option<&GaugeVec> {
        self.gauges.get(name)
    }

    /// Render every gauge in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| XproberError::MetricsError(format!("encoding metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| XproberError::MetricsError(format!("metrics are not utf-8: {e}")))
    }
}

/// Serve `/metrics` and `/healthz` on `listener` until `cancel` fires
pub async fn serve(metrics: ProberMetrics, listener: TcpListener, cancel: CancellationToken) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "metrics server started");
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;

    if let Err(e) = result {
        error!(error = %e, "metrics server error");
    }
}

async fn metrics_handler(State(metrics): State<ProberMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_all_gauges_registered() {
        let metrics = ProberMetrics::new().unwrap();
        for (name, _, _) in GAUGES {
            assert!(metrics.gauge(name).is_some(), "missing {name}");
        }
        assert!(metrics.gauge("unknown_metric").is_none());
    }

    #[test]
    fn test_encode_includes_labels() {
        let metrics = ProberMetrics::new().unwrap();
        metrics
            .gauge(PING_LATENCY)
            .unwrap()
            .with_label_values(&["us-east", "eu-west"])
            .set(12.5);

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            "ping_latency_millonseconds{source_region=\"us-east\",target_region=\"eu-west\"} 12.5"
        ));
    }

    async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_endpoints() {
        let metrics = ProberMetrics::new().unwrap();
        metrics
            .gauge(HTTP_INTERFACE_SUCCESS)
            .unwrap()
            .with_label_values(&["us-east", "https://a.example"])
            .set(1.0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(metrics, listener, cancel.clone()));

        let health = http_get(addr, "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("ok"));

        let body = http_get(addr, "/metrics").await;
        assert!(body.contains("http_interface_success{addr=\"https://a.example\",source_region=\"us-east\"} 1"));

        cancel.cancel();
        server.await.unwrap();
    }
}
