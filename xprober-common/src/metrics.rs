//! Metric vocabulary shared by probes and the server aggregator
//!
//! Names follow `module_type_unit`; the middle segment is the metric type the
//! aggregator keys on.

pub const PING_LATENCY: &str = "ping_latency_millonseconds";
pub const PING_PACKAGE_DROP: &str = "ping_packageDrop_rate";

pub const HTTP_RESOLVE_DURATION: &str = "http_resolveDuration_millonseconds";
pub const HTTP_TLS_DURATION: &str = "http_tlsDuration_millonseconds";
pub const HTTP_CONNECT_DURATION: &str = "http_connectDuration_millonseconds";
pub const HTTP_PROCESSING_DURATION: &str = "http_processingDuration_millonseconds";
pub const HTTP_TRANSFER_DURATION: &str = "http_transferDuration_millonseconds";
pub const HTTP_INTERFACE_SUCCESS: &str = "http_interface_success";

const SEPARATOR: char = '_';

/// Extract the metric type segment, e.g. `latency` from `ping_latency_millonseconds`
pub fn metric_type(metric_name: &str) -> Option<&str> {
    let mut parts = metric_name.split(SEPARATOR);
    parts.next()?;
    parts.next().filter(|segment| !segment.is_empty())
}
