//! ICMP reachability via the system `ping` binary
//!
//! Sends a quick burst of echo requests and reads the summary lines for the
//! packet-loss percentage and the average round-trip time.

use super::{Probe, ProbeOutcome};
use crate::metadata::AgentIdentity;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use xprober_common::metrics::{PING_LATENCY, PING_PACKAGE_DROP};
use xprober_common::ProbeTarget;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const PING_ARGS: [&str; 8] = ["-q", "-A", "-f", "-s", "100", "-W", "1000", "-c"];
const PING_COUNT: &str = "50";

/// Probe backed by `ping`
#[derive(Debug, Clone)]
pub struct IcmpProbe {
    program: String,
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for IcmpProbe {
    fn default() -> Self {
        Self::new("ping", DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Probe for IcmpProbe {
    async fn probe(&self, agent: &AgentIdentity, target: &ProbeTarget) -> ProbeOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(PING_ARGS)
            .arg(PING_COUNT)
            .arg(&target.address)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ProbeOutcome::Failed(format!("spawning {}: {}", self.program, e)),
            Err(_) => return ProbeOutcome::Failed(format!("ping timed out after {:?}", self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(summary) = parse_ping_summary(&stdout) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                address = %target.address,
                status = %output.status,
                stderr = %stderr.trim(),
                "ping produced no usable summary"
            );
            return ProbeOutcome::Failed(format!("ping exited with {}", output.status));
        };

        debug!(
            address = %target.address,
            loss_percent = summary.loss_percent,
            avg_rtt_ms = ?summary.avg_rtt_ms,
            "ping summary"
        );

        let mut batch = vec![agent.result(target, PING_PACKAGE_DROP, summary.loss_percent)];
        // Total loss prints no rtt line; the drop rate alone still says something.
        if let Some(avg) = summary.avg_rtt_ms {
            batch.push(agent.result(target, PING_LATENCY, avg));
        }
        ProbeOutcome::Batch(batch)
    }
}

/// Figures extracted from `ping -q` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    pub loss_percent: f64,
    pub avg_rtt_ms: Option<f64>,
}

/// Parse the statistics block printed by iputils/busybox `ping`
pub fn parse_ping_summary(output: &str) -> Option<PingSummary> {
    let mut loss_percent = None;
    let mut avg_rtt_ms = None;

    for line in output.lines() {
        if line.contains("packets transmitted") {
            loss_percent = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .find_map(|token| token.strip_suffix('%'))
                .and_then(|pct| pct.parse::<f64>().ok());
        } else if line.contains("min/avg/max") {
            avg_rtt_ms = line
                .split('=')
                .nth(1)
                .and_then(|values| values.split_whitespace().next())
                .and_then(|values| values.split('/').nth(1))
                .and_then(|avg| avg.parse::<f64>().ok());
        }
    }

    loss_percent.map(|loss_percent| PingSummary {
        loss_percent,
        avg_rtt_ms,
    })
}
