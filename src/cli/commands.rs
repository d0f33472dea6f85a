use crate::cli::Commands;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::debug;
use xprober_agent::{ControlPlane, RpcClient};
use xprober_common::{unix_now, ProbeResult, ProberType, TargetDescriptor};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_command(server: &str, command: Commands) -> Result<()> {
    let client = RpcClient::connect(server, RPC_TIMEOUT)
        .await
        .with_context(|| format!("connecting to server at {server}"))?;

    match command {
        Commands::Targets { region, ip } => {
            let targets = client.get_targets(&region, &ip).await?;
            print!("{}", render_targets(&targets));
        }
        Commands::Report { ip, region } => {
            client.report_agent(&ip, &region).await?;
            println!("Reported {ip} in {region}");
        }
        Commands::Push {
            metric,
            value,
            source_region,
            target_region,
            target,
            probe_type,
            worker,
        } => {
            let probe_type = match probe_type {
                Some(t) => t,
                None => probe_type_for(&metric)?.to_string(),
            };
            let result = ProbeResult {
                metric_name: metric,
                worker_identity: worker,
                source_region,
                target_region,
                target_address: target,
                probe_type,
                timestamp: unix_now(),
                value,
            };
            debug!(?result, "pushing");
            let accepted = client.push_results(vec![result]).await?;
            println!("Server accepted {accepted} result(s)");
        }
    }

    Ok(())
}

/// Probe type implied by a metric's module prefix
pub fn probe_type_for(metric: &str) -> Result<ProberType> {
    match metric.split('_').next() {
        Some("ping") => Ok(ProberType::Icmp),
        Some("http") => Ok(ProberType::Http),
        _ => bail!("cannot derive probe type from {metric:?}, pass --probe-type"),
    }
}

pub fn render_targets(targets: &[TargetDescriptor]) -> String {
    if targets.is_empty() {
        return "No targets.\n".to_string();
    }

    let mut rows: Vec<(&str, &str, &str)> = targets
        .iter()
        .flat_map(|t| {
            t.addresses
                .iter()
                .map(move |a| (t.region.as_str(), t.prober_type.as_str(), a.as_str()))
        })
        .collect();
    rows.sort();

    let mut out = format!("{:<20} {:<6} {}\n", "REGION", "TYPE", "ADDRESS");
    out.push_str(&"-".repeat(72));
    out.push('\n');
    for (region, prober_type, address) in rows {
        out.push_str(&format!(
            "{:<20} {:<6} {}\n",
            truncate(region, 20),
            prober_type,
            truncate(address, 45)
        ));
    }
    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
