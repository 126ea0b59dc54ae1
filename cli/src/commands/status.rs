// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote gate probing
//!
//! Asks remote processes for their capacity exactly as a jump would, so an
//! operator can see what players will be told before they try.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use warpgate_core::domain::config::WarpgateConfig;
use warpgate_core::domain::server_status::{ServerStatus, ServerStatusProbe};
use warpgate_core::infrastructure::HttpStatusProbe;

#[derive(Args)]
pub struct StatusArgs {
    /// Remote gate name or `host:port` (default: every remote gate)
    #[arg(value_name = "TARGET")]
    target: Option<String>,

    /// Probe timeout in milliseconds (default: from configuration)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ProbeResult {
    gate: Option<String>,
    address: String,
    status: ServerStatus,
    elapsed_ms: u128,
}

pub async fn execute(args: StatusArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = WarpgateConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.status_probe_timeout);

    let targets = targets(&config, args.target.as_deref());
    if targets.is_empty() {
        println!("{}", "No remote gates configured.".yellow());
        return Ok(());
    }

    let probe = Arc::new(HttpStatusProbe::from_config(&config).context("Failed to build HTTP client")?);
    let mut probes = JoinSet::new();
    for (gate, address) in targets {
        let probe = probe.clone();
        probes.spawn(async move {
            let started = Instant::now();
            let status = probe.query(&address, timeout).await;
            ProbeResult {
                gate,
                address,
                status,
                elapsed_ms: started.elapsed().as_millis(),
            }
        });
    }

    let mut results = Vec::new();
    while let Some(result) = probes.join_next().await {
        results.push(result.context("Probe task failed")?);
    }
    results.sort_by(|a, b| a.gate.cmp(&b.gate).then_with(|| a.address.cmp(&b.address)));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        let status = match result.status {
            ServerStatus::Accept => result.status.to_string().green(),
            ServerStatus::Full | ServerStatus::Loading => result.status.to_string().yellow(),
            ServerStatus::Unreachable | ServerStatus::UnknownError => result.status.to_string().red(),
        };
        println!(
            "  {:<16} {:<24} {} ({} ms)",
            result.gate.as_deref().unwrap_or("-").bold(),
            result.address,
            status,
            result.elapsed_ms
        );
    }

    Ok(())
}

/// `(gate name, address)` pairs to probe.
fn targets(config: &WarpgateConfig, target: Option<&str>) -> Vec<(Option<String>, String)> {
    match target {
        Some(target) => match config.remote_address(target) {
            Some(address) => vec![(Some(target.to_string()), address.to_string())],
            None => vec![(None, target.to_string())],
        },
        None => config
            .remote_gates
            .iter()
            .map(|remote| (Some(remote.name.clone()), remote.address.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgate_core::domain::config::RemoteGate;

    #[test]
    fn test_targets_resolve_gate_names() {
        let config = WarpgateConfig {
            remote_gates: vec![RemoteGate {
                name: "Beta".to_string(),
                address: "10.0.0.2:27080".to_string(),
            }],
            ..WarpgateConfig::default()
        };

        assert_eq!(
            targets(&config, Some("Beta")),
            vec![(Some("Beta".to_string()), "10.0.0.2:27080".to_string())]
        );
        assert_eq!(
            targets(&config, Some("127.0.0.1:9000")),
            vec![(None, "127.0.0.1:9000".to_string())]
        );
        assert_eq!(targets(&config, None).len(), 1);
    }
}
