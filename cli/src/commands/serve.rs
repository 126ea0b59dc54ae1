// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Standalone status API
//!
//! Serves `/status`, `/health` and `/metrics` for a process whose player
//! count is managed outside warpgate, e.g. behind a proxy or during
//! maintenance windows.

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use warpgate_core::domain::config::WarpgateConfig;
use warpgate_core::presentation::status_api::{self, PlayerCapacity};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (default: `this_address` from configuration)
    #[arg(long, env = "WARPGATE_LISTEN", value_name = "HOST:PORT")]
    listen: Option<String>,

    /// Players currently online
    #[arg(long, default_value_t = 0)]
    online: u32,

    /// Answer `loading` until the process is stopped
    #[arg(long)]
    loading: bool,

    /// Do not install the Prometheus recorder
    #[arg(long)]
    no_metrics: bool,
}

pub async fn execute(args: ServeArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = WarpgateConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;

    let addr = args
        .listen
        .or_else(|| config.this_address.clone())
        .context("No listen address; pass --listen or set `this_address`")?;

    let metrics = if args.no_metrics {
        None
    } else {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?,
        )
    };

    let capacity = Arc::new(PlayerCapacity::new(config.max_players));
    capacity.set_online(args.online);
    if !args.loading {
        capacity.mark_ready();
    }

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        max_players = ?config.max_players,
        online = args.online,
        loading = args.loading,
        "Serving status API"
    );
    status_api::serve(listener, status_api::app(capacity, metrics), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Status API shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
