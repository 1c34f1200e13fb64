// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use casino_oracle::config::{CasinoNodeConfig, DEFAULT_CONFIG_PATH};
use casino_oracle::metrics::OracleMetrics;
use casino_oracle::node::run_casino_node;
use casino_oracle::telemetry::init_logging;
use casino_oracle_config::Config;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version)]
struct Args {
    #[clap(long, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = CasinoNodeConfig::load(&args.config_path)?;
    init_logging(&config.server.log_level)?;
    info!("Loaded config from {}", args.config_path.display());

    let prometheus_registry = OracleMetrics::new_registry()?;
    let cancel = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        shutdown.cancel();
    });

    let handle = run_casino_node(config, prometheus_registry, cancel).await?;
    handle
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
}
