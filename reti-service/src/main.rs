// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod block_time;
mod daemon;
mod epoch;
mod key_watcher;
mod monitoring;
mod options;
mod participation;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;
use is_terminal::IsTerminal as _;
use reti_algod::AlgodClient;
use reti_core::RetiClient;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{daemon::Daemon, options::NodeManagerOptions};

#[tokio::main]
async fn main() {
    let options = NodeManagerOptions::parse();

    let default_filter = if options.debug_enabled() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(error) = run(options).await {
        tracing::error!("fatal: {error:#}");
        std::process::exit(1);
    }
}

async fn run(options: NodeManagerOptions) -> anyhow::Result<()> {
    let reti_app_id = options.resolved_reti_app_id()?;
    if options.validator_id == 0 || options.node_num == 0 {
        anyhow::bail!(
            "both the validator id (RETI_VALIDATORID) and node number (RETI_NODENUM) must be set"
        );
    }

    let connection = options.resolve_connection()?;
    let algod = Arc::new(AlgodClient::new(&connection).context("building algod client")?);
    // Hit the node once up front so a bad endpoint fails fast.
    let status = algod
        .status()
        .await
        .context("verifying algod connectivity")?;
    info!(round = status.last_round, "connected to algod");
    if let Some(nfd_url) = &options.nfd_api_url {
        tracing::debug!(%nfd_url, "NFD API endpoint configured");
    }

    let signer = options.build_signer()?;
    let reti = Arc::new(RetiClient::new(
        reti_app_id,
        options.validator_id,
        options.node_num,
        algod.clone(),
        signer,
    ));

    let shutdown = CancellationToken::new();
    Daemon::new(algod, reti, options.port, options.epoch_minutes)
        .run(shutdown)
        .await
}
