// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process supervisor: starts the worker loops, wires the shared
//! cancellation token through them, and handles shutdown signals.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use reti_algod::AlgodClient;
use reti_core::RetiClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    block_time::BlockTimeTracker, epoch::EpochUpdater, key_watcher::KeyWatcher,
    monitoring::start_monitoring,
};

const HTTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const DAEMON_VERSION: &str = concat!("reti-nodemgr/", env!("CARGO_PKG_VERSION"));

pub struct Daemon {
    algod: Arc<AlgodClient>,
    reti: Arc<RetiClient>,
    port: u16,
    epoch_minutes: u64,
}

impl Daemon {
    pub fn new(algod: Arc<AlgodClient>, reti: Arc<RetiClient>, port: u16, epoch_minutes: u64) -> Self {
        Self {
            algod,
            reti,
            port,
            epoch_minutes,
        }
    }

    /// Runs until a shutdown signal arrives or a worker loop requests a
    /// restart (manager rotation). Startup failures are fatal.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(version = DAEMON_VERSION, "starting daemon");

        self.reti
            .load_state(&shutdown)
            .await
            .context("loading validator state")?;

        // The watcher cannot reason about key validity without a block
        // time estimate, so the first computation failing is fatal.
        let block_times = Arc::new(BlockTimeTracker::new(self.algod.clone()));
        block_times
            .refresh()
            .await
            .context("computing initial block time")?;

        let mut workers = JoinSet::new();

        // The key watcher receives the root token: observing a manager
        // rotation cancels the whole process so it restarts with the new
        // manager's keys required up front.
        let watcher = KeyWatcher::new(
            self.algod.clone(),
            self.reti.clone(),
            block_times.clone(),
            DAEMON_VERSION,
        );
        workers.spawn(watcher.run(shutdown.clone()));

        let epoch = EpochUpdater::new(self.algod.clone(), self.reti.clone(), self.epoch_minutes);
        workers.spawn(epoch.run(shutdown.child_token()));

        let http = start_monitoring(self.port, shutdown.child_token());

        workers.spawn(wait_for_shutdown_signal(shutdown.clone()));

        shutdown.cancelled().await;
        info!("shutting down, waiting on background tasks");
        while workers.join_next().await.is_some() {}
        let _ = tokio::time::timeout(HTTP_SHUTDOWN_GRACE, http).await;
        info!("exited");
        Ok(())
    }
}

/// Cancels `shutdown` on SIGINT or SIGTERM. Resolves quietly if the token
/// fires first for some other reason.
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    let sigterm = async {
        #[cfg(unix)]
        {
            let mut stream =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("installing SIGTERM handler");
            stream.recv().await;
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = shutdown.cancelled() => return,
        result = tokio::signal::ctrl_c() => {
            if result.is_err() {
                return;
            }
            info!("received interrupt");
        }
        _ = sigterm => info!("received SIGTERM"),
    }
    shutdown.cancel();
}
