// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use reti_algod::{AlgodClient, AlgodError};
use tracing::info;

/// Rounds sampled per refresh.
const SAMPLE_ROUNDS: u64 = 10;

/// Tracks the average inter-block duration from the most recent blocks.
/// The key watcher needs it to convert validity-round distances into wall
/// time; a refresh failure keeps the previous estimate.
pub struct BlockTimeTracker {
    algod: Arc<AlgodClient>,
    average: RwLock<Duration>,
}

impl BlockTimeTracker {
    pub fn new(algod: Arc<AlgodClient>) -> Self {
        Self {
            algod,
            average: RwLock::new(Duration::ZERO),
        }
    }

    pub fn average_block_time(&self) -> Duration {
        *self.average.read().expect("block time lock poisoned")
    }

    /// Recomputes the average over the deltas of the latest N block
    /// timestamps.
    pub async fn refresh(&self) -> Result<(), AlgodError> {
        let status = self.algod.status().await?;
        let first = status.last_round.saturating_sub(SAMPLE_ROUNDS);
        let mut timestamps = Vec::with_capacity(SAMPLE_ROUNDS as usize);
        for round in first..status.last_round {
            timestamps.push(self.algod.block_timestamp(round).await?);
        }
        let deltas = timestamps.windows(2).map(|pair| (pair[1] - pair[0]).max(0));
        let total: i64 = deltas.sum();
        if timestamps.len() > 1 {
            let average =
                Duration::from_secs_f64(total as f64 / (timestamps.len() - 1) as f64);
            *self.average.write().expect("block time lock poisoned") = average;
            info!(?average, "average block time refreshed");
        }
        Ok(())
    }
}
