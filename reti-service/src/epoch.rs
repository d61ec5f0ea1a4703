// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The epoch updater: wakes at each wall-clock epoch boundary and issues
//! one epoch-balance-update per locally-owned pool. The contract itself
//! enforces the round-based boundary; the daemon only has to submit
//! promptly after it, so "too early" failures are retried on a short
//! fixed delay.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use reti_algod::AlgodClient;
use reti_core::{constants::MANAGER_MIN_SPENDABLE, RetiClient, RetiError, EPOCH_UPDATE_POLICY};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Time until the next boundary of the `epoch_minutes` grid. Always in
/// the half-open interval `(0, epoch_minutes]`: landing exactly on a
/// boundary schedules the one after it.
pub fn duration_to_next_epoch(now_secs: u64, epoch_minutes: u64) -> Duration {
    let interval = epoch_minutes.max(1) * 60;
    let remainder = now_secs % interval;
    // Round to the nearest boundary, then step forward if that landed on
    // or behind the current instant.
    let rounded = if remainder * 2 >= interval {
        now_secs - remainder + interval
    } else {
        now_secs - remainder
    };
    let mut delta = rounded as i64 - now_secs as i64;
    if delta <= 0 {
        delta += interval as i64;
    }
    Duration::from_secs(delta as u64)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

pub struct EpochUpdater {
    algod: Arc<AlgodClient>,
    reti: Arc<RetiClient>,
    epoch_minutes: u64,
}

impl EpochUpdater {
    pub fn new(algod: Arc<AlgodClient>, reti: Arc<RetiClient>, epoch_minutes: u64) -> Self {
        Self {
            algod,
            reti,
            epoch_minutes,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        info!(epoch_minutes = self.epoch_minutes, "starting epoch updater");
        loop {
            let wait = duration_to_next_epoch(unix_now(), self.epoch_minutes);
            info!(?wait, "next epoch boundary scheduled");
            tokio::select! {
                _ = token.cancelled() => {
                    info!("epoch updater exiting");
                    return;
                }
                _ = tokio::time::sleep(wait) => self.process_boundary(&token).await,
            }
        }
    }

    /// Fans out one update task per local pool; the fan-out is bounded by
    /// the pool count and every task runs its own retry schedule.
    async fn process_boundary(&self, token: &CancellationToken) {
        let info = self.reti.info();
        let manager = info.config.manager;

        let mut tasks = JoinSet::new();
        for (&pool_id, &pool_app_id) in &info.local_pools {
            let algod = self.algod.clone();
            let reti = self.reti.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let account = algod.account(&manager.to_string()).await?;
                if account.spendable() < MANAGER_MIN_SPENDABLE {
                    return Err(RetiError::ManagerInsufficientBalance {
                        pool_app_id,
                        available: account.spendable(),
                        required: MANAGER_MIN_SPENDABLE,
                    });
                }
                // All errors count as transient here: submitting slightly
                // before the on-chain boundary is the expected failure.
                EPOCH_UPDATE_POLICY
                    .run(&token, |_| true, || {
                        reti.epoch_balance_update(&token, pool_id, pool_app_id, manager)
                    })
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => error!(%error, "epoch balance update failed"),
                Err(join_error) => error!(%join_error, "epoch update task panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    /// Seconds past midnight for readable test cases.
    fn at(hours: u64, minutes: u64, seconds: u64) -> u64 {
        hours * 3600 + minutes * 60 + seconds
    }

    #[test_case(at(11, 10, 15), 60, 2_985.0; "mid hour waits for the next full hour")]
    #[test_case(at(11, 55, 15), 60, 285.0; "rounds up close to the boundary")]
    #[test_case(at(0, 45, 0), 15, 900.0; "exact boundary schedules the following one")]
    #[test_case(at(0, 30, 0), 60, 1_800.0; "half hour rounds to the next hour")]
    #[test_case(at(12, 0, 0), 24 * 60, 12.0 * 3600.0; "noon is half a day from midnight")]
    #[test_case(at(0, 7, 30), 15, 450.0; "half interval rounds forward")]
    fn boundary_cases(now: u64, epoch_minutes: u64, expected_secs: f64) {
        let dur = duration_to_next_epoch(now, epoch_minutes);
        assert!(
            (dur.as_secs_f64() - expected_secs).abs() < 0.01,
            "expected ~{expected_secs}s, got {dur:?}"
        );
    }

    #[test]
    fn always_within_one_period_and_periodic() {
        for epoch_minutes in [1u64, 15, 60, 1440] {
            let interval = epoch_minutes * 60;
            for now in (0..3 * interval).step_by(7) {
                let dur = duration_to_next_epoch(now, epoch_minutes);
                assert!(
                    dur > Duration::ZERO && dur <= Duration::from_secs(interval),
                    "dur {dur:?} out of (0, {interval}] at now={now}"
                );
                assert_eq!(
                    dur,
                    duration_to_next_epoch(now + interval, epoch_minutes),
                    "not periodic at now={now}"
                );
            }
        }
    }

    #[test]
    fn boundary_plus_duration_lands_on_the_grid() {
        for now in [at(11, 10, 15), at(3, 59, 59), at(0, 0, 1)] {
            let dur = duration_to_next_epoch(now, 60);
            assert_eq!((now + dur.as_secs()) % 3600, 0);
        }
    }
}
