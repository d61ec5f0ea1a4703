// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The key-watcher loop: once a minute, reconcile every locally-owned
//! pool account against the node's participation keys and the chain's
//! online status, and enact whatever corrective actions the decision
//! rules produce.

use std::{sync::Arc, time::Duration};

use reti_algod::{Address, AlgodClient, PartKeyStore, PartKeysByAddress};
use reti_core::{constants::POOL_FUNDED_THRESHOLD, RetiClient, RetiError, RELOAD_POLICY};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    block_time::BlockTimeTracker,
    participation::{
        expired_key_sweep, missing_key_actions, offline_actions, renewal_actions, switch_actions,
        KeyAction, OnlineInfo, PoolAccounts,
    },
};

const CHECK_INTERVAL: Duration = Duration::from_secs(60);
const BLOCK_TIME_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct KeyWatcher {
    algod: Arc<AlgodClient>,
    reti: Arc<RetiClient>,
    keystore: PartKeyStore,
    block_times: Arc<BlockTimeTracker>,
    daemon_version: &'static str,
}

impl KeyWatcher {
    pub fn new(
        algod: Arc<AlgodClient>,
        reti: Arc<RetiClient>,
        block_times: Arc<BlockTimeTracker>,
        daemon_version: &'static str,
    ) -> Self {
        let keystore = PartKeyStore::new(algod.clone());
        Self {
            algod,
            reti,
            keystore,
            block_times,
            daemon_version,
        }
    }

    /// Runs until `token` fires. The token is also the restart lever: a
    /// manager rotation observed mid-run cancels it so the process can
    /// come back up requiring the new manager's signing key.
    pub async fn run(self, token: CancellationToken) {
        info!("starting key watcher");
        self.check_pools(&token).await;

        let mut check = tokio::time::interval(CHECK_INTERVAL);
        let mut block_time_refresh = tokio::time::interval(BLOCK_TIME_REFRESH_INTERVAL);
        // Both intervals fire immediately once; the initial pass above
        // already covered that.
        check.tick().await;
        block_time_refresh.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("key watcher exiting");
                    return;
                }
                _ = check.tick() => self.tick(&token).await,
                _ = block_time_refresh.tick() => {
                    if let Err(error) = self.block_times.refresh().await {
                        warn!(%error, "block time refresh failed, keeping previous estimate");
                    }
                }
            }
        }
    }

    async fn tick(&self, token: &CancellationToken) {
        let current_manager = self.reti.info().config.manager;
        let reload = RELOAD_POLICY
            .run(token, RetiError::is_transient, || self.reti.load_state(token))
            .await;
        if let Err(error) = reload {
            warn!(%error, "validator state refresh failed, skipping tick");
            return;
        }
        if token.is_cancelled() {
            return;
        }
        let info = self.reti.info();
        if info.config.manager != current_manager {
            info!(
                old = %current_manager,
                new = %info.config.manager,
                "manager address rotated on chain, requesting restart"
            );
            token.cancel();
            return;
        }

        self.update_pool_versions(token).await;
        self.check_pools(token).await;
    }

    /// Records the node software + daemon version into each local pool
    /// that does not already carry it. Idempotent: a pool with the right
    /// version recorded produces no transaction.
    async fn update_pool_versions(&self, token: &CancellationToken) {
        let info = self.reti.info();
        let version = match self.algod.version_string().await {
            Ok(node_version) => format!("{node_version} {}", self.daemon_version),
            Err(error) => {
                error!(%error, "unable to fetch version from algod");
                return;
            }
        };
        for &pool_app_id in info.local_pools.values() {
            if let Err(error) = self
                .reti
                .update_algod_ver(token, pool_app_id, &version, info.config.manager)
                .await
            {
                error!(%error, pool_app_id, "unable to update recorded algod version");
            }
        }
    }

    async fn check_pools(&self, token: &CancellationToken) {
        let info = self.reti.info();
        let manager = info.config.manager;

        // Online status and selection keys of all our pool accounts,
        // skipping any that have not been funded yet.
        let mut pool_accounts = PoolAccounts::new();
        for &pool_app_id in info.local_pools.values() {
            let address = Address::for_application(pool_app_id).to_string();
            let account = match self.algod.account(&address).await {
                Ok(account) => account,
                Err(error) => {
                    warn!(%error, account = %address, "account fetch error");
                    return;
                }
            };
            if account.spendable() <= POOL_FUNDED_THRESHOLD {
                continue;
            }
            let participation = account.participation.clone().unwrap_or_default();
            let snapshot = OnlineInfo {
                pool_app_id,
                is_online: account.is_online(),
                selection_participation_key: participation.selection_participation_key,
                first_valid: participation.vote_first_valid,
            };
            debug!(
                account = %address,
                online = snapshot.is_online,
                first_valid = snapshot.first_valid,
                "pool account snapshot"
            );
            pool_accounts.insert(address, snapshot);
        }

        for &pool_app_id in info.local_pools.values() {
            if let Err(error) = self
                .reti
                .check_and_init_pool_storage(token, pool_app_id, manager)
                .await
            {
                warn!(%error, pool_app_id, "pool storage check failed");
            }
        }

        let mut part_keys = match self.keystore.list().await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "participation key fetch error");
                return;
            }
        };
        let current_round = match self.algod.status().await {
            Ok(status) => status.last_round,
            Err(error) => {
                warn!(%error, "status fetch error");
                return;
            }
        };

        // Expired keys go first, for every account on the node; the daemon
        // owns cleanup even for pools that moved elsewhere.
        let expired = expired_key_sweep(&part_keys, current_round);
        let removed = self.execute_all(token, expired, manager).await;
        if removed > 0 {
            part_keys = match self.keystore.list().await {
                Ok(keys) => keys,
                Err(error) => {
                    warn!(%error, "participation key re-fetch error");
                    return;
                }
            };
        }

        // Other accounts' keys are not under our control.
        part_keys.retain(|address, _| pool_accounts.contains_key(address));

        self.ensure_participation(token, &pool_accounts, &part_keys, current_round)
            .await;
    }

    /// Applies the four reconciliation rules in order. Each rule is an
    /// independent pass; a failing action is logged and the remaining
    /// passes still run, to be retried on the next tick.
    async fn ensure_participation(
        &self,
        token: &CancellationToken,
        accounts: &PoolAccounts,
        keys: &PartKeysByAddress,
        current_round: u64,
    ) {
        let manager = self.reti.info().config.manager;
        let avg_block_time = self.block_times.average_block_time();

        let passes = [
            missing_key_actions(accounts, keys, current_round, avg_block_time),
            offline_actions(accounts, keys),
            renewal_actions(accounts, keys, current_round, avg_block_time),
            switch_actions(accounts, keys, current_round),
        ];
        for actions in passes {
            if token.is_cancelled() {
                return;
            }
            self.execute_all(token, actions, manager).await;
        }
    }

    /// Executes actions sequentially, returning how many succeeded.
    async fn execute_all(
        &self,
        token: &CancellationToken,
        actions: Vec<KeyAction>,
        manager: Address,
    ) -> usize {
        let mut succeeded = 0;
        for action in actions {
            match self.execute(token, &action, manager).await {
                Ok(()) => succeeded += 1,
                Err(error) => error!(%error, ?action, "participation action failed"),
            }
        }
        succeeded
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        action: &KeyAction,
        manager: Address,
    ) -> Result<(), RetiError> {
        match action {
            KeyAction::Generate {
                account,
                first_valid,
                last_valid,
            } => {
                self.keystore
                    .generate(token, account, *first_valid, *last_valid)
                    .await?;
            }
            KeyAction::GoOnline {
                pool_app_id,
                account,
                key,
            } => {
                info!(
                    account = %account,
                    pool_app_id,
                    key = %key.id,
                    "going online with newest participation key"
                );
                self.reti.go_online(token, *pool_app_id, manager, key).await?;
            }
            KeyAction::GoOffline {
                pool_app_id,
                account,
            } => {
                warn!(
                    account = %account,
                    pool_app_id,
                    "no local key matches the chain's selection key, going offline"
                );
                self.reti.go_offline(token, *pool_app_id, manager).await?;
            }
            KeyAction::DeleteKey { account, id } => {
                info!(account = %account, key = %id, "removing expired participation key");
                self.keystore.delete(id).await?;
            }
        }
        Ok(())
    }
}
