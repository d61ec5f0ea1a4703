// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reti_algod::{
    abi::{AbiMethod, AbiType, AbiValue},
    atc::{AppBoxReference, GroupComposer, MethodArg, MethodCallParams},
    transactions::{make_payment, MIN_TXN_FEE},
    Address, AlgodClient, AlgodError, Backoff, ParticipationKey, RetryPolicy, SimulateConfig,
    SuggestedParams, TealKeyValue, TransactionSigner,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    boxes::{validator_list_box_name, STAKER_LEDGER_BOX_NAME},
    constants::{DUMMY_SENDER, INCENTIVE_ELIGIBILITY_FEE, STAKE_POOL_ALGOD_VER, VLDTR_POOL_TMPL_ID},
    error::RetiError,
    metrics,
    model::{
        MbrAmounts, NodePoolAssignments, PoolInfo, ProtocolConstraints, ValidatorConfig,
        ValidatorInfo,
    },
    state::SharedState,
};

// Validator registry surface consumed by the daemon.
const GET_VALIDATOR_CONFIG: AbiMethod = AbiMethod::new(
    "getValidatorConfig(uint64)(uint64,address,address,uint64,uint8,address,uint64[4],uint64,\
     uint64,uint64,uint32,uint32,address,uint64,uint64,uint8,uint64,uint64)",
);
const GET_POOLS: AbiMethod = AbiMethod::new("getPools(uint64)(uint64,uint16,uint64)[]");
const GET_NODE_POOL_ASSIGNMENTS: AbiMethod =
    AbiMethod::new("getNodePoolAssignments(uint64)((uint64[6])[12])");
const GET_PROTOCOL_CONSTRAINTS: AbiMethod = AbiMethod::new(
    "getProtocolConstraints()(uint64,uint64,uint64,uint64,uint64,uint64,uint64,uint64,uint64,\
     uint64)",
);
const GET_MBR_AMOUNTS: AbiMethod =
    AbiMethod::new("getMbrAmounts()(uint64,uint64,uint64,uint64)");

// Staking pool surface.
const POOL_GAS: AbiMethod = AbiMethod::new("gas()void");
const POOL_GO_ONLINE: AbiMethod =
    AbiMethod::new("goOnline(pay,byte[32],byte[32],byte[64],uint64,uint64,uint64)void");
const POOL_GO_OFFLINE: AbiMethod = AbiMethod::new("goOffline()void");
const POOL_EPOCH_BALANCE_UPDATE: AbiMethod = AbiMethod::new("epochBalanceUpdate()void");
const POOL_UPDATE_ALGOD_VER: AbiMethod = AbiMethod::new("updateAlgodVer(string)void");
const POOL_INIT_STORAGE: AbiMethod = AbiMethod::new("initStorage(pay)void");

const CONFIRMATION_ROUNDS: u64 = 4;

/// Retry schedule for refreshing validator state on the watcher cadence.
pub const RELOAD_POLICY: RetryPolicy = RetryPolicy::new(
    10,
    Backoff::Jittered {
        min: Duration::from_secs(5),
        max: Duration::from_secs(10),
    },
);

/// Retry schedule for epoch updates; "too early" is the common failure, so
/// every error is worth the fixed 5-second wait.
pub const EPOCH_UPDATE_POLICY: RetryPolicy =
    RetryPolicy::new(5, Backoff::Fixed(Duration::from_secs(5)));

/// Reads a uint value out of decoded application global state.
pub fn global_state_uint(state: &[TealKeyValue], key: &str) -> Result<u64, RetiError> {
    for entry in state {
        let raw_key = BASE64.decode(&entry.key).unwrap_or_default();
        if raw_key == key.as_bytes() && entry.value.value_type == 2 {
            return Ok(entry.value.uint);
        }
    }
    Err(RetiError::StateKeyNotFound(key.to_owned()))
}

/// Reads a byte-string value out of decoded application global state.
pub fn global_state_string(state: &[TealKeyValue], key: &str) -> Result<String, RetiError> {
    for entry in state {
        let raw_key = BASE64.decode(&entry.key).unwrap_or_default();
        if raw_key == key.as_bytes() && entry.value.value_type == 1 {
            let raw = BASE64
                .decode(&entry.value.bytes)
                .map_err(|err| RetiError::AbiShape(format!("bad state bytes: {err}")))?;
            return Ok(String::from_utf8_lossy(&raw).into_owned());
        }
    }
    Err(RetiError::StateKeyNotFound(key.to_owned()))
}

/// High-level client for the validator registry and staking pool
/// contracts. One instance serves all daemon loops.
pub struct RetiClient {
    algod: Arc<AlgodClient>,
    signer: Arc<dyn TransactionSigner>,

    reti_app_id: u64,
    validator_id: u64,
    node_num: u64,

    pool_template_app_id: AtomicU64,
    state: SharedState,
}

impl RetiClient {
    pub fn new(
        reti_app_id: u64,
        validator_id: u64,
        node_num: u64,
        algod: Arc<AlgodClient>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        info!(
            reti_app_id,
            validator_id, node_num, "protocol client initialized"
        );
        Self {
            algod,
            signer,
            reti_app_id,
            validator_id,
            node_num,
            pool_template_app_id: AtomicU64::new(0),
            state: SharedState::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.reti_app_id != 0 && self.validator_id != 0 && self.node_num != 0
    }

    pub fn validator_id(&self) -> u64 {
        self.validator_id
    }

    pub fn node_num(&self) -> u64 {
        self.node_num
    }

    /// App id of the staking pool template, captured by `load_state`.
    pub fn pool_template_app_id(&self) -> u64 {
        self.pool_template_app_id.load(Ordering::Relaxed)
    }

    /// Snapshot of the most recently loaded validator info.
    pub fn info(&self) -> ValidatorInfo {
        self.state.info()
    }

    /// Loads the validator's full on-chain state, verifies a local signer
    /// exists for owner or manager, publishes the new snapshot, and
    /// refreshes the metrics gauges.
    pub async fn load_state(&self, token: &CancellationToken) -> Result<(), RetiError> {
        if self.reti_app_id == 0 {
            return Err(RetiError::NotConfigured);
        }
        let registry = self.algod.application(self.reti_app_id).await?;
        let template_id = global_state_uint(&registry.params.global_state, VLDTR_POOL_TMPL_ID)?;
        self.pool_template_app_id.store(template_id, Ordering::Relaxed);

        if self.validator_id == 0 {
            return Ok(());
        }

        let config = self.get_validator_config(token).await?;
        if self
            .signer
            .find_first_signer(&[config.owner, config.manager])
            .is_none()
        {
            return Err(RetiError::SignerMissing {
                validator_id: self.validator_id,
            });
        }

        let constraints = self.get_protocol_constraints(token).await?;
        // Each daemon reports only its own node's share; dashboards
        // aggregate across nodes.
        let pools = self.get_validator_pools(token).await?;
        let assignments = self.get_node_pool_assignments(token).await?;

        if self.node_num == 0 || self.node_num as usize > assignments.nodes.len() {
            return Err(RetiError::NodeOutOfRange {
                node_num: self.node_num,
                node_count: assignments.nodes.len(),
            });
        }

        let mut local_pools = BTreeMap::new();
        let mut local_stakers = 0u64;
        let mut local_staked = 0u64;
        let mut local_rewards = 0f64;
        for &pool_app_id in &assignments.nodes[self.node_num as usize - 1].pool_app_ids {
            let position = pools
                .iter()
                .position(|pool| pool.pool_app_id == pool_app_id)
                .ok_or(RetiError::PoolNotFound { pool_app_id })?;
            let pool = &pools[position];
            local_stakers += u64::from(pool.total_stakers);
            local_staked += pool.total_algo_staked;
            local_rewards += self
                .pool_available_rewards(pool_app_id, pool.total_algo_staked)
                .await
                .unwrap_or(0) as f64
                / 1e6;
            local_pools.insert(position as u64 + 1, pool_app_id);
        }

        metrics::POOL_COUNT.set(local_pools.len() as i64);
        metrics::STAKER_COUNT.set(local_stakers as i64);
        metrics::STAKED_TOTAL.set(local_staked as f64 / 1e6);
        metrics::REWARD_AVAILABLE.set(local_rewards);
        metrics::MAX_STAKE_ALLOWED.set(constraints.max_algo_per_validator as f64 / 1e6);

        self.state.set_info(ValidatorInfo {
            config,
            pools,
            node_pool_assignments: assignments,
            local_pools,
        });
        debug!("validator state re-loaded");
        Ok(())
    }

    async fn read_only_call(
        &self,
        token: &CancellationToken,
        app_id: u64,
        method: AbiMethod,
        args: Vec<MethodArg>,
        boxes: Vec<AppBoxReference>,
        returns: AbiType,
    ) -> Result<AbiValue, RetiError> {
        let params = self.algod.suggested_params(token).await?;
        let mut composer = GroupComposer::new();
        composer.add_method_call(MethodCallParams {
            app_id,
            method,
            args,
            foreign_apps: Vec::new(),
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes,
            sender: *DUMMY_SENDER,
            params,
            returns: Some(returns),
        })?;
        let outcome = composer
            .simulate(
                &self.algod,
                SimulateConfig {
                    allow_empty_signatures: true,
                    allow_unnamed_resources: true,
                },
            )
            .await?;
        if !outcome.group.failure_message.is_empty() {
            return Err(RetiError::SimulateFailed(outcome.group.failure_message));
        }
        outcome
            .returns
            .into_iter()
            .last()
            .flatten()
            .ok_or_else(|| RetiError::AbiShape(format!("{} returned nothing", method.name())))
    }

    pub async fn get_validator_config(
        &self,
        token: &CancellationToken,
    ) -> Result<ValidatorConfig, RetiError> {
        let value = self
            .read_only_call(
                token,
                self.reti_app_id,
                GET_VALIDATOR_CONFIG,
                vec![MethodArg::Value(AbiValue::Uint(self.validator_id))],
                vec![
                    AppBoxReference::new(0, validator_list_box_name(self.validator_id)),
                    AppBoxReference::extra_io(),
                ],
                ValidatorConfig::abi_type(),
            )
            .await?;
        ValidatorConfig::from_abi(value)
    }

    pub async fn get_validator_pools(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<PoolInfo>, RetiError> {
        let value = self
            .read_only_call(
                token,
                self.reti_app_id,
                GET_POOLS,
                vec![MethodArg::Value(AbiValue::Uint(self.validator_id))],
                vec![
                    AppBoxReference::new(0, validator_list_box_name(self.validator_id)),
                    AppBoxReference::extra_io(),
                ],
                AbiType::DynamicArray(Box::new(PoolInfo::abi_element_type())),
            )
            .await?;
        PoolInfo::list_from_abi(value)
    }

    pub async fn get_node_pool_assignments(
        &self,
        token: &CancellationToken,
    ) -> Result<NodePoolAssignments, RetiError> {
        let value = self
            .read_only_call(
                token,
                self.reti_app_id,
                GET_NODE_POOL_ASSIGNMENTS,
                vec![MethodArg::Value(AbiValue::Uint(self.validator_id))],
                vec![
                    AppBoxReference::new(0, validator_list_box_name(self.validator_id)),
                    AppBoxReference::extra_io(),
                ],
                NodePoolAssignments::abi_type(),
            )
            .await?;
        NodePoolAssignments::from_abi(value)
    }

    pub async fn get_protocol_constraints(
        &self,
        token: &CancellationToken,
    ) -> Result<ProtocolConstraints, RetiError> {
        let value = self
            .read_only_call(
                token,
                self.reti_app_id,
                GET_PROTOCOL_CONSTRAINTS,
                Vec::new(),
                Vec::new(),
                ProtocolConstraints::abi_type(),
            )
            .await?;
        ProtocolConstraints::from_abi(value)
    }

    pub async fn get_mbr_amounts(&self, token: &CancellationToken) -> Result<MbrAmounts, RetiError> {
        let value = self
            .read_only_call(
                token,
                self.reti_app_id,
                GET_MBR_AMOUNTS,
                Vec::new(),
                Vec::new(),
                MbrAmounts::abi_type(),
            )
            .await?;
        MbrAmounts::from_abi(value)
    }

    /// Takes the pool account online with the given participation key.
    /// Accounts that are not yet incentive eligible pay the one-time
    /// eligibility fee into the pool as part of the same group.
    pub async fn go_online(
        &self,
        token: &CancellationToken,
        pool_app_id: u64,
        caller: Address,
        key: &ParticipationKey,
    ) -> Result<(), RetiError> {
        let pool_address = Address::for_application(pool_app_id);
        let mut params = self.algod.suggested_params(token).await?;
        params.fee = MIN_TXN_FEE * 3;

        let account = self.algod.account(&pool_address.to_string()).await?;
        let online_fee = if account.incentive_eligible {
            0
        } else {
            info!(pool_app_id, "paying extra fee to make pool incentive eligible");
            INCENTIVE_ELIGIBILITY_FEE
        };
        let payment = make_payment(&params, caller, pool_address, online_fee);

        let mut composer = GroupComposer::new();
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_GO_ONLINE,
            args: vec![
                MethodArg::Transaction(payment),
                MethodArg::Value(AbiValue::FixedBytes(key.vote_key_bytes()?)),
                MethodArg::Value(AbiValue::FixedBytes(key.selection_key_bytes()?)),
                MethodArg::Value(AbiValue::FixedBytes(key.state_proof_key_bytes()?)),
                MethodArg::Value(AbiValue::Uint(key.key.vote_first_valid)),
                MethodArg::Value(AbiValue::Uint(key.key.vote_last_valid)),
                MethodArg::Value(AbiValue::Uint(key.key.vote_key_dilution)),
            ],
            foreign_apps: vec![self.reti_app_id],
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![
                AppBoxReference::new(self.reti_app_id, validator_list_box_name(self.validator_id)),
                AppBoxReference::extra_io(),
            ],
            sender: caller,
            params,
            returns: None,
        })?;
        let round = composer
            .execute(&self.algod, self.signer.as_ref(), CONFIRMATION_ROUNDS)
            .await?;
        info!(pool_app_id, round, "pool account went online");
        Ok(())
    }

    /// Takes the pool account offline.
    pub async fn go_offline(
        &self,
        token: &CancellationToken,
        pool_app_id: u64,
        caller: Address,
    ) -> Result<(), RetiError> {
        let mut params = self.algod.suggested_params(token).await?;
        params.fee = MIN_TXN_FEE * 3;

        let mut composer = GroupComposer::new();
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_GO_OFFLINE,
            args: Vec::new(),
            foreign_apps: vec![self.reti_app_id],
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![
                AppBoxReference::new(self.reti_app_id, validator_list_box_name(self.validator_id)),
                AppBoxReference::extra_io(),
            ],
            sender: caller,
            params,
            returns: None,
        })?;
        composer
            .execute(&self.algod, self.signer.as_ref(), CONFIRMATION_ROUNDS)
            .await?;
        info!(pool_app_id, "pool account went offline");
        Ok(())
    }

    /// The node software version a pool has recorded on chain.
    pub async fn get_algod_ver(&self, pool_app_id: u64) -> Result<String, RetiError> {
        let app = self.algod.application(pool_app_id).await?;
        global_state_string(&app.params.global_state, STAKE_POOL_ALGOD_VER)
    }

    /// Records `version` in the pool's global state when it differs from
    /// what is already there. Returns whether a transaction was sent.
    pub async fn update_algod_ver(
        &self,
        token: &CancellationToken,
        pool_app_id: u64,
        version: &str,
        caller: Address,
    ) -> Result<bool, RetiError> {
        let recorded = match self.get_algod_ver(pool_app_id).await {
            Ok(version) => version,
            Err(RetiError::StateKeyNotFound(_)) => String::new(),
            Err(err) => return Err(err),
        };
        if recorded == version {
            return Ok(false);
        }

        let mut params = self.algod.suggested_params(token).await?;
        params.fee = MIN_TXN_FEE * 2;

        let mut composer = GroupComposer::new();
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_UPDATE_ALGOD_VER,
            args: vec![MethodArg::Value(AbiValue::Bytes(
                version.as_bytes().to_vec(),
            ))],
            foreign_apps: vec![self.reti_app_id],
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![
                AppBoxReference::new(self.reti_app_id, validator_list_box_name(self.validator_id)),
                AppBoxReference::extra_io(),
            ],
            sender: caller,
            params,
            returns: None,
        })?;
        composer
            .execute(&self.algod, self.signer.as_ref(), CONFIRMATION_ROUNDS)
            .await?;
        info!(pool_app_id, version, "updated recorded algod version");
        Ok(true)
    }

    fn compose_epoch_group(
        &self,
        info: &ValidatorInfo,
        pool_idx: u64,
        pool_app_id: u64,
        caller: Address,
        params: &SuggestedParams,
        update_fee: u64,
    ) -> Result<GroupComposer, RetiError> {
        let mut zero_fee = params.clone();
        zero_fee.fee = 0;

        let mut extra_apps = Vec::new();
        let mut extra_assets = Vec::new();
        if info.config.nfd_app_id != 0 {
            extra_apps.push(info.config.nfd_app_id);
        }
        if info.config.reward_token_id != 0 {
            extra_assets.push(info.config.reward_token_id);
            if pool_idx != 1 {
                // Pool 1 tracks the token payout ratio and gets called by
                // the other pools during their update.
                if let Some(first_pool) = info.pools.first() {
                    extra_apps.push(first_pool.pool_app_id);
                }
            }
        }

        let mut composer = GroupComposer::new();
        // Two gas calls exist purely to stack up resource references for
        // the update itself.
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_GAS,
            args: Vec::new(),
            foreign_apps: vec![self.reti_app_id],
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![
                AppBoxReference::new(self.reti_app_id, validator_list_box_name(self.validator_id)),
                AppBoxReference::new(0, STAKER_LEDGER_BOX_NAME.to_vec()),
                AppBoxReference::extra_io(),
                AppBoxReference::extra_io(),
                AppBoxReference::extra_io(),
                AppBoxReference::extra_io(),
                AppBoxReference::extra_io(),
            ],
            sender: caller,
            params: zero_fee.clone(),
            returns: None,
        })?;
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_GAS,
            args: Vec::new(),
            foreign_apps: extra_apps,
            foreign_assets: extra_assets,
            accounts: vec![info.config.commission_address, info.config.manager],
            boxes: Vec::new(),
            sender: caller,
            params: zero_fee,
            returns: None,
        })?;

        let mut update_params = params.clone();
        update_params.fee = update_fee;
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_EPOCH_BALANCE_UPDATE,
            args: Vec::new(),
            foreign_apps: Vec::new(),
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![AppBoxReference::extra_io(); 7],
            sender: caller,
            params: update_params,
            returns: None,
        })?;
        Ok(composer)
    }

    /// Materializes the just-ended epoch's rewards for one pool:
    /// simulates the group to size the fee from the granted opcode
    /// budget, then executes. A simulation failure aborts before any
    /// submission.
    pub async fn epoch_balance_update(
        &self,
        token: &CancellationToken,
        pool_idx: u64,
        pool_app_id: u64,
        caller: Address,
    ) -> Result<(), RetiError> {
        let info = self.info();
        let pools = self.get_validator_pools(token).await?;
        let total_staked = pool_idx
            .checked_sub(1)
            .and_then(|idx| pools.get(idx as usize))
            .map(|pool| pool.total_algo_staked)
            .unwrap_or(0);
        let reward_avail = self
            .pool_available_rewards(pool_app_id, total_staked)
            .await?;

        let status = self.algod.status().await?;
        let epoch_round_length = u64::from(info.config.epoch_round_length.max(1));
        let epoch_start = status.last_round - status.last_round % epoch_round_length;
        info!(
            pool = pool_idx,
            pool_app_id,
            round = status.last_round,
            epoch_start,
            rewards = %reti_algod::format_micro_algos(reward_avail),
            "issuing epoch balance update"
        );

        let params = self.algod.suggested_params(token).await?;

        // High fee cap for simulation only; nothing is submitted.
        let mut simulated = self.compose_epoch_group(
            &info,
            pool_idx,
            pool_app_id,
            caller,
            &params,
            240 * MIN_TXN_FEE,
        )?;
        let outcome = simulated
            .simulate(
                &self.algod,
                SimulateConfig {
                    allow_empty_signatures: true,
                    allow_unnamed_resources: true,
                },
            )
            .await?;
        if !outcome.group.failure_message.is_empty() {
            return Err(RetiError::SimulateFailed(outcome.group.failure_message));
        }

        let fee = MIN_TXN_FEE * (1 + outcome.group.app_budget_added / 700);
        let mut composer =
            self.compose_epoch_group(&info, pool_idx, pool_app_id, caller, &params, fee)?;
        composer
            .execute(&self.algod, self.signer.as_ref(), CONFIRMATION_ROUNDS)
            .await?;
        Ok(())
    }

    /// Makes sure the pool's staker-ledger box exists, creating it (and
    /// paying its MBR into the pool) if this is a fresh pool.
    pub async fn check_and_init_pool_storage(
        &self,
        token: &CancellationToken,
        pool_app_id: u64,
        caller: Address,
    ) -> Result<bool, RetiError> {
        match self
            .algod
            .application_box(pool_app_id, STAKER_LEDGER_BOX_NAME)
            .await
        {
            Ok(content) if !content.is_empty() => return Ok(false),
            Ok(_) => {}
            Err(AlgodError::Api { status: 404, .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let mbr = self.get_mbr_amounts(token).await?;
        let pool_address = Address::for_application(pool_app_id);
        let mut params = self.algod.suggested_params(token).await?;
        params.fee = MIN_TXN_FEE * 3;

        let mut zero_fee = params.clone();
        zero_fee.fee = 0;

        let mut composer = GroupComposer::new();
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_GAS,
            args: Vec::new(),
            foreign_apps: vec![self.reti_app_id],
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![
                AppBoxReference::new(self.reti_app_id, validator_list_box_name(self.validator_id)),
                AppBoxReference::new(0, STAKER_LEDGER_BOX_NAME.to_vec()),
                AppBoxReference::extra_io(),
                AppBoxReference::extra_io(),
            ],
            sender: caller,
            params: zero_fee,
            returns: None,
        })?;
        let payment = make_payment(&params, caller, pool_address, mbr.pool_init_mbr);
        composer.add_method_call(MethodCallParams {
            app_id: pool_app_id,
            method: POOL_INIT_STORAGE,
            args: vec![MethodArg::Transaction(payment)],
            foreign_apps: Vec::new(),
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes: vec![AppBoxReference::new(0, STAKER_LEDGER_BOX_NAME.to_vec())],
            sender: caller,
            params,
            returns: None,
        })?;
        composer
            .execute(&self.algod, self.signer.as_ref(), CONFIRMATION_ROUNDS)
            .await?;
        info!(pool_app_id, "initialized staking pool storage");
        Ok(true)
    }

    /// Rewards currently sitting in the pool account above stake and MBR,
    /// clamped at zero while the pool is still being set up.
    pub async fn pool_available_rewards(
        &self,
        pool_app_id: u64,
        total_staked: u64,
    ) -> Result<u64, RetiError> {
        let address = Address::for_application(pool_app_id).to_string();
        let account = self.algod.account(&address).await?;
        Ok(account
            .amount
            .saturating_sub(total_staked)
            .saturating_sub(account.min_balance))
    }
}
