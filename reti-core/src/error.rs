// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use reti_algod::AlgodError;
use thiserror::Error;

/// Errors from the protocol client and the daemon logic built on it.
#[derive(Debug, Error)]
pub enum RetiError {
    #[error(transparent)]
    Algod(#[from] AlgodError),

    #[error("validator app id, validator id and node number must all be configured")]
    NotConfigured,

    #[error("neither owner nor manager address for validator id {validator_id} has local keys present")]
    SignerMissing { validator_id: u64 },

    #[error("configured node number {node_num} is invalid for {node_count} on-chain nodes")]
    NodeOutOfRange { node_num: u64, node_count: usize },

    #[error("global state key {0:?} not found")]
    StateKeyNotFound(String),

    #[error("simulation failed: {0}")]
    SimulateFailed(String),

    #[error("unexpected ABI shape: {0}")]
    AbiShape(String),

    #[error("staking pool app id {pool_app_id} is not among this validator's pools")]
    PoolNotFound { pool_app_id: u64 },

    #[error("staker ledger box length {0} is not a whole number of records")]
    LedgerFormat(usize),

    #[error(
        "manager account spendable balance of {available} µALGO is below the \
         {required} µALGO needed to issue an epoch update for pool app id {pool_app_id}"
    )]
    ManagerInsufficientBalance {
        pool_app_id: u64,
        available: u64,
        required: u64,
    },
}

impl RetiError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RetiError::Algod(inner) => inner.is_transient(),
            // Boxes missing during pool warm-up resolve on their own.
            RetiError::StateKeyNotFound(_) => true,
            _ => false,
        }
    }
}
