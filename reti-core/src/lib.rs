// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Protocol-level operations for validator staking pools: loading the
//! on-chain validator state, key registration (online/offline), epoch
//! balance updates, pool storage initialization, and the shared state the
//! daemon loops read.

pub mod boxes;
pub mod constants;
pub mod metrics;

mod client;
mod error;
mod model;
mod state;

pub use client::{
    global_state_string, global_state_uint, RetiClient, EPOCH_UPDATE_POLICY, RELOAD_POLICY,
};
pub use error::RetiError;
pub use model::{
    MbrAmounts, NodeConfig, NodePoolAssignments, PoolInfo, ProtocolConstraints, ValidatorConfig,
    ValidatorInfo,
};
pub use state::SharedState;
