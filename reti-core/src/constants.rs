// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use reti_algod::Address;

/// Global state key in the validator registry holding the staking pool
/// template app id.
pub const VLDTR_POOL_TMPL_ID: &str = "poolTemplateAppID";

/// Global state key in a staking pool recording the node software version.
pub const STAKE_POOL_ALGOD_VER: &str = "algodVer";

/// A pool account below this spendable balance has not been funded yet and
/// is left alone by the key watcher.
pub const POOL_FUNDED_THRESHOLD: u64 = 1_000_000;

/// Spendable balance the manager account needs before an epoch update is
/// worth submitting.
pub const MANAGER_MIN_SPENDABLE: u64 = 100_000;

/// Extra payment into the pool when taking a not-yet-eligible account
/// online, making it eligible for block payouts.
pub const INCENTIVE_ELIGIBILITY_FEE: u64 = 2_000_000;

/// Upper bounds baked into the node-pool assignment grid.
pub const MAX_NODES: usize = 12;
pub const MAX_POOLS_PER_NODE: usize = 6;

/// Sender used for unsigned read-only simulate calls. Never signs
/// anything; it merely has to be a well-formed address.
pub static DUMMY_SENDER: LazyLock<Address> = LazyLock::new(|| {
    "DUMMYE34NWB6LZ6QGVLHE6N43M6TN65VRBI4LSITTEIHCF4ILVMRCB42ZE"
        .parse()
        .expect("dummy sender address is valid")
});
