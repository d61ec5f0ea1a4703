// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use prometheus::{register_gauge, register_int_gauge, Gauge, IntGauge, Opts};

const NAMESPACE: &str = "reti";

pub static POOL_COUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(Opts::new("pool_count", "Number of pools on this node").namespace(NAMESPACE))
        .expect("gauge can be registered")
});

pub static STAKER_COUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        Opts::new("staker_count", "Number of stakers across this node's pools")
            .namespace(NAMESPACE)
    )
    .expect("gauge can be registered")
});

pub static STAKED_TOTAL: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        Opts::new("staked_total", "Total ALGO staked in this node's pools").namespace(NAMESPACE)
    )
    .expect("gauge can be registered")
});

pub static REWARD_AVAILABLE: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        Opts::new(
            "reward_available",
            "ALGO available for rewards across this node's pools"
        )
        .namespace(NAMESPACE)
    )
    .expect("gauge can be registered")
});

pub static MAX_STAKE_ALLOWED: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        Opts::new(
            "max_stake_allowed",
            "Protocol-wide maximum ALGO stake per validator"
        )
        .namespace(NAMESPACE)
    )
    .expect("gauge can be registered")
});
