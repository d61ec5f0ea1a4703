// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::RwLock;

use crate::model::ValidatorInfo;

/// Holder of the most recently loaded [`ValidatorInfo`]. Readers get a
/// snapshot; the loader replaces the whole value. Lock hold times are a
/// clone or an assignment, so a blocking lock is fine inside async code.
#[derive(Default)]
pub struct SharedState {
    info: RwLock<ValidatorInfo>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the current validator info.
    pub fn info(&self) -> ValidatorInfo {
        self.info.read().expect("validator info lock poisoned").clone()
    }

    /// Atomically replaces the validator info.
    pub fn set_info(&self, info: ValidatorInfo) {
        *self.info.write().expect("validator info lock poisoned") = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoolInfo;

    #[test]
    fn readers_see_the_latest_replacement() {
        let state = SharedState::new();
        assert!(state.info().pools.is_empty());

        let mut info = ValidatorInfo::default();
        info.pools.push(PoolInfo {
            pool_app_id: 42,
            total_stakers: 1,
            total_algo_staked: 5,
        });
        state.set_info(info);
        assert_eq!(state.info().pools[0].pool_app_id, 42);
    }

    #[test]
    fn snapshots_are_independent_of_later_writes() {
        let state = SharedState::new();
        let snapshot = state.info();
        state.set_info(ValidatorInfo {
            local_pools: [(1u64, 100u64)].into_iter().collect(),
            ..ValidatorInfo::default()
        });
        assert!(snapshot.local_pools.is_empty());
        assert_eq!(state.info().local_pools.len(), 1);
    }
}
