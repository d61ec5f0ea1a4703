// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed access to the Algorand node ("algod") REST surface, plus the
//! transaction plumbing the node manager needs: canonical transaction
//! encoding, ARC-4 method calls, atomic group composition with
//! simulate-then-execute fee sizing, and participation key management.

mod address;
mod client;
mod error;
mod keys;
mod retry;
mod signing;

pub mod abi;
pub mod atc;
pub mod transactions;

pub use address::{Address, ZERO_ADDRESS};
pub use client::{
    AccountInfo, AccountParticipation, AlgodClient, AlgodConnection, ApplicationInfo,
    NodeStatus, SimulateConfig, SimulateGroupResult, SuggestedParams, TealKeyValue, TealValue,
};
pub use error::AlgodError;
pub use keys::{ParticipationKey, PartKeyStore, PartKeysByAddress, VotingKeyData};
pub use retry::{Backoff, RetryPolicy};
pub use signing::{InMemorySigner, TransactionSigner};

/// Micro-algo amounts rendered for humans: `1.5` rather than `1500000`.
pub fn format_micro_algos(micro_algos: u64) -> String {
    let formatted = format!("{:.6}", micro_algos as f64 / 1e6);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::format_micro_algos;

    #[test]
    fn micro_algo_formatting_trims_zeros() {
        assert_eq!(format_micro_algos(1_500_000), "1.5");
        assert_eq!(format_micro_algos(1_000_000), "1");
        assert_eq!(format_micro_algos(0), "0");
        assert_eq!(format_micro_algos(123), "0.000123");
    }
}
