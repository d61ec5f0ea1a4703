// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced by the algod REST client and the transaction plumbing
/// built on top of it.
#[derive(Debug, Error)]
pub enum AlgodError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("algod returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid Algorand address {0:?}")]
    InvalidAddress(String),

    #[error("transaction encoding failed: {0}")]
    Encoding(String),

    #[error("ABI value mismatch: {0}")]
    Abi(String),

    #[error("no signing key available for address {0}")]
    NoSignerForAddress(String),

    #[error("no participation key appeared for account {account} within {timeout_secs}s")]
    KeyGenerationTimeout { account: String, timeout_secs: u64 },

    #[error("transaction {txid} was not confirmed within {rounds} rounds")]
    ConfirmationTimeout { txid: String, rounds: u64 },

    #[error("transaction {txid} rejected by the pool: {message}")]
    TransactionRejected { txid: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl AlgodError {
    /// Whether a retry of the same request can reasonably succeed.
    /// Network failures and 5xx responses are transient; everything the
    /// node rejected outright is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            AlgodError::Transport(error) => !error.is_builder(),
            AlgodError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
