// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signer as _, SigningKey};
use serde_bytes::ByteBuf;

use crate::{
    address::Address,
    error::AlgodError,
    transactions::{SignedTransaction, Transaction},
};

/// The signing seam. The daemon composes transactions and asks a signer to
/// produce signatures for the accounts it manages; which accounts a signer
/// can act for is the signer's business. Implementations must be safe to
/// share across the worker loops.
pub trait TransactionSigner: Send + Sync {
    /// Whether this signer holds key material for `address`.
    fn can_sign(&self, address: &Address) -> bool;

    /// Signs `transaction` with the key of `address`.
    fn sign(&self, address: &Address, transaction: Transaction)
        -> Result<SignedTransaction, AlgodError>;

    /// The first of `candidates` this signer can act for. Used to verify
    /// at startup that either the owner or the manager key is local.
    fn find_first_signer(&self, candidates: &[Address]) -> Option<Address> {
        candidates
            .iter()
            .copied()
            .find(|address| self.can_sign(address))
    }
}

/// An in-memory ed25519 signer fed from raw 32-byte seeds. The production
/// wallet layer is pluggable behind [`TransactionSigner`]; this covers
/// daemon deployments where seed material is injected via the environment.
pub struct InMemorySigner {
    keys: HashMap<Address, SigningKey>,
}

impl InMemorySigner {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Parses a comma-separated list of base64 seeds, as carried by the
    /// `ALGO_SIGNER_KEYS` environment variable.
    pub fn from_env_value(value: &str) -> Result<Self, AlgodError> {
        let mut signer = Self::new();
        for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let raw = BASE64
                .decode(entry)
                .map_err(|err| AlgodError::Encoding(format!("bad signer seed: {err}")))?;
            let seed: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
                AlgodError::Encoding(format!("signer seed must be 32 bytes, got {}", raw.len()))
            })?;
            signer.add_seed(seed);
        }
        Ok(signer)
    }

    pub fn add_seed(&mut self, seed: [u8; 32]) -> Address {
        let key = SigningKey::from_bytes(&seed);
        let address = Address(key.verifying_key().to_bytes());
        self.keys.insert(address, key);
        address
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for InMemorySigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSigner for InMemorySigner {
    fn can_sign(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }

    fn sign(
        &self,
        address: &Address,
        transaction: Transaction,
    ) -> Result<SignedTransaction, AlgodError> {
        let key = self
            .keys
            .get(address)
            .ok_or_else(|| AlgodError::NoSignerForAddress(address.to_string()))?;
        let signature = key.sign(&transaction.bytes_to_sign()?);
        Ok(SignedTransaction {
            signature: ByteBuf::from(signature.to_bytes().to_vec()),
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::SuggestedParams,
        transactions::{make_payment, MIN_TXN_FEE},
    };

    fn params() -> SuggestedParams {
        SuggestedParams {
            fee: MIN_TXN_FEE,
            min_fee: MIN_TXN_FEE,
            first_valid: 10,
            last_valid: 110,
            genesis_id: "test".to_owned(),
            genesis_hash: [0u8; 32],
        }
    }

    #[test]
    fn signs_only_for_held_accounts() {
        let mut signer = InMemorySigner::new();
        let held = signer.add_seed([1u8; 32]);
        let other = Address([9u8; 32]);
        assert!(signer.can_sign(&held));
        assert!(!signer.can_sign(&other));

        let txn = make_payment(&params(), held, other, 1);
        assert_eq!(signer.sign(&held, txn.clone()).unwrap().signature.len(), 64);
        assert!(signer.sign(&other, txn).is_err());
    }

    #[test]
    fn find_first_signer_prefers_earlier_candidates() {
        let mut signer = InMemorySigner::new();
        let owner = signer.add_seed([2u8; 32]);
        let manager = signer.add_seed([3u8; 32]);
        assert_eq!(signer.find_first_signer(&[owner, manager]), Some(owner));
        assert_eq!(
            signer.find_first_signer(&[Address([9u8; 32]), manager]),
            Some(manager)
        );
        assert_eq!(signer.find_first_signer(&[Address([9u8; 32])]), None);
    }

    #[test]
    fn env_parsing_rejects_short_seeds() {
        let value = BASE64.encode([1u8; 16]);
        assert!(InMemorySigner::from_env_value(&value).is_err());
    }
}
