// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transaction types and their canonical wire form.
//!
//! Algorand's canonical msgpack drops zero-valued fields and orders map
//! keys alphabetically. Fields below are declared in alphabetical order of
//! their wire names and elided when empty, so `rmp_serde::to_vec_named`
//! produces the canonical encoding directly.

use data_encoding::BASE32_NOPAD;
use serde::Serialize;
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};

use crate::{address::Address, error::AlgodError};

/// Network-wide minimum transaction fee in micro-algos.
pub const MIN_TXN_FEE: u64 = 1_000;

/// Transactions are valid for at most this many rounds past their first
/// valid round; the pool contracts additionally require the short window
/// so that prior-block access works.
pub const DEFAULT_VALID_ROUND_RANGE: u64 = 100;

const TXID_PREFIX: &[u8] = b"TX";
const GROUP_PREFIX: &[u8] = b"TG";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransactionType {
    #[serde(rename = "pay")]
    Payment,
    #[serde(rename = "appl")]
    ApplicationCall,
}

/// Application-call completion action. Only no-op calls are issued here.
pub const ON_COMPLETE_NOOP: u64 = 0;

fn is_empty_bytes(bytes: &ByteBuf) -> bool {
    bytes.is_empty()
}

/// A box reference in the resolved wire form: `i` indexes the foreign-apps
/// array (0 meaning the called application itself).
#[derive(Clone, Debug, Serialize)]
pub struct WireBoxReference {
    #[serde(rename = "i", skip_serializing_if = "is_zero_u64")]
    pub index: u64,
    #[serde(rename = "n", skip_serializing_if = "is_empty_bytes")]
    pub name: ByteBuf,
}

/// A single transaction, payment or application call. Field names are the
/// wire names; declaration order is their alphabetical order.
#[derive(Clone, Debug, Serialize)]
pub struct Transaction {
    #[serde(rename = "amt", skip_serializing_if = "is_zero_u64")]
    pub amount: u64,
    #[serde(rename = "apaa", skip_serializing_if = "Vec::is_empty")]
    pub app_args: Vec<ByteBuf>,
    #[serde(rename = "apan", skip_serializing_if = "is_zero_u64")]
    pub on_complete: u64,
    #[serde(rename = "apas", skip_serializing_if = "Vec::is_empty")]
    pub foreign_assets: Vec<u64>,
    #[serde(rename = "apat", skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Address>,
    #[serde(rename = "apbx", skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<WireBoxReference>,
    #[serde(rename = "apfa", skip_serializing_if = "Vec::is_empty")]
    pub foreign_apps: Vec<u64>,
    #[serde(rename = "apid", skip_serializing_if = "is_zero_u64")]
    pub app_id: u64,
    #[serde(rename = "fee", skip_serializing_if = "is_zero_u64")]
    pub fee: u64,
    #[serde(rename = "fv", skip_serializing_if = "is_zero_u64")]
    pub first_valid: u64,
    #[serde(rename = "gen", skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(rename = "gh")]
    pub genesis_hash: ByteBuf,
    #[serde(rename = "grp", skip_serializing_if = "is_empty_bytes")]
    pub group: ByteBuf,
    #[serde(rename = "lv", skip_serializing_if = "is_zero_u64")]
    pub last_valid: u64,
    #[serde(rename = "rcv", skip_serializing_if = "is_zero_address")]
    pub receiver: Address,
    #[serde(rename = "snd")]
    pub sender: Address,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

fn is_zero_address(address: &Address) -> bool {
    address.as_bytes().iter().all(|byte| *byte == 0)
}

impl Transaction {
    /// Canonical msgpack encoding of the unsigned transaction.
    pub fn encode(&self) -> Result<Vec<u8>, AlgodError> {
        rmp_serde::to_vec_named(self).map_err(|err| AlgodError::Encoding(err.to_string()))
    }

    /// The byte string that is actually signed: `"TX" || encoding`.
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>, AlgodError> {
        let mut bytes = TXID_PREFIX.to_vec();
        bytes.extend(self.encode()?);
        Ok(bytes)
    }

    pub fn raw_id(&self) -> Result<[u8; 32], AlgodError> {
        Ok(Sha512_256::digest(self.bytes_to_sign()?).into())
    }

    /// The text form of the transaction id as reported by algod.
    pub fn id(&self) -> Result<String, AlgodError> {
        Ok(BASE32_NOPAD.encode(&self.raw_id()?))
    }
}

/// Computes the group id over a set of transactions and stamps it into
/// each of them.
pub fn assign_group_id(transactions: &mut [Transaction]) -> Result<(), AlgodError> {
    #[derive(Serialize)]
    struct TxGroup {
        #[serde(rename = "txlist")]
        tx_list: Vec<ByteBuf>,
    }

    let tx_list = transactions
        .iter()
        .map(|txn| Ok(ByteBuf::from(txn.raw_id()?.to_vec())))
        .collect::<Result<Vec<_>, AlgodError>>()?;
    let encoded = rmp_serde::to_vec_named(&TxGroup { tx_list })
        .map_err(|err| AlgodError::Encoding(err.to_string()))?;
    let mut bytes = GROUP_PREFIX.to_vec();
    bytes.extend(encoded);
    let group: [u8; 32] = Sha512_256::digest(&bytes).into();
    for txn in transactions {
        txn.group = ByteBuf::from(group.to_vec());
    }
    Ok(())
}

/// A transaction together with its ed25519 signature. An empty signature
/// is permitted only for simulation.
#[derive(Clone, Debug, Serialize)]
pub struct SignedTransaction {
    #[serde(rename = "sig", skip_serializing_if = "is_empty_bytes")]
    pub signature: ByteBuf,
    #[serde(rename = "txn")]
    pub transaction: Transaction,
}

impl SignedTransaction {
    pub fn unsigned(transaction: Transaction) -> Self {
        Self {
            signature: ByteBuf::new(),
            transaction,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AlgodError> {
        rmp_serde::to_vec_named(self).map_err(|err| AlgodError::Encoding(err.to_string()))
    }
}

/// Builds a bare payment transaction. Zero-amount payments are legal and
/// used when the pool is already incentive eligible.
pub fn make_payment(
    params: &crate::client::SuggestedParams,
    sender: Address,
    receiver: Address,
    amount: u64,
) -> Transaction {
    Transaction {
        amount,
        app_args: Vec::new(),
        on_complete: ON_COMPLETE_NOOP,
        foreign_assets: Vec::new(),
        accounts: Vec::new(),
        boxes: Vec::new(),
        foreign_apps: Vec::new(),
        app_id: 0,
        fee: params.fee,
        first_valid: params.first_valid,
        genesis_id: params.genesis_id.clone(),
        genesis_hash: ByteBuf::from(params.genesis_hash.to_vec()),
        group: ByteBuf::new(),
        last_valid: params.last_valid,
        receiver,
        sender,
        txn_type: TransactionType::Payment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SuggestedParams;

    fn test_params() -> SuggestedParams {
        SuggestedParams {
            fee: MIN_TXN_FEE,
            min_fee: MIN_TXN_FEE,
            first_valid: 1_000,
            last_valid: 1_100,
            genesis_id: "testnet-v1.0".to_owned(),
            genesis_hash: [9u8; 32],
        }
    }

    #[test]
    fn canonical_encoding_elides_empty_fields() {
        let txn = make_payment(&test_params(), Address([1u8; 32]), Address([2u8; 32]), 0);
        let encoded = txn.encode().unwrap();
        // A zero-amount payment must not carry the `amt` key, nor any of
        // the application-call keys.
        assert!(!contains_key(&encoded, b"amt"));
        assert!(!contains_key(&encoded, b"apid"));
        assert!(contains_key(&encoded, b"rcv"));
        assert!(contains_key(&encoded, b"snd"));
    }

    #[test]
    fn group_assignment_is_uniform_and_order_sensitive() {
        let params = test_params();
        let a = make_payment(&params, Address([1u8; 32]), Address([2u8; 32]), 5);
        let b = make_payment(&params, Address([3u8; 32]), Address([4u8; 32]), 6);

        let mut forward = [a.clone(), b.clone()];
        assign_group_id(&mut forward).unwrap();
        assert_eq!(forward[0].group, forward[1].group);
        assert_eq!(forward[0].group.len(), 32);

        let mut reversed = [b, a];
        assign_group_id(&mut reversed).unwrap();
        assert_ne!(forward[0].group, reversed[0].group);
    }

    #[test]
    fn transaction_id_is_52_chars_of_base32() {
        let txn = make_payment(&test_params(), Address([1u8; 32]), Address([2u8; 32]), 1);
        let id = txn.id().unwrap();
        assert_eq!(id.len(), 52);
        assert!(id.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    fn contains_key(encoded: &[u8], key: &[u8]) -> bool {
        encoded
            .windows(key.len())
            .any(|window| window == key)
    }
}
