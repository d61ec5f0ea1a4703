// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{client::AlgodClient, error::AlgodError};

const GENERATE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// The voting key material inside a participation key record. The byte
/// fields stay base64 as delivered by the REST surface; they are only
/// decoded when handed to a key registration call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct VotingKeyData {
    #[serde(default)]
    pub selection_participation_key: String,
    #[serde(default)]
    pub state_proof_key: String,
    #[serde(default)]
    pub vote_first_valid: u64,
    #[serde(default)]
    pub vote_key_dilution: u64,
    #[serde(default)]
    pub vote_last_valid: u64,
    #[serde(default)]
    pub vote_participation_key: String,
}

/// A participation key held by the local node.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipationKey {
    pub address: String,
    #[serde(default)]
    pub effective_first_valid: u64,
    #[serde(default)]
    pub effective_last_valid: u64,
    pub id: String,
    pub key: VotingKeyData,
    #[serde(default)]
    pub last_block_proposal: u64,
    #[serde(default)]
    pub last_vote: u64,
}

impl ParticipationKey {
    /// Raw selection key bytes, for comparison against the account record.
    pub fn selection_key_bytes(&self) -> Result<Vec<u8>, AlgodError> {
        decode_b64("selection key", &self.key.selection_participation_key)
    }

    pub fn vote_key_bytes(&self) -> Result<Vec<u8>, AlgodError> {
        decode_b64("vote key", &self.key.vote_participation_key)
    }

    pub fn state_proof_key_bytes(&self) -> Result<Vec<u8>, AlgodError> {
        decode_b64("state proof key", &self.key.state_proof_key)
    }
}

fn decode_b64(what: &str, value: &str) -> Result<Vec<u8>, AlgodError> {
    BASE64
        .decode(value)
        .map_err(|err| AlgodError::Encoding(format!("bad {what}: {err}")))
}

/// Local participation keys grouped by the account they vote for.
pub type PartKeysByAddress = BTreeMap<String, Vec<ParticipationKey>>;

/// Thin store over the node's own participation key inventory. Stateless:
/// the node is the single source of truth.
pub struct PartKeyStore {
    algod: Arc<AlgodClient>,
}

impl PartKeyStore {
    pub fn new(algod: Arc<AlgodClient>) -> Self {
        Self { algod }
    }

    /// All keys on the node, grouped by address.
    pub async fn list(&self) -> Result<PartKeysByAddress, AlgodError> {
        let mut grouped = PartKeysByAddress::new();
        for key in self.algod.list_participation_keys().await? {
            grouped.entry(key.address.clone()).or_default().push(key);
        }
        Ok(grouped)
    }

    /// Requests a new key for `address` valid over `[first_valid,
    /// last_valid]` and polls until the node reports it. Key generation is
    /// slow (minutes for long validity windows); polling is every 10
    /// seconds with a 30-minute ceiling.
    pub async fn generate(
        &self,
        token: &CancellationToken,
        address: &str,
        first_valid: u64,
        last_valid: u64,
    ) -> Result<ParticipationKey, AlgodError> {
        info!(account = %address, first_valid, last_valid, "generating participation key");
        self.algod
            .generate_participation_key(address, first_valid, last_valid)
            .await?;

        let deadline = tokio::time::Instant::now() + GENERATE_TIMEOUT;
        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(AlgodError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(AlgodError::KeyGenerationTimeout {
                        account: address.to_owned(),
                        timeout_secs: GENERATE_TIMEOUT.as_secs(),
                    });
                }
                _ = tokio::time::sleep(GENERATE_POLL_INTERVAL) => {
                    let keys = self.list().await?;
                    let found = keys.get(address).and_then(|keys| {
                        keys.iter()
                            .find(|key| key.key.vote_first_valid == first_valid)
                            .cloned()
                    });
                    if let Some(key) = found {
                        info!(account = %address, id = %key.id, "participation key generated");
                        return Ok(key);
                    }
                }
            }
        }
    }

    pub async fn delete(&self, key_id: &str) -> Result<(), AlgodError> {
        info!(id = %key_id, "deleting participation key");
        self.algod.delete_participation_key(key_id).await
    }
}
