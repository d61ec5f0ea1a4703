// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::{
    error::AlgodError,
    keys::ParticipationKey,
    retry::{Backoff, RetryPolicy},
    transactions::{SignedTransaction, DEFAULT_VALID_ROUND_RANGE},
};

/// How a client reaches its algod instance.
#[derive(Clone, Debug)]
pub struct AlgodConnection {
    pub url: String,
    pub token: String,
    pub headers: Vec<(String, String)>,
}

/// Suggested transaction parameters, already adjusted for submission: the
/// first valid round is pulled back one round (nodes we submit to may lag
/// the node we read from) and the validity window is capped.
#[derive(Clone, Debug)]
pub struct SuggestedParams {
    pub fee: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    pub last_round: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountParticipation {
    #[serde(default)]
    pub selection_participation_key: String,
    #[serde(default)]
    pub vote_participation_key: String,
    #[serde(default)]
    pub state_proof_key: String,
    #[serde(default)]
    pub vote_first_valid: u64,
    #[serde(default)]
    pub vote_last_valid: u64,
    #[serde(default)]
    pub vote_key_dilution: u64,
}

/// The subset of the account record the daemon consumes, fetched with
/// `exclude=all` so asset holdings never inflate the response.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountInfo {
    pub address: String,
    pub amount: u64,
    #[serde(default)]
    pub min_balance: u64,
    pub status: String,
    #[serde(default)]
    pub incentive_eligible: bool,
    #[serde(default)]
    pub participation: Option<AccountParticipation>,
}

impl AccountInfo {
    /// Balance above the minimum-balance requirement.
    pub fn spendable(&self) -> u64 {
        self.amount.saturating_sub(self.min_balance)
    }

    pub fn is_online(&self) -> bool {
        self.status == "Online"
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TealValue {
    #[serde(default)]
    pub bytes: String,
    #[serde(rename = "type")]
    pub value_type: u64,
    #[serde(default)]
    pub uint: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TealKeyValue {
    pub key: String,
    pub value: TealValue,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationParams {
    #[serde(default)]
    pub global_state: Vec<TealKeyValue>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationInfo {
    pub id: u64,
    pub params: ApplicationParams,
}

/// Options for a read-only simulation pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulateConfig {
    pub allow_empty_signatures: bool,
    pub allow_unnamed_resources: bool,
}

/// The per-group result of a simulation: the failure message (empty on
/// success), the extra opcode budget the group was granted, and the log
/// streams of each transaction for ABI return extraction.
#[derive(Clone, Debug)]
pub struct SimulateGroupResult {
    pub failure_message: String,
    pub app_budget_added: u64,
    pub txn_logs: Vec<Vec<Vec<u8>>>,
}

/// Typed wrapper over the algod REST surface. Cheap to clone is not a
/// goal; share it behind an `Arc`.
pub struct AlgodClient {
    http: reqwest::Client,
    base: Url,
}

impl AlgodClient {
    /// Builds the client. The connection pool is sized for the daemon's
    /// parallel pool fan-outs against a single host.
    pub fn new(connection: &AlgodConnection) -> Result<Self, AlgodError> {
        let base = Url::parse(connection.url.trim_end_matches('/'))
            .map_err(|err| AlgodError::Encoding(format!("bad algod url: {err}")))?;

        let mut headers = HeaderMap::new();
        if !connection.token.is_empty() {
            let value = HeaderValue::from_str(&connection.token)
                .map_err(|err| AlgodError::Encoding(format!("bad algod token: {err}")))?;
            headers.insert(HeaderName::from_static("x-algo-api-token"), value);
        }
        for (key, value) in &connection.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| AlgodError::Encoding(format!("bad header name {key:?}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| AlgodError::Encoding(format!("bad header value: {err}")))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(100)
            .timeout(Duration::from_secs(30))
            .build()?;

        info!(url = %base, "connecting to algod");
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AlgodError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .query(query)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn decode_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AlgodError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| value.get("message")?.as_str().map(str::to_owned))
                .unwrap_or(body);
            return Err(AlgodError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn status(&self) -> Result<NodeStatus, AlgodError> {
        self.get_json("/v2/status", &[]).await
    }

    /// Blocks until a round later than `round` is committed, then returns
    /// the fresh status.
    pub async fn status_after_round(&self, round: u64) -> Result<NodeStatus, AlgodError> {
        self.get_json(&format!("/v2/status/wait-for-block-after/{round}"), &[])
            .await
    }

    /// Unix timestamp of the given block.
    pub async fn block_timestamp(&self, round: u64) -> Result<i64, AlgodError> {
        #[derive(Deserialize)]
        struct BlockHeader {
            #[serde(default)]
            ts: i64,
        }
        #[derive(Deserialize)]
        struct BlockResponse {
            block: BlockHeader,
        }
        let response: BlockResponse = self
            .get_json(
                &format!("/v2/blocks/{round}"),
                &[("format", "json".to_owned())],
            )
            .await?;
        Ok(response.block.ts)
    }

    /// Account record without asset data, but including the min balance.
    pub async fn account(&self, address: &str) -> Result<AccountInfo, AlgodError> {
        self.get_json(
            &format!("/v2/accounts/{address}"),
            &[("exclude", "all".to_owned())],
        )
        .await
    }

    pub async fn application(&self, app_id: u64) -> Result<ApplicationInfo, AlgodError> {
        self.get_json(&format!("/v2/applications/{app_id}"), &[]).await
    }

    /// Raw content of an application box. A missing box surfaces as a 404
    /// `Api` error; callers treat that as "not created yet" where needed.
    pub async fn application_box(&self, app_id: u64, name: &[u8]) -> Result<Vec<u8>, AlgodError> {
        #[derive(Deserialize)]
        struct BoxResponse {
            value: String,
        }
        let response: BoxResponse = self
            .get_json(
                &format!("/v2/applications/{app_id}/box"),
                &[("name", format!("b64:{}", BASE64.encode(name)))],
            )
            .await?;
        BASE64
            .decode(response.value)
            .map_err(|err| AlgodError::Encoding(format!("bad box content: {err}")))
    }

    pub async fn list_participation_keys(&self) -> Result<Vec<ParticipationKey>, AlgodError> {
        // algod returns a JSON `null` body when the node holds no keys.
        let keys: Option<Vec<ParticipationKey>> = self.get_json("/v2/participation", &[]).await?;
        Ok(keys.unwrap_or_default())
    }

    /// Kicks off key generation on the node. The call returns before the
    /// key exists; see [`crate::PartKeyStore::generate`] for the polling
    /// wrapper.
    pub async fn generate_participation_key(
        &self,
        address: &str,
        first_valid: u64,
        last_valid: u64,
    ) -> Result<(), AlgodError> {
        let response = self
            .http
            .post(self.endpoint(&format!("/v2/participation/generate/{address}")))
            .query(&[
                ("first", first_valid.to_string()),
                ("last", last_valid.to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AlgodError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    pub async fn delete_participation_key(&self, key_id: &str) -> Result<(), AlgodError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("/v2/participation/{key_id}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AlgodError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Software version of the node, as recorded on chain by
    /// `updateAlgodVer`.
    pub async fn version_string(&self) -> Result<String, AlgodError> {
        #[derive(Deserialize)]
        struct BuildVersion {
            major: u64,
            minor: u64,
            build_number: u64,
            branch: String,
            commit_hash: String,
        }
        #[derive(Deserialize)]
        struct VersionsResponse {
            build: BuildVersion,
        }
        let response: VersionsResponse = self.get_json("/versions", &[]).await?;
        let build = response.build;
        Ok(format!(
            "{}.{}.{} {} [{}]",
            build.major, build.minor, build.build_number, build.branch, build.commit_hash
        ))
    }

    /// Fetches suggested parameters, retrying with exponential backoff
    /// until the node answers, then applies the daemon's submission
    /// adjustments (flat minimum fee, short validity window).
    pub async fn suggested_params(
        &self,
        token: &CancellationToken,
    ) -> Result<SuggestedParams, AlgodError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct TransactionParams {
            min_fee: u64,
            genesis_hash: String,
            genesis_id: String,
            last_round: u64,
        }

        let policy = RetryPolicy::new(
            0,
            Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        );
        // Don't take no for an answer from this endpoint; nothing can be
        // submitted without it.
        let raw: TransactionParams = policy
            .run(token, |_| true, || {
                self.get_json("/v2/transactions/params", &[])
            })
            .await?;

        let genesis_hash: [u8; 32] = BASE64
            .decode(&raw.genesis_hash)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| AlgodError::Encoding("bad genesis hash".to_owned()))?;

        let first_valid = raw.last_round.saturating_sub(1);
        Ok(SuggestedParams {
            fee: raw.min_fee,
            min_fee: raw.min_fee,
            first_valid,
            last_valid: first_valid + DEFAULT_VALID_ROUND_RANGE,
            genesis_id: raw.genesis_id,
            genesis_hash,
        })
    }

    /// Submits a signed group and returns the id of its first transaction.
    pub async fn submit_group(
        &self,
        transactions: &[SignedTransaction],
    ) -> Result<String, AlgodError> {
        #[derive(Deserialize)]
        struct SubmitResponse {
            #[serde(rename = "txId")]
            tx_id: String,
        }
        let mut body = Vec::new();
        for signed in transactions {
            body.extend(signed.encode()?);
        }
        let response = self
            .http
            .post(self.endpoint("/v2/transactions"))
            .header("Content-Type", "application/x-binary")
            .body(body)
            .send()
            .await?;
        let response: SubmitResponse = Self::decode_response(response).await?;
        debug!(txid = %response.tx_id, "submitted transaction group");
        Ok(response.tx_id)
    }

    /// Simulates a single group without committing anything.
    pub async fn simulate(
        &self,
        transactions: &[SignedTransaction],
        config: SimulateConfig,
    ) -> Result<SimulateGroupResult, AlgodError> {
        #[derive(serde::Serialize)]
        struct SimulateRequestGroup<'a> {
            #[serde(rename = "txns")]
            txns: &'a [SignedTransaction],
        }
        #[derive(serde::Serialize)]
        struct SimulateRequest<'a> {
            #[serde(rename = "allow-empty-signatures")]
            allow_empty_signatures: bool,
            #[serde(rename = "allow-unnamed-resources")]
            allow_unnamed_resources: bool,
            #[serde(rename = "txn-groups")]
            txn_groups: Vec<SimulateRequestGroup<'a>>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct SimTxnResult {
            #[serde(default)]
            logs: Vec<String>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct SimTxnResultWrapper {
            txn_result: SimTxnResult,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct SimGroupResult {
            #[serde(default)]
            failure_message: String,
            #[serde(default)]
            app_budget_added: u64,
            #[serde(default)]
            txn_results: Vec<SimTxnResultWrapper>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct SimulateResponse {
            txn_groups: Vec<SimGroupResult>,
        }

        let request = SimulateRequest {
            allow_empty_signatures: config.allow_empty_signatures,
            allow_unnamed_resources: config.allow_unnamed_resources,
            txn_groups: vec![SimulateRequestGroup { txns: transactions }],
        };
        let body = rmp_serde::to_vec_named(&request)
            .map_err(|err| AlgodError::Encoding(err.to_string()))?;
        let response = self
            .http
            .post(self.endpoint("/v2/transactions/simulate"))
            .header("Content-Type", "application/msgpack")
            .body(body)
            .send()
            .await?;
        let response: SimulateResponse = Self::decode_response(response).await?;
        let group = response
            .txn_groups
            .into_iter()
            .next()
            .ok_or_else(|| AlgodError::Encoding("empty simulate response".to_owned()))?;

        let txn_logs = group
            .txn_results
            .iter()
            .map(|result| {
                result
                    .txn_result
                    .logs
                    .iter()
                    .map(|log| {
                        BASE64
                            .decode(log)
                            .map_err(|err| AlgodError::Encoding(format!("bad log entry: {err}")))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SimulateGroupResult {
            failure_message: group.failure_message,
            app_budget_added: group.app_budget_added,
            txn_logs,
        })
    }

    /// Waits until `txid` is confirmed, checking once per committed round
    /// for at most `max_rounds` rounds.
    pub async fn wait_for_confirmation(
        &self,
        txid: &str,
        max_rounds: u64,
    ) -> Result<u64, AlgodError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct PendingInfo {
            #[serde(default)]
            confirmed_round: u64,
            #[serde(default)]
            pool_error: String,
        }

        let mut current = self.status().await?.last_round;
        let deadline = current + max_rounds;
        loop {
            let pending: PendingInfo = self
                .get_json(
                    &format!("/v2/transactions/pending/{txid}"),
                    &[("format", "json".to_owned())],
                )
                .await?;
            if pending.confirmed_round > 0 {
                return Ok(pending.confirmed_round);
            }
            if !pending.pool_error.is_empty() {
                return Err(AlgodError::TransactionRejected {
                    txid: txid.to_owned(),
                    message: pending.pool_error,
                });
            }
            if current >= deadline {
                return Err(AlgodError::ConfirmationTimeout {
                    txid: txid.to_owned(),
                    rounds: max_rounds,
                });
            }
            current = self.status_after_round(current).await?.last_round;
        }
    }
}
