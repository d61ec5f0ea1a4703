// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context as _};
use clap::Parser;
use reti_algod::{AlgodConnection, InMemorySigner, TransactionSigner};

/// Named networks with their default endpoints and registry app ids.
/// Environment settings override every default.
struct NetworkDefaults {
    node_url: &'static str,
    node_token: &'static str,
    reti_app_id: u64,
}

fn network_defaults(network: &str) -> anyhow::Result<NetworkDefaults> {
    Ok(match network {
        "mainnet" => NetworkDefaults {
            node_url: "https://mainnet-api.algonode.cloud",
            node_token: "",
            reti_app_id: 0,
        },
        "testnet" => NetworkDefaults {
            node_url: "https://testnet-api.algonode.cloud",
            node_token: "",
            reti_app_id: 0,
        },
        "betanet" => NetworkDefaults {
            node_url: "https://betanet-api.algonode.cloud",
            node_token: "",
            reti_app_id: 0,
        },
        "sandbox" => NetworkDefaults {
            node_url: "http://localhost:4001",
            node_token: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            reti_app_id: 0,
        },
        "voitestnet" => NetworkDefaults {
            node_url: "https://testnet-api.voi.nodely.io",
            node_token: "",
            reti_app_id: 0,
        },
        other => bail!("unknown network: {other}"),
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "reti-nodemgr",
    about = "Background daemon maintaining participation keys and epoch payouts for validator staking pools",
    version
)]
pub struct NodeManagerOptions {
    /// Algorand network to run against.
    #[arg(long, short = 'n', env = "ALGO_NETWORK", default_value = "mainnet")]
    pub network: String,

    /// Application id of the validator registry contract.
    #[arg(long = "retiid", env = "RETI_APPID", default_value_t = 0)]
    pub reti_app_id: u64,

    /// The validator id this daemon serves.
    #[arg(long = "validator", env = "RETI_VALIDATORID", default_value_t = 0)]
    pub validator_id: u64,

    /// The node number (1+) this host represents among the validator's
    /// configured nodes.
    #[arg(long = "node", env = "RETI_NODENUM", default_value_t = 0)]
    pub node_num: u64,

    /// Port exposing the prometheus /metrics and /ready endpoints.
    #[arg(long, default_value_t = 6260)]
    pub port: u16,

    /// Wall-clock epoch length driving the payout scheduler.
    #[arg(long = "epoch-minutes", env = "RETI_EPOCHMINUTES", default_value_t = 60)]
    pub epoch_minutes: u64,

    /// Set to 1 for debug logging.
    #[arg(long, env = "DEBUG", default_value = "0")]
    pub debug: String,

    /// Base URL of the algod REST endpoint.
    #[arg(long = "algod-url", env = "ALGO_ALGOD_URL")]
    pub algod_url: Option<String>,

    /// Admin token for algod; takes precedence over the plain token.
    #[arg(long = "algod-admin-token", env = "ALGO_ALGOD_ADMIN_TOKEN", hide_env_values = true)]
    pub algod_admin_token: Option<String>,

    #[arg(long = "algod-token", env = "ALGO_ALGOD_TOKEN", hide_env_values = true)]
    pub algod_token: Option<String>,

    /// Extra headers for every algod request, as `key:value,key:value`.
    #[arg(long = "algod-headers", env = "ALGO_ALGOD_HEADERS")]
    pub algod_headers: Option<String>,

    /// Local node data directory; when set, the endpoint and admin token
    /// are read from `algod.net` and `algod.admin.token` inside it.
    #[arg(long = "algorand-data", env = "ALGORAND_DATA")]
    pub algorand_data: Option<PathBuf>,

    /// Base URL of the NFD API for this network. Accepted for
    /// compatibility with the wider tooling; the daemon itself performs
    /// no name-directory lookups.
    #[arg(long = "nfd-url", env = "ALGO_NFD_URL")]
    pub nfd_api_url: Option<String>,

    /// Comma-separated base64 ed25519 seeds for the owner or manager
    /// accounts this daemon signs for.
    #[arg(long = "signer-keys", env = "ALGO_SIGNER_KEYS", hide_env_values = true)]
    pub signer_keys: Option<String>,
}

impl NodeManagerOptions {
    pub fn debug_enabled(&self) -> bool {
        self.debug == "1"
    }

    /// The registry app id: explicit configuration first, then the
    /// network default.
    pub fn resolved_reti_app_id(&self) -> anyhow::Result<u64> {
        if self.reti_app_id != 0 {
            return Ok(self.reti_app_id);
        }
        let defaults = network_defaults(&self.network)?;
        if defaults.reti_app_id == 0 {
            bail!("the validator registry app id must be set via --retiid or RETI_APPID");
        }
        Ok(defaults.reti_app_id)
    }

    /// Resolves how to reach algod: the data directory wins, then
    /// explicit URL/token settings layered over the network defaults.
    pub fn resolve_connection(&self) -> anyhow::Result<AlgodConnection> {
        if let Some(data_dir) = &self.algorand_data {
            let net = std::fs::read_to_string(data_dir.join("algod.net"))
                .with_context(|| format!("reading {}", data_dir.join("algod.net").display()))?;
            let token = std::fs::read_to_string(data_dir.join("algod.admin.token"))
                .with_context(|| {
                    format!("reading {}", data_dir.join("algod.admin.token").display())
                })?;
            return Ok(AlgodConnection {
                url: format!("http://{}", net.trim()),
                token: token.trim().to_owned(),
                headers: Vec::new(),
            });
        }

        let defaults = network_defaults(&self.network)?;
        let url = self
            .algod_url
            .clone()
            .unwrap_or_else(|| defaults.node_url.to_owned());
        let token = self
            .algod_admin_token
            .clone()
            .or_else(|| self.algod_token.clone())
            .unwrap_or_else(|| defaults.node_token.to_owned());
        Ok(AlgodConnection {
            url: url.trim_end_matches('/').to_owned(),
            token,
            headers: parse_headers(self.algod_headers.as_deref().unwrap_or_default()),
        })
    }

    /// Builds the local signer from the configured seed material.
    pub fn build_signer(&self) -> anyhow::Result<Arc<dyn TransactionSigner>> {
        let value = self
            .signer_keys
            .as_deref()
            .context("ALGO_SIGNER_KEYS must provide at least one signing seed")?;
        let signer = InMemorySigner::from_env_value(value).context("parsing signer seeds")?;
        if signer.is_empty() {
            bail!("ALGO_SIGNER_KEYS contained no usable seeds");
        }
        Ok(Arc::new(signer))
    }
}

/// Parses `key:value,key:value` header lists. Values may themselves
/// contain colons; only the first one splits.
fn parse_headers(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':')?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lists_split_on_first_colon_only() {
        let headers = parse_headers("X-API-Key: secret, Authorization: Bearer a:b:c");
        assert_eq!(
            headers,
            vec![
                ("X-API-Key".to_owned(), "secret".to_owned()),
                ("Authorization".to_owned(), "Bearer a:b:c".to_owned()),
            ]
        );
        assert!(parse_headers("").is_empty());
        assert!(parse_headers("no-colon-here").is_empty());
    }

    #[test]
    fn unknown_networks_are_rejected() {
        assert!(network_defaults("devnet").is_err());
        for known in ["sandbox", "betanet", "testnet", "mainnet", "voitestnet"] {
            assert!(network_defaults(known).is_ok(), "{known} should be known");
        }
    }

    #[test]
    fn admin_token_takes_precedence() {
        let options = NodeManagerOptions::parse_from([
            "reti-nodemgr",
            "--network",
            "sandbox",
            "--algod-admin-token",
            "admin",
            "--algod-token",
            "plain",
        ]);
        let connection = options.resolve_connection().unwrap();
        assert_eq!(connection.token, "admin");
        assert_eq!(connection.url, "http://localhost:4001");
    }

    #[test]
    fn plain_token_and_url_fall_through() {
        let options = NodeManagerOptions::parse_from([
            "reti-nodemgr",
            "--network",
            "testnet",
            "--algod-url",
            "https://node.example.com/",
            "--algod-token",
            "plain",
        ]);
        let connection = options.resolve_connection().unwrap();
        assert_eq!(connection.token, "plain");
        assert_eq!(connection.url, "https://node.example.com");
    }
}
