// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The on-chain data model of a validator and its pools, with decoding
//! from the ABI tuples the registry contract returns.

use std::{collections::BTreeMap, fmt};

use reti_algod::{
    abi::{AbiType, AbiValue},
    format_micro_algos, Address,
};

use crate::{
    constants::{MAX_NODES, MAX_POOLS_PER_NODE},
    error::RetiError,
};

/// Configuration of one validator, as stored in the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Sequentially assigned id; 0 is invalid.
    pub id: u64,
    /// Account controlling the configuration - presumably a cold wallet.
    pub owner: Address,
    /// Account that triggers and pays for payouts and key registrations;
    /// has to be a hot wallet since the node signs for it.
    pub manager: Address,
    pub nfd_app_id: u64,
    pub entry_gating_type: u8,
    pub entry_gating_address: Address,
    pub entry_gating_assets: [u64; 4],
    pub gating_asset_min_balance: u64,
    pub reward_token_id: u64,
    pub reward_per_payout: u64,
    /// Number of consensus rounds per payout epoch.
    pub epoch_round_length: u32,
    /// Payout percentage with four implied decimals: 50000 = 5%.
    pub percent_to_validator: u32,
    /// Receives the validator commission each epoch; may be the zero
    /// address.
    pub commission_address: Address,
    pub min_entry_stake: u64,
    pub max_algo_per_pool: u64,
    pub pools_per_node: u8,
    pub sunsetting_on: u64,
    pub sunsetting_to: u64,
}

impl ValidatorConfig {
    pub fn abi_type() -> AbiType {
        AbiType::Tuple(vec![
            AbiType::Uint(64),                                          // id
            AbiType::Address,                                           // owner
            AbiType::Address,                                           // manager
            AbiType::Uint(64),                                          // nfdAppId
            AbiType::Uint(8),                                           // entryGatingType
            AbiType::Address,                                           // entryGatingAddress
            AbiType::StaticArray(Box::new(AbiType::Uint(64)), 4),       // entryGatingAssets
            AbiType::Uint(64),                                          // gatingAssetMinBalance
            AbiType::Uint(64),                                          // rewardTokenId
            AbiType::Uint(64),                                          // rewardPerPayout
            AbiType::Uint(32),                                          // epochRoundLength
            AbiType::Uint(32),                                          // percentToValidator
            AbiType::Address,                                           // commissionAddress
            AbiType::Uint(64),                                          // minEntryStake
            AbiType::Uint(64),                                          // maxAlgoPerPool
            AbiType::Uint(8),                                           // poolsPerNode
            AbiType::Uint(64),                                          // sunsettingOn
            AbiType::Uint(64),                                          // sunsettingTo
        ])
    }

    pub fn from_abi(value: AbiValue) -> Result<Self, RetiError> {
        let fields = value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?;
        let mut fields = fields.into_iter();
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| RetiError::AbiShape("validator config tuple too short".into()))
        };
        let uint = |value: AbiValue| value.as_uint().map_err(|e| RetiError::AbiShape(e.to_string()));
        let addr =
            |value: AbiValue| value.as_address().map_err(|e| RetiError::AbiShape(e.to_string()));

        let id = uint(next()?)?;
        let owner = addr(next()?)?;
        let manager = addr(next()?)?;
        let nfd_app_id = uint(next()?)?;
        let entry_gating_type = uint(next()?)? as u8;
        let entry_gating_address = addr(next()?)?;
        let mut entry_gating_assets = [0u64; 4];
        for (slot, element) in entry_gating_assets.iter_mut().zip(
            next()?
                .into_elements()
                .map_err(|err| RetiError::AbiShape(err.to_string()))?,
        ) {
            *slot = uint(element)?;
        }
        Ok(Self {
            id,
            owner,
            manager,
            nfd_app_id,
            entry_gating_type,
            entry_gating_address,
            entry_gating_assets,
            gating_asset_min_balance: uint(next()?)?,
            reward_token_id: uint(next()?)?,
            reward_per_payout: uint(next()?)?,
            epoch_round_length: uint(next()?)? as u32,
            percent_to_validator: uint(next()?)? as u32,
            commission_address: addr(next()?)?,
            min_entry_stake: uint(next()?)?,
            max_algo_per_pool: uint(next()?)?,
            pools_per_node: uint(next()?)? as u8,
            sunsetting_on: uint(next()?)?,
            sunsetting_to: uint(next()?)?,
        })
    }
}

impl fmt::Display for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Owner: {}", self.owner)?;
        writeln!(f, "Manager: {}", self.manager)?;
        writeln!(f, "Commission Address: {}", self.commission_address)?;
        writeln!(
            f,
            "% to Validator: {:.4}",
            self.percent_to_validator as f64 / 10_000.0
        )?;
        writeln!(f, "Epoch Length: {} rounds", self.epoch_round_length)?;
        writeln!(
            f,
            "Min Entry Stake: {}",
            format_micro_algos(self.min_entry_stake)
        )?;
        writeln!(
            f,
            "Max Algo Per Pool: {}",
            format_micro_algos(self.max_algo_per_pool)
        )?;
        write!(f, "Max Pools per Node: {}", self.pools_per_node)
    }
}

/// Live state of one pool. Pools are numbered 1..N; position conveys
/// identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolInfo {
    pub pool_app_id: u64,
    pub total_stakers: u16,
    pub total_algo_staked: u64,
}

impl PoolInfo {
    pub fn abi_element_type() -> AbiType {
        AbiType::Tuple(vec![
            AbiType::Uint(64),
            AbiType::Uint(16),
            AbiType::Uint(64),
        ])
    }

    pub fn list_from_abi(value: AbiValue) -> Result<Vec<Self>, RetiError> {
        let elements = value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?;
        elements
            .into_iter()
            .map(|element| {
                let fields = element
                    .into_elements()
                    .map_err(|err| RetiError::AbiShape(err.to_string()))?;
                let [app, stakers, staked] = fields.as_slice() else {
                    return Err(RetiError::AbiShape("pool info must have 3 fields".into()));
                };
                Ok(PoolInfo {
                    pool_app_id: app.as_uint().map_err(|e| RetiError::AbiShape(e.to_string()))?,
                    total_stakers: stakers
                        .as_uint()
                        .map_err(|e| RetiError::AbiShape(e.to_string()))?
                        as u16,
                    total_algo_staked: staked
                        .as_uint()
                        .map_err(|e| RetiError::AbiShape(e.to_string()))?,
                })
            })
            .collect()
    }
}

/// Pools assigned to one physical node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub pool_app_ids: Vec<u64>,
}

/// The full node-to-pool assignment grid of a validator. Every pool app
/// id appears in exactly one node's list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePoolAssignments {
    pub nodes: Vec<NodeConfig>,
}

impl NodePoolAssignments {
    pub fn abi_type() -> AbiType {
        AbiType::Tuple(vec![AbiType::StaticArray(
            Box::new(AbiType::Tuple(vec![AbiType::StaticArray(
                Box::new(AbiType::Uint(64)),
                MAX_POOLS_PER_NODE,
            )])),
            MAX_NODES,
        )])
    }

    /// Decodes the fixed 12x6 grid, dropping the zero padding of
    /// unassigned slots.
    pub fn from_abi(value: AbiValue) -> Result<Self, RetiError> {
        let mut outer = value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?;
        let nodes_value = outer
            .pop()
            .ok_or_else(|| RetiError::AbiShape("empty assignment tuple".into()))?;
        let nodes = nodes_value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?
            .into_iter()
            .map(|node| {
                let mut fields = node
                    .into_elements()
                    .map_err(|err| RetiError::AbiShape(err.to_string()))?;
                let ids_value = fields
                    .pop()
                    .ok_or_else(|| RetiError::AbiShape("empty node tuple".into()))?;
                let pool_app_ids = ids_value
                    .into_elements()
                    .map_err(|err| RetiError::AbiShape(err.to_string()))?
                    .into_iter()
                    .map(|id| id.as_uint().map_err(|e| RetiError::AbiShape(e.to_string())))
                    .collect::<Result<Vec<u64>, _>>()?
                    .into_iter()
                    .filter(|id| *id != 0)
                    .collect();
                Ok(NodeConfig { pool_app_ids })
            })
            .collect::<Result<Vec<_>, RetiError>>()?;
        Ok(Self { nodes })
    }

    /// Total number of assigned pools across all nodes.
    pub fn assigned_pool_count(&self) -> usize {
        self.nodes.iter().map(|node| node.pool_app_ids.len()).sum()
    }
}

/// Protocol-wide constraints from the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolConstraints {
    pub epoch_payout_rounds_min: u64,
    pub epoch_payout_rounds_max: u64,
    pub min_pct_to_validator_w_four_decimals: u64,
    pub max_pct_to_validator_w_four_decimals: u64,
    pub min_entry_stake: u64,
    pub max_algo_per_pool: u64,
    pub max_algo_per_validator: u64,
    pub max_nodes: u64,
    pub max_pools_per_node: u64,
    pub max_stakers_per_pool: u64,
}

impl ProtocolConstraints {
    pub fn abi_type() -> AbiType {
        AbiType::Tuple(vec![AbiType::Uint(64); 10])
    }

    pub fn from_abi(value: AbiValue) -> Result<Self, RetiError> {
        let fields = value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?;
        let values = fields
            .into_iter()
            .map(|field| field.as_uint().map_err(|e| RetiError::AbiShape(e.to_string())))
            .collect::<Result<Vec<u64>, _>>()?;
        let [a, b, c, d, e, f, g, h, i, j] = values.as_slice() else {
            return Err(RetiError::AbiShape(
                "protocol constraints must have 10 fields".into(),
            ));
        };
        Ok(Self {
            epoch_payout_rounds_min: *a,
            epoch_payout_rounds_max: *b,
            min_pct_to_validator_w_four_decimals: *c,
            max_pct_to_validator_w_four_decimals: *d,
            min_entry_stake: *e,
            max_algo_per_pool: *f,
            max_algo_per_validator: *g,
            max_nodes: *h,
            max_pools_per_node: *i,
            max_stakers_per_pool: *j,
        })
    }
}

/// Minimum-balance amounts required by the registry for its box storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MbrAmounts {
    pub add_validator_mbr: u64,
    pub add_pool_mbr: u64,
    pub pool_init_mbr: u64,
    pub add_staker_mbr: u64,
}

impl MbrAmounts {
    pub fn abi_type() -> AbiType {
        AbiType::Tuple(vec![AbiType::Uint(64); 4])
    }

    pub fn from_abi(value: AbiValue) -> Result<Self, RetiError> {
        let fields = value
            .into_elements()
            .map_err(|err| RetiError::AbiShape(err.to_string()))?;
        let values = fields
            .into_iter()
            .map(|field| field.as_uint().map_err(|e| RetiError::AbiShape(e.to_string())))
            .collect::<Result<Vec<u64>, _>>()?;
        let [validator, pool, init, staker] = values.as_slice() else {
            return Err(RetiError::AbiShape("MBR record must have 4 fields".into()));
        };
        Ok(Self {
            add_validator_mbr: *validator,
            add_pool_mbr: *pool,
            pool_init_mbr: *init,
            add_staker_mbr: *staker,
        })
    }
}

/// Everything the daemon knows about its validator, refreshed on each
/// key-watcher tick and replaced atomically.
#[derive(Clone, Debug, Default)]
pub struct ValidatorInfo {
    pub config: ValidatorConfig,
    pub pools: Vec<PoolInfo>,
    pub node_pool_assignments: NodePoolAssignments,
    /// 1-based pool id to pool app id, restricted to this node.
    pub local_pools: BTreeMap<u64, u64>,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use reti_algod::abi::{decode, AbiValue};

    use super::*;

    fn encode_assignment_grid(nodes: &[Vec<u64>]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for node in 0..MAX_NODES {
            for slot in 0..MAX_POOLS_PER_NODE {
                let id = nodes
                    .get(node)
                    .and_then(|pools| pools.get(slot))
                    .copied()
                    .unwrap_or(0);
                bytes.extend_from_slice(&id.to_be_bytes());
            }
        }
        bytes
    }

    #[test]
    fn assignment_grid_drops_zero_padding() {
        let bytes = encode_assignment_grid(&[vec![100, 101], vec![], vec![102]]);
        let value = decode(&NodePoolAssignments::abi_type(), &bytes).unwrap();
        let assignments = NodePoolAssignments::from_abi(value).unwrap();
        assert_eq!(assignments.nodes.len(), MAX_NODES);
        assert_eq!(assignments.nodes[0].pool_app_ids, vec![100, 101]);
        assert!(assignments.nodes[1].pool_app_ids.is_empty());
        assert_eq!(assignments.nodes[2].pool_app_ids, vec![102]);
        assert_eq!(assignments.assigned_pool_count(), 3);
    }

    #[test]
    fn assignments_are_a_permutation_of_the_pool_list() {
        // The invariant LoadState relies on: every assigned pool app id
        // appears exactly once, and the multiset matches the pool list.
        let pools = [100u64, 101, 102, 103];
        let bytes = encode_assignment_grid(&[vec![100, 103], vec![101], vec![102]]);
        let value = decode(&NodePoolAssignments::abi_type(), &bytes).unwrap();
        let assignments = NodePoolAssignments::from_abi(value).unwrap();

        let assigned: Vec<u64> = assignments
            .nodes
            .iter()
            .flat_map(|node| node.pool_app_ids.iter().copied())
            .collect();
        assert_eq!(assigned.len(), pools.len());
        assert_eq!(
            assigned.iter().copied().collect::<BTreeSet<_>>(),
            pools.iter().copied().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn pool_list_decodes_from_dynamic_array() {
        let mut bytes = 2u16.to_be_bytes().to_vec();
        for (app, stakers, staked) in [(100u64, 5u16, 7_000_000u64), (101, 0, 0)] {
            bytes.extend_from_slice(&app.to_be_bytes());
            bytes.extend_from_slice(&stakers.to_be_bytes());
            bytes.extend_from_slice(&staked.to_be_bytes());
        }
        let ty = reti_algod::abi::AbiType::DynamicArray(Box::new(PoolInfo::abi_element_type()));
        let pools = PoolInfo::list_from_abi(decode(&ty, &bytes).unwrap()).unwrap();
        assert_eq!(
            pools,
            vec![
                PoolInfo {
                    pool_app_id: 100,
                    total_stakers: 5,
                    total_algo_staked: 7_000_000
                },
                PoolInfo {
                    pool_app_id: 101,
                    total_stakers: 0,
                    total_algo_staked: 0
                },
            ]
        );
    }

    #[test]
    fn validator_config_round_trips_from_abi_bytes() {
        // Hand-encode a config tuple and make sure the field mapping holds.
        let owner = reti_algod::Address([1u8; 32]);
        let manager = reti_algod::Address([2u8; 32]);
        let commission = reti_algod::Address([3u8; 32]);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u64.to_be_bytes()); // id
        bytes.extend_from_slice(owner.as_bytes());
        bytes.extend_from_slice(manager.as_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes()); // nfd
        bytes.push(0); // gating type
        bytes.extend_from_slice(reti_algod::ZERO_ADDRESS.as_bytes());
        bytes.extend_from_slice(&[0u8; 32]); // gating assets x4
        bytes.extend_from_slice(&0u64.to_be_bytes()); // gating min balance
        bytes.extend_from_slice(&0u64.to_be_bytes()); // reward token
        bytes.extend_from_slice(&0u64.to_be_bytes()); // reward per payout
        bytes.extend_from_slice(&1285u32.to_be_bytes()); // epoch rounds
        bytes.extend_from_slice(&50_000u32.to_be_bytes()); // pct
        bytes.extend_from_slice(commission.as_bytes());
        bytes.extend_from_slice(&1_000_000u64.to_be_bytes()); // min entry
        bytes.extend_from_slice(&240_000_000_000u64.to_be_bytes()); // max per pool
        bytes.push(3); // pools per node
        bytes.extend_from_slice(&0u64.to_be_bytes()); // sunsetting on
        bytes.extend_from_slice(&0u64.to_be_bytes()); // sunsetting to

        let value = decode(&ValidatorConfig::abi_type(), &bytes).unwrap();
        let config = ValidatorConfig::from_abi(value).unwrap();
        assert_eq!(config.id, 7);
        assert_eq!(config.owner, owner);
        assert_eq!(config.manager, manager);
        assert_eq!(config.commission_address, commission);
        assert_eq!(config.epoch_round_length, 1285);
        assert_eq!(config.percent_to_validator, 50_000);
        assert_eq!(config.pools_per_node, 3);
    }

    #[test]
    fn short_config_tuple_is_rejected() {
        let config = ValidatorConfig::from_abi(AbiValue::Tuple(vec![AbiValue::Uint(1)]));
        assert!(matches!(config, Err(RetiError::AbiShape(_))));
    }
}
