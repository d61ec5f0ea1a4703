// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Box-name conventions of the registry and pool contracts, and the
//! staker-ledger record codec.

use reti_algod::Address;

use crate::error::RetiError;

/// Name of the per-pool staker ledger box.
pub const STAKER_LEDGER_BOX_NAME: &[u8] = b"stakers";

const STAKED_INFO_SIZE: usize = 64;

/// Box name of a validator record: `"v" || big-endian-u64(id)`.
pub fn validator_list_box_name(validator_id: u64) -> Vec<u8> {
    let mut name = b"v".to_vec();
    name.extend_from_slice(&validator_id.to_be_bytes());
    name
}

/// Box name of a staker's pool-set record: `"sps" || raw 32-byte address`.
pub fn staker_pool_set_box_name(staker: &Address) -> Vec<u8> {
    let mut name = b"sps".to_vec();
    name.extend_from_slice(staker.as_bytes());
    name
}

/// One fixed-size record of the staker ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StakedInfo {
    pub account: Address,
    pub balance: u64,
    pub total_rewarded: u64,
    pub reward_token_balance: u64,
    pub entry_round: u64,
}

/// Parses the staker-ledger box content: a concatenation of 64-byte
/// records. Empty slots (zero-address records) are retained; callers
/// filter them as needed.
pub fn parse_staker_ledger(data: &[u8]) -> Result<Vec<StakedInfo>, RetiError> {
    if data.len() % STAKED_INFO_SIZE != 0 {
        return Err(RetiError::LedgerFormat(data.len()));
    }
    data.chunks_exact(STAKED_INFO_SIZE)
        .map(|record| {
            let account = Address::try_from(&record[0..32])
                .map_err(|err| RetiError::AbiShape(err.to_string()))?;
            let u64_at = |start: usize| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&record[start..start + 8]);
                u64::from_be_bytes(raw)
            };
            Ok(StakedInfo {
                account,
                balance: u64_at(32),
                total_rewarded: u64_at(40),
                reward_token_balance: u64_at(48),
                entry_round: u64_at(56),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reti_algod::ZERO_ADDRESS;

    use super::*;

    #[test]
    fn validator_box_name_is_prefix_plus_big_endian_id() {
        assert_eq!(
            validator_list_box_name(258),
            vec![b'v', 0, 0, 0, 0, 0, 0, 1, 2]
        );
    }

    #[test]
    fn staker_pool_set_name_embeds_raw_address() {
        let staker = Address([5u8; 32]);
        let name = staker_pool_set_box_name(&staker);
        assert_eq!(&name[..3], b"sps");
        assert_eq!(&name[3..], staker.as_bytes());
    }

    #[test]
    fn ledger_parses_occupied_then_empty_record() {
        let account = Address([7u8; 32]);
        let mut data = Vec::new();
        data.extend_from_slice(account.as_bytes());
        data.extend_from_slice(&2_000_000u64.to_be_bytes());
        data.extend_from_slice(&150u64.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&41_000u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 64]);

        let ledger = parse_staker_ledger(&data).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].account, account);
        assert_eq!(ledger[0].balance, 2_000_000);
        assert_eq!(ledger[0].total_rewarded, 150);
        assert_eq!(ledger[0].entry_round, 41_000);
        // The empty slot compares equal to the zero-address sentinel.
        assert_eq!(ledger[1].account, ZERO_ADDRESS);
        assert_eq!(ledger[1].balance, 0);
    }

    #[test]
    fn ragged_ledger_content_is_rejected() {
        assert_matches!(
            parse_staker_ledger(&[0u8; 65]),
            Err(RetiError::LedgerFormat(65))
        );
    }
}
