// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The participation-key state machine, as pure decision functions.
//!
//! Each rule inspects a snapshot of (pool accounts, local keys, current
//! round, average block time) and emits the corrective actions for one
//! tick. The key watcher executes them; nothing here touches the network,
//! which keeps the whole state machine unit-testable.

use std::{collections::BTreeMap, time::Duration};

use reti_algod::{ParticipationKey, PartKeysByAddress};

/// Validity window of freshly generated keys.
pub const GENERATED_KEY_LENGTH_DAYS: u64 = 7;

/// A key within this many days of expiry gets a successor generated.
pub const DAYS_PRIOR_TO_EXPIRY_RENEW: u64 = 1;

const SECONDS_PER_DAY: u64 = 86_400;

/// Chain-side view of one pool account, rebuilt each tick.
#[derive(Clone, Debug)]
pub struct OnlineInfo {
    pub pool_app_id: u64,
    pub is_online: bool,
    /// Base64 selection key the chain considers active; the authoritative
    /// pointer to the key the account is online with.
    pub selection_participation_key: String,
    pub first_valid: u64,
}

/// Pool accounts by address text, restricted to funded accounts.
pub type PoolAccounts = BTreeMap<String, OnlineInfo>;

/// A corrective action decided by one of the rules.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyAction {
    Generate {
        account: String,
        first_valid: u64,
        last_valid: u64,
    },
    GoOnline {
        pool_app_id: u64,
        account: String,
        key: ParticipationKey,
    },
    GoOffline {
        pool_app_id: u64,
        account: String,
    },
    DeleteKey {
        account: String,
        id: String,
    },
}

/// Rounds spanning `days` at the current average block time.
pub fn rounds_for_days(days: u64, avg_block_time: Duration) -> u64 {
    let seconds = avg_block_time.as_secs_f64();
    if seconds <= 0.0 {
        return 0;
    }
    ((days * SECONDS_PER_DAY) as f64 / seconds) as u64
}

fn newest_first(keys: &[ParticipationKey]) -> Vec<&ParticipationKey> {
    let mut sorted: Vec<&ParticipationKey> = keys.iter().collect();
    sorted.sort_by(|a, b| b.key.vote_first_valid.cmp(&a.key.vote_first_valid));
    sorted
}

fn active_key<'a>(
    keys: &'a [ParticipationKey],
    info: &OnlineInfo,
) -> Option<&'a ParticipationKey> {
    keys.iter()
        .find(|key| key.key.selection_participation_key == info.selection_participation_key)
}

/// Deletes every key past its last valid round, whichever account it
/// belongs to.
pub fn expired_key_sweep(keys: &PartKeysByAddress, current_round: u64) -> Vec<KeyAction> {
    keys.values()
        .flatten()
        .filter(|key| key.key.vote_last_valid < current_round)
        .map(|key| KeyAction::DeleteKey {
            account: key.address.clone(),
            id: key.id.clone(),
        })
        .collect()
}

/// Rule 1: an account with no local key at all gets a fresh key starting
/// now. Going online is left to a later tick, once the key is visible.
pub fn missing_key_actions(
    accounts: &PoolAccounts,
    keys: &PartKeysByAddress,
    current_round: u64,
    avg_block_time: Duration,
) -> Vec<KeyAction> {
    accounts
        .keys()
        .filter(|account| keys.get(*account).map_or(true, Vec::is_empty))
        .map(|account| KeyAction::Generate {
            account: account.clone(),
            first_valid: current_round,
            last_valid: current_round + rounds_for_days(GENERATED_KEY_LENGTH_DAYS, avg_block_time),
        })
        .collect()
}

/// Rule 2: an offline account that has local keys goes online with the
/// newest of them.
pub fn offline_actions(accounts: &PoolAccounts, keys: &PartKeysByAddress) -> Vec<KeyAction> {
    accounts
        .iter()
        .filter(|(_, info)| !info.is_online)
        .filter_map(|(account, info)| {
            let for_account = keys.get(account)?;
            let newest = newest_first(for_account).into_iter().next()?;
            Some(KeyAction::GoOnline {
                pool_app_id: info.pool_app_id,
                account: account.clone(),
                key: newest.clone(),
            })
        })
        .collect()
}

/// Rule 3: the steady-state renewal check. Only applies while exactly one
/// local key exists (so a pending renewal inhibits further generation),
/// that key is the one the chain is online with, and the key is already
/// effective. Within the renewal window, the successor starts one day
/// before the current key expires.
pub fn renewal_actions(
    accounts: &PoolAccounts,
    keys: &PartKeysByAddress,
    current_round: u64,
    avg_block_time: Duration,
) -> Vec<KeyAction> {
    let renew_window = Duration::from_secs(DAYS_PRIOR_TO_EXPIRY_RENEW * SECONDS_PER_DAY);
    accounts
        .iter()
        .filter(|(_, info)| info.is_online)
        .filter_map(|(account, info)| {
            let for_account = keys.get(account)?;
            if for_account.len() != 1 {
                return None;
            }
            let key = active_key(for_account, info)?;
            if key.effective_first_valid > current_round {
                return None;
            }
            let rounds_left = key.key.vote_last_valid.saturating_sub(current_round);
            let distance_secs = avg_block_time.as_secs_f64() * rounds_left as f64;
            if distance_secs > renew_window.as_secs_f64() {
                return None;
            }
            let first_valid = key
                .key
                .vote_last_valid
                .saturating_sub(rounds_for_days(DAYS_PRIOR_TO_EXPIRY_RENEW, avg_block_time));
            Some(KeyAction::Generate {
                account: account.clone(),
                first_valid,
                last_valid: first_valid
                    + rounds_for_days(GENERATED_KEY_LENGTH_DAYS, avg_block_time),
            })
        })
        .collect()
}

/// Rule 4 and its guard. An online account whose newest key is already
/// valid switches to it; the superseded key is reaped by the expired-key
/// sweep once out of range. An online account where no local key matches
/// the chain's selection key has lost its key material: go offline so the
/// missing-key rule can rebuild from scratch.
pub fn switch_actions(
    accounts: &PoolAccounts,
    keys: &PartKeysByAddress,
    current_round: u64,
) -> Vec<KeyAction> {
    accounts
        .iter()
        .filter(|(_, info)| info.is_online)
        .filter_map(|(account, info)| {
            let for_account = keys.get(account).filter(|keys| !keys.is_empty())?;
            let Some(active) = active_key(for_account, info) else {
                return Some(KeyAction::GoOffline {
                    pool_app_id: info.pool_app_id,
                    account: account.clone(),
                });
            };
            if for_account.len() < 2 {
                return None;
            }
            let newest = newest_first(for_account).into_iter().next()?;
            if newest.id == active.id || newest.key.vote_first_valid > current_round {
                return None;
            }
            Some(KeyAction::GoOnline {
                pool_app_id: info.pool_app_id,
                account: account.clone(),
                key: newest.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVG_BLOCK_SECS: f64 = 3.0;

    fn avg() -> Duration {
        Duration::from_secs_f64(AVG_BLOCK_SECS)
    }

    fn key(account: &str, id: &str, first: u64, last: u64, selection: &str) -> ParticipationKey {
        let mut key = ParticipationKey {
            address: account.to_owned(),
            id: id.to_owned(),
            effective_first_valid: first,
            effective_last_valid: last,
            ..ParticipationKey::default()
        };
        key.key.vote_first_valid = first;
        key.key.vote_last_valid = last;
        key.key.selection_participation_key = selection.to_owned();
        key.key.vote_key_dilution = 100;
        key
    }

    fn keys_for(entries: &[&ParticipationKey]) -> PartKeysByAddress {
        let mut map = PartKeysByAddress::new();
        for entry in entries {
            map.entry(entry.address.clone())
                .or_default()
                .push((*entry).clone());
        }
        map
    }

    fn online(pool_app_id: u64, selection: &str) -> OnlineInfo {
        OnlineInfo {
            pool_app_id,
            is_online: true,
            selection_participation_key: selection.to_owned(),
            first_valid: 0,
        }
    }

    fn offline(pool_app_id: u64) -> OnlineInfo {
        OnlineInfo {
            pool_app_id,
            is_online: false,
            selection_participation_key: String::new(),
            first_valid: 0,
        }
    }

    fn accounts(entries: &[(&str, OnlineInfo)]) -> PoolAccounts {
        entries
            .iter()
            .map(|(account, info)| ((*account).to_owned(), info.clone()))
            .collect()
    }

    #[test]
    fn fresh_pool_gets_one_key_and_no_go_online() {
        // A funded offline pool with zero local keys: first tick issues a
        // single 7-day generation, nothing else.
        let accounts = accounts(&[("POOL1", offline(100))]);
        let keys = PartKeysByAddress::new();
        let cur = 5_000;

        let generated = missing_key_actions(&accounts, &keys, cur, avg());
        let expected_last = cur + ((7 * 86_400) as f64 / AVG_BLOCK_SECS) as u64;
        assert_eq!(
            generated,
            vec![KeyAction::Generate {
                account: "POOL1".to_owned(),
                first_valid: cur,
                last_valid: expected_last,
            }]
        );
        assert!(offline_actions(&accounts, &keys).is_empty());
        assert!(switch_actions(&accounts, &keys, cur).is_empty());
    }

    #[test]
    fn visible_key_takes_offline_account_online() {
        let k = key("POOL1", "k1", 5_000, 200_000, "sel1");
        let accounts = accounts(&[("POOL1", offline(100))]);
        let keys = keys_for(&[&k]);

        let actions = offline_actions(&accounts, &keys);
        assert_eq!(
            actions,
            vec![KeyAction::GoOnline {
                pool_app_id: 100,
                account: "POOL1".to_owned(),
                key: k,
            }]
        );
    }

    #[test]
    fn offline_account_picks_newest_of_several_keys() {
        let older = key("POOL1", "old", 1_000, 90_000, "sel-old");
        let newer = key("POOL1", "new", 50_000, 290_000, "sel-new");
        let accounts = accounts(&[("POOL1", offline(100))]);
        let keys = keys_for(&[&older, &newer]);

        let actions = offline_actions(&accounts, &keys);
        assert_eq!(actions.len(), 1);
        assert!(
            matches!(&actions[0], KeyAction::GoOnline { key, .. } if key.id == "new"),
            "expected the newest key, got {actions:?}"
        );
    }

    #[test]
    fn near_expiry_key_is_renewed_with_one_day_lead() {
        // voteLastValid one day out at 3s blocks.
        let cur = 100_000;
        let one_day_rounds = (86_400f64 / AVG_BLOCK_SECS) as u64;
        let k = key("POOL1", "k1", 10_000, cur + one_day_rounds, "sel1");
        let accounts = accounts(&[("POOL1", online(100, "sel1"))]);
        let keys = keys_for(&[&k]);

        let actions = renewal_actions(&accounts, &keys, cur, avg());
        let expected_first = (cur + one_day_rounds) - one_day_rounds;
        assert_eq!(
            actions,
            vec![KeyAction::Generate {
                account: "POOL1".to_owned(),
                first_valid: expected_first,
                last_valid: expected_first + 7 * one_day_rounds,
            }]
        );
        // And no switching while the successor does not exist yet.
        assert!(switch_actions(&accounts, &keys, cur).is_empty());
    }

    #[test]
    fn renewal_is_inhibited_outside_the_window_and_with_two_keys() {
        let cur = 100_000;
        let far_out = key("POOL1", "k1", 10_000, cur + 2_000_000, "sel1");
        let accounts_online = accounts(&[("POOL1", online(100, "sel1"))]);
        assert!(renewal_actions(&accounts_online, &keys_for(&[&far_out]), cur, avg()).is_empty());

        // A pending renewal key means count != 1, so R3 stays quiet even
        // though the active key is near expiry.
        let near = key("POOL1", "k1", 10_000, cur + 100, "sel1");
        let pending = key("POOL1", "k2", cur + 50, cur + 2_000_000, "sel2");
        assert!(
            renewal_actions(&accounts_online, &keys_for(&[&near, &pending]), cur, avg())
                .is_empty()
        );
    }

    #[test]
    fn renewal_ignores_keys_not_yet_effective() {
        let cur = 100_000;
        let mut k = key("POOL1", "k1", 10_000, cur + 100, "sel1");
        k.effective_first_valid = cur + 10;
        let accounts = accounts(&[("POOL1", online(100, "sel1"))]);
        assert!(renewal_actions(&accounts, &keys_for(&[&k]), cur, avg()).is_empty());
    }

    #[test]
    fn rollover_switches_to_the_newer_valid_key() {
        // K1 active, K2 valid since ten rounds ago: switch, keep K1.
        let cur = 100_000;
        let k1 = key("POOL1", "k1", 10_000, cur + 5_000, "sel1");
        let k2 = key("POOL1", "k2", cur - 10, cur + 300_000, "sel2");
        let accounts = accounts(&[("POOL1", online(100, "sel1"))]);
        let keys = keys_for(&[&k1, &k2]);

        let actions = switch_actions(&accounts, &keys, cur);
        assert_eq!(
            actions,
            vec![KeyAction::GoOnline {
                pool_app_id: 100,
                account: "POOL1".to_owned(),
                key: k2,
            }]
        );
        // K1 is not expired yet, so the sweep leaves it alone.
        assert!(expired_key_sweep(&keys, cur).is_empty());
    }

    #[test]
    fn switch_waits_for_the_new_key_to_become_valid() {
        let cur = 100_000;
        let k1 = key("POOL1", "k1", 10_000, cur + 5_000, "sel1");
        let k2 = key("POOL1", "k2", cur + 500, cur + 300_000, "sel2");
        let accounts = accounts(&[("POOL1", online(100, "sel1"))]);
        assert!(switch_actions(&accounts, &keys_for(&[&k1, &k2]), cur).is_empty());
    }

    #[test]
    fn online_account_without_matching_key_goes_offline() {
        // Data-loss recovery: the node lost the key the chain is online
        // with. Go offline so a later tick can start over.
        let cur = 100_000;
        let stray = key("POOL1", "k9", 10_000, cur + 5_000, "sel-other");
        let accounts = accounts(&[("POOL1", online(100, "sel-gone"))]);
        let actions = switch_actions(&accounts, &keys_for(&[&stray]), cur);
        assert_eq!(
            actions,
            vec![KeyAction::GoOffline {
                pool_app_id: 100,
                account: "POOL1".to_owned(),
            }]
        );
    }

    #[test]
    fn expired_sweep_covers_foreign_accounts_and_spares_current_keys() {
        let cur = 100_000;
        let expired = key("POOL1", "k1", 1_000, cur - 1, "sel1");
        let foreign_expired = key("OTHER", "k2", 1_000, cur - 500, "sel2");
        let current = key("POOL1", "k3", 50_000, cur + 50_000, "sel3");
        let keys = keys_for(&[&expired, &foreign_expired, &current]);

        let mut deleted: Vec<String> = expired_key_sweep(&keys, cur)
            .into_iter()
            .map(|action| match action {
                KeyAction::DeleteKey { id, .. } => id,
                other => panic!("unexpected action {other:?}"),
            })
            .collect();
        deleted.sort();
        assert_eq!(deleted, vec!["k1".to_owned(), "k2".to_owned()]);

        // Post-sweep property: every surviving key is still in range.
        let survivors: Vec<&ParticipationKey> = keys
            .values()
            .flatten()
            .filter(|key| key.key.vote_last_valid >= cur)
            .collect();
        assert!(survivors.iter().all(|key| key.key.vote_last_valid >= cur));
        assert_eq!(survivors.len(), 1);
    }

    #[test]
    fn steady_state_produces_no_actions() {
        // One valid key, online with it, far from expiry: every rule must
        // be a no-op, making the tick idempotent.
        let cur = 100_000;
        let k = key("POOL1", "k1", 10_000, cur + 2_000_000, "sel1");
        let accounts = accounts(&[("POOL1", online(100, "sel1"))]);
        let keys = keys_for(&[&k]);

        assert!(expired_key_sweep(&keys, cur).is_empty());
        assert!(missing_key_actions(&accounts, &keys, cur, avg()).is_empty());
        assert!(offline_actions(&accounts, &keys).is_empty());
        assert!(renewal_actions(&accounts, &keys, cur, avg()).is_empty());
        assert!(switch_actions(&accounts, &keys, cur).is_empty());
    }

    #[test]
    fn untracked_accounts_get_no_actions() {
        // Accounts filtered out of the snapshot (unfunded, or not ours)
        // never see a Generate or GoOnline, even when the node holds keys
        // for them.
        let cur = 100_000;
        let stray = key("UNFUNDED", "k1", 1_000, cur + 50_000, "sel1");
        let accounts = PoolAccounts::new();
        let keys = keys_for(&[&stray]);

        assert!(missing_key_actions(&accounts, &keys, cur, avg()).is_empty());
        assert!(offline_actions(&accounts, &keys).is_empty());
        assert!(renewal_actions(&accounts, &keys, cur, avg()).is_empty());
        assert!(switch_actions(&accounts, &keys, cur).is_empty());
    }

    #[test]
    fn rounds_for_days_handles_degenerate_block_time() {
        assert_eq!(rounds_for_days(7, Duration::ZERO), 0);
        assert_eq!(rounds_for_days(1, Duration::from_secs(3)), 28_800);
    }
}
