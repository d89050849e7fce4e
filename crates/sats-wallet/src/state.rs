//! Wallet state and its transitions.
//!
//! [`WalletState`] is only changed through the `set_*`/`add_*` methods,
//! which report whether anything actually changed so the synchronizer knows
//! which events to emit. `balance` is derived from `utxos` on every update.

use sats_core::address::DerivedAddress;
use sats_core::types::{BlockInfo, TransactionHistoryEntry, Utxo};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletState {
    transaction_history: Vec<TransactionHistoryEntry>,
    pending_transactions: Vec<TransactionHistoryEntry>,
    utxos: Vec<Utxo>,
    balance: u64,
    addresses: Vec<DerivedAddress>,
    last_known_block: Option<BlockInfo>,
}

impl WalletState {
    pub fn transaction_history(&self) -> &[TransactionHistoryEntry] {
        &self.transaction_history
    }

    pub fn pending_transactions(&self) -> &[TransactionHistoryEntry] {
        &self.pending_transactions
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn addresses(&self) -> &[DerivedAddress] {
        &self.addresses
    }

    /// Last block a full update completed against.
    pub fn last_known_block(&self) -> Option<&BlockInfo> {
        self.last_known_block.as_ref()
    }

    /// True if `block` differs from the last synced block, or none was synced.
    pub fn is_new_block(&self, block: &BlockInfo) -> bool {
        self.last_known_block
            .as_ref()
            .is_none_or(|known| known.hash != block.hash)
    }

    pub fn set_last_known_block(&mut self, block: BlockInfo) {
        self.last_known_block = Some(block);
    }

    pub fn set_transaction_history(&mut self, history: Vec<TransactionHistoryEntry>) -> bool {
        replace_if_changed(&mut self.transaction_history, history)
    }

    /// Replace the UTXO set and recompute the balance.
    ///
    /// Returns true if the set changed.
    pub fn set_utxos(&mut self, utxos: Vec<Utxo>) -> bool {
        self.balance = utxos
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.satoshis));
        replace_if_changed(&mut self.utxos, utxos)
    }

    pub fn set_pending_transactions(&mut self, pending: Vec<TransactionHistoryEntry>) -> bool {
        replace_if_changed(&mut self.pending_transactions, pending)
    }

    /// Track a newly submitted transaction. No-op if its hash is known.
    pub fn add_pending_transaction(&mut self, entry: TransactionHistoryEntry) -> bool {
        if self
            .pending_transactions
            .iter()
            .any(|p| p.transaction_hash == entry.transaction_hash)
        {
            return false;
        }
        self.pending_transactions.push(entry);
        true
    }

    pub fn set_addresses(&mut self, addresses: Vec<DerivedAddress>) -> bool {
        replace_if_changed(&mut self.addresses, addresses)
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Vec<T>, new: Vec<T>) -> bool {
    if *slot == new {
        return false;
    }
    *slot = new;
    true
}

/// Merge the local pending set with a fresh mempool snapshot.
///
/// A local entry is dropped if one of its inputs is spent by a confirmed
/// entry (it settled) or by a remote pending entry with a different hash
/// (it was replaced). Remote entries then overwrite local ones with the same
/// hash or are appended.
pub fn merge_pending(
    local: &[TransactionHistoryEntry],
    remote: &[TransactionHistoryEntry],
    confirmed: &[TransactionHistoryEntry],
) -> Vec<TransactionHistoryEntry> {
    let mut merged: Vec<TransactionHistoryEntry> = local
        .iter()
        .filter(|p| !confirmed.iter().any(|c| p.shares_input_with(c)))
        .filter(|p| {
            !remote
                .iter()
                .any(|r| r.transaction_hash != p.transaction_hash && p.shares_input_with(r))
        })
        .cloned()
        .collect();

    for entry in remote {
        match merged
            .iter_mut()
            .find(|p| p.transaction_hash == entry.transaction_hash)
        {
            Some(slot) => *slot = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sats_core::types::{OutputEntry, TransactionStatus};

    fn outpoint(n: u8, index: u32) -> Utxo {
        Utxo {
            tx_id: format!("{n:02x}").repeat(32),
            index,
            satoshis: 10_000,
            address: "tb1qme".into(),
        }
    }

    fn tx(hash: &str, spends: &[Utxo], status: TransactionStatus) -> TransactionHistoryEntry {
        TransactionHistoryEntry {
            inputs: spends.to_vec(),
            outputs: vec![OutputEntry {
                address: "tb1qpayee".into(),
                satoshis: 9_000,
                op_return_data: None,
            }],
            transaction_hash: hash.into(),
            confirmations: 0,
            status,
            block_height: 0,
            timestamp: 1_700_000_000,
        }
    }

    fn pending(hash: &str, spends: &[Utxo]) -> TransactionHistoryEntry {
        tx(hash, spends, TransactionStatus::Pending)
    }

    fn hashes(entries: &[TransactionHistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.transaction_hash.as_str()).collect()
    }

    #[test]
    fn balance_follows_utxos() {
        let mut state = WalletState::default();
        assert!(state.set_utxos(vec![outpoint(1, 0), outpoint(2, 0)]));
        assert_eq!(state.balance(), 20_000);
        assert!(!state.set_utxos(vec![outpoint(1, 0), outpoint(2, 0)]));
        assert!(state.set_utxos(vec![]));
        assert_eq!(state.balance(), 0);
    }

    #[test]
    fn setters_report_changes() {
        let mut state = WalletState::default();
        assert!(!state.set_transaction_history(vec![]));
        assert!(state.set_transaction_history(vec![pending("a", &[])]));
        assert!(!state.set_transaction_history(vec![pending("a", &[])]));
        assert!(!state.set_addresses(vec![]));
        assert!(state.set_pending_transactions(vec![pending("p", &[])]));
    }

    #[test]
    fn add_pending_dedups_by_hash() {
        let mut state = WalletState::default();
        assert!(state.add_pending_transaction(pending("abc", &[outpoint(1, 0)])));
        assert!(!state.add_pending_transaction(pending("abc", &[outpoint(9, 9)])));
        assert_eq!(hashes(state.pending_transactions()), vec!["abc"]);
        assert_eq!(state.pending_transactions()[0].inputs[0], outpoint(1, 0));
    }

    #[test]
    fn new_block_detection() {
        let mut state = WalletState::default();
        let b1 = BlockInfo { height: 1, hash: "h1".into() };
        assert!(state.is_new_block(&b1));
        state.set_last_known_block(b1.clone());
        assert!(!state.is_new_block(&b1));
        assert!(state.is_new_block(&BlockInfo { height: 1, hash: "h1'".into() }));
        assert_eq!(state.last_known_block(), Some(&b1));
    }

    #[test]
    fn settled_pending_removed() {
        let local = vec![pending("mine", &[outpoint(1, 0)])];
        let confirmed = vec![tx("mine", &[outpoint(1, 0)], TransactionStatus::Confirmed)];
        assert!(merge_pending(&local, &[], &confirmed).is_empty());
    }

    #[test]
    fn replaced_pending_removed() {
        let local = vec![pending("original", &[outpoint(1, 0), outpoint(2, 0)])];
        let remote = vec![pending("bumped", &[outpoint(2, 0)])];
        let merged = merge_pending(&local, &remote, &[]);
        assert_eq!(hashes(&merged), vec!["bumped"]);
    }

    #[test]
    fn same_hash_overwritten_by_remote() {
        let mut local_entry = pending("t", &[outpoint(1, 0)]);
        local_entry.inputs[0].address = String::new();
        let remote_entry = pending("t", &[outpoint(1, 0)]);
        let merged = merge_pending(&[local_entry], &[remote_entry.clone()], &[]);
        assert_eq!(merged, vec![remote_entry]);
    }

    #[test]
    fn unrelated_entries_kept_in_order() {
        let local = vec![pending("a", &[outpoint(1, 0)]), pending("b", &[outpoint(2, 0)])];
        let remote = vec![pending("c", &[outpoint(3, 0)])];
        let confirmed = vec![tx("z", &[outpoint(9, 0)], TransactionStatus::Confirmed)];
        let merged = merge_pending(&local, &remote, &confirmed);
        assert_eq!(hashes(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn different_index_is_not_a_conflict() {
        let local = vec![pending("a", &[outpoint(1, 0)])];
        let remote = vec![pending("b", &[outpoint(1, 1)])];
        assert_eq!(hashes(&merge_pending(&local, &remote, &[])), vec!["a", "b"]);
    }

    fn arb_outpoint() -> impl Strategy<Value = Utxo> {
        (0u8..6, 0u32..3, 1u64..1_000_000).prop_map(|(n, index, satoshis)| Utxo {
            satoshis,
            ..outpoint(n, index)
        })
    }

    fn arb_entry() -> impl Strategy<Value = TransactionHistoryEntry> {
        ("[a-f]{2}", prop::collection::vec(arb_outpoint(), 1..3))
            .prop_map(|(hash, spends)| pending(&hash, &spends))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn balance_is_sum_of_utxos(sets in prop::collection::vec(prop::collection::vec(arb_outpoint(), 0..8), 1..5)) {
            let mut state = WalletState::default();
            for set in sets {
                let expected: u64 = set.iter().map(|u| u.satoshis).sum();
                state.set_utxos(set);
                prop_assert_eq!(state.balance(), expected);
            }
        }

        #[test]
        fn no_local_entry_survives_a_confirmed_conflict(
            local in prop::collection::vec(arb_entry(), 0..6),
            confirmed in prop::collection::vec(arb_entry(), 0..4),
        ) {
            let merged = merge_pending(&local, &[], &confirmed);
            for entry in &merged {
                prop_assert!(!confirmed.iter().any(|c| entry.shares_input_with(c)));
            }
        }

        #[test]
        fn every_remote_entry_present_after_merge(
            local in prop::collection::vec(arb_entry(), 0..6),
            remote in prop::collection::vec(arb_entry(), 0..6),
        ) {
            let merged = merge_pending(&local, &remote, &[]);
            for r in &remote {
                prop_assert!(merged.iter().any(|m| m.transaction_hash == r.transaction_hash));
            }
        }
    }
}
