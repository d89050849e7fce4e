//! Wallet data model: UTXOs, history entries, blocks and fee estimates.
//!
//! Field names serialize in camel case so provider payloads map directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An unspent transaction output. Unique key is `(tx_id, index)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    /// Hex id of the transaction that created this output.
    pub tx_id: String,
    /// Output index within that transaction.
    pub index: u32,
    /// Value in satoshis.
    pub satoshis: u64,
    /// Address the output pays to.
    pub address: String,
}

impl Utxo {
    /// True if both values refer to the same outpoint.
    pub fn same_outpoint(&self, other: &Utxo) -> bool {
        self.index == other.index && self.tx_id == other.tx_id
    }
}

/// A transaction input is the output it spends.
pub type InputEntry = Utxo;

/// A transaction output as seen from the wallet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    /// Destination address; empty for scripts with no address form.
    pub address: String,
    pub satoshis: u64,
    /// Hex payload when this output is an OP_RETURN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_return_data: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TransactionStatus {
    /// Waiting in the mempool.
    #[default]
    Pending,
    /// Included in a block.
    Confirmed,
    /// Evicted or replaced.
    Dropped,
}

/// One transaction touching the wallet's address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistoryEntry {
    pub inputs: Vec<InputEntry>,
    pub outputs: Vec<OutputEntry>,
    pub transaction_hash: String,
    pub confirmations: u32,
    pub status: TransactionStatus,
    pub block_height: u64,
    /// Unix seconds.
    pub timestamp: u64,
}

impl TransactionHistoryEntry {
    /// True if any input of `self` spends an outpoint also spent by `other`.
    pub fn shares_input_with(&self, other: &TransactionHistoryEntry) -> bool {
        self.inputs
            .iter()
            .any(|mine| other.inputs.iter().any(|theirs| mine.same_outpoint(theirs)))
    }
}

/// Height and hash of a block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: String,
}

/// One page of address history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<TransactionHistoryEntry>,
    /// Empty when there are no further pages.
    pub next_cursor: String,
}

/// Trade-off requested from a fee estimator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeeEstimationMode {
    /// Favour reliable confirmation over cost.
    Conservative,
    /// Favour lower cost over confirmation speed.
    Economical,
}

impl fmt::Display for FeeEstimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservative => f.write_str("conservative"),
            Self::Economical => f.write_str("economical"),
        }
    }
}

/// Result of a provider fee estimate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    /// Fee rate in sat/vB.
    pub fee_rate: f64,
    /// Block target the estimate applies to.
    pub blocks: u32,
}

/// One tier of the fee market.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeMarket {
    /// Fee rate in sat/vB.
    pub fee_rate: f64,
    /// Expected time to confirmation in seconds.
    pub target_confirmation_time: u64,
}

/// Fee market split into three priority tiers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct EstimatedFees {
    pub fast: FeeMarket,
    pub standard: FeeMarket,
    pub slow: FeeMarket,
}

/// A caller-specified payment destination.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OutputTarget {
    pub address: String,
    pub satoshis: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(tx: &str, index: u32) -> Utxo {
        Utxo {
            tx_id: tx.into(),
            index,
            satoshis: 1_000,
            address: "tb1q".into(),
        }
    }

    fn entry(hash: &str, inputs: Vec<Utxo>) -> TransactionHistoryEntry {
        TransactionHistoryEntry {
            inputs,
            outputs: vec![],
            transaction_hash: hash.into(),
            confirmations: 0,
            status: TransactionStatus::Pending,
            block_height: 0,
            timestamp: 0,
        }
    }

    #[test]
    fn same_outpoint_ignores_value() {
        let a = utxo("aa", 1);
        let mut b = utxo("aa", 1);
        b.satoshis = 7;
        assert!(a.same_outpoint(&b));
        assert!(!a.same_outpoint(&utxo("aa", 2)));
        assert!(!a.same_outpoint(&utxo("bb", 1)));
    }

    #[test]
    fn shares_input_detects_conflict() {
        let a = entry("a", vec![utxo("p", 0), utxo("p", 1)]);
        let b = entry("b", vec![utxo("q", 0), utxo("p", 1)]);
        let c = entry("c", vec![utxo("q", 1)]);
        assert!(a.shares_input_with(&b));
        assert!(!a.shares_input_with(&c));
    }

    #[test]
    fn json_uses_camel_case() {
        let json = serde_json::to_value(utxo("ab", 3)).unwrap();
        assert_eq!(json["txId"], "ab");
        assert_eq!(json["index"], 3);

        let out = OutputEntry {
            address: String::new(),
            satoshis: 0,
            op_return_data: Some("6869".into()),
        };
        let json = serde_json::to_value(out).unwrap();
        assert_eq!(json["opReturnData"], "6869");
    }

    #[test]
    fn status_defaults_to_pending() {
        assert_eq!(TransactionStatus::default(), TransactionStatus::Pending);
    }
}
