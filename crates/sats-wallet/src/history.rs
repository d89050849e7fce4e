//! History entries for transactions the wallet built itself.
//!
//! A submitted transaction is known only as raw bytes until the provider
//! indexes it. [`history_entry_from_raw_tx`] turns it into a pending
//! [`TransactionHistoryEntry`], resolving inputs through an [`InputResolver`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::Transaction;
use bitcoin::script::Instruction;

use sats_core::address::{Network, address_from_script};
use sats_core::error::ProviderError;
use sats_core::traits::{BlockchainDataProvider, InputResolver};
use sats_core::types::{OutputEntry, TransactionHistoryEntry, TransactionStatus, Utxo};

use crate::error::WalletError;

/// Decode a raw transaction hex string.
pub fn decode_raw_tx(raw_hex: &str) -> Result<Transaction, WalletError> {
    let bytes = hex::decode(raw_hex.trim())
        .map_err(|e| WalletError::InvalidTransaction(format!("hex: {e}")))?;
    bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| WalletError::InvalidTransaction(e.to_string()))
}

/// Build a pending history entry from a raw transaction.
///
/// Each input is resolved to the output it spends. The entry has zero
/// confirmations, block height 0 and the current time as its timestamp.
pub async fn history_entry_from_raw_tx(
    raw_hex: &str,
    network: Network,
    resolver: &dyn InputResolver,
) -> Result<TransactionHistoryEntry, WalletError> {
    let tx = decode_raw_tx(raw_hex)?;

    let mut inputs = Vec::with_capacity(tx.input.len());
    for txin in &tx.input {
        let prev = txin.previous_output;
        inputs.push(resolver.resolve(&prev.txid.to_string(), prev.vout).await?);
    }

    let outputs = tx
        .output
        .iter()
        .map(|out| {
            if out.script_pubkey.is_op_return() {
                OutputEntry {
                    address: String::new(),
                    satoshis: out.value.to_sat(),
                    op_return_data: Some(hex::encode(op_return_payload(&out.script_pubkey))),
                }
            } else {
                OutputEntry {
                    address: address_from_script(&out.script_pubkey, network).unwrap_or_default(),
                    satoshis: out.value.to_sat(),
                    op_return_data: None,
                }
            }
        })
        .collect();

    Ok(TransactionHistoryEntry {
        inputs,
        outputs,
        transaction_hash: tx.compute_txid().to_string(),
        confirmations: 0,
        status: TransactionStatus::Pending,
        block_height: 0,
        timestamp: unix_now(),
    })
}

fn op_return_payload(script: &bitcoin::Script) -> Vec<u8> {
    script
        .instructions()
        .skip(1)
        .filter_map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Resolves inputs by fetching the parent transaction from a provider.
#[derive(Clone)]
pub struct BlockchainInputResolver {
    provider: Arc<dyn BlockchainDataProvider>,
}

impl BlockchainInputResolver {
    pub fn new(provider: Arc<dyn BlockchainDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl InputResolver for BlockchainInputResolver {
    async fn resolve(&self, tx_id: &str, index: u32) -> Result<Utxo, ProviderError> {
        let parent = self.provider.get_transaction(tx_id).await?;
        let output = parent
            .outputs
            .get(index as usize)
            .ok_or_else(|| ProviderError::NotFound(format!("{tx_id}:{index}")))?;
        Ok(Utxo {
            tx_id: tx_id.to_string(),
            index,
            satoshis: output.satoshis,
            address: output.address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::consensus::encode::serialize_hex;
    use bitcoin::script::PushBytesBuf;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};
    use sats_core::address::script_pubkey_for;
    use sats_core::stub::{STUB_COUNTERPARTY, STUB_TX_HASH, StubBlockchainDataProvider};
    use std::str::FromStr;

    const PAYEE: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    /// Resolves every input to a fixed 50k output.
    struct FixedResolver;

    #[async_trait]
    impl InputResolver for FixedResolver {
        async fn resolve(&self, tx_id: &str, index: u32) -> Result<Utxo, ProviderError> {
            Ok(Utxo {
                tx_id: tx_id.to_string(),
                index,
                satoshis: 50_000,
                address: PAYEE.to_string(),
            })
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl InputResolver for FailingResolver {
        async fn resolve(&self, tx_id: &str, index: u32) -> Result<Utxo, ProviderError> {
            Err(ProviderError::NotFound(format!("{tx_id}:{index}")))
        }
    }

    fn raw_tx(with_op_return: bool) -> (Transaction, String) {
        let mut output = vec![TxOut {
            value: Amount::from_sat(40_000),
            script_pubkey: script_pubkey_for(PAYEE, Network::Testnet).unwrap(),
        }];
        if with_op_return {
            output.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: ScriptBuf::new_op_return(PushBytesBuf::try_from(b"gm".to_vec()).unwrap()),
            });
        }
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_str(STUB_TX_HASH).unwrap(), 3),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output,
        };
        let hex = serialize_hex(&tx);
        (tx, hex)
    }

    #[tokio::test]
    async fn entry_from_raw_tx() {
        let (tx, hex) = raw_tx(true);
        let entry = history_entry_from_raw_tx(&hex, Network::Testnet, &FixedResolver)
            .await
            .unwrap();

        assert_eq!(entry.transaction_hash, tx.compute_txid().to_string());
        assert_eq!(entry.status, TransactionStatus::Pending);
        assert_eq!(entry.confirmations, 0);
        assert_eq!(entry.block_height, 0);
        assert!(entry.timestamp > 0);

        assert_eq!(entry.inputs.len(), 1);
        assert_eq!(entry.inputs[0].tx_id, STUB_TX_HASH);
        assert_eq!(entry.inputs[0].index, 3);
        assert_eq!(entry.inputs[0].satoshis, 50_000);

        assert_eq!(entry.outputs.len(), 2);
        assert_eq!(entry.outputs[0].address, PAYEE);
        assert_eq!(entry.outputs[0].satoshis, 40_000);
        assert_eq!(entry.outputs[1].address, "");
        assert_eq!(entry.outputs[1].op_return_data.as_deref(), Some("676d"));
    }

    #[tokio::test]
    async fn resolver_failure_propagates() {
        let (_, hex) = raw_tx(false);
        let err = history_entry_from_raw_tx(&hex, Network::Testnet, &FailingResolver)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Provider(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn garbage_hex_rejected() {
        for raw in ["zz", "00", ""] {
            let err = history_entry_from_raw_tx(raw, Network::Testnet, &FixedResolver)
                .await
                .unwrap_err();
            assert!(matches!(err, WalletError::InvalidTransaction(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn provider_resolver_picks_output_by_index() {
        let provider = Arc::new(StubBlockchainDataProvider::new(Network::Testnet));
        let resolver = BlockchainInputResolver::new(provider);
        // The stub's parent transaction has one counterparty output.
        let utxo = resolver.resolve(STUB_TX_HASH, 0).await.unwrap();
        assert_eq!(utxo.address, STUB_COUNTERPARTY);
        assert_eq!(utxo.satoshis, 4_000);
        assert_eq!(utxo.tx_id, STUB_TX_HASH);

        assert!(matches!(
            resolver.resolve(STUB_TX_HASH, 7).await,
            Err(ProviderError::NotFound(_))
        ));
    }
}
