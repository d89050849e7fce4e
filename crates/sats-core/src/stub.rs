//! Fixed-response data provider for demos and offline tests.
//!
//! Every call succeeds with the same canned data: a tip at height 1000, one
//! confirmed transaction paying the queried address, and a single
//! 100,000-sat UTXO.

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::address::Network;
use crate::error::ProviderError;
use crate::traits::BlockchainDataProvider;
use crate::types::{
    BlockInfo, FeeEstimate, FeeEstimationMode, OutputEntry, TransactionHistoryEntry,
    TransactionPage, TransactionStatus, Utxo,
};

pub const STUB_BLOCK_HASH: &str = "0000000000000000000a1b2c3d4e5f67890123456789abcdefabcdefabcdef";
pub const STUB_TX_HASH: &str = "d528068a1156d135430c815573c79faa7d45b3f395728e92322f3db1ad99da30";
pub const STUB_COUNTERPARTY: &str = "tb1qwj666s6uktl2q5am0uej008usfsg93fgrwjuuf";
pub const STUB_FEE_RATE: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct StubBlockchainDataProvider {
    network: Network,
}

impl StubBlockchainDataProvider {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn entry(&self, address: Option<&str>) -> TransactionHistoryEntry {
        let mut outputs = vec![OutputEntry {
            address: STUB_COUNTERPARTY.to_string(),
            satoshis: 4_000,
            op_return_data: None,
        }];
        if let Some(address) = address {
            outputs.push(OutputEntry {
                address: address.to_string(),
                satoshis: 9_000,
                op_return_data: None,
            });
        }
        TransactionHistoryEntry {
            inputs: vec![Utxo {
                tx_id: STUB_BLOCK_HASH.to_string(),
                index: 0,
                satoshis: 5_000,
                address: STUB_COUNTERPARTY.to_string(),
            }],
            outputs,
            transaction_hash: STUB_TX_HASH.to_string(),
            confirmations: 10,
            status: TransactionStatus::Confirmed,
            block_height: 999,
            timestamp: now_secs(),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[async_trait]
impl BlockchainDataProvider for StubBlockchainDataProvider {
    async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
        Ok(BlockInfo {
            height: 1000,
            hash: STUB_BLOCK_HASH.to_string(),
        })
    }

    async fn get_transaction(&self, _tx_hash: &str) -> Result<TransactionHistoryEntry, ProviderError> {
        Ok(self.entry(None))
    }

    async fn get_transactions(
        &self,
        address: &str,
        _after_block_height: Option<u64>,
        _limit: usize,
        _cursor: &str,
    ) -> Result<TransactionPage, ProviderError> {
        Ok(TransactionPage {
            transactions: vec![self.entry(Some(address))],
            next_cursor: String::new(),
        })
    }

    async fn get_transactions_in_mempool(
        &self,
        address: &str,
        _after_block_height: Option<u64>,
    ) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
        Ok(vec![self.entry(Some(address))])
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        Ok(vec![Utxo {
            tx_id: STUB_TX_HASH.to_string(),
            index: 0,
            satoshis: 100_000,
            address: address.to_string(),
        }])
    }

    async fn submit_transaction(&self, raw_hex: &str) -> Result<String, ProviderError> {
        if raw_hex.is_empty() {
            return Err(ProviderError::Rejected("empty transaction".into()));
        }
        Ok(STUB_TX_HASH.to_string())
    }

    async fn get_transaction_status(&self, _tx_hash: &str) -> Result<TransactionStatus, ProviderError> {
        Ok(TransactionStatus::Confirmed)
    }

    async fn estimate_fee(
        &self,
        target_blocks: u32,
        _mode: FeeEstimationMode,
    ) -> Result<FeeEstimate, ProviderError> {
        Ok(FeeEstimate {
            fee_rate: STUB_FEE_RATE,
            blocks: target_blocks,
        })
    }
}
