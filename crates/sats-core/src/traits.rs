//! Collaborator interfaces consumed by the wallet engine.
//!
//! - [`BlockchainDataProvider`] — chain and mempool data source
//! - [`InputResolver`] — backfills input details for locally built transactions
//! - [`FeeMarketProvider`] — tiered fee-rate estimates
//!
//! All are object safe so the synchronizer can hold them as `Arc<dyn _>`.

use async_trait::async_trait;

use crate::constants::DEFAULT_PAGE_LIMIT;
use crate::error::ProviderError;
use crate::types::{
    BlockInfo, EstimatedFees, FeeEstimate, FeeEstimationMode, TransactionHistoryEntry,
    TransactionPage, TransactionStatus, Utxo,
};

/// Read/submit access to the Bitcoin network for one or more addresses.
#[async_trait]
pub trait BlockchainDataProvider: Send + Sync {
    /// Height and hash of the current chain tip.
    async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError>;

    /// A single transaction by hash.
    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionHistoryEntry, ProviderError>;

    /// Confirmed history of `address`, newest first, paginated by `cursor`.
    async fn get_transactions(
        &self,
        address: &str,
        after_block_height: Option<u64>,
        limit: usize,
        cursor: &str,
    ) -> Result<TransactionPage, ProviderError>;

    /// First page of history with the default page size.
    ///
    /// Default implementation delegates to [`get_transactions`](Self::get_transactions).
    async fn get_recent_transactions(&self, address: &str) -> Result<TransactionPage, ProviderError> {
        self.get_transactions(address, None, DEFAULT_PAGE_LIMIT, "").await
    }

    /// Unconfirmed transactions touching `address`.
    async fn get_transactions_in_mempool(
        &self,
        address: &str,
        after_block_height: Option<u64>,
    ) -> Result<Vec<TransactionHistoryEntry>, ProviderError>;

    /// Spendable outputs of `address`.
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Broadcast a raw transaction; returns its id.
    async fn submit_transaction(&self, raw_hex: &str) -> Result<String, ProviderError>;

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus, ProviderError>;

    /// Fee rate (sat/vB) for confirmation within `target_blocks`.
    async fn estimate_fee(
        &self,
        target_blocks: u32,
        mode: FeeEstimationMode,
    ) -> Result<FeeEstimate, ProviderError>;
}

/// Resolves an outpoint to the output it references.
#[async_trait]
pub trait InputResolver: Send + Sync {
    async fn resolve(&self, tx_id: &str, index: u32) -> Result<Utxo, ProviderError>;
}

/// Source of tiered fee-rate estimates.
#[async_trait]
pub trait FeeMarketProvider: Send + Sync {
    async fn get_fee_market(&self) -> Result<EstimatedFees, ProviderError>;
}
