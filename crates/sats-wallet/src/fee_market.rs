//! Fee market built from a provider's per-target estimates.

use std::sync::Arc;

use async_trait::async_trait;

use sats_core::constants::BLOCK_INTERVAL_SECS;
use sats_core::error::ProviderError;
use sats_core::traits::{BlockchainDataProvider, FeeMarketProvider};
use sats_core::types::{EstimatedFees, FeeEstimationMode, FeeMarket};

/// Block targets and modes for the fast, standard and slow tiers.
pub const FAST_TARGET: (u32, FeeEstimationMode) = (1, FeeEstimationMode::Conservative);
pub const STANDARD_TARGET: (u32, FeeEstimationMode) = (3, FeeEstimationMode::Economical);
pub const SLOW_TARGET: (u32, FeeEstimationMode) = (6, FeeEstimationMode::Economical);

/// [`FeeMarketProvider`] backed by [`BlockchainDataProvider::estimate_fee`].
#[derive(Clone)]
pub struct ProviderFeeMarket {
    provider: Arc<dyn BlockchainDataProvider>,
}

impl ProviderFeeMarket {
    pub fn new(provider: Arc<dyn BlockchainDataProvider>) -> Self {
        Self { provider }
    }

    async fn tier(&self, (blocks, mode): (u32, FeeEstimationMode)) -> Result<FeeMarket, ProviderError> {
        let estimate = self.provider.estimate_fee(blocks, mode).await?;
        Ok(FeeMarket {
            fee_rate: estimate.fee_rate,
            target_confirmation_time: u64::from(blocks) * BLOCK_INTERVAL_SECS,
        })
    }
}

#[async_trait]
impl FeeMarketProvider for ProviderFeeMarket {
    async fn get_fee_market(&self) -> Result<EstimatedFees, ProviderError> {
        Ok(EstimatedFees {
            fast: self.tier(FAST_TARGET).await?,
            standard: self.tier(STANDARD_TARGET).await?,
            slow: self.tier(SLOW_TARGET).await?,
        })
    }
}
