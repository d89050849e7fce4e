//! Synchronizer configuration.

use std::time::Duration;

use sats_core::address::Network;
use sats_core::constants::{DEFAULT_HISTORY_DEPTH, DEFAULT_POLL_INTERVAL_MS};

/// Configuration for a [`crate::wallet::BitcoinWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Delay between poll ticks.
    pub poll_interval: Duration,
    /// Confirmed history entries requested per full update.
    pub history_depth: usize,
    /// Network the wallet address belongs to.
    pub network: Network,
    /// Whether scheduled ticks run. Can be toggled at runtime.
    pub poll_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            history_depth: DEFAULT_HISTORY_DEPTH,
            network: Network::Testnet,
            poll_enabled: true,
        }
    }
}

impl SyncConfig {
    pub fn testnet() -> Self {
        Self::default()
    }

    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }
}
