//! # sats-wallet — keys, transactions and synchronization.
//!
//! Derives HD keys from mnemonics or extended keys, selects coins, builds
//! and signs PSBT-based transactions, and keeps a single-address wallet in
//! sync with a blockchain data provider.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`keys`] — Seeds, BIP-32 account and child keys, extended key sets
//! - [`mnemonic`] — BIP-39 phrase generation and validation
//! - [`source`] — Wallet key sources and the public `WalletInfo`
//! - [`coin_selection`] — Fee-aware greedy UTXO selection
//! - [`builder`] — Unsigned transaction builder
//! - [`signer`] — Input signing and finalization
//! - [`history`] — History entries for self-built transactions
//! - [`fee_market`] — Tiered fee rates from a data provider
//! - [`events`] — State change notifications
//! - [`state`] — Wallet state and pending reconciliation
//! - [`config`] — Synchronizer configuration
//! - [`wallet`] — The polling synchronizer

pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod error;
pub mod events;
pub mod fee_market;
pub mod history;
pub mod keys;
pub mod mnemonic;
pub mod signer;
pub mod source;
pub mod state;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{TransactionBuilder, UnsignedTransaction};
pub use coin_selection::{CoinSelection, CoinSelector, GreedyCoinSelector};
pub use config::SyncConfig;
pub use error::WalletError;
pub use events::{ChannelListener, NoopListener, WalletEvent, WalletEventListener};
pub use fee_market::ProviderFeeMarket;
pub use history::{BlockchainInputResolver, history_entry_from_raw_tx};
pub use keys::{KeyPair, Seed};
pub use signer::{SignedTransaction, Signer, sign_transaction};
pub use source::{WalletInfo, WalletKeys, WalletSource};
pub use state::WalletState;
pub use wallet::{BitcoinWallet, PollOutcome, SyncStatus};
