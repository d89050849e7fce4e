//! Shared test helpers: a scripted provider, fixed keys and entry builders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sats_core::address::{AddressValidationResult, Network, validate_address};
use sats_core::error::ProviderError;
use sats_core::traits::BlockchainDataProvider;
use sats_core::types::{
    BlockInfo, FeeEstimate, FeeEstimationMode, OutputEntry, TransactionHistoryEntry,
    TransactionPage, TransactionStatus, Utxo,
};
use sats_wallet::events::{WalletEvent, WalletEventListener};
use sats_wallet::history::decode_raw_tx;
use sats_wallet::{BitcoinWallet, ProviderFeeMarket, SyncConfig, WalletInfo, WalletKeys, WalletSource};

/// BIP-39 test mnemonic.
pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// A testnet P2WPKH address the wallet does not own.
pub const PAYEE: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

/// Keys for [`ABANDON`], account 0.
pub fn test_keys() -> WalletKeys {
    WalletKeys::from_source(
        WalletSource::Mnemonic {
            phrase: ABANDON.to_string(),
            passphrase: String::new(),
        },
        0,
    )
    .expect("test mnemonic is valid")
}

pub fn test_info() -> WalletInfo {
    test_keys().wallet_info("test").expect("seed wallet has xpubs")
}

/// Hex hash built from one repeated byte.
pub fn hash(n: u8) -> String {
    format!("{n:02x}").repeat(32)
}

pub fn utxo(tx: u8, index: u32, satoshis: u64, address: &str) -> Utxo {
    Utxo {
        tx_id: hash(tx),
        index,
        satoshis,
        address: address.to_string(),
    }
}

/// An entry spending `inputs` and paying `satoshis` to `to`.
pub fn entry(
    transaction_hash: &str,
    inputs: Vec<Utxo>,
    to: &str,
    satoshis: u64,
    status: TransactionStatus,
    block_height: u64,
) -> TransactionHistoryEntry {
    TransactionHistoryEntry {
        inputs,
        outputs: vec![OutputEntry {
            address: to.to_string(),
            satoshis,
            op_return_data: None,
        }],
        transaction_hash: transaction_hash.to_string(),
        confirmations: u32::from(status == TransactionStatus::Confirmed),
        status,
        block_height,
        timestamp: 1_700_000_000 + block_height,
    }
}

pub fn block(height: u64) -> BlockInfo {
    BlockInfo {
        height,
        hash: format!("{height:064x}"),
    }
}

/// Provider calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Block,
    Transaction,
    History,
    Mempool,
    Utxos,
    Submit,
    Fee,
}

#[derive(Default)]
struct Script {
    block: Option<BlockInfo>,
    history: Vec<TransactionHistoryEntry>,
    mempool: Vec<TransactionHistoryEntry>,
    utxos: Vec<Utxo>,
    transactions: HashMap<String, TransactionHistoryEntry>,
    failing: Vec<Call>,
    submitted: Vec<String>,
    calls: HashMap<Call, usize>,
    fee_rate: f64,
    block_delay: Option<Duration>,
}

/// In-memory provider whose answers are set by the test.
///
/// Every answer can be changed between polls; any call can be made to fail
/// with a transport error. Call counts are recorded per method.
pub struct MockProvider {
    script: Mutex<Script>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                block: Some(block(100)),
                fee_rate: 5.0,
                ..Script::default()
            }),
        }
    }

    pub fn set_block(&self, block: BlockInfo) {
        self.script.lock().block = Some(block);
    }

    /// Make `get_last_known_block` wait this long before answering.
    pub fn set_block_delay(&self, delay: Duration) {
        self.script.lock().block_delay = Some(delay);
    }

    pub fn set_history(&self, history: Vec<TransactionHistoryEntry>) {
        self.script.lock().history = history;
    }

    pub fn set_mempool(&self, mempool: Vec<TransactionHistoryEntry>) {
        self.script.lock().mempool = mempool;
    }

    pub fn set_utxos(&self, utxos: Vec<Utxo>) {
        self.script.lock().utxos = utxos;
    }

    /// Make a transaction available to `get_transaction`.
    pub fn add_transaction(&self, entry: TransactionHistoryEntry) {
        self.script
            .lock()
            .transactions
            .insert(entry.transaction_hash.clone(), entry);
    }

    pub fn fail(&self, call: Call) {
        self.script.lock().failing.push(call);
    }

    pub fn recover(&self) {
        self.script.lock().failing.clear();
    }

    pub fn calls(&self, call: Call) -> usize {
        self.script.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Raw transactions accepted by `submit_transaction`.
    pub fn submitted(&self) -> Vec<String> {
        self.script.lock().submitted.clone()
    }

    fn enter(&self, call: Call) -> Result<parking_lot::MutexGuard<'_, Script>, ProviderError> {
        let mut script = self.script.lock();
        *script.calls.entry(call).or_default() += 1;
        if script.failing.contains(&call) {
            return Err(ProviderError::Transport(format!("{call:?} unavailable")));
        }
        Ok(script)
    }
}

#[async_trait]
impl BlockchainDataProvider for MockProvider {
    async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
        let delay = self.script.lock().block_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.enter(Call::Block)?
            .block
            .clone()
            .ok_or_else(|| ProviderError::NotFound("no blocks".into()))
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionHistoryEntry, ProviderError> {
        self.enter(Call::Transaction)?
            .transactions
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(tx_hash.to_string()))
    }

    async fn get_transactions(
        &self,
        _address: &str,
        _after_block_height: Option<u64>,
        limit: usize,
        _cursor: &str,
    ) -> Result<TransactionPage, ProviderError> {
        let script = self.enter(Call::History)?;
        Ok(TransactionPage {
            transactions: script.history.iter().take(limit).cloned().collect(),
            next_cursor: String::new(),
        })
    }

    async fn get_transactions_in_mempool(
        &self,
        _address: &str,
        _after_block_height: Option<u64>,
    ) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
        Ok(self.enter(Call::Mempool)?.mempool.clone())
    }

    async fn get_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
        Ok(self.enter(Call::Utxos)?.utxos.clone())
    }

    async fn submit_transaction(&self, raw_hex: &str) -> Result<String, ProviderError> {
        let mut script = self.enter(Call::Submit)?;
        let tx = decode_raw_tx(raw_hex).map_err(|e| ProviderError::Rejected(e.to_string()))?;
        script.submitted.push(raw_hex.to_string());
        Ok(tx.compute_txid().to_string())
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus, ProviderError> {
        let script = self.enter(Call::Transaction)?;
        if script.history.iter().any(|e| e.transaction_hash == tx_hash) {
            Ok(TransactionStatus::Confirmed)
        } else if script.mempool.iter().any(|e| e.transaction_hash == tx_hash) {
            Ok(TransactionStatus::Pending)
        } else {
            Ok(TransactionStatus::Dropped)
        }
    }

    async fn estimate_fee(
        &self,
        target_blocks: u32,
        _mode: FeeEstimationMode,
    ) -> Result<FeeEstimate, ProviderError> {
        let script = self.enter(Call::Fee)?;
        Ok(FeeEstimate {
            fee_rate: script.fee_rate / f64::from(target_blocks.max(1)),
            blocks: target_blocks,
        })
    }
}

/// Records every event it receives.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<WalletEvent>>,
}

impl RecordingListener {
    /// Drain the recorded events.
    pub fn take(&self) -> Vec<WalletEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl WalletEventListener for RecordingListener {
    fn on_balance(&self, balance: u64) {
        self.events.lock().push(WalletEvent::Balance(balance));
    }
    fn on_utxos(&self, utxos: &[Utxo]) {
        self.events.lock().push(WalletEvent::Utxos(utxos.to_vec()));
    }
    fn on_transaction_history(&self, history: &[TransactionHistoryEntry]) {
        self.events
            .lock()
            .push(WalletEvent::TransactionHistory(history.to_vec()));
    }
    fn on_pending_transactions(&self, pending: &[TransactionHistoryEntry]) {
        self.events
            .lock()
            .push(WalletEvent::PendingTransactions(pending.to_vec()));
    }
    fn on_addresses(&self, addresses: &[sats_core::address::DerivedAddress]) {
        self.events.lock().push(WalletEvent::Addresses(addresses.to_vec()));
    }
}

/// Testnet wallet for [`ABANDON`] on top of `provider`.
pub fn wallet_with(provider: &Arc<MockProvider>, config: SyncConfig) -> BitcoinWallet {
    BitcoinWallet::new(
        provider.clone(),
        Arc::new(ProviderFeeMarket::new(provider.clone())),
        test_info(),
        config,
    )
    .expect("wallet construction")
}

pub fn wallet(provider: &Arc<MockProvider>) -> BitcoinWallet {
    wallet_with(provider, SyncConfig::testnet())
}

/// Fund `address` with one confirmed output and make its parent resolvable.
///
/// Returns the spendable UTXO.
pub fn fund(provider: &MockProvider, tx: u8, satoshis: u64, address: &str) -> Utxo {
    assert_eq!(
        validate_address(address, Network::Testnet),
        AddressValidationResult::Valid
    );
    let parent = entry(
        &hash(tx),
        vec![utxo(tx.wrapping_add(100), 0, satoshis + 1_000, PAYEE)],
        address,
        satoshis,
        TransactionStatus::Confirmed,
        90,
    );
    provider.add_transaction(parent);
    utxo(tx, 0, satoshis, address)
}
