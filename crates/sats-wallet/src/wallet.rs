//! Wallet synchronizer.
//!
//! [`BitcoinWallet`] tracks one derived receiving address. Each poll tick
//! fetches the chain tip; on a new block it runs a full update (confirmed
//! history, mempool, and UTXOs when history changed), otherwise it only
//! reconciles the pending set against the mempool.
//!
//! A tick fetches everything it needs before touching [`WalletState`], so a
//! provider failure leaves the last good state in place and the next tick
//! retries. Ticks never overlap: a tick that finds another one running is
//! skipped. Shutdown stops the timer; a tick already in flight runs to
//! completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sats_core::address::{AddressType, ChainType, DerivedAddress, Network};
use sats_core::traits::{BlockchainDataProvider, FeeMarketProvider, InputResolver};
use sats_core::types::{BlockInfo, EstimatedFees, TransactionHistoryEntry, Utxo};

use crate::builder::{TransactionBuilder, check_fee_rate, sat_per_vbyte_to_btc_per_kb};
use crate::config::SyncConfig;
use crate::error::WalletError;
use crate::events::{NoopListener, WalletEvent, WalletEventListener, dispatch};
use crate::history::{BlockchainInputResolver, history_entry_from_raw_tx};
use crate::source::WalletInfo;
use crate::state::{WalletState, merge_pending};

/// Progress flags maintained around each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// A tick is talking to the provider.
    pub is_any_request_pending: bool,
    /// The last tick completed without a provider error.
    pub is_up_to_date: bool,
    /// No transactions are pending.
    pub is_settled: bool,
}

/// What a call to [`BitcoinWallet::poll_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Polling is disabled.
    Disabled,
    /// Another tick was still running.
    Busy,
    /// A new block was seen.
    FullUpdate { history_changed: bool },
    /// Same block as before; only the pending set was refreshed.
    PendingOnly,
}

struct Inner {
    provider: Arc<dyn BlockchainDataProvider>,
    fee_market: Arc<dyn FeeMarketProvider>,
    resolver: Arc<dyn InputResolver>,
    info: WalletInfo,
    config: SyncConfig,
    address: DerivedAddress,
    state: RwLock<WalletState>,
    status: RwLock<SyncStatus>,
    listener: RwLock<Arc<dyn WalletEventListener>>,
    poll_enabled: AtomicBool,
    tick: tokio::sync::Mutex<()>,
}

/// Handle to the running polling task.
struct PollTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl PollTask {
    /// Ask the loop to exit before its next tick.
    fn stop(self) {
        self.stop.send_replace(true);
    }
}

/// A synchronized single-address Bitcoin wallet.
pub struct BitcoinWallet {
    inner: Arc<Inner>,
    task: Mutex<Option<PollTask>>,
}

impl BitcoinWallet {
    /// Create a wallet for the native SegWit external address 0 of `info`.
    ///
    /// Inputs of submitted transactions are resolved through `provider`.
    /// Polling does not start until [`start_polling`](Self::start_polling).
    pub fn new(
        provider: Arc<dyn BlockchainDataProvider>,
        fee_market: Arc<dyn FeeMarketProvider>,
        info: WalletInfo,
        config: SyncConfig,
    ) -> Result<Self, WalletError> {
        let resolver = Arc::new(BlockchainInputResolver::new(provider.clone()));
        Self::with_resolver(provider, fee_market, resolver, info, config)
    }

    /// Like [`new`](Self::new) with a custom input resolver.
    pub fn with_resolver(
        provider: Arc<dyn BlockchainDataProvider>,
        fee_market: Arc<dyn FeeMarketProvider>,
        resolver: Arc<dyn InputResolver>,
        info: WalletInfo,
        config: SyncConfig,
    ) -> Result<Self, WalletError> {
        let address = info.derive_address(
            AddressType::NativeSegWit,
            config.network,
            ChainType::External,
            0,
        )?;
        let mut state = WalletState::default();
        state.set_addresses(vec![address.clone()]);
        info!(address = %address.address, network = %config.network, "wallet created");

        let inner = Inner {
            provider,
            fee_market,
            resolver,
            info,
            poll_enabled: AtomicBool::new(config.poll_enabled),
            config,
            address,
            state: RwLock::new(state),
            status: RwLock::new(SyncStatus {
                is_settled: true,
                ..SyncStatus::default()
            }),
            listener: RwLock::new(Arc::new(NoopListener)),
            tick: tokio::sync::Mutex::new(()),
        };
        Ok(Self {
            inner: Arc::new(inner),
            task: Mutex::new(None),
        })
    }

    pub fn info(&self) -> &WalletInfo {
        &self.inner.info
    }

    pub fn network(&self) -> Network {
        self.inner.config.network
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The tracked receiving address.
    pub fn address(&self) -> &DerivedAddress {
        &self.inner.address
    }

    pub fn balance(&self) -> u64 {
        self.inner.state.read().balance()
    }

    pub fn utxos(&self) -> Vec<Utxo> {
        self.inner.state.read().utxos().to_vec()
    }

    pub fn transaction_history(&self) -> Vec<TransactionHistoryEntry> {
        self.inner.state.read().transaction_history().to_vec()
    }

    pub fn pending_transactions(&self) -> Vec<TransactionHistoryEntry> {
        self.inner.state.read().pending_transactions().to_vec()
    }

    pub fn addresses(&self) -> Vec<DerivedAddress> {
        self.inner.state.read().addresses().to_vec()
    }

    pub fn last_known_block(&self) -> Option<BlockInfo> {
        self.inner.state.read().last_known_block().cloned()
    }

    pub fn sync_status(&self) -> SyncStatus {
        *self.inner.status.read()
    }

    /// Replace the event listener. The default ignores all events.
    pub fn set_event_listener(&self, listener: Arc<dyn WalletEventListener>) {
        *self.inner.listener.write() = listener;
    }

    pub fn is_poll_enabled(&self) -> bool {
        self.inner.poll_enabled.load(Ordering::Acquire)
    }

    /// Enable or disable scheduled ticks. A tick in flight is not interrupted.
    pub fn set_poll_enabled(&self, enabled: bool) {
        self.inner.poll_enabled.store(enabled, Ordering::Release);
        debug!(enabled, "poll enabled changed");
    }

    /// Run one tick unless polling is disabled or a tick is already running.
    pub async fn poll_once(&self) -> Result<PollOutcome, WalletError> {
        self.inner.poll_once().await
    }

    /// Run one tick now, waiting for any running tick to finish first.
    ///
    /// Ignores the poll-enabled flag.
    pub async fn refresh(&self) -> Result<PollOutcome, WalletError> {
        let _guard = self.inner.tick.lock().await;
        self.inner.run_cycle().await
    }

    /// Start the polling task: one tick now, then one per poll interval.
    ///
    /// Must be called from within a tokio runtime. Calling it while the task
    /// is running does nothing.
    pub fn start_polling(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let period = inner.config.poll_interval;
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                match inner.poll_once().await {
                    Ok(outcome) => debug!(?outcome, "poll tick"),
                    Err(e) => warn!("poll tick failed: {e}"),
                }
            }
            debug!("polling task exited");
        });
        *task = Some(PollTask { handle, stop });
        info!(interval_ms = period.as_millis() as u64, "polling started");
    }

    pub fn is_polling(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Stop the polling timer. State is kept.
    ///
    /// No new tick starts after this returns; a tick in flight finishes
    /// and commits its result.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
            info!("polling stopped");
        }
    }

    /// Broadcast a raw transaction and track it as pending.
    ///
    /// Returns the provider's transaction id. Submitting the same
    /// transaction again does not add a second pending entry.
    pub async fn submit_transaction(&self, raw_hex: &str) -> Result<String, WalletError> {
        let txid = self.inner.provider.submit_transaction(raw_hex).await?;
        info!(%txid, "submitted transaction");

        match history_entry_from_raw_tx(raw_hex, self.network(), self.inner.resolver.as_ref()).await {
            Ok(mut entry) => {
                entry.transaction_hash = txid.clone();
                let event = {
                    let mut state = self.inner.state.write();
                    state
                        .add_pending_transaction(entry)
                        .then(|| WalletEvent::PendingTransactions(state.pending_transactions().to_vec()))
                };
                if let Some(event) = event {
                    self.inner.status.write().is_settled = false;
                    self.inner.emit(vec![event]);
                }
            }
            // The next mempool refresh will pick it up.
            Err(e) => warn!(%txid, "could not track submitted transaction: {e}"),
        }
        Ok(txid)
    }

    /// Current fast/standard/slow fee rates.
    pub async fn current_fee_market(&self) -> Result<EstimatedFees, WalletError> {
        Ok(self.inner.fee_market.get_fee_market().await?)
    }

    /// A builder preloaded with the current UTXOs, paying change back to the
    /// wallet address. `fee_rate` is in sat/vB.
    pub fn transaction_builder(&self, fee_rate: f64) -> Result<TransactionBuilder, WalletError> {
        check_fee_rate(fee_rate)?;
        let mut builder = TransactionBuilder::new(
            self.network(),
            sat_per_vbyte_to_btc_per_kb(fee_rate),
            vec![self.inner.address.clone()],
        );
        builder.set_utxo_set(self.utxos());
        builder.set_change_address(&self.inner.address.address)?;
        Ok(builder)
    }
}

impl Drop for BitcoinWallet {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.stop();
        }
    }
}

/// Holds `is_any_request_pending` up until dropped, including when the
/// tick future is cancelled mid-request.
struct RequestInFlight<'a>(&'a RwLock<SyncStatus>);

impl<'a> RequestInFlight<'a> {
    fn begin(status: &'a RwLock<SyncStatus>) -> Self {
        status.write().is_any_request_pending = true;
        Self(status)
    }
}

impl Drop for RequestInFlight<'_> {
    fn drop(&mut self) {
        self.0.write().is_any_request_pending = false;
    }
}

impl Inner {
    async fn poll_once(&self) -> Result<PollOutcome, WalletError> {
        if !self.poll_enabled.load(Ordering::Acquire) {
            return Ok(PollOutcome::Disabled);
        }
        let Ok(_guard) = self.tick.try_lock() else {
            debug!("previous tick still running, skipping");
            return Ok(PollOutcome::Busy);
        };
        self.run_cycle().await
    }

    /// Tick body. Callers hold `tick`.
    async fn run_cycle(&self) -> Result<PollOutcome, WalletError> {
        let in_flight = RequestInFlight::begin(&self.status);
        let result = self.sync().await;
        drop(in_flight);

        let settled = self.state.read().pending_transactions().is_empty();
        let mut status = self.status.write();
        status.is_up_to_date = result.is_ok();
        status.is_settled = settled;
        drop(status);

        if let Err(e) = &result {
            warn!(address = %self.address.address, "sync failed, keeping last state: {e}");
        }
        result
    }

    async fn sync(&self) -> Result<PollOutcome, WalletError> {
        let block = self.provider.get_last_known_block().await?;
        let (is_new, first_sync) = {
            let state = self.state.read();
            (state.is_new_block(&block), state.last_known_block().is_none())
        };
        if is_new {
            info!(height = block.height, hash = %block.hash, "new block");
            let history_changed = self.full_update(block, first_sync).await?;
            Ok(PollOutcome::FullUpdate { history_changed })
        } else {
            debug!(height = block.height, "block unchanged, refreshing pending");
            self.pending_update(Some(block.height)).await?;
            Ok(PollOutcome::PendingOnly)
        }
    }

    async fn full_update(&self, block: BlockInfo, first_sync: bool) -> Result<bool, WalletError> {
        let address = self.address.address.as_str();

        let history = self
            .provider
            .get_transactions(address, Some(0), self.config.history_depth, "")
            .await?
            .transactions;
        let history_changed = self.state.read().transaction_history() != history.as_slice();

        let mempool = self
            .provider
            .get_transactions_in_mempool(address, Some(block.height))
            .await?;

        let utxos = if history_changed || first_sync {
            Some(self.provider.get_utxos(address).await?)
        } else {
            None
        };

        let mut events = Vec::new();
        {
            let mut state = self.state.write();
            if state.set_transaction_history(history) {
                events.push(WalletEvent::TransactionHistory(state.transaction_history().to_vec()));
            }
            let merged = merge_pending(
                state.pending_transactions(),
                &mempool,
                state.transaction_history(),
            );
            if state.set_pending_transactions(merged) {
                events.push(WalletEvent::PendingTransactions(state.pending_transactions().to_vec()));
            }
            if let Some(utxos) = utxos {
                let old_balance = state.balance();
                if state.set_utxos(utxos) {
                    events.push(WalletEvent::Utxos(state.utxos().to_vec()));
                }
                if state.balance() != old_balance {
                    events.push(WalletEvent::Balance(state.balance()));
                }
            }
            state.set_last_known_block(block);
        }

        if !events.is_empty() {
            info!(changes = events.len(), "wallet state updated");
        }
        self.emit(events);
        Ok(history_changed)
    }

    async fn pending_update(&self, after_block_height: Option<u64>) -> Result<(), WalletError> {
        let mempool = self
            .provider
            .get_transactions_in_mempool(&self.address.address, after_block_height)
            .await?;

        let event = {
            let mut state = self.state.write();
            let merged = merge_pending(
                state.pending_transactions(),
                &mempool,
                state.transaction_history(),
            );
            state
                .set_pending_transactions(merged)
                .then(|| WalletEvent::PendingTransactions(state.pending_transactions().to_vec()))
        };
        if let Some(event) = event {
            self.emit(vec![event]);
        }
        Ok(())
    }

    /// Deliver events outside any state lock.
    fn emit(&self, events: Vec<WalletEvent>) {
        if events.is_empty() {
            return;
        }
        let listener = self.listener.read().clone();
        for event in &events {
            dispatch(listener.as_ref(), event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{WalletKeys, WalletSource};
    use async_trait::async_trait;
    use sats_core::error::ProviderError;
    use sats_core::stub::{STUB_BLOCK_HASH, STUB_FEE_RATE, StubBlockchainDataProvider};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn info() -> WalletInfo {
        WalletKeys::from_source(
            WalletSource::Mnemonic {
                phrase: ABANDON.into(),
                passphrase: String::new(),
            },
            0,
        )
        .unwrap()
        .wallet_info("test")
        .unwrap()
    }

    struct StubFees;

    #[async_trait]
    impl FeeMarketProvider for StubFees {
        async fn get_fee_market(&self) -> Result<EstimatedFees, ProviderError> {
            Err(ProviderError::Transport("offline".into()))
        }
    }

    fn stub_wallet() -> BitcoinWallet {
        BitcoinWallet::new(
            Arc::new(StubBlockchainDataProvider::new(Network::Testnet)),
            Arc::new(crate::fee_market::ProviderFeeMarket::new(Arc::new(
                StubBlockchainDataProvider::new(Network::Testnet),
            ))),
            info(),
            SyncConfig::testnet(),
        )
        .unwrap()
    }

    #[test]
    fn new_wallet_tracks_native_segwit_address() {
        let wallet = stub_wallet();
        assert!(wallet.address().address.starts_with("tb1q"));
        assert_eq!(wallet.address().address_type, AddressType::NativeSegWit);
        assert_eq!(wallet.addresses(), vec![wallet.address().clone()]);
        assert_eq!(wallet.balance(), 0);
        assert!(wallet.last_known_block().is_none());
        assert!(!wallet.is_polling());
        assert!(wallet.sync_status().is_settled);
    }

    #[test]
    fn mainnet_config_derives_mainnet_address() {
        let wallet = BitcoinWallet::new(
            Arc::new(StubBlockchainDataProvider::new(Network::Mainnet)),
            Arc::new(StubFees),
            info(),
            SyncConfig::mainnet(),
        )
        .unwrap();
        // BIP-84 first receive address of the test mnemonic
        assert_eq!(wallet.address().address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
    }

    #[tokio::test]
    async fn first_poll_runs_full_update() {
        let wallet = stub_wallet();
        let outcome = wallet.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::FullUpdate { history_changed: true });
        assert_eq!(wallet.balance(), 100_000);
        assert_eq!(wallet.utxos().len(), 1);
        assert_eq!(wallet.transaction_history().len(), 1);
        assert_eq!(wallet.last_known_block().unwrap().hash, STUB_BLOCK_HASH);

        let status = wallet.sync_status();
        assert!(status.is_up_to_date);
        assert!(!status.is_any_request_pending);
    }

    #[tokio::test]
    async fn same_block_runs_pending_only() {
        let wallet = stub_wallet();
        wallet.poll_once().await.unwrap();
        assert_eq!(wallet.poll_once().await.unwrap(), PollOutcome::PendingOnly);
    }

    #[tokio::test]
    async fn disabled_poll_does_nothing_but_refresh_runs() {
        let wallet = stub_wallet();
        wallet.set_poll_enabled(false);
        assert_eq!(wallet.poll_once().await.unwrap(), PollOutcome::Disabled);
        assert!(wallet.last_known_block().is_none());

        let outcome = wallet.refresh().await.unwrap();
        assert!(matches!(outcome, PollOutcome::FullUpdate { .. }));
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let wallet = stub_wallet();
        let _held = wallet.inner.tick.lock().await;
        assert_eq!(wallet.poll_once().await.unwrap(), PollOutcome::Busy);
    }

    #[tokio::test]
    async fn fee_market_passthrough() {
        let wallet = stub_wallet();
        let fees = wallet.current_fee_market().await.unwrap();
        assert_eq!(fees.fast.fee_rate, STUB_FEE_RATE);

        let offline = BitcoinWallet::new(
            Arc::new(StubBlockchainDataProvider::default()),
            Arc::new(StubFees),
            info(),
            SyncConfig::testnet(),
        )
        .unwrap();
        assert!(matches!(
            offline.current_fee_market().await,
            Err(WalletError::Provider(ProviderError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn builder_uses_synced_utxos() {
        let wallet = stub_wallet();
        wallet.poll_once().await.unwrap();
        let mut builder = wallet.transaction_builder(1.0).unwrap();
        assert_eq!(builder.fee_rate(), 1.0);
        builder
            .add_output("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", 50_000)
            .unwrap();
        let unsigned = builder.build().unwrap();
        assert_eq!(unsigned.fee, 146);
        assert_eq!(unsigned.signers, vec![wallet.address().clone()]);
    }

    #[tokio::test]
    async fn shutdown_stops_task() {
        let wallet = stub_wallet();
        wallet.start_polling();
        assert!(wallet.is_polling());
        wallet.start_polling();
        wallet.shutdown();
        tokio::task::yield_now().await;
        assert!(!wallet.is_polling());
    }
}
