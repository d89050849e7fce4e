//! Wallet state notifications.
//!
//! The synchronizer reports every state change to one
//! [`WalletEventListener`]. Each callback receives the full new value.
//! Listeners run synchronously on the polling task; a panicking listener is
//! caught and logged so the cycle's bookkeeping still completes.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::broadcast;
use tracing::warn;

use sats_core::address::DerivedAddress;
use sats_core::types::{TransactionHistoryEntry, Utxo};

/// Observer for wallet state changes. Every method defaults to a no-op.
pub trait WalletEventListener: Send + Sync {
    fn on_balance(&self, _balance: u64) {}
    fn on_utxos(&self, _utxos: &[Utxo]) {}
    fn on_transaction_history(&self, _history: &[TransactionHistoryEntry]) {}
    fn on_pending_transactions(&self, _pending: &[TransactionHistoryEntry]) {}
    fn on_addresses(&self, _addresses: &[DerivedAddress]) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl WalletEventListener for NoopListener {}

/// One state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Balance(u64),
    Utxos(Vec<Utxo>),
    TransactionHistory(Vec<TransactionHistoryEntry>),
    PendingTransactions(Vec<TransactionHistoryEntry>),
    Addresses(Vec<DerivedAddress>),
}

impl WalletEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Balance(_) => "balance",
            Self::Utxos(_) => "utxos",
            Self::TransactionHistory(_) => "transaction_history",
            Self::PendingTransactions(_) => "pending_transactions",
            Self::Addresses(_) => "addresses",
        }
    }
}

/// Forwards every event to a tokio broadcast channel.
///
/// Slow receivers lag and miss events rather than block the wallet.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: broadcast::Sender<WalletEvent>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<WalletEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: WalletEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

impl WalletEventListener for ChannelListener {
    fn on_balance(&self, balance: u64) {
        self.send(WalletEvent::Balance(balance));
    }
    fn on_utxos(&self, utxos: &[Utxo]) {
        self.send(WalletEvent::Utxos(utxos.to_vec()));
    }
    fn on_transaction_history(&self, history: &[TransactionHistoryEntry]) {
        self.send(WalletEvent::TransactionHistory(history.to_vec()));
    }
    fn on_pending_transactions(&self, pending: &[TransactionHistoryEntry]) {
        self.send(WalletEvent::PendingTransactions(pending.to_vec()));
    }
    fn on_addresses(&self, addresses: &[DerivedAddress]) {
        self.send(WalletEvent::Addresses(addresses.to_vec()));
    }
}

/// Deliver `event` to `listener`, containing any panic.
///
/// Returns false if the listener panicked.
pub fn dispatch(listener: &dyn WalletEventListener, event: &WalletEvent) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| match event {
        WalletEvent::Balance(balance) => listener.on_balance(*balance),
        WalletEvent::Utxos(utxos) => listener.on_utxos(utxos),
        WalletEvent::TransactionHistory(history) => listener.on_transaction_history(history),
        WalletEvent::PendingTransactions(pending) => listener.on_pending_transactions(pending),
        WalletEvent::Addresses(addresses) => listener.on_addresses(addresses),
    }));
    if outcome.is_err() {
        warn!(event = event.kind(), "wallet event listener panicked");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        balances: Mutex<Vec<u64>>,
    }

    impl WalletEventListener for Recorder {
        fn on_balance(&self, balance: u64) {
            self.balances.lock().push(balance);
        }
    }

    struct Panicker;

    impl WalletEventListener for Panicker {
        fn on_utxos(&self, _utxos: &[Utxo]) {
            panic!("listener bug");
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let recorder = Recorder::default();
        assert!(dispatch(&recorder, &WalletEvent::Utxos(vec![])));
        assert!(dispatch(&recorder, &WalletEvent::Balance(42)));
        assert_eq!(*recorder.balances.lock(), vec![42]);
        assert!(dispatch(&NoopListener, &WalletEvent::Addresses(vec![])));
    }

    #[test]
    fn panic_is_contained() {
        assert!(!dispatch(&Panicker, &WalletEvent::Utxos(vec![])));
        // other callbacks still work
        assert!(dispatch(&Panicker, &WalletEvent::Balance(1)));
    }

    #[test]
    fn channel_listener_forwards_full_values() {
        let (listener, mut rx) = ChannelListener::new(8);
        let utxo = Utxo {
            tx_id: "aa".repeat(32),
            index: 1,
            satoshis: 700,
            address: "tb1qme".into(),
        };
        dispatch(&listener, &WalletEvent::Utxos(vec![utxo.clone()]));
        dispatch(&listener, &WalletEvent::Balance(700));

        assert_eq!(rx.try_recv().unwrap(), WalletEvent::Utxos(vec![utxo]));
        assert_eq!(rx.try_recv().unwrap(), WalletEvent::Balance(700));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_listener_without_receivers_is_silent() {
        let (listener, rx) = ChannelListener::new(1);
        drop(rx);
        listener.on_balance(5);
        let mut late = listener.subscribe();
        listener.on_balance(6);
        assert_eq!(late.try_recv().unwrap(), WalletEvent::Balance(6));
    }
}
