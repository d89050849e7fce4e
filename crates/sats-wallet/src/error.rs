//! Wallet error types.

use sats_core::error::{AddressError, DerivationError, ProviderError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Selected inputs cannot cover the outputs plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Total value of the offered UTXOs in sats.
        have: u64,
        /// Requested output total in sats, before fees.
        need: u64,
    },

    /// No UTXOs available for spending.
    #[error("no UTXOs available")]
    NoUtxos,

    /// The builder has no payment outputs.
    #[error("no outputs have been added")]
    NoOutputs,

    /// The builder has no change address.
    #[error("change address not set")]
    MissingChangeAddress,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Address rejected for the wallet's network.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// OP_RETURN payload larger than the relay limit.
    #[error("OP_RETURN payload is {len} bytes, max {max}")]
    InvalidOpReturn {
        /// Encoded payload length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// A selected UTXO pays an address the wallet cannot sign for.
    #[error("unknown address in UTXO set: {0}")]
    UnknownSigningAddress(String),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Signature creation failure.
    #[error("signing: {0}")]
    Signing(String),

    /// Number of signers does not match the transaction inputs.
    #[error("expected {inputs} signers, got {signers}")]
    SignerMismatch {
        /// Inputs in the transaction.
        inputs: usize,
        /// Signers supplied.
        signers: usize,
    },

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Raw transaction could not be decoded.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction build error.
    #[error("build error: {0}")]
    BuildError(String),

    /// Address error from sats-core.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Derivation error from sats-core.
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// Data provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl WalletError {
    /// True for shortfalls the caller can fix by adding funds.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, WalletError::InsufficientFunds { .. })
    }
}
