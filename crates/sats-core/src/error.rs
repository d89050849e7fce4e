//! Error types shared across the Sats crates.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address: {0}")] InvalidAddress(String),
    #[error("address {address} does not belong to {network}")] WrongNetwork { address: String, network: String },
    #[error("invalid key length: expected {expected}, got {got}")] InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid public key: {0}")] InvalidPublicKey(String),
    #[error("invalid private key")] InvalidPrivateKey,
    #[error("taproot tweak failed: {0}")] TweakFailed(String),
    #[error("unsupported address type: {0}")] UnsupportedAddressType(String),
    #[error("unknown network: {0}")] UnknownNetwork(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("invalid extended key: {0}")] InvalidExtendedKey(String),
    #[error("derivation failed at {path}: {reason}")] Failed { path: String, reason: String },
    #[error("missing private key after derivation")] MissingPrivateKey,
    #[error("missing public key after derivation")] MissingPublicKey,
}

/// Failures reported by external data sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport: {0}")] Transport(String),
    #[error("not found: {0}")] NotFound(String),
    #[error("decode: {0}")] Decode(String),
    #[error("rejected: {0}")] Rejected(String),
}
