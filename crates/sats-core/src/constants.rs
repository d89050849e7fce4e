//! Engine constants. All monetary values in satoshis (1 BTC = 10^8 sats).

pub const SATS_PER_BTC: u64 = 100_000_000;

/// Estimated virtual size of one input, in vbytes.
pub const INPUT_SIZE: u64 = 68;

/// Estimated virtual size of one output, in vbytes.
pub const OUTPUT_SIZE: u64 = 34;

/// Fixed per-transaction overhead (version, counts, lock time), in vbytes.
pub const TRANSACTION_OVERHEAD: u64 = 10;

/// Outputs below this value are not economically spendable.
pub const DUST_THRESHOLD: u64 = 546;

/// Maximum OP_RETURN payload after UTF-8 encoding.
pub const MAX_OP_RETURN_BYTES: usize = 80;

/// PBKDF2-HMAC-SHA512 rounds for mnemonic seed stretching.
pub const PBKDF2_ROUNDS: u32 = 2048;

/// Length of a stretched mnemonic seed.
pub const SEED_LEN: usize = 64;

/// Salt prefix for BIP-39 seeds.
pub const BIP39_SALT_PREFIX: &str = "mnemonic";

/// Salt prefix for Electrum seeds.
pub const ELECTRUM_SALT_PREFIX: &str = "electrum";

/// Average block interval used to turn a block target into seconds.
pub const BLOCK_INTERVAL_SECS: u64 = 600;

/// Default synchronizer poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Default number of confirmed history entries fetched per sync.
pub const DEFAULT_HISTORY_DEPTH: usize = 20;

/// Default page size for provider history queries.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Estimated fee for a transaction with the given shape.
///
/// Sizes are fixed per-input/output estimates, not exact byte counts.
///
/// # Examples
///
/// ```
/// use sats_core::constants::estimate_fee;
/// // one input, one payment + change, no OP_RETURN, 1 sat/vB
/// assert_eq!(estimate_fee(1, 2, 1.0), 68 + 2 * 34 + 10);
/// ```
pub fn estimate_fee(inputs: usize, outputs: usize, fee_rate: f64) -> u64 {
    let vbytes = estimate_vbytes(inputs, outputs);
    (vbytes as f64 * fee_rate).ceil() as u64
}

/// Estimated virtual size for the given input and output counts.
pub fn estimate_vbytes(inputs: usize, outputs: usize) -> u64 {
    (inputs as u64)
        .saturating_mul(INPUT_SIZE)
        .saturating_add((outputs as u64).saturating_mul(OUTPUT_SIZE))
        .saturating_add(TRANSACTION_OVERHEAD)
}
