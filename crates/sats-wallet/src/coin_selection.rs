//! Fee-aware coin selection.
//!
//! [`CoinSelector`] is the strategy seam used by the transaction builder;
//! [`GreedyCoinSelector`] is the default. Greedy selection is deterministic
//! over input order, so callers control prioritization by pre-sorting UTXOs.

use sats_core::constants::{DUST_THRESHOLD, INPUT_SIZE, estimate_fee};
use sats_core::types::{OutputTarget, Utxo};

/// Result of coin selection: inputs to spend, final outputs and the fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// Selected UTXOs, in selection order.
    pub selected_utxos: Vec<Utxo>,
    /// Requested outputs followed by the change output, if any.
    pub outputs: Vec<OutputTarget>,
    /// Transaction fee in sats, including any folded sub-dust change.
    pub fee: u64,
    /// Change returned to the wallet; zero or at least [`DUST_THRESHOLD`].
    pub change: u64,
}

impl CoinSelection {
    /// Total value of the selected inputs.
    pub fn input_total(&self) -> u64 {
        self.selected_utxos.iter().map(|u| u.satoshis).sum()
    }
}

/// Strategy for picking funding inputs.
pub trait CoinSelector: Send + Sync {
    /// Select inputs paying `outputs` at `fee_rate` sat/vB.
    ///
    /// Returns `None` when `utxos` cannot cover the outputs plus fee.
    fn select(
        &self,
        change_address: &str,
        utxos: &[Utxo],
        outputs: &[OutputTarget],
        fee_rate: f64,
        has_op_return: bool,
    ) -> Option<CoinSelection>;
}

/// Accumulate UTXOs in order until outputs plus fee are covered.
///
/// Fee estimates always reserve room for a change output. Change that would
/// be dust is first rescued by one extra input if a remaining UTXO pays for
/// itself; otherwise it is folded into the fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyCoinSelector;

impl CoinSelector for GreedyCoinSelector {
    fn select(
        &self,
        change_address: &str,
        utxos: &[Utxo],
        outputs: &[OutputTarget],
        fee_rate: f64,
        has_op_return: bool,
    ) -> Option<CoinSelection> {
        let total_output = outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.satoshis));
        // payments + change + optional OP_RETURN
        let fee_outputs = outputs.len() + 1 + usize::from(has_op_return);

        let mut selected: Vec<Utxo> = Vec::new();
        let mut input_sum: u64 = 0;
        let mut fee: u64 = 0;
        let mut covered = false;

        for utxo in utxos {
            selected.push(utxo.clone());
            input_sum = input_sum.saturating_add(utxo.satoshis);
            fee = estimate_fee(selected.len(), fee_outputs, fee_rate);
            if input_sum >= total_output.saturating_add(fee) {
                covered = true;
                break;
            }
        }
        if !covered {
            return None;
        }

        let mut change = input_sum - total_output - fee;

        if change > 0 && change < DUST_THRESHOLD {
            let input_cost = (INPUT_SIZE as f64 * fee_rate).ceil() as u64;
            for extra in &utxos[selected.len()..] {
                let new_fee = estimate_fee(selected.len() + 1, fee_outputs, fee_rate);
                let Some(new_change) = input_sum
                    .checked_add(extra.satoshis)
                    .and_then(|s| s.checked_sub(total_output))
                    .and_then(|s| s.checked_sub(new_fee))
                else {
                    continue;
                };
                let gained = new_change.saturating_sub(change);
                if gained > input_cost && new_change >= DUST_THRESHOLD {
                    selected.push(extra.clone());
                    fee = new_fee;
                    change = new_change;
                    break;
                }
            }
        }

        if change < DUST_THRESHOLD {
            fee += change;
            change = 0;
        }

        let mut final_outputs = outputs.to_vec();
        if change > 0 {
            final_outputs.push(OutputTarget {
                address: change_address.to_string(),
                satoshis: change,
            });
        }

        Some(CoinSelection {
            selected_utxos: selected,
            outputs: final_outputs,
            fee,
            change,
        })
    }
}
