//! Transaction builder.
//!
//! Accumulates a UTXO set, change address, payment outputs and an optional
//! OP_RETURN payload, then runs coin selection and assembles an unsigned
//! PSBT together with the signer metadata for each input:
//! 1. `set_utxo_set` / `set_change_address`
//! 2. `add_output` (and optionally `add_op_return_output`)
//! 3. `build`, then hand the result to [`crate::signer::sign_transaction`]

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::psbt::Psbt;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use sats_core::address::{
    AddressValidationResult, DerivedAddress, Network, script_pubkey_for, validate_address,
};
use sats_core::constants::{MAX_OP_RETURN_BYTES, SATS_PER_BTC, estimate_vbytes};
use sats_core::types::{OutputTarget, Utxo};

use crate::coin_selection::{CoinSelection, CoinSelector, GreedyCoinSelector};
use crate::error::WalletError;

/// Convert a BTC/kB fee rate to sat/vB, rounded to whole sat/kB.
pub fn btc_per_kb_to_sat_per_vbyte(btc_per_kb: f64) -> f64 {
    (btc_per_kb * SATS_PER_BTC as f64).round() / 1000.0
}

/// Reject fee rates that are negative, NaN or infinite.
pub fn check_fee_rate(rate: f64) -> Result<(), WalletError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(WalletError::InvalidAmount(format!("fee rate {rate}")))
    }
}

/// Convert a sat/vB fee rate to BTC/kB.
pub fn sat_per_vbyte_to_btc_per_kb(sat_per_vbyte: f64) -> f64 {
    sat_per_vbyte * 1000.0 / SATS_PER_BTC as f64
}

/// An unsigned transaction ready for signing.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// PSBT with `witness_utxo` set on every input.
    pub context: Psbt,
    /// First payment destination.
    pub to_address: String,
    /// Amount paid to `to_address`, in sats.
    pub amount: u64,
    /// Fee paid to miners, in sats.
    pub fee: u64,
    /// Change paid back to the wallet; zero if none.
    pub change: u64,
    /// Estimated virtual size.
    pub vbytes: u64,
    /// Signing address for each input, in input order.
    pub signers: Vec<DerivedAddress>,
}

/// Builder for unsigned transactions.
///
/// # Example
/// ```ignore
/// let mut builder = TransactionBuilder::new(Network::Testnet, 0.00002, vec![own]);
/// builder.set_utxo_set(utxos).set_change_address(&own.address)?;
/// builder.add_output("tb1q...", 50_000)?;
/// let unsigned = builder.build()?;
/// ```
pub struct TransactionBuilder {
    network: Network,
    fee_rate: f64,
    known_addresses: Vec<DerivedAddress>,
    utxos: Vec<Utxo>,
    change_address: Option<String>,
    outputs: Vec<OutputTarget>,
    op_return: Option<Vec<u8>>,
    selector: Box<dyn CoinSelector>,
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("network", &self.network)
            .field("fee_rate", &self.fee_rate)
            .field("known_addresses", &self.known_addresses)
            .field("utxos", &self.utxos)
            .field("change_address", &self.change_address)
            .field("outputs", &self.outputs)
            .field("op_return", &self.op_return)
            .finish_non_exhaustive()
    }
}

impl TransactionBuilder {
    /// Create a builder signing for `known_addresses`.
    ///
    /// `fee_rate_btc_per_kb` is converted to sat/vB for coin selection.
    pub fn new(network: Network, fee_rate_btc_per_kb: f64, known_addresses: Vec<DerivedAddress>) -> Self {
        Self {
            network,
            fee_rate: btc_per_kb_to_sat_per_vbyte(fee_rate_btc_per_kb),
            known_addresses,
            utxos: Vec::new(),
            change_address: None,
            outputs: Vec::new(),
            op_return: None,
            selector: Box::new(GreedyCoinSelector),
        }
    }

    /// Fee rate handed to the coin selector, in sat/vB.
    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// Replace the spendable UTXO set. Order is selection priority.
    pub fn set_utxo_set(&mut self, utxos: Vec<Utxo>) -> &mut Self {
        self.utxos = utxos;
        self
    }

    pub fn set_change_address(&mut self, address: &str) -> Result<&mut Self, WalletError> {
        self.check_address(address)?;
        self.change_address = Some(address.to_string());
        Ok(self)
    }

    /// Swap the coin selection strategy (default: [`GreedyCoinSelector`]).
    pub fn set_coin_selector(&mut self, selector: Box<dyn CoinSelector>) -> &mut Self {
        self.selector = selector;
        self
    }

    /// Add a payment output. The address must be valid for the builder's network.
    pub fn add_output(&mut self, address: &str, satoshis: u64) -> Result<&mut Self, WalletError> {
        self.check_address(address)?;
        if satoshis == 0 {
            return Err(WalletError::InvalidAmount("output amount is zero".into()));
        }
        self.outputs.push(OutputTarget {
            address: address.to_string(),
            satoshis,
        });
        Ok(self)
    }

    /// Set or clear the OP_RETURN payload.
    ///
    /// `None` or a blank message clears it. Payloads over
    /// [`MAX_OP_RETURN_BYTES`] UTF-8 bytes are rejected and leave any
    /// previous payload in place.
    pub fn add_op_return_output(&mut self, message: Option<&str>) -> Result<&mut Self, WalletError> {
        match message {
            Some(text) if !text.trim().is_empty() => {
                let bytes = text.as_bytes();
                if bytes.len() > MAX_OP_RETURN_BYTES {
                    return Err(WalletError::InvalidOpReturn {
                        len: bytes.len(),
                        max: MAX_OP_RETURN_BYTES,
                    });
                }
                self.op_return = Some(bytes.to_vec());
            }
            _ => self.op_return = None,
        }
        Ok(self)
    }

    pub fn outputs(&self) -> &[OutputTarget] {
        &self.outputs
    }

    pub fn op_return(&self) -> Option<&[u8]> {
        self.op_return.as_deref()
    }

    /// Run coin selection and assemble the unsigned transaction.
    pub fn build(&self) -> Result<UnsignedTransaction, WalletError> {
        check_fee_rate(self.fee_rate)?;
        if self.utxos.is_empty() {
            return Err(WalletError::NoUtxos);
        }
        let change_address = self
            .change_address
            .as_deref()
            .ok_or(WalletError::MissingChangeAddress)?;
        let first = self.outputs.first().ok_or(WalletError::NoOutputs)?;

        let selection = self
            .selector
            .select(
                change_address,
                &self.utxos,
                &self.outputs,
                self.fee_rate,
                self.op_return.is_some(),
            )
            .ok_or_else(|| WalletError::InsufficientFunds {
                have: self.utxos.iter().fold(0u64, |a, u| a.saturating_add(u.satoshis)),
                need: self.outputs.iter().fold(0u64, |a, o| a.saturating_add(o.satoshis)),
            })?;

        let mut signers = Vec::with_capacity(selection.selected_utxos.len());
        let mut inputs = Vec::with_capacity(selection.selected_utxos.len());
        let mut prevouts = Vec::with_capacity(selection.selected_utxos.len());
        for utxo in &selection.selected_utxos {
            let signer = self
                .known_addresses
                .iter()
                .find(|a| a.address == utxo.address)
                .ok_or_else(|| WalletError::UnknownSigningAddress(utxo.address.clone()))?;
            signers.push(signer.clone());
            inputs.push(tx_input(utxo)?);
            prevouts.push(TxOut {
                value: Amount::from_sat(utxo.satoshis),
                script_pubkey: script_pubkey_for(&utxo.address, self.network)?,
            });
        }

        let mut outputs = Vec::with_capacity(selection.outputs.len() + 1);
        for target in &selection.outputs {
            outputs.push(TxOut {
                value: Amount::from_sat(target.satoshis),
                script_pubkey: script_pubkey_for(&target.address, self.network)?,
            });
        }
        if let Some(data) = &self.op_return {
            let push = PushBytesBuf::try_from(data.clone())
                .map_err(|e| WalletError::BuildError(e.to_string()))?;
            outputs.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: ScriptBuf::new_op_return(push),
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| WalletError::BuildError(e.to_string()))?;
        for (input, prevout) in psbt.inputs.iter_mut().zip(prevouts) {
            input.witness_utxo = Some(prevout);
        }

        let vbytes = size_estimate(&selection, self.op_return.is_some());
        tracing::debug!(
            inputs = selection.selected_utxos.len(),
            outputs = selection.outputs.len(),
            fee = selection.fee,
            vbytes,
            "built unsigned transaction"
        );

        Ok(UnsignedTransaction {
            context: psbt,
            to_address: first.address.clone(),
            amount: first.satoshis,
            fee: selection.fee,
            change: selection.change,
            vbytes,
            signers,
        })
    }

    fn check_address(&self, address: &str) -> Result<(), WalletError> {
        match validate_address(address, self.network) {
            AddressValidationResult::Valid => Ok(()),
            AddressValidationResult::InvalidNetwork => Err(WalletError::InvalidAddress(format!(
                "{address} is not a {} address",
                self.network
            ))),
            AddressValidationResult::InvalidAddress => {
                Err(WalletError::InvalidAddress(address.to_string()))
            }
        }
    }
}

fn tx_input(utxo: &Utxo) -> Result<TxIn, WalletError> {
    let txid = Txid::from_str(&utxo.tx_id)
        .map_err(|e| WalletError::InvalidTransaction(format!("utxo txid {}: {e}", utxo.tx_id)))?;
    Ok(TxIn {
        previous_output: OutPoint::new(txid, utxo.index),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::new(),
    })
}

fn size_estimate(selection: &CoinSelection, has_op_return: bool) -> u64 {
    estimate_vbytes(
        selection.selected_utxos.len(),
        selection.outputs.len() + usize::from(has_op_return),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{WalletKeys, WalletSource};
    use sats_core::address::{AddressType, ChainType};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const PAYEE: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
    const MAINNET_PAYEE: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
    // 1 sat/vB
    const RATE: f64 = 0.00001;

    fn own(address_type: AddressType) -> DerivedAddress {
        let keys = WalletKeys::from_source(
            WalletSource::Mnemonic {
                phrase: ABANDON.into(),
                passphrase: String::new(),
            },
            0,
        )
        .unwrap();
        keys.wallet_info("test")
            .unwrap()
            .derive_address(address_type, Network::Testnet, ChainType::External, 0)
            .unwrap()
    }

    fn utxo(n: u8, satoshis: u64, address: &str) -> Utxo {
        Utxo {
            tx_id: format!("{n:02x}").repeat(32),
            index: u32::from(n),
            satoshis,
            address: address.to_string(),
        }
    }

    fn builder(me: &DerivedAddress, utxos: Vec<Utxo>) -> TransactionBuilder {
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![me.clone()]);
        b.set_utxo_set(utxos);
        b.set_change_address(&me.address).unwrap();
        b
    }

    #[test]
    fn fee_rate_conversion() {
        assert_eq!(btc_per_kb_to_sat_per_vbyte(0.00001), 1.0);
        assert_eq!(btc_per_kb_to_sat_per_vbyte(0.00012345), 12.345);
        assert_eq!(btc_per_kb_to_sat_per_vbyte(sat_per_vbyte_to_btc_per_kb(7.5)), 7.5);
    }

    #[test]
    fn build_payment_with_change() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 50_000).unwrap();
        let unsigned = b.build().unwrap();

        assert_eq!(unsigned.fee, 146);
        assert_eq!(unsigned.change, 100_000 - 50_000 - 146);
        assert_eq!(unsigned.vbytes, 146);
        assert_eq!(unsigned.to_address, PAYEE);
        assert_eq!(unsigned.amount, 50_000);
        assert_eq!(unsigned.signers, vec![me.clone()]);

        let tx = &unsigned.context.unsigned_tx;
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].previous_output.vout, 1);
        assert_eq!(tx.input[0].sequence, Sequence::ENABLE_RBF_NO_LOCKTIME);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
        assert_eq!(
            tx.output[1].script_pubkey,
            script_pubkey_for(&me.address, Network::Testnet).unwrap()
        );

        let prevout = unsigned.context.inputs[0].witness_utxo.as_ref().unwrap();
        assert_eq!(prevout.value, Amount::from_sat(100_000));
        assert!(prevout.script_pubkey.is_p2wpkh());
    }

    #[test]
    fn sub_dust_change_gives_single_output() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 99_500).unwrap();
        let unsigned = b.build().unwrap();
        assert_eq!(unsigned.fee, 500);
        assert_eq!(unsigned.change, 0);
        assert_eq!(unsigned.context.unsigned_tx.output.len(), 1);
        assert_eq!(unsigned.vbytes, 68 + 34 + 10);
    }

    #[test]
    fn insufficient_funds_is_distinct_error() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 99_999).unwrap();
        let err = b.build().unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                have: 100_000,
                need: 99_999
            }
        );
        assert!(err.is_insufficient_funds());
    }

    #[test]
    fn op_return_appended_last_with_zero_value() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 10_000).unwrap();
        b.add_op_return_output(Some("hello sats")).unwrap();
        let unsigned = b.build().unwrap();

        let outputs = &unsigned.context.unsigned_tx.output;
        assert_eq!(outputs.len(), 3);
        let last = outputs.last().unwrap();
        assert!(last.script_pubkey.is_op_return());
        assert_eq!(last.value, Amount::ZERO);
        // 1 input, payment + change + OP_RETURN
        assert_eq!(unsigned.vbytes, 68 + 3 * 34 + 10);
        assert_eq!(unsigned.fee, unsigned.vbytes);
    }

    #[test]
    fn oversized_op_return_rejected_before_selection() {
        let me = own(AddressType::NativeSegWit);
        // No UTXOs at all: the error must come from the payload check.
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![me]);
        let err = b.add_op_return_output(Some(&"x".repeat(81))).unwrap_err();
        assert_eq!(err, WalletError::InvalidOpReturn { len: 81, max: 80 });
        assert!(b.op_return().is_none());
    }

    #[test]
    fn op_return_limit_counts_utf8_bytes() {
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![]);
        // 40 two-byte characters
        assert!(b.add_op_return_output(Some(&"é".repeat(40))).is_ok());
        assert!(b.add_op_return_output(Some(&"é".repeat(41))).is_err());
        assert_eq!(b.op_return().map(<[u8]>::len), Some(80));
    }

    #[test]
    fn blank_op_return_clears_payload() {
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![]);
        b.add_op_return_output(Some("memo")).unwrap();
        b.add_op_return_output(Some("   ")).unwrap();
        assert!(b.op_return().is_none());
        b.add_op_return_output(Some("memo")).unwrap();
        b.add_op_return_output(None).unwrap();
        assert!(b.op_return().is_none());
    }

    #[test]
    fn unusable_fee_rates_rejected() {
        let me = own(AddressType::NativeSegWit);
        for rate in [-0.00001, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut b = TransactionBuilder::new(Network::Testnet, rate, vec![me.clone()]);
            b.set_utxo_set(vec![utxo(1, 100_000, &me.address)]);
            b.set_change_address(&me.address).unwrap();
            b.add_output(PAYEE, 50_000).unwrap();
            let err = b.build().unwrap_err();
            assert!(matches!(err, WalletError::InvalidAmount(_)), "{rate}: {err:?}");
            assert!(!err.is_insufficient_funds());
        }

        // Zero is a valid, if unwise, rate.
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 50_000).unwrap();
        b.fee_rate = 0.0;
        assert_eq!(b.build().unwrap().fee, 0);
    }

    #[test]
    fn preconditions_checked_in_order() {
        let me = own(AddressType::NativeSegWit);
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![me.clone()]);
        assert_eq!(b.build().unwrap_err(), WalletError::NoUtxos);
        b.set_utxo_set(vec![utxo(1, 1_000, &me.address)]);
        assert_eq!(b.build().unwrap_err(), WalletError::MissingChangeAddress);
        b.set_change_address(&me.address).unwrap();
        assert_eq!(b.build().unwrap_err(), WalletError::NoOutputs);
    }

    #[test]
    fn wrong_network_output_rejected() {
        let mut b = TransactionBuilder::new(Network::Testnet, RATE, vec![]);
        assert!(matches!(
            b.add_output(MAINNET_PAYEE, 1_000),
            Err(WalletError::InvalidAddress(_))
        ));
        assert!(matches!(
            b.add_output("not-an-address", 1_000),
            Err(WalletError::InvalidAddress(_))
        ));
        assert!(matches!(
            b.add_output(PAYEE, 0),
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(b.outputs().is_empty());
    }

    #[test]
    fn unknown_utxo_address_rejected() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, PAYEE)]);
        b.add_output(PAYEE, 1_000).unwrap();
        assert_eq!(
            b.build().unwrap_err(),
            WalletError::UnknownSigningAddress(PAYEE.into())
        );
    }

    #[test]
    fn taproot_destination_uses_output_key() {
        let me = own(AddressType::NativeSegWit);
        let tr = own(AddressType::Taproot);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(&tr.address, 20_000).unwrap();
        let unsigned = b.build().unwrap();
        let script = &unsigned.context.unsigned_tx.output[0].script_pubkey;
        assert!(script.is_p2tr());
        assert_eq!(
            sats_core::address::address_from_script(script, Network::Testnet).as_deref(),
            Some(tr.address.as_str())
        );
    }

    #[test]
    fn build_does_not_consume_builder() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(&me, vec![utxo(1, 100_000, &me.address)]);
        b.add_output(PAYEE, 1_000).unwrap();
        let first = b.build().unwrap();
        let second = b.build().unwrap();
        assert_eq!(first.context, second.context);
    }

    struct TakeAll;

    impl CoinSelector for TakeAll {
        fn select(
            &self,
            _change: &str,
            utxos: &[Utxo],
            outputs: &[OutputTarget],
            _fee_rate: f64,
            _has_op_return: bool,
        ) -> Option<CoinSelection> {
            let total: u64 = utxos.iter().map(|u| u.satoshis).sum();
            let paid: u64 = outputs.iter().map(|o| o.satoshis).sum();
            Some(CoinSelection {
                selected_utxos: utxos.to_vec(),
                outputs: outputs.to_vec(),
                fee: total.checked_sub(paid)?,
                change: 0,
            })
        }
    }

    #[test]
    fn custom_selector_is_used() {
        let me = own(AddressType::NativeSegWit);
        let mut b = builder(
            &me,
            vec![utxo(1, 10_000, &me.address), utxo(2, 10_000, &me.address)],
        );
        b.set_coin_selector(Box::new(TakeAll));
        b.add_output(PAYEE, 5_000).unwrap();
        let unsigned = b.build().unwrap();
        assert_eq!(unsigned.signers.len(), 2);
        assert_eq!(unsigned.fee, 15_000);
    }
}
