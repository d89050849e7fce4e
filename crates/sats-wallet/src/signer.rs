//! Input signing and finalization.
//!
//! One [`Signer`] per input, in input order. The input's `witness_utxo`
//! script decides how it is signed:
//! - P2WPKH: BIP-143 ECDSA, witness `<sig> <pubkey>`
//! - P2SH-P2WPKH: as above plus a script sig pushing the redeem script
//! - P2PKH: legacy ECDSA, script sig `<sig> <pubkey>`
//! - P2TR: BIP-341 key-path Schnorr with the tweaked private key

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{self, Keypair, Message, PublicKey, Secp256k1, SecretKey, schnorr};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{CompressedPublicKey, ScriptBuf, Transaction, TxOut, Witness, ecdsa, taproot};
use zeroize::Zeroize;

use sats_core::address::DerivedAddress;
use sats_core::taproot::{tweak_taproot_private_key, tweak_taproot_pubkey};

use crate::builder::UnsignedTransaction;
use crate::error::WalletError;
use crate::keys::KeyPair;
use crate::source::WalletKeys;

/// A fully signed, submission-ready transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub context: Transaction,
    /// Consensus serialization, hex encoded.
    pub hex: String,
}

impl SignedTransaction {
    pub fn txid(&self) -> String {
        self.context.compute_txid().to_string()
    }
}

/// Signs digests with one key pair.
///
/// Call [`Zeroize::zeroize`] when done; [`sign_transaction`] does this for
/// every signer it is given.
#[derive(Debug, Clone)]
pub struct Signer {
    key_pair: KeyPair,
}

impl Signer {
    pub fn new(key_pair: KeyPair) -> Self {
        Self { key_pair }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// ECDSA signature over a 32-byte digest.
    pub fn sign(&self, hash: &[u8]) -> Result<secp256k1::ecdsa::Signature, WalletError> {
        let msg = digest(hash)?;
        let secret = self.secret_key()?;
        Ok(Secp256k1::signing_only().sign_ecdsa(&msg, &secret))
    }

    /// BIP-340 Schnorr signature over a 32-byte digest using the BIP-86
    /// tweaked private key.
    pub fn sign_schnorr(&self, hash: &[u8]) -> Result<schnorr::Signature, WalletError> {
        let msg = digest(hash)?;
        let secret = self.secret_key()?;
        let tweaked = tweak_taproot_private_key(&secret.secret_bytes())?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &tweaked)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(secp.sign_schnorr_no_aux_rand(&msg, &keypair))
    }

    fn secret_key(&self) -> Result<SecretKey, WalletError> {
        let bytes = self
            .key_pair
            .private_key()
            .ok_or_else(|| WalletError::Signing("private key is absent".into()))?;
        if bytes.len() != 32 {
            return Err(WalletError::Signing(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        SecretKey::from_slice(bytes).map_err(|e| WalletError::Signing(e.to_string()))
    }

    fn public_key(&self) -> Result<PublicKey, WalletError> {
        PublicKey::from_slice(self.key_pair.public_key())
            .map_err(|e| WalletError::Signing(format!("public key: {e}")))
    }
}

impl Zeroize for Signer {
    fn zeroize(&mut self) {
        self.key_pair.zeroize();
    }
}

fn digest(hash: &[u8]) -> Result<Message, WalletError> {
    let bytes: [u8; 32] = hash
        .try_into()
        .map_err(|_| WalletError::Signing(format!("digest must be 32 bytes, got {}", hash.len())))?;
    Ok(Message::from_digest(bytes))
}

/// One signer per address, resolved from wallet keys.
pub fn signers_for(keys: &WalletKeys, addresses: &[DerivedAddress]) -> Result<Vec<Signer>, WalletError> {
    addresses
        .iter()
        .map(|a| keys.key_pair_for(a).map(Signer::new))
        .collect()
}

/// Sign and finalize every input, then extract the transaction.
///
/// `signers` must match the inputs one to one and are zeroized on return,
/// whether or not signing succeeded.
pub fn sign_transaction(
    unsigned: UnsignedTransaction,
    signers: &mut [Signer],
) -> Result<SignedTransaction, WalletError> {
    let mut psbt = unsigned.context;
    let result = sign_inputs(&mut psbt, signers);
    for signer in signers.iter_mut() {
        signer.zeroize();
    }
    result?;

    let tx = psbt
        .extract_tx()
        .map_err(|e| WalletError::Signing(e.to_string()))?;
    let hex = serialize_hex(&tx);
    tracing::debug!(txid = %tx.compute_txid(), inputs = tx.input.len(), "signed transaction");
    Ok(SignedTransaction { context: tx, hex })
}

fn sign_inputs(psbt: &mut Psbt, signers: &[Signer]) -> Result<(), WalletError> {
    if signers.len() != psbt.inputs.len() {
        return Err(WalletError::SignerMismatch {
            inputs: psbt.inputs.len(),
            signers: signers.len(),
        });
    }

    let prevouts: Vec<TxOut> = psbt
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            input
                .witness_utxo
                .clone()
                .ok_or_else(|| WalletError::InvalidTransaction(format!("input {i} has no witness utxo")))
        })
        .collect::<Result<_, _>>()?;

    let tx = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&tx);

    for (i, (signer, prevout)) in signers.iter().zip(&prevouts).enumerate() {
        let script = &prevout.script_pubkey;
        let input = &mut psbt.inputs[i];

        if script.is_p2tr() {
            let internal = signer.public_key()?.x_only_public_key().0.serialize();
            let output_key = tweak_taproot_pubkey(&internal)?;
            if script.as_bytes()[2..] != output_key {
                return Err(key_mismatch(i));
            }
            let sighash = cache
                .taproot_key_spend_signature_hash(i, &Prevouts::All(&prevouts), TapSighashType::Default)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            let signature = signer.sign_schnorr(&sighash.to_byte_array())?;
            input.final_script_witness = Some(Witness::p2tr_key_spend(&taproot::Signature {
                signature,
                sighash_type: TapSighashType::Default,
            }));
            continue;
        }

        let pk = signer.public_key()?;
        let cpk = CompressedPublicKey(pk);
        let p2wpkh = ScriptBuf::new_p2wpkh(&cpk.wpubkey_hash());

        if script.is_p2wpkh() {
            if *script != p2wpkh {
                return Err(key_mismatch(i));
            }
            let sighash = cache
                .p2wpkh_signature_hash(i, script, prevout.value, EcdsaSighashType::All)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            let signature = signer.sign(&sighash.to_byte_array())?;
            input.final_script_witness = Some(Witness::p2wpkh(&ecdsa_all(signature), &pk));
        } else if script.is_p2sh() {
            if *script != ScriptBuf::new_p2sh(&p2wpkh.script_hash()) {
                return Err(key_mismatch(i));
            }
            let sighash = cache
                .p2wpkh_signature_hash(i, &p2wpkh, prevout.value, EcdsaSighashType::All)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            let signature = signer.sign(&sighash.to_byte_array())?;
            let redeem = PushBytesBuf::try_from(p2wpkh.to_bytes())
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            input.final_script_sig = Some(Builder::new().push_slice(redeem).into_script());
            input.final_script_witness = Some(Witness::p2wpkh(&ecdsa_all(signature), &pk));
        } else if script.is_p2pkh() {
            if *script != ScriptBuf::new_p2pkh(&cpk.pubkey_hash()) {
                return Err(key_mismatch(i));
            }
            let sighash = cache
                .legacy_signature_hash(i, script, EcdsaSighashType::All.to_u32())
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            let signature = signer.sign(&sighash.to_byte_array())?;
            let sig_push = PushBytesBuf::try_from(ecdsa_all(signature).to_vec())
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            input.final_script_sig = Some(
                Builder::new()
                    .push_slice(sig_push)
                    .push_key(&bitcoin::PublicKey::new(pk))
                    .into_script(),
            );
        } else {
            return Err(WalletError::Signing(format!(
                "input {i}: unsupported script {script}"
            )));
        }
    }
    Ok(())
}

fn ecdsa_all(signature: secp256k1::ecdsa::Signature) -> ecdsa::Signature {
    ecdsa::Signature {
        signature,
        sighash_type: EcdsaSighashType::All,
    }
}

fn key_mismatch(input: usize) -> WalletError {
    WalletError::Signing(format!("input {input}: signer key does not match the spent output"))
}
