//! Seed stretching and BIP-32 key derivation.
//!
//! Account keys live at `m/purpose'/coin_type'/account'` with the purpose
//! taken from the [`AddressType`]; child keys at the non-hardened
//! `chain/index` below an account, so receive and change public keys can be
//! derived from an account xpub alone.

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{Secp256k1, Signing, Verification};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use sats_core::address::{AddressType, ChainType, Network};
use sats_core::constants::{BIP39_SALT_PREFIX, ELECTRUM_SALT_PREFIX, PBKDF2_ROUNDS, SEED_LEN};
use sats_core::error::DerivationError;

use crate::error::WalletError;

/// A 64-byte master seed stretched from a mnemonic.
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Standard BIP-39 seed: PBKDF2-HMAC-SHA512, salt `"mnemonic" + passphrase`.
pub fn derive_bip39_seed(mnemonic: &str, passphrase: &str) -> Seed {
    stretch(mnemonic, BIP39_SALT_PREFIX, passphrase)
}

/// Electrum seed: same KDF, salt `"electrum" + password`.
pub fn derive_electrum_seed(mnemonic: &str, password: &str) -> Seed {
    stretch(mnemonic, ELECTRUM_SALT_PREFIX, password)
}

fn stretch(phrase: &str, salt_prefix: &str, extra: &str) -> Seed {
    let salt = Zeroizing::new(format!("{salt_prefix}{extra}"));
    let mut bytes = [0u8; SEED_LEN];
    pbkdf2_hmac::<Sha512>(phrase.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut bytes);
    let seed = Seed::from_bytes(bytes);
    bytes.zeroize();
    seed
}

/// A public key with its private key.
///
/// The public key is 33 bytes compressed; the private key is 32 bytes, or
/// empty once zeroized or when only public material is known.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    pub fn new(public_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// A key pair with no private half.
    pub fn public_only(public_key: Vec<u8>) -> Self {
        Self::new(public_key, Vec::new())
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The private key, or `None` if absent or already zeroized.
    pub fn private_key(&self) -> Option<&[u8]> {
        if self.private_key.is_empty() {
            None
        } else {
            Some(&self.private_key)
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Account-level extended keys and the path they were derived at.
pub struct AccountKeyPair {
    /// Base58 extended private key.
    pub xprv: Zeroizing<String>,
    /// Base58 extended public key.
    pub xpub: String,
    /// e.g. `m/84'/1'/0'`.
    pub path: String,
}

impl fmt::Debug for AccountKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKeyPair")
            .field("xprv", &"[REDACTED]")
            .field("xpub", &self.xpub)
            .field("path", &self.path)
            .finish()
    }
}

/// A derived child key pair and its path relative to the account.
#[derive(Debug, Clone)]
pub struct ChildKeyPair {
    pub pair: KeyPair,
    /// e.g. `m/0/5`.
    pub path: String,
}

/// Account-level path for an address type.
pub fn account_path(address_type: AddressType, network: Network, account: u32) -> String {
    format!(
        "m/{}'/{}'/{}'",
        address_type.purpose(),
        network.coin_type(),
        account
    )
}

fn hardened(index: u32, path: &str) -> Result<ChildNumber, DerivationError> {
    ChildNumber::from_hardened_idx(index).map_err(|e| DerivationError::Failed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn normal(index: u32, path: &str) -> Result<ChildNumber, DerivationError> {
    ChildNumber::from_normal_idx(index).map_err(|e| DerivationError::Failed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn child_path(chain: ChainType, index: u32) -> Result<(DerivationPath, String), DerivationError> {
    let display = format!("m/{}/{}", chain.index(), index);
    let path = DerivationPath::from(vec![normal(chain.index(), &display)?, normal(index, &display)?]);
    Ok((path, display))
}

/// Derive the account key pair at `m/purpose'/coin_type'/account'`.
pub fn derive_account_root_key_pair(
    seed: &Seed,
    address_type: AddressType,
    network: Network,
    account: u32,
) -> Result<AccountKeyPair, WalletError> {
    let secp = Secp256k1::new();
    let display = account_path(address_type, network, account);
    let master = Xpriv::new_master(network.to_bitcoin(), seed.as_bytes()).map_err(|e| {
        DerivationError::Failed {
            path: "m".into(),
            reason: e.to_string(),
        }
    })?;
    let path = DerivationPath::from(vec![
        hardened(address_type.purpose(), &display)?,
        hardened(network.coin_type(), &display)?,
        hardened(account, &display)?,
    ]);
    let node = master
        .derive_priv(&secp, &path)
        .map_err(|e| DerivationError::Failed {
            path: display.clone(),
            reason: e.to_string(),
        })?;
    let xpub = Xpub::from_priv(&secp, &node);

    Ok(AccountKeyPair {
        xprv: Zeroizing::new(node.to_string()),
        xpub: xpub.to_string(),
        path: display,
    })
}

/// Derive the child key pair at `chain/index` below an account xprv.
pub fn derive_child_key_pair(
    account_xprv: &str,
    chain: ChainType,
    index: u32,
) -> Result<ChildKeyPair, WalletError> {
    let secp = Secp256k1::new();
    let account = Xpriv::from_str(account_xprv)
        .map_err(|e| DerivationError::InvalidExtendedKey(e.to_string()))?;
    let (path, display) = child_path(chain, index)?;
    let child = account
        .derive_priv(&secp, &path)
        .map_err(|e| DerivationError::Failed {
            path: display.clone(),
            reason: e.to_string(),
        })?;

    let public_key = Xpub::from_priv(&secp, &child).public_key.serialize().to_vec();
    let private_key = child.private_key.secret_bytes().to_vec();

    Ok(ChildKeyPair {
        pair: KeyPair::new(public_key, private_key),
        path: display,
    })
}

/// Derive the 33-byte public key at `chain/index` below an account key.
///
/// Accepts an xpub, or an xprv whose public half is used.
pub fn derive_child_public_key(
    account_key: &str,
    chain: ChainType,
    index: u32,
) -> Result<Vec<u8>, WalletError> {
    let secp = Secp256k1::new();
    let account = parse_account_xpub(&secp, account_key)?;
    let (path, display) = child_path(chain, index)?;
    let child = derive_pub(&secp, &account, &path, &display)?;
    Ok(child.public_key.serialize().to_vec())
}

fn derive_pub<C: Verification>(
    secp: &Secp256k1<C>,
    account: &Xpub,
    path: &DerivationPath,
    display: &str,
) -> Result<Xpub, DerivationError> {
    account.derive_pub(secp, path).map_err(|e| DerivationError::Failed {
        path: display.to_string(),
        reason: e.to_string(),
    })
}

fn parse_account_xpub<C: Signing>(secp: &Secp256k1<C>, key: &str) -> Result<Xpub, DerivationError> {
    if let Ok(xpub) = Xpub::from_str(key) {
        return Ok(xpub);
    }
    let xprv = Xpriv::from_str(key).map_err(|e| DerivationError::InvalidExtendedKey(e.to_string()))?;
    Ok(Xpub::from_priv(secp, &xprv))
}

/// Account xpubs for every address type on one network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAccountPublicKeys {
    pub legacy: String,
    pub seg_wit: String,
    pub native_seg_wit: String,
    pub taproot: String,
    pub electrum_native_seg_wit: String,
}

impl ExtendedAccountPublicKeys {
    /// The xpub for `address_type`; empty if unknown.
    pub fn get(&self, address_type: AddressType) -> &str {
        match address_type {
            AddressType::Legacy => &self.legacy,
            AddressType::SegWit => &self.seg_wit,
            AddressType::NativeSegWit => &self.native_seg_wit,
            AddressType::Taproot => &self.taproot,
            AddressType::ElectrumNativeSegWit => &self.electrum_native_seg_wit,
        }
    }

    pub fn set(&mut self, address_type: AddressType, xpub: String) {
        let slot = match address_type {
            AddressType::Legacy => &mut self.legacy,
            AddressType::SegWit => &mut self.seg_wit,
            AddressType::NativeSegWit => &mut self.native_seg_wit,
            AddressType::Taproot => &mut self.taproot,
            AddressType::ElectrumNativeSegWit => &mut self.electrum_native_seg_wit,
        };
        *slot = xpub;
    }
}

/// Account xpubs for both networks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NetworkKeys {
    pub mainnet: ExtendedAccountPublicKeys,
    pub testnet: ExtendedAccountPublicKeys,
}

impl NetworkKeys {
    pub fn for_network(&self, network: Network) -> &ExtendedAccountPublicKeys {
        match network {
            Network::Mainnet => &self.mainnet,
            Network::Testnet => &self.testnet,
        }
    }

    pub fn for_network_mut(&mut self, network: Network) -> &mut ExtendedAccountPublicKeys {
        match network {
            Network::Mainnet => &mut self.mainnet,
            Network::Testnet => &mut self.testnet,
        }
    }
}

/// Derive account xpubs for every address type on both networks.
pub fn extended_pub_keys(seed: &Seed, account: u32) -> Result<NetworkKeys, WalletError> {
    let mut keys = NetworkKeys::default();
    for network in [Network::Mainnet, Network::Testnet] {
        for address_type in AddressType::ALL {
            let pair = derive_account_root_key_pair(seed, address_type, network, account)?;
            keys.for_network_mut(network).set(address_type, pair.xpub.clone());
        }
    }
    Ok(keys)
}
