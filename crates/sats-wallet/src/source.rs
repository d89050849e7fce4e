//! Wallet key sources and the public wallet description derived from them.
//!
//! A [`WalletSource`] names where key material comes from; [`WalletKeys::from_source`]
//! is the single entry point that turns any of them into usable keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use sats_core::address::{AddressType, ChainType, DerivedAddress, Network, derive_address_by_type};

use crate::error::WalletError;
use crate::keys::{
    KeyPair, NetworkKeys, Seed, derive_account_root_key_pair, derive_child_key_pair,
    derive_child_public_key, derive_electrum_seed, extended_pub_keys,
};
use crate::mnemonic::mnemonic_to_seed;

/// Where a wallet's keys come from.
///
/// Secret-bearing variants are zeroized on drop.
pub enum WalletSource {
    /// A stretched 64-byte seed.
    Seed(Seed),
    /// A BIP-39 phrase with optional passphrase.
    Mnemonic { phrase: String, passphrase: String },
    /// An Electrum phrase with optional password.
    ElectrumMnemonic { phrase: String, password: String },
    /// A base58 account xprv for a single address type.
    AccountXprv {
        xprv: String,
        address_type: AddressType,
        network: Network,
    },
    /// Watch-only account xpubs.
    ExtendedPublicKeys(NetworkKeys),
    /// One explicit key pair for one address.
    KeyPair {
        key_pair: KeyPair,
        address: DerivedAddress,
    },
}

impl Drop for WalletSource {
    fn drop(&mut self) {
        match self {
            WalletSource::Mnemonic { phrase, passphrase } => {
                phrase.zeroize();
                passphrase.zeroize();
            }
            WalletSource::ElectrumMnemonic { phrase, password } => {
                phrase.zeroize();
                password.zeroize();
            }
            WalletSource::AccountXprv { xprv, .. } => xprv.zeroize(),
            // Seed and KeyPair zeroize themselves.
            WalletSource::Seed(_) | WalletSource::KeyPair { .. } => {}
            WalletSource::ExtendedPublicKeys(_) => {}
        }
    }
}

impl fmt::Debug for WalletSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            WalletSource::Seed(_) => "Seed",
            WalletSource::Mnemonic { .. } => "Mnemonic",
            WalletSource::ElectrumMnemonic { .. } => "ElectrumMnemonic",
            WalletSource::AccountXprv { .. } => "AccountXprv",
            WalletSource::ExtendedPublicKeys(_) => "ExtendedPublicKeys",
            WalletSource::KeyPair { .. } => "KeyPair",
        };
        f.debug_tuple("WalletSource").field(&kind).finish()
    }
}

/// Public description of a wallet account: enough to sync, not to spend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub wallet_name: String,
    pub account_index: u32,
    pub extended_account_public_keys: NetworkKeys,
}

impl WalletInfo {
    /// Account xpub for an address type on a network; empty if unknown.
    pub fn xpub(&self, address_type: AddressType, network: Network) -> &str {
        self.extended_account_public_keys
            .for_network(network)
            .get(address_type)
    }

    /// Derive an address from the stored account xpubs.
    pub fn derive_address(
        &self,
        address_type: AddressType,
        network: Network,
        chain: ChainType,
        index: u32,
    ) -> Result<DerivedAddress, WalletError> {
        let xpub = self.xpub(address_type, network);
        if xpub.is_empty() {
            return Err(WalletError::KeyDerivation(format!(
                "no {address_type} account key for {network}"
            )));
        }
        let public_key = derive_child_public_key(xpub, chain, index)?;
        let address = derive_address_by_type(&public_key, address_type, network)?;
        Ok(DerivedAddress {
            address,
            address_type,
            network,
            account: self.account_index,
            chain,
            index,
            public_key_hex: hex::encode(public_key),
        })
    }
}

enum KeyMaterial {
    Seed(Seed),
    AccountXprv {
        xprv: Zeroizing<String>,
        address_type: AddressType,
        network: Network,
    },
    WatchOnly(NetworkKeys),
    Single {
        key_pair: KeyPair,
        address: DerivedAddress,
    },
}

/// Key material resolved from a [`WalletSource`] for one account.
pub struct WalletKeys {
    account: u32,
    material: KeyMaterial,
}

impl fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeys")
            .field("account", &self.account)
            .field("watch_only", &self.is_watch_only())
            .finish()
    }
}

impl WalletKeys {
    /// Resolve a source into keys for `account`.
    ///
    /// Mnemonics are validated before stretching; BIP-39 phrases must pass
    /// the word list and checksum, Electrum phrases are only trimmed.
    pub fn from_source(source: WalletSource, account: u32) -> Result<Self, WalletError> {
        let material = match &source {
            WalletSource::Seed(seed) => KeyMaterial::Seed(seed.clone()),
            WalletSource::Mnemonic { phrase, passphrase } => {
                KeyMaterial::Seed(mnemonic_to_seed(phrase, passphrase)?)
            }
            WalletSource::ElectrumMnemonic { phrase, password } => {
                let phrase = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));
                if phrase.is_empty() {
                    return Err(WalletError::InvalidMnemonic("empty phrase".into()));
                }
                KeyMaterial::Seed(derive_electrum_seed(&phrase, password))
            }
            WalletSource::AccountXprv {
                xprv,
                address_type,
                network,
            } => {
                // Fails early on a malformed or public-only key.
                account_xpub_from_xprv(xprv)?;
                KeyMaterial::AccountXprv {
                    xprv: Zeroizing::new(xprv.clone()),
                    address_type: *address_type,
                    network: *network,
                }
            }
            WalletSource::ExtendedPublicKeys(keys) => KeyMaterial::WatchOnly(keys.clone()),
            WalletSource::KeyPair { key_pair, address } => KeyMaterial::Single {
                key_pair: key_pair.clone(),
                address: address.clone(),
            },
        };
        Ok(Self { account, material })
    }

    pub fn account(&self) -> u32 {
        self.account
    }

    /// True if no private key material is held.
    pub fn is_watch_only(&self) -> bool {
        match &self.material {
            KeyMaterial::WatchOnly(_) => true,
            KeyMaterial::Single { key_pair, .. } => key_pair.private_key().is_none(),
            _ => false,
        }
    }

    /// Account xpubs for every type and network this material can produce.
    ///
    /// Slots the material cannot fill are left empty.
    pub fn extended_public_keys(&self) -> Result<NetworkKeys, WalletError> {
        match &self.material {
            KeyMaterial::Seed(seed) => extended_pub_keys(seed, self.account),
            KeyMaterial::AccountXprv {
                xprv,
                address_type,
                network,
            } => {
                let mut keys = NetworkKeys::default();
                let xpub = account_xpub_from_xprv(xprv)?;
                keys.for_network_mut(*network).set(*address_type, xpub);
                Ok(keys)
            }
            KeyMaterial::WatchOnly(keys) => Ok(keys.clone()),
            KeyMaterial::Single { .. } => Err(WalletError::KeyDerivation(
                "a single key pair has no account key".into(),
            )),
        }
    }

    /// Build the public wallet description.
    pub fn wallet_info(&self, wallet_name: &str) -> Result<WalletInfo, WalletError> {
        Ok(WalletInfo {
            wallet_name: wallet_name.to_string(),
            account_index: self.account,
            extended_account_public_keys: self.extended_public_keys()?,
        })
    }

    /// The signing key pair for a derived address.
    ///
    /// The derived public key must match the address's recorded key.
    pub fn key_pair_for(&self, address: &DerivedAddress) -> Result<KeyPair, WalletError> {
        let pair = match &self.material {
            KeyMaterial::Seed(seed) => {
                let account = derive_account_root_key_pair(
                    seed,
                    address.address_type,
                    address.network,
                    address.account,
                )?;
                derive_child_key_pair(&account.xprv, address.chain, address.index)?.pair
            }
            KeyMaterial::AccountXprv {
                xprv,
                address_type,
                network,
            } => {
                if *address_type != address.address_type || *network != address.network {
                    return Err(WalletError::UnknownSigningAddress(address.address.clone()));
                }
                derive_child_key_pair(xprv, address.chain, address.index)?.pair
            }
            KeyMaterial::WatchOnly(_) => {
                return Err(WalletError::KeyDerivation("wallet is watch-only".into()));
            }
            KeyMaterial::Single {
                key_pair,
                address: own,
            } => {
                if own.address != address.address {
                    return Err(WalletError::UnknownSigningAddress(address.address.clone()));
                }
                key_pair.clone()
            }
        };

        if pair.public_key_hex() != address.public_key_hex {
            return Err(WalletError::UnknownSigningAddress(address.address.clone()));
        }
        Ok(pair)
    }
}

fn account_xpub_from_xprv(xprv: &str) -> Result<String, WalletError> {
    use bitcoin::bip32::{Xpriv, Xpub};
    use bitcoin::secp256k1::Secp256k1;
    use sats_core::error::DerivationError;
    use std::str::FromStr;

    let xprv = Xpriv::from_str(xprv).map_err(|e| DerivationError::InvalidExtendedKey(e.to_string()))?;
    Ok(Xpub::from_priv(&Secp256k1::new(), &xprv).to_string())
}
