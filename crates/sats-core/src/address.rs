//! Bitcoin address derivation, encoding and validation.
//!
//! Five address types are supported, each tied to one derivation purpose
//! and one encoding rule:
//!
//! | type                   | purpose | encoding                      |
//! |------------------------|---------|-------------------------------|
//! | `Legacy`               | 44      | P2PKH (`1...`, `m.../n...`)   |
//! | `SegWit`               | 49      | P2SH-P2WPKH (`3...`, `2...`)  |
//! | `NativeSegWit`         | 84      | P2WPKH (`bc1q...`, `tb1q...`) |
//! | `Taproot`              | 86      | P2TR, tweaked key (`bc1p...`) |
//! | `ElectrumNativeSegWit` | 0       | P2WPKH                        |
//!
//! Validation never coerces an address into another network: a well-formed
//! address for the other network is reported as
//! [`AddressValidationResult::InvalidNetwork`].

use bitcoin::bech32::segwit;
use bitcoin::key::{CompressedPublicKey, TweakedPublicKey, XOnlyPublicKey};
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::script::Builder;
use bitcoin::{Address, ScriptBuf, base58};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;
use crate::taproot::tweak_taproot_pubkey;

/// Bitcoin network the wallet operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet (`bc` HRP).
    Mainnet,
    /// Bitcoin testnet (`tb` HRP).
    #[default]
    Testnet,
}

impl Network {
    /// BIP-44 coin type: 0 for mainnet, 1 for testnet.
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
        }
    }

    /// Human-readable prefix for segwit addresses.
    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet => "tb",
        }
    }

    /// Base58 version byte for P2PKH addresses.
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    /// Base58 version byte for P2SH addresses.
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    /// The `bitcoin` crate's network value.
    pub fn to_bitcoin(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl From<Network> for bitcoin::Network {
    fn from(network: Network) -> Self {
        network.to_bitcoin()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(AddressError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Address scheme, which fixes both derivation purpose and encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    Legacy,
    SegWit,
    NativeSegWit,
    Taproot,
    /// Electrum's native segwit, derived under `m/0'` instead of BIP-84.
    ElectrumNativeSegWit,
}

impl AddressType {
    /// Every supported address type.
    pub const ALL: [AddressType; 5] = [
        AddressType::Legacy,
        AddressType::SegWit,
        AddressType::NativeSegWit,
        AddressType::Taproot,
        AddressType::ElectrumNativeSegWit,
    ];

    /// Hardened purpose segment of the account path.
    pub fn purpose(&self) -> u32 {
        match self {
            AddressType::Legacy => 44,
            AddressType::SegWit => 49,
            AddressType::NativeSegWit => 84,
            AddressType::Taproot => 86,
            AddressType::ElectrumNativeSegWit => 0,
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressType::Legacy => "Legacy",
            AddressType::SegWit => "SegWit",
            AddressType::NativeSegWit => "NativeSegWit",
            AddressType::Taproot => "Taproot",
            AddressType::ElectrumNativeSegWit => "ElectrumNativeSegWit",
        };
        f.write_str(name)
    }
}

impl FromStr for AddressType {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddressType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| AddressError::UnsupportedAddressType(s.to_string()))
    }
}

/// Receiving (external) or change (internal) branch of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    External,
    Internal,
}

impl ChainType {
    /// Non-hardened path segment: 0 external, 1 internal.
    pub fn index(&self) -> u32 {
        match self {
            ChainType::External => 0,
            ChainType::Internal => 1,
        }
    }
}

/// An address together with the derivation coordinates that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddress {
    pub address: String,
    pub address_type: AddressType,
    pub network: Network,
    pub account: u32,
    pub chain: ChainType,
    pub index: u32,
    /// Compressed (33-byte) public key, hex encoded.
    pub public_key_hex: String,
}

/// Outcome of [`validate_address`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressValidationResult {
    Valid,
    InvalidNetwork,
    InvalidAddress,
}

/// Encode a compressed public key as an address of the given type.
///
/// Taproot addresses commit to the BIP-341 tweaked output key, not the
/// internal key.
pub fn derive_address_by_type(
    public_key: &[u8],
    address_type: AddressType,
    network: Network,
) -> Result<String, AddressError> {
    if public_key.len() != 33 {
        return Err(AddressError::InvalidKeyLength {
            expected: 33,
            got: public_key.len(),
        });
    }
    let key = CompressedPublicKey::from_slice(public_key)
        .map_err(|e| AddressError::InvalidPublicKey(e.to_string()))?;
    let net = network.to_bitcoin();

    let address = match address_type {
        AddressType::Legacy => Address::p2pkh(key.pubkey_hash(), net),
        AddressType::SegWit => Address::p2shwpkh(&key, net),
        AddressType::NativeSegWit | AddressType::ElectrumNativeSegWit => {
            Address::p2wpkh(&key, net)
        }
        AddressType::Taproot => {
            let (internal, _parity) = key.0.x_only_public_key();
            let output = tweak_taproot_pubkey(&internal.serialize())?;
            let output = XOnlyPublicKey::from_slice(&output)
                .map_err(|e| AddressError::TweakFailed(e.to_string()))?;
            Address::p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(output), net)
        }
    };
    Ok(address.to_string())
}

/// Classify an address against the expected network.
///
/// Base58Check payloads are checked by version byte; segwit addresses by
/// HRP and witness program shape (v0 with 20 or 32 bytes, v1 with 32).
pub fn validate_address(address: &str, network: Network) -> AddressValidationResult {
    if let Ok(payload) = base58::decode_check(address) {
        if payload.len() == 21 {
            let version = payload[0];
            return if version == network.p2pkh_version() || version == network.p2sh_version() {
                AddressValidationResult::Valid
            } else {
                AddressValidationResult::InvalidNetwork
            };
        }
    }

    let Ok((hrp, version, program)) = segwit::decode(address) else {
        return AddressValidationResult::InvalidAddress;
    };
    if !hrp.as_str().eq_ignore_ascii_case(network.bech32_hrp()) {
        return AddressValidationResult::InvalidNetwork;
    }
    match (version.to_u8(), program.len()) {
        (0, 20) | (0, 32) | (1, 32) => AddressValidationResult::Valid,
        _ => AddressValidationResult::InvalidAddress,
    }
}

/// True for mainnet or testnet Taproot addresses.
pub fn is_p2tr_address(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    lower.starts_with("bc1p") || lower.starts_with("tb1p")
}

/// Output script paying to `address`, which must be valid for `network`.
///
/// Taproot destinations are compiled straight from the 32-byte witness
/// program as `OP_1 <output key>`.
pub fn script_pubkey_for(address: &str, network: Network) -> Result<ScriptBuf, AddressError> {
    match validate_address(address, network) {
        AddressValidationResult::Valid => {}
        AddressValidationResult::InvalidNetwork => {
            return Err(AddressError::WrongNetwork {
                address: address.to_string(),
                network: network.to_string(),
            });
        }
        AddressValidationResult::InvalidAddress => {
            return Err(AddressError::InvalidAddress(address.to_string()));
        }
    }

    if is_p2tr_address(address) {
        let (_, _, program) = segwit::decode(address)
            .map_err(|e| AddressError::InvalidAddress(e.to_string()))?;
        let output_key: [u8; 32] = program.as_slice().try_into().map_err(|_| {
            AddressError::InvalidKeyLength {
                expected: 32,
                got: program.len(),
            }
        })?;
        return Ok(Builder::new()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(output_key)
            .into_script());
    }

    let parsed = Address::from_str(address)
        .map_err(|e| AddressError::InvalidAddress(e.to_string()))?
        .require_network(network.to_bitcoin())
        .map_err(|_| AddressError::WrongNetwork {
            address: address.to_string(),
            network: network.to_string(),
        })?;
    Ok(parsed.script_pubkey())
}

/// Address form of an output script, if it has one.
pub fn address_from_script(script: &bitcoin::Script, network: Network) -> Option<String> {
    Address::from_script(script, network.to_bitcoin())
        .ok()
        .map(|a| a.to_string())
}
