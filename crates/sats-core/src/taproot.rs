//! BIP-341 key tweaking for Taproot key-path outputs.
//!
//! The output key is `Q = P + t·G` with `t = H_TapTweak(P)`; no script tree
//! is committed. The matching private key is `d + t mod n`, where `d` is
//! negated first if `d·G` has an odd Y coordinate.

use bitcoin::key::{Keypair, TapTweak, XOnlyPublicKey};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::TapTweakHash;

use crate::error::AddressError;

/// Tweak a 32-byte x-only internal key into its output key.
pub fn tweak_taproot_pubkey(internal_key: &[u8]) -> Result<[u8; 32], AddressError> {
    if internal_key.len() != 32 {
        return Err(AddressError::InvalidKeyLength {
            expected: 32,
            got: internal_key.len(),
        });
    }
    let internal = XOnlyPublicKey::from_slice(internal_key)
        .map_err(|e| AddressError::InvalidPublicKey(e.to_string()))?;
    let tweak = TapTweakHash::from_key_and_tweak(internal, None).to_scalar();
    let secp = Secp256k1::verification_only();
    let (output, _parity) = internal
        .add_tweak(&secp, &tweak)
        .map_err(|e| AddressError::TweakFailed(e.to_string()))?;
    Ok(output.serialize())
}

/// Tweak a 32-byte private key so it signs for the tweaked output key.
pub fn tweak_taproot_private_key(secret: &[u8]) -> Result<[u8; 32], AddressError> {
    if secret.len() != 32 {
        return Err(AddressError::InvalidKeyLength {
            expected: 32,
            got: secret.len(),
        });
    }
    let secp = Secp256k1::new();
    let keypair =
        Keypair::from_seckey_slice(&secp, secret).map_err(|_| AddressError::InvalidPrivateKey)?;
    let tweaked = keypair.tap_tweak(&secp, None).to_inner();
    Ok(tweaked.secret_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // BIP-86 vector: m/86'/0'/0'/0/0 of "abandon ... about".
    const INTERNAL: &str = "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115";
    const OUTPUT: &str = "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c";

    #[test]
    fn bip86_vector() {
        let internal = hex::decode(INTERNAL).unwrap();
        let output = tweak_taproot_pubkey(&internal).unwrap();
        assert_eq!(hex::encode(output), OUTPUT);
    }

    #[test]
    fn wrong_lengths_rejected() {
        for len in [0usize, 31, 33, 65] {
            let key = vec![1u8; len];
            assert_eq!(
                tweak_taproot_pubkey(&key),
                Err(AddressError::InvalidKeyLength { expected: 32, got: len })
            );
            assert_eq!(
                tweak_taproot_private_key(&key),
                Err(AddressError::InvalidKeyLength { expected: 32, got: len })
            );
        }
    }

    #[test]
    fn zero_secret_rejected() {
        assert_eq!(
            tweak_taproot_private_key(&[0u8; 32]),
            Err(AddressError::InvalidPrivateKey)
        );
    }

    #[test]
    fn private_tweak_matches_public_tweak() {
        let secp = Secp256k1::new();
        let secret = [0x11u8; 32];
        let keypair = Keypair::from_seckey_slice(&secp, &secret).unwrap();
        let (internal, _) = keypair.x_only_public_key();

        let expected = tweak_taproot_pubkey(&internal.serialize()).unwrap();
        let tweaked_secret = tweak_taproot_private_key(&secret).unwrap();
        let tweaked = Keypair::from_seckey_slice(&secp, &tweaked_secret).unwrap();
        assert_eq!(tweaked.x_only_public_key().0.serialize(), expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn output_is_32_bytes_for_valid_keys(seed in 1u8..=255u8, salt in any::<[u8; 31]>()) {
            let secp = Secp256k1::new();
            let mut secret = [seed; 32];
            secret[1..].copy_from_slice(&salt);
            if let Ok(kp) = Keypair::from_seckey_slice(&secp, &secret) {
                let (internal, _) = kp.x_only_public_key();
                let out = tweak_taproot_pubkey(&internal.serialize()).unwrap();
                prop_assert_eq!(out.len(), 32);
                prop_assert!(XOnlyPublicKey::from_slice(&out).is_ok());
            }
        }
    }
}
