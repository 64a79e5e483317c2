//! Conversions between `bitcoin` types and the MuSig2 library types.
//!
//! The MuSig2 implementation lives in a different release line of
//! `secp256k1`, so keys have to be re-parsed when crossing the boundary.

use bitcoin::secp256k1::PublicKey;
use bitcoin::XOnlyPublicKey;

/// Converts a Bitcoin public key to the MuSig2 library's public key type.
///
/// # Panics
///
/// Panics if the conversion is invalid, which cannot happen with a valid
/// Bitcoin public key.
pub fn to_musig_pk(pk: PublicKey) -> musig::PublicKey {
    musig::PublicKey::from_slice(&pk.serialize()).expect("valid conversion")
}

/// Converts a MuSig2 x-only public key to a Bitcoin x-only public key.
///
/// # Panics
///
/// Panics if the conversion is invalid, which cannot happen with a valid
/// x-only public key.
pub fn from_musig_xonly(pk: musig::XOnlyPublicKey) -> XOnlyPublicKey {
    XOnlyPublicKey::from_slice(&pk.serialize()).expect("valid conversion")
}
