//! Coercion of counterparty-provided public keys into x-only form.
//!
//! Keys cross the wire either as 33-byte compressed SEC1 or as 32-byte x-only
//! encodings. Script construction only ever works with x-only keys, so every
//! key is pushed through [`to_x_only`] before it gets anywhere near a script.

use bitcoin::secp256k1::PublicKey;
use bitcoin::XOnlyPublicKey;
use std::fmt;
use thiserror::Error;

/// Which participant a key belongs to, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Sender,
    Receiver,
    Server,
    Counterparty,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Sender => write!(f, "sender"),
            KeyRole::Receiver => write!(f, "receiver"),
            KeyRole::Server => write!(f, "server"),
            KeyRole::Counterparty => write!(f, "counterparty"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum KeyError {
    #[error("invalid {role} key length: expected 32 or 33 bytes, got {length}")]
    InvalidKeyLength { role: KeyRole, length: usize },
    #[error("invalid {role} key encoding: {reason}")]
    InvalidKeyEncoding { role: KeyRole, reason: String },
}

/// Normalise a public key to its 32-byte x-only form.
///
/// A 33-byte compressed SEC1 key has its parity byte stripped; a 32-byte key
/// is taken as already x-only. Any other length is rejected.
pub fn to_x_only(role: KeyRole, bytes: &[u8]) -> Result<XOnlyPublicKey, KeyError> {
    match bytes.len() {
        32 => XOnlyPublicKey::from_slice(bytes).map_err(|e| KeyError::InvalidKeyEncoding {
            role,
            reason: e.to_string(),
        }),
        33 => {
            let pk = PublicKey::from_slice(bytes).map_err(|e| KeyError::InvalidKeyEncoding {
                role,
                reason: e.to_string(),
            })?;

            Ok(pk.x_only_public_key().0)
        }
        length => Err(KeyError::InvalidKeyLength { role, length }),
    }
}

/// Normalise a hex-encoded public key to x-only form.
pub fn to_x_only_from_hex(role: KeyRole, hex_key: &str) -> Result<XOnlyPublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|e| KeyError::InvalidKeyEncoding {
        role,
        reason: e.to_string(),
    })?;

    to_x_only(role, &bytes)
}
