//! The wallet collaborator contract.

use crate::error::Error;
use arkswap_core::ArkAddress;
use async_trait::async_trait;
use bitcoin::key::Keypair;
use bitcoin::secp256k1;
use bitcoin::secp256k1::schnorr;
use bitcoin::Amount;
use bitcoin::Psbt;
use bitcoin::Txid;
use bitcoin::XOnlyPublicKey;
use std::sync::Arc;

/// The key-holding wallet the swap engine signs and funds with.
///
/// Signing must be reentrant or internally serialised: several swaps can
/// request signatures concurrently.
#[async_trait]
pub trait SwapWallet: Send + Sync {
    /// The wallet's own Ark receiving address.
    fn address(&self) -> Result<ArkAddress, Error>;

    /// The wallet identity as a 33-byte compressed key.
    fn compressed_public_key(&self) -> Result<secp256k1::PublicKey, Error>;

    /// The wallet identity as a 32-byte x-only key.
    fn x_only_public_key(&self) -> Result<XOnlyPublicKey, Error> {
        Ok(self.compressed_public_key()?.x_only_public_key().0)
    }

    /// Sign `msg` with the wallet identity key.
    fn sign_schnorr(&self, msg: &secp256k1::Message) -> Result<schnorr::Signature, Error>;

    /// Sign the given PSBT inputs, or all of them when `input_indexes` is
    /// `None`.
    async fn sign(&self, psbt: &mut Psbt, input_indexes: Option<&[usize]>) -> Result<(), Error>;

    /// Send `amount` to an Ark address; used to fund VHTLC lockups.
    async fn send_bitcoin(&self, address: &ArkAddress, amount: Amount) -> Result<Txid, Error>;

    /// The MuSig-style signer session used as a cosigner in Ark batch
    /// ceremonies.
    fn signer_session(&self) -> SignerSessionSource;
}

/// Where batch cosigner sessions come from.
///
/// Wallets hand over either a session value or a zero-arg factory; both are
/// wrapped here so that call sites always get a session per use and nothing
/// is cached across swap boundaries.
#[derive(Clone)]
pub enum SignerSessionSource {
    Value(Keypair),
    Factory(Arc<dyn Fn() -> Keypair + Send + Sync>),
}

impl SignerSessionSource {
    /// Yield a session for a single ceremony.
    pub fn session(&self) -> Keypair {
        match self {
            SignerSessionSource::Value(kp) => *kp,
            SignerSessionSource::Factory(f) => f(),
        }
    }
}

impl std::fmt::Debug for SignerSessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerSessionSource::Value(_) => f.write_str("SignerSessionSource::Value"),
            SignerSessionSource::Factory(_) => f.write_str("SignerSessionSource::Factory"),
        }
    }
}
