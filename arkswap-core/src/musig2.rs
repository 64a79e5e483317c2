//! Two-party MuSig2 ceremonies for the BTC side of chain swaps.
//!
//! The BTC lockup output of a chain swap is a Taproot key-spend path over the
//! aggregate of the two parties' keys, tweaked by the merkle root of the swap
//! tree. Both the swap-output detection and the cooperative claim run through
//! the helpers in this module.

use crate::conversions::from_musig_xonly;
use crate::conversions::to_musig_pk;
use crate::Error;
use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TapNodeHash;
use bitcoin::ScriptBuf;
use bitcoin::TapTweakHash;
use bitcoin::XOnlyPublicKey;
use musig::musig::AggregatedNonce;
use musig::musig::KeyAggCache;
use musig::musig::PartialSignature;
use musig::musig::PublicNonce;
use musig::musig::SecretNonce;
use musig::musig::Session;
use musig::musig::SessionSecretRand;

/// The aggregate key for a swap, tweaked for a Taproot key-path spend.
pub struct SwapKeyAgg {
    key_agg_cache: KeyAggCache,
    output_key: XOnlyPublicKey,
}

impl SwapKeyAgg {
    /// Aggregate `keys` (order matters and must match the counterparty) and
    /// apply the Taproot tweak for `merkle_root`.
    pub fn new(keys: &[PublicKey], merkle_root: Option<TapNodeHash>) -> Result<Self, Error> {
        let musig_pks = keys.iter().map(|pk| to_musig_pk(*pk)).collect::<Vec<_>>();
        let mut key_agg_cache = KeyAggCache::new(&musig_pks.iter().collect::<Vec<_>>());

        let agg_pk = from_musig_xonly(key_agg_cache.agg_pk());

        let tweak_hash = TapTweakHash::from_key_and_tweak(agg_pk, merkle_root);
        let tweak = ::musig::Scalar::from(
            ::musig::SecretKey::from_byte_array(*tweak_hash.as_byte_array())
                .map_err(|e| Error::crypto(format!("invalid taproot tweak: {e}")))?,
        );

        let tweaked = key_agg_cache
            .pubkey_xonly_tweak_add(&tweak)
            .map_err(Error::crypto)?;

        let output_key = from_musig_xonly(tweaked.x_only_public_key().0);

        Ok(Self {
            key_agg_cache,
            output_key,
        })
    }

    /// The tweaked aggregate key, i.e. the x-only key in the Taproot output.
    pub fn output_key(&self) -> XOnlyPublicKey {
        self.output_key
    }

    /// The script pubkey of the swap's lockup output.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(bitcoin::key::TweakedPublicKey::dangerous_assume_tweaked(
            self.output_key,
        ))
    }

    /// Generate a fresh nonce pair bound to `msg` for `own_pk`.
    pub fn generate_nonce_pair(
        &self,
        own_pk: PublicKey,
        msg: &[u8; 32],
    ) -> (SecretNonce, PublicNonce) {
        let session_id = SessionSecretRand::assume_unique_per_nonce_gen(rand::random());
        let extra_rand: [u8; 32] = rand::random();

        self.key_agg_cache
            .nonce_gen(session_id, to_musig_pk(own_pk), msg, Some(extra_rand))
    }

    /// Produce our partial signature over `msg`.
    pub fn partial_sign(
        &self,
        msg: &[u8; 32],
        agg_nonce: AggregatedNonce,
        secret_nonce: SecretNonce,
        keypair: &Keypair,
    ) -> Result<PartialSignature, Error> {
        let keypair = ::musig::Keypair::from_seckey_slice(&keypair.secret_bytes())
            .map_err(|e| Error::crypto(format!("invalid keypair: {e}")))?;

        let session = Session::new(&self.key_agg_cache, agg_nonce, msg);

        Ok(session.partial_sign(secret_nonce, &keypair, &self.key_agg_cache))
    }

    /// Verify the counterparty's partial signature over `msg`.
    pub fn verify_partial(
        &self,
        msg: &[u8; 32],
        agg_nonce: AggregatedNonce,
        partial_sig: &PartialSignature,
        their_nonce: &PublicNonce,
        their_pk: PublicKey,
    ) -> bool {
        let session = Session::new(&self.key_agg_cache, agg_nonce, msg);

        session.partial_verify(
            &self.key_agg_cache,
            partial_sig,
            their_nonce,
            to_musig_pk(their_pk),
        )
    }

    /// Aggregate the partial signatures into the final Schnorr signature and
    /// verify it against the tweaked output key.
    pub fn aggregate_signatures(
        &self,
        msg: &[u8; 32],
        agg_nonce: AggregatedNonce,
        partial_sigs: &[&PartialSignature],
    ) -> Result<bitcoin::secp256k1::schnorr::Signature, Error> {
        let session = Session::new(&self.key_agg_cache, agg_nonce, msg);

        let sig = session.partial_sig_agg(partial_sigs).assume_valid();

        let sig = bitcoin::secp256k1::schnorr::Signature::from_slice(sig.as_ref())
            .map_err(|e| Error::crypto(format!("invalid aggregated signature: {e}")))?;

        // "assume_valid" holds nothing: check the aggregate against the
        // tweaked output key before it goes anywhere near a witness.
        let secp = bitcoin::key::Secp256k1::verification_only();
        let msg = bitcoin::secp256k1::Message::from_digest(*msg);
        secp.verify_schnorr(&sig, &msg, &self.output_key)
            .map_err(|e| Error::crypto(format!("aggregated signature does not verify: {e}")))?;

        Ok(sig)
    }
}

/// Compute the aggregate public nonce over both parties' nonces.
pub fn aggregate_nonces(nonces: &[&PublicNonce]) -> AggregatedNonce {
    AggregatedNonce::new(nonces)
}

pub fn parse_public_nonce(hex_nonce: &str) -> Result<PublicNonce, Error> {
    let bytes = hex::decode(hex_nonce)
        .map_err(|e| Error::crypto(format!("invalid public nonce hex: {e}")))?;

    let bytes: [u8; 66] = bytes
        .try_into()
        .map_err(|_| Error::crypto("public nonce must be 66 bytes"))?;

    PublicNonce::from_byte_array(&bytes)
        .map_err(|e| Error::crypto(format!("invalid public nonce: {e}")))
}

pub fn parse_partial_signature(hex_sig: &str) -> Result<PartialSignature, Error> {
    let bytes = hex::decode(hex_sig)
        .map_err(|e| Error::crypto(format!("invalid partial signature hex: {e}")))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::crypto("partial signature must be 32 bytes"))?;

    PartialSignature::from_byte_array(&bytes)
        .map_err(|e| Error::crypto(format!("invalid partial signature: {e}")))
}
