//! BTC-side construction for chain swaps.
//!
//! The BTC lockup of a chain swap is a Taproot output whose key path is the
//! MuSig2 aggregate of the counterparty's key and our ephemeral key, tweaked
//! by the merkle root of the counterparty-serialised swap tree. There is no
//! local reconstruction of the BTC HTLC scripts: detection and spending both
//! go through the aggregate key.

use crate::ark::ArkProvider;
use crate::boltz::ChainClaimRequest;
use crate::boltz::ChainClaimSignatureData;
use crate::boltz::ChainClaimToSign;
use crate::boltz::CounterpartyApi;
use crate::claim::ClaimEngine;
use crate::error::Error;
use crate::error::ErrorContext;
use crate::swap::ChainSwapData;
use crate::wallet::SwapWallet;
use arkswap_core::musig2;
use arkswap_core::musig2::SwapKeyAgg;
use bitcoin::absolute::LockTime;
use bitcoin::consensus;
use bitcoin::hashes::Hash;
use bitcoin::hex::DisplayHex;
use bitcoin::hex::FromHex;
use bitcoin::key::Keypair;
use bitcoin::key::Secp256k1;
use bitcoin::sighash::Prevouts;
use bitcoin::sighash::SighashCache;
use bitcoin::transaction;
use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::OutPoint;
use bitcoin::Sequence;
use bitcoin::TapSighashType;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;
use bitcoin::Witness;
use std::str::FromStr;

/// Virtual size of a one-input key-spend, one-output P2TR transaction.
const CLAIM_TX_VSIZE: u64 = 111;

const BTC_CURRENCY: &str = "BTC";

impl<C, A, W> ClaimEngine<C, A, W>
where
    C: CounterpartyApi,
    A: ArkProvider,
    W: SwapWallet,
{
    fn ephemeral_keypair(&self, swap: &ChainSwapData) -> Keypair {
        let secp = Secp256k1::new();
        Keypair::from_secret_key(&secp, &swap.ephemeral_key)
    }

    /// The aggregate key controlling the BTC lockup output of `swap`.
    fn btc_key_agg(&self, swap: &ChainSwapData) -> Result<SwapKeyAgg, Error> {
        let merkle_root = swap.btc.swap_tree.merkle_root()?;

        let ephemeral_pk = self.ephemeral_keypair(swap).public_key();

        SwapKeyAgg::new(
            &[swap.btc.counterparty_public_key, ephemeral_pk],
            Some(merkle_root),
        )
        .context("failed to aggregate BTC swap keys")
    }

    /// Find the swap output in the counterparty's raw lockup transaction.
    fn detect_lockup_output(
        &self,
        lockup_tx_hex: &str,
        key_agg: &SwapKeyAgg,
    ) -> Result<(OutPoint, TxOut), Error> {
        let bytes = Vec::from_hex(lockup_tx_hex)
            .map_err(|e| Error::ad_hoc(format!("invalid lockup transaction hex: {e}")))?;

        let lockup_tx: Transaction = consensus::deserialize(&bytes)
            .map_err(|e| Error::ad_hoc(format!("invalid lockup transaction: {e}")))?;

        let script_pubkey = key_agg.script_pubkey();

        let (vout, output) = lockup_tx
            .output
            .iter()
            .enumerate()
            .find(|(_, output)| output.script_pubkey == script_pubkey)
            .ok_or_else(|| {
                Error::ad_hoc(format!(
                    "no output of lockup transaction {} pays the aggregated swap key",
                    lockup_tx.compute_txid()
                ))
            })?;

        Ok((
            OutPoint {
                txid: lockup_tx.compute_txid(),
                vout: vout as u32,
            },
            output.clone(),
        ))
    }

    /// Claim the BTC side of an ARK→BTC chain swap with the preimage, using
    /// a cooperative MuSig2 key-spend with the counterparty.
    ///
    /// `lockup_tx_hex` is the raw server lockup transaction from the status
    /// update payload. Returns the broadcast claim txid.
    pub async fn claim_btc(
        &self,
        swap: &ChainSwapData,
        lockup_tx_hex: &str,
    ) -> Result<Txid, Error> {
        let key_agg = self.btc_key_agg(swap)?;

        let (outpoint, prevout) = self.detect_lockup_output(lockup_tx_hex, &key_agg)?;

        let to_address = Address::from_str(&swap.to_address)
            .map_err(|e| Error::ad_hoc(format!("invalid destination address: {e}")))?
            .require_network(self.server_info().network)
            .map_err(|e| Error::ad_hoc(format!("destination address network mismatch: {e}")))?;

        let fee_rate = swap
            .fee_rate_sat_per_vb
            .unwrap_or(self.config().fee_rate_sat_per_vb);
        let fee = Amount::from_sat(fee_rate * CLAIM_TX_VSIZE);
        let claim_value = prevout
            .value
            .checked_sub(fee)
            .ok_or_else(|| Error::ad_hoc("lockup amount does not cover the claim fee"))?;

        let mut claim_tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: outpoint,
                script_sig: Default::default(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: claim_value,
                script_pubkey: to_address.script_pubkey(),
            }],
        };

        let msg = btc_key_spend_sighash(&claim_tx, &prevout)?;

        let ephemeral_kp = self.ephemeral_keypair(swap);
        let (secret_nonce, pub_nonce) = key_agg.generate_nonce_pair(ephemeral_kp.public_key(), &msg);

        let claim_request = ChainClaimRequest {
            preimage: swap.preimage.to_lower_hex_string(),
            signature: None,
            to_sign: Some(ChainClaimToSign {
                pub_nonce: pub_nonce.serialize().to_lower_hex_string(),
                transaction: consensus::serialize(&claim_tx).to_lower_hex_string(),
                index: 0,
            }),
        };

        let their_signature = self
            .counterparty()
            .post_chain_claim(&swap.id, claim_request)
            .await
            .context("counterparty claim signature request failed")?;

        let their_nonce = musig2::parse_public_nonce(&their_signature.pub_nonce)?;
        let their_partial = musig2::parse_partial_signature(&their_signature.partial_signature)?;

        let agg_nonce = musig2::aggregate_nonces(&[&their_nonce, &pub_nonce]);

        if !key_agg.verify_partial(
            &msg,
            agg_nonce,
            &their_partial,
            &their_nonce,
            swap.btc.counterparty_public_key,
        ) {
            return Err(Error::InvalidCounterpartySignature {
                swap_id: swap.id.clone(),
                reason: "invalid MuSig2 partial signature on BTC claim".to_string(),
            });
        }

        let our_partial = key_agg.partial_sign(&msg, agg_nonce, secret_nonce, &ephemeral_kp)?;

        let final_sig = key_agg
            .aggregate_signatures(&msg, agg_nonce, &[&their_partial, &our_partial])
            .context("failed to aggregate BTC claim signatures")?;

        claim_tx.input[0].witness = Witness::p2tr_key_spend(&bitcoin::taproot::Signature {
            signature: final_sig,
            sighash_type: TapSighashType::Default,
        });

        let txid = self
            .counterparty()
            .broadcast_transaction(BTC_CURRENCY, &consensus::serialize(&claim_tx).to_lower_hex_string())
            .await
            .context("failed to broadcast BTC claim")?;

        let txid =
            Txid::from_str(&txid).map_err(|e| Error::ad_hoc(format!("invalid claim txid: {e}")))?;

        tracing::info!(swap_id = swap.id, %txid, %claim_value, "Claimed BTC lockup");

        Ok(txid)
    }

    /// Give the counterparty our half of the MuSig2 signature for its own
    /// BTC claim, after it settled the Ark side of a BTC→ARK chain swap.
    ///
    /// Failures here are non-fatal for the swap: the counterparty can always
    /// batch-sweep the lockup later.
    pub async fn cooperative_sign_btc_claim(&self, swap: &ChainSwapData) -> Result<(), Error> {
        let details = self
            .counterparty()
            .get_chain_claim_details(&swap.id)
            .await
            .context("failed to fetch counterparty claim details")?;

        let key_agg = self.btc_key_agg(swap)?;

        let msg: [u8; 32] = Vec::from_hex(&details.transaction_hash)
            .map_err(|e| Error::ad_hoc(format!("invalid claim transaction hash: {e}")))?
            .try_into()
            .map_err(|_| Error::ad_hoc("claim transaction hash must be 32 bytes"))?;

        let their_nonce = musig2::parse_public_nonce(&details.pub_nonce)?;

        let ephemeral_kp = self.ephemeral_keypair(swap);
        let (secret_nonce, pub_nonce) = key_agg.generate_nonce_pair(ephemeral_kp.public_key(), &msg);

        let agg_nonce = musig2::aggregate_nonces(&[&their_nonce, &pub_nonce]);

        let our_partial = key_agg.partial_sign(&msg, agg_nonce, secret_nonce, &ephemeral_kp)?;

        let request = ChainClaimRequest {
            preimage: swap.preimage.to_lower_hex_string(),
            signature: Some(ChainClaimSignatureData {
                pub_nonce: pub_nonce.serialize().to_lower_hex_string(),
                partial_signature: our_partial.serialize().to_lower_hex_string(),
            }),
            to_sign: None,
        };

        self.counterparty()
            .post_chain_claim(&swap.id, request)
            .await
            .context("failed to post cooperative claim signature")?;

        tracing::debug!(swap_id = swap.id, "Sent cooperative BTC claim signature");

        Ok(())
    }
}

fn btc_key_spend_sighash(tx: &Transaction, prevout: &TxOut) -> Result<[u8; 32], Error> {
    let prevouts = [prevout];
    let prevouts = Prevouts::All(&prevouts);

    let sighash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(0, &prevouts, TapSighashType::Default)
        .map_err(|e| Error::ad_hoc(format!("failed to compute claim sighash: {e}")))?;

    Ok(sighash.to_raw_hash().to_byte_array())
}
