//! Mock collaborators for the engine tests.
//!
//! The mock Ark server and counterparty genuinely co-sign: claims and
//! refunds only succeed when the engine's signature verification accepts
//! real Schnorr signatures over the right sighashes, keys and leaves.

use crate::ark::ArkProvider;
use crate::ark::EventStream;
use crate::ark::RecoveryIntent;
use crate::boltz::ChainClaimDetails;
use crate::boltz::ChainClaimRequest;
use crate::boltz::ChainClaimSignatureData;
use crate::boltz::CounterpartyApi;
use crate::boltz::CreateChainSwapRequest;
use crate::boltz::CreateChainSwapResponse;
use crate::boltz::CreateReverseSwapRequest;
use crate::boltz::CreateReverseSwapResponse;
use crate::boltz::CreateSubmarineSwapRequest;
use crate::boltz::CreateSubmarineSwapResponse;
use crate::boltz::RefundSwapResponse;
use crate::boltz::SwapFees;
use crate::boltz::SwapLimits;
use crate::boltz::SwapTransactionResponse;
use crate::boltz::SwapUpdate;
use crate::boltz::UpdateStream;
use crate::error::Error;
use crate::swap::SwapStatus;
use crate::swap::TimeoutBlockHeights;
use crate::wallet::SignerSessionSource;
use crate::wallet::SwapWallet;
use arkswap_core::keys::KeyRole;
use arkswap_core::musig2;
use arkswap_core::musig2::SwapKeyAgg;
use arkswap_core::server::SubmitOffchainTxResponse;
use arkswap_core::server::VirtualTxOutPoint;
use arkswap_core::vhtlc::VhtlcOptions;
use arkswap_core::vhtlc::VhtlcScript;
use arkswap_core::ArkAddress;
use async_trait::async_trait;
use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::hex::DisplayHex;
use bitcoin::hex::FromHex;
use bitcoin::key::Keypair;
use bitcoin::key::Secp256k1;
use bitcoin::key::TweakedPublicKey;
use bitcoin::secp256k1;
use bitcoin::secp256k1::PublicKey;
use bitcoin::sighash::Prevouts;
use bitcoin::sighash::SighashCache;
use bitcoin::taproot::LeafVersion;
use bitcoin::Amount;
use bitcoin::Network;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::TapLeafHash;
use bitcoin::TapSighashType;
use bitcoin::TxOut;
use bitcoin::Txid;
use bitcoin::XOnlyPublicKey;
use lightning_invoice::Bolt11Invoice;
use lightning_invoice::Currency;
use lightning_invoice::InvoiceBuilder;
use lightning_invoice::PaymentSecret;
use std::str::FromStr;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const NETWORK: Network = Network::Regtest;

pub(crate) fn keypair(byte: u8) -> Keypair {
    let secp = Secp256k1::new();
    Keypair::from_seckey_slice(&secp, &[byte; 32]).expect("valid secret key")
}

pub(crate) fn test_timeouts() -> TimeoutBlockHeights {
    TimeoutBlockHeights {
        refund: 600_000,
        unilateral_claim: 144,
        unilateral_refund: 288,
        unilateral_refund_without_receiver: 288,
    }
}

pub(crate) fn x_only(pk: &PublicKey) -> XOnlyPublicKey {
    arkswap_core::keys::to_x_only(KeyRole::Counterparty, &pk.serialize()).expect("valid key")
}

/// Build a real BOLT11 invoice committing to `payment_hash`.
pub(crate) fn build_invoice(payment_hash: sha256::Hash, amount: Amount) -> Bolt11Invoice {
    let secp = Secp256k1::new();
    let node_kp = keypair(0x51);

    InvoiceBuilder::new(Currency::Regtest)
        .description("arkswap test".to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([0x42; 32]))
        .amount_milli_satoshis(amount.to_sat() * 1000)
        .current_timestamp()
        .min_final_cltv_expiry_delta(80)
        .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_kp.secret_key()))
        .expect("valid invoice")
}

/// Sign input `input_index` of `psbt` along the given leaf script.
fn sign_leaf(
    psbt: &mut Psbt,
    prevouts: &[TxOut],
    input_index: usize,
    leaf_script: &ScriptBuf,
    kp: &Keypair,
) {
    let secp = Secp256k1::new();

    let leaf_hash = TapLeafHash::from_script(leaf_script, LeafVersion::TapScript);

    let sighash = SighashCache::new(&psbt.unsigned_tx)
        .taproot_script_spend_signature_hash(
            input_index,
            &Prevouts::All(prevouts),
            leaf_hash,
            TapSighashType::Default,
        )
        .expect("valid sighash");

    let msg = secp256k1::Message::from_digest(sighash.to_raw_hash().to_byte_array());
    let sig = secp.sign_schnorr_no_aux_rand(&msg, kp);

    psbt.inputs[input_index].tap_script_sigs.insert(
        (kp.x_only_public_key().0, leaf_hash),
        bitcoin::taproot::Signature {
            signature: sig,
            sighash_type: TapSighashType::Default,
        },
    );
}

/// The leaf script the spender committed to on a PSBT input.
fn committed_leaf(psbt: &Psbt, input_index: usize) -> ScriptBuf {
    psbt.inputs[input_index]
        .tap_scripts
        .values()
        .next()
        .map(|(script, _)| script.clone())
        .expect("input commits to a leaf script")
}

// Mock wallet.

pub(crate) struct MockWallet {
    kp: Keypair,
    cosigner_kp: Keypair,
    server_pk: XOnlyPublicKey,
    pub sent: Mutex<Vec<(ArkAddress, Amount)>>,
}

impl MockWallet {
    pub fn new(kp: Keypair, server_pk: XOnlyPublicKey) -> Self {
        Self {
            kp,
            cosigner_kp: keypair(0x33),
            server_pk,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SwapWallet for MockWallet {
    fn address(&self) -> Result<ArkAddress, Error> {
        Ok(ArkAddress::new(
            NETWORK,
            self.server_pk,
            TweakedPublicKey::dangerous_assume_tweaked(self.kp.x_only_public_key().0),
        ))
    }

    fn compressed_public_key(&self) -> Result<PublicKey, Error> {
        Ok(self.kp.public_key())
    }

    fn sign_schnorr(
        &self,
        msg: &secp256k1::Message,
    ) -> Result<secp256k1::schnorr::Signature, Error> {
        Ok(Secp256k1::new().sign_schnorr_no_aux_rand(msg, &self.kp))
    }

    async fn sign(
        &self,
        _psbt: &mut Psbt,
        _input_indexes: Option<&[usize]>,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn send_bitcoin(&self, address: &ArkAddress, amount: Amount) -> Result<Txid, Error> {
        self.sent.lock().expect("lock").push((*address, amount));

        Ok(Txid::from_str(
            "1111111111111111111111111111111111111111111111111111111111111111",
        )
        .expect("valid txid"))
    }

    fn signer_session(&self) -> SignerSessionSource {
        SignerSessionSource::Value(self.cosigner_kp)
    }
}

// Mock Ark server.

pub(crate) struct MockArk {
    server_kp: Keypair,
    /// Amount vended for any queried script.
    pub vtxo_amount: Amount,
    /// Vend swept (unspendable) VTXOs instead of live ones.
    pub vend_swept: Mutex<bool>,
    pub submitted: AtomicU32,
    pub finalized: Mutex<Vec<Txid>>,
}

impl MockArk {
    pub fn new(server_kp: Keypair, vtxo_amount: Amount) -> Self {
        Self {
            server_kp,
            vtxo_amount,
            vend_swept: Mutex::new(false),
            submitted: AtomicU32::new(0),
            finalized: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArkProvider for MockArk {
    async fn list_vtxos(&self, script: &ScriptBuf) -> Result<Vec<VirtualTxOutPoint>, Error> {
        let is_swept = *self.vend_swept.lock().expect("lock");

        Ok(vec![VirtualTxOutPoint {
            outpoint: OutPoint {
                txid: Txid::from_str(
                    "2222222222222222222222222222222222222222222222222222222222222222",
                )
                .expect("valid txid"),
                vout: 0,
            },
            amount: self.vtxo_amount,
            script: script.clone(),
            is_spent: false,
            is_swept,
        }])
    }

    async fn submit_offchain_tx(
        &self,
        ark_tx: Psbt,
        checkpoint_txs: Vec<Psbt>,
    ) -> Result<SubmitOffchainTxResponse, Error> {
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let mut signed_ark_tx = ark_tx;

        let prevouts = checkpoint_txs
            .iter()
            .map(|c| c.unsigned_tx.output[0].clone())
            .collect::<Vec<_>>();

        let leaf = committed_leaf(&signed_ark_tx, 0);
        sign_leaf(&mut signed_ark_tx, &prevouts, 0, &leaf, &self.server_kp);

        let signed_checkpoint_txs = checkpoint_txs
            .into_iter()
            .map(|mut checkpoint| {
                let prevout = checkpoint.inputs[0]
                    .witness_utxo
                    .clone()
                    .expect("checkpoint carries its witness utxo");

                let leaf = committed_leaf(&checkpoint, 0);
                sign_leaf(&mut checkpoint, &[prevout], 0, &leaf, &self.server_kp);

                checkpoint
            })
            .collect();

        Ok(SubmitOffchainTxResponse {
            signed_ark_tx,
            signed_checkpoint_txs,
        })
    }

    async fn finalize_offchain_tx(
        &self,
        ark_txid: Txid,
        _checkpoint_txs: Vec<Psbt>,
    ) -> Result<(), Error> {
        self.finalized.lock().expect("lock").push(ark_txid);
        Ok(())
    }

    async fn register_intent(&self, _intent: &RecoveryIntent) -> Result<String, Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }

    async fn confirm_registration(&self, _intent_id: &str) -> Result<(), Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }

    async fn event_stream(&self, _topics: Vec<String>) -> Result<EventStream, Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }

    async fn submit_tree_nonces(
        &self,
        _batch_id: &str,
        _cosigner_pk: PublicKey,
        _txid: Txid,
        _nonce: musig::musig::PublicNonce,
    ) -> Result<(), Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }

    async fn submit_tree_signatures(
        &self,
        _batch_id: &str,
        _cosigner_pk: PublicKey,
        _txid: Txid,
        _signature: musig::musig::PartialSignature,
    ) -> Result<(), Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }

    async fn submit_signed_forfeit_txs(&self, _forfeit_txs: Vec<Psbt>) -> Result<(), Error> {
        Err(Error::ark_server("mock does not support batch ceremonies"))
    }
}

// Mock counterparty.

pub(crate) struct MockCounterparty {
    kp: Keypair,
    server_pk: XOnlyPublicKey,
    /// When set, create responses carry a lockup address that does not match
    /// the real VHTLC.
    pub corrupt_lockup_address: bool,
    /// Status updates replayed to every subscriber, in order.
    pub scripted_updates: Mutex<Vec<SwapUpdate>>,
    /// Swap ids whose subscription was closed.
    pub unsubscribed: Mutex<Vec<String>>,
    /// Initial status reported by `get_status`.
    pub initial_status: Mutex<SwapStatus>,
    pub settlement: Mutex<Option<SwapTransactionResponse>>,
    pub revealed_preimage: Mutex<Option<[u8; 32]>>,
    /// VHTLCs by swap id, for refund co-signing.
    vhtlcs: Mutex<std::collections::HashMap<String, VhtlcOptions>>,
    next_id: AtomicU32,
    /// BTC side of chain swaps: the lockup prevout, the claimant's key and
    /// the swap tree, for MuSig2 co-signing.
    pub btc_lockup: Mutex<Option<TxOut>>,
    pub chain_claimant_pk: Mutex<Option<PublicKey>>,
    pub chain_swap_tree: Mutex<Option<crate::swap::SwapTree>>,
    pub chain_claim_details: Mutex<Option<ChainClaimDetails>>,
    pub cooperative_sigs: Mutex<Vec<ChainClaimSignatureData>>,
    pub broadcasts: Mutex<Vec<String>>,
}

impl MockCounterparty {
    pub fn new(kp: Keypair, server_pk: XOnlyPublicKey) -> Self {
        Self {
            kp,
            server_pk,
            corrupt_lockup_address: false,
            scripted_updates: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
            initial_status: Mutex::new(SwapStatus::Created),
            settlement: Mutex::new(None),
            revealed_preimage: Mutex::new(None),
            vhtlcs: Mutex::new(std::collections::HashMap::new()),
            next_id: AtomicU32::new(0),
            btc_lockup: Mutex::new(None),
            chain_claimant_pk: Mutex::new(None),
            chain_swap_tree: Mutex::new(None),
            chain_claim_details: Mutex::new(None),
            cooperative_sigs: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.kp.public_key()
    }

    pub fn script(&self, statuses: impl IntoIterator<Item = SwapStatus>) {
        let mut updates = self.scripted_updates.lock().expect("lock");
        *updates = statuses
            .into_iter()
            .map(|status| SwapUpdate {
                id: String::new(),
                status,
                payload: Default::default(),
            })
            .collect();
    }

    fn assign_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("swap-{n}")
    }

    fn vhtlc(&self, options: VhtlcOptions) -> (VhtlcScript, ArkAddress) {
        let script = VhtlcScript::new(options, NETWORK).expect("valid VHTLC");
        let address = if self.corrupt_lockup_address {
            ArkAddress::new(
                NETWORK,
                self.server_pk,
                TweakedPublicKey::dangerous_assume_tweaked(keypair(0x66).x_only_public_key().0),
            )
        } else {
            script.address()
        };

        (script, address)
    }
}

#[async_trait]
impl CounterpartyApi for MockCounterparty {
    async fn create_submarine_swap(
        &self,
        request: CreateSubmarineSwapRequest,
    ) -> Result<CreateSubmarineSwapResponse, Error> {
        let id = self.assign_id();

        let preimage_hash =
            ripemd160::Hash::hash(request.invoice.payment_hash().as_byte_array());

        let options = VhtlcOptions {
            sender: x_only(&request.refund_public_key),
            receiver: self.kp.x_only_public_key().0,
            server: self.server_pk,
            preimage_hash,
            refund_locktime: test_timeouts().refund,
            unilateral_claim_delay: Sequence::from_height(144),
            unilateral_refund_delay: Sequence::from_height(288),
            unilateral_refund_without_receiver_delay: Sequence::from_height(288),
        };

        let (_, address) = self.vhtlc(options.clone());
        self.vhtlcs.lock().expect("lock").insert(id.clone(), options);

        let amount = request
            .invoice
            .amount_milli_satoshis()
            .map(|msat| Amount::from_sat(msat / 1000))
            .unwrap_or(Amount::from_sat(100_000));

        Ok(CreateSubmarineSwapResponse {
            id,
            address,
            expected_amount: amount,
            claim_public_key: self.kp.public_key(),
            timeout_block_heights: test_timeouts(),
        })
    }

    async fn create_reverse_swap(
        &self,
        request: CreateReverseSwapRequest,
    ) -> Result<CreateReverseSwapResponse, Error> {
        let id = self.assign_id();

        let preimage_hash = ripemd160::Hash::hash(request.preimage_hash.as_byte_array());

        let options = VhtlcOptions {
            sender: self.kp.x_only_public_key().0,
            receiver: x_only(&request.claim_public_key),
            server: self.server_pk,
            preimage_hash,
            refund_locktime: test_timeouts().refund,
            unilateral_claim_delay: Sequence::from_height(144),
            unilateral_refund_delay: Sequence::from_height(288),
            unilateral_refund_without_receiver_delay: Sequence::from_height(288),
        };

        let (_, address) = self.vhtlc(options.clone());
        self.vhtlcs.lock().expect("lock").insert(id.clone(), options);

        let amount = request
            .invoice_amount
            .or(request.onchain_amount)
            .unwrap_or(Amount::from_sat(100_000));

        Ok(CreateReverseSwapResponse {
            id,
            lockup_address: address,
            refund_public_key: self.kp.public_key(),
            timeout_block_heights: test_timeouts(),
            invoice: build_invoice(request.preimage_hash, amount),
            onchain_amount: Some(amount),
        })
    }

    async fn create_chain_swap(
        &self,
        _request: CreateChainSwapRequest,
    ) -> Result<CreateChainSwapResponse, Error> {
        Err(Error::ad_hoc("mock does not script chain swap creation"))
    }

    async fn get_status(&self, swap_id: &str) -> Result<SwapUpdate, Error> {
        Ok(SwapUpdate {
            id: swap_id.to_string(),
            status: *self.initial_status.lock().expect("lock"),
            payload: Default::default(),
        })
    }

    async fn get_submarine_preimage(&self, _swap_id: &str) -> Result<[u8; 32], Error> {
        self.revealed_preimage
            .lock()
            .expect("lock")
            .ok_or_else(|| Error::ad_hoc("no preimage revealed"))
    }

    async fn get_reverse_swap_transaction(
        &self,
        _swap_id: &str,
    ) -> Result<SwapTransactionResponse, Error> {
        Ok(self
            .settlement
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or(SwapTransactionResponse {
                id: None,
                hex: None,
                timeout_block_height: None,
            }))
    }

    async fn get_submarine_quote(&self, _swap_id: &str) -> Result<Amount, Error> {
        Ok(Amount::from_sat(99_000))
    }

    async fn refund_submarine_swap(
        &self,
        swap_id: &str,
        refund_tx: &Psbt,
        checkpoint_tx: &Psbt,
    ) -> Result<RefundSwapResponse, Error> {
        let options = self
            .vhtlcs
            .lock()
            .expect("lock")
            .get(swap_id)
            .cloned()
            .ok_or_else(|| Error::ad_hoc(format!("unknown swap: {swap_id}")))?;

        let refund_leaf = options.refund_script();

        // Co-sign the refund transaction against the checkpoint output and
        // the checkpoint transaction against the VHTLC output.
        let mut refund_tx = refund_tx.clone();
        let checkpoint_prevout = checkpoint_tx.unsigned_tx.output[0].clone();
        sign_leaf(&mut refund_tx, &[checkpoint_prevout], 0, &refund_leaf, &self.kp);

        let mut checkpoint_tx = checkpoint_tx.clone();
        let vhtlc_prevout = checkpoint_tx.inputs[0]
            .witness_utxo
            .clone()
            .expect("checkpoint carries its witness utxo");
        sign_leaf(&mut checkpoint_tx, &[vhtlc_prevout], 0, &refund_leaf, &self.kp);

        Ok(RefundSwapResponse {
            transaction: refund_tx.to_string(),
            checkpoint: checkpoint_tx.to_string(),
            error: None,
        })
    }

    async fn get_chain_claim_details(&self, _swap_id: &str) -> Result<ChainClaimDetails, Error> {
        self.chain_claim_details
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| Error::ad_hoc("no chain claim details configured"))
    }

    async fn post_chain_claim(
        &self,
        _swap_id: &str,
        request: ChainClaimRequest,
    ) -> Result<ChainClaimSignatureData, Error> {
        let Some(to_sign) = request.to_sign else {
            // The partner role: record the cooperative signature we received.
            let signature = request
                .signature
                .ok_or_else(|| Error::ad_hoc("claim request carries neither side"))?;

            self.cooperative_sigs.lock().expect("lock").push(signature.clone());

            return Ok(signature);
        };

        let prevout = self
            .btc_lockup
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| Error::ad_hoc("no BTC lockup configured"))?;

        let tx_bytes = Vec::from_hex(&to_sign.transaction)
            .map_err(|e| Error::ad_hoc(format!("invalid transaction hex: {e}")))?;
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(&tx_bytes)
            .map_err(|e| Error::ad_hoc(format!("invalid transaction: {e}")))?;

        let sighash = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(
                to_sign.index as usize,
                &Prevouts::All(&[prevout.clone()]),
                TapSighashType::Default,
            )
            .map_err(|e| Error::ad_hoc(format!("failed to compute sighash: {e}")))?;
        let msg: [u8; 32] = sighash.to_raw_hash().to_byte_array();

        // Rebuild the aggregate the way the claimant does: counterparty key
        // first, claimant key second. The mock supports a single in-flight
        // chain swap, configured by the test.
        let their_pk = self
            .chain_claimant_pk
            .lock()
            .expect("lock")
            .ok_or_else(|| Error::ad_hoc("no chain claimant configured"))?;

        let merkle_root = self
            .chain_swap_tree
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| Error::ad_hoc("no chain swap tree configured"))?
            .merkle_root()?;

        let agg = SwapKeyAgg::new(&[self.kp.public_key(), their_pk], Some(merkle_root))?;

        let their_nonce = musig2::parse_public_nonce(&to_sign.pub_nonce)?;
        let (our_secret_nonce, our_pub_nonce) = agg.generate_nonce_pair(self.kp.public_key(), &msg);

        let agg_nonce = musig2::aggregate_nonces(&[&their_nonce, &our_pub_nonce]);

        let partial = agg.partial_sign(&msg, agg_nonce, our_secret_nonce, &self.kp)?;

        Ok(ChainClaimSignatureData {
            pub_nonce: our_pub_nonce.serialize().to_lower_hex_string(),
            partial_signature: partial.serialize().to_lower_hex_string(),
        })
    }

    async fn broadcast_transaction(&self, _currency: &str, tx_hex: &str) -> Result<String, Error> {
        self.broadcasts.lock().expect("lock").push(tx_hex.to_string());

        let tx_bytes = Vec::from_hex(tx_hex)
            .map_err(|e| Error::ad_hoc(format!("invalid transaction hex: {e}")))?;
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(&tx_bytes)
            .map_err(|e| Error::ad_hoc(format!("invalid transaction: {e}")))?;

        Ok(tx.compute_txid().to_string())
    }

    async fn get_fees(&self) -> Result<SwapFees, Error> {
        Err(Error::ad_hoc("mock does not report fees"))
    }

    async fn get_limits(&self) -> Result<SwapLimits, Error> {
        Err(Error::ad_hoc("mock does not report limits"))
    }

    async fn subscribe_push(&self, swap_id: &str) -> Result<UpdateStream, Error> {
        let updates = self.scripted_updates.lock().expect("lock").clone();
        let swap_id = swap_id.to_string();

        Ok(Box::pin(async_stream::stream! {
            for mut update in updates {
                update.id = swap_id.clone();
                yield Ok(update);
            }

            // Keep the subscription open; terminal handling happens in the
            // lifecycle, not by ending the stream.
            futures::future::pending::<()>().await;
        }))
    }

    async fn unsubscribe(&self, swap_id: &str) -> Result<(), Error> {
        self.unsubscribed
            .lock()
            .expect("lock")
            .push(swap_id.to_string());

        Ok(())
    }

    fn subscribe_poll(&self, swap_id: &str, _interval: Duration) -> UpdateStream {
        let updates = self.scripted_updates.lock().expect("lock").clone();
        let swap_id = swap_id.to_string();

        Box::pin(async_stream::stream! {
            for mut update in updates {
                update.id = swap_id.clone();
                yield Ok(update);
            }

            futures::future::pending::<()>().await;
        })
    }
}
