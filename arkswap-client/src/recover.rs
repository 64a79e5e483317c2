//! Recovery of swept VHTLCs through an Ark batch ceremony.
//!
//! Once the server has swept an expired VHTLC into a batch, the cooperative
//! refund path is gone: the value can only be recovered by joining the next
//! commitment transaction. The ceremony is a state machine over the server's
//! event stream: batch start, tree signing start, nonce exchange, and batch
//! finalization.

use crate::ark::ArkProvider;
use crate::ark::RecoveryIntent;
use crate::error::Error;
use crate::error::ErrorContext;
use crate::wallet::SwapWallet;
use arkswap_core::csv_sig_script;
use arkswap_core::musig2;
use arkswap_core::musig2::SwapKeyAgg;
use arkswap_core::server;
use arkswap_core::server::BatchTreeType;
use arkswap_core::server::StreamEvent;
use arkswap_core::server::VirtualTxOutPoint;
use arkswap_core::vhtlc::VhtlcScript;
use arkswap_core::ArkAddress;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1;
use bitcoin::sighash::Prevouts;
use bitcoin::sighash::SighashCache;
use bitcoin::taproot::LeafVersion;
use bitcoin::transaction;
use bitcoin::Psbt;
use bitcoin::TapLeafHash;
use bitcoin::TapSighashType;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;
use futures::StreamExt;
use musig::musig::SecretNonce;
use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Start,
    BatchStarted,
    TreeSigningStarted,
    Finalized,
}

/// Join the next batch with a swept VHTLC outpoint and recover its value to
/// `to_address`.
///
/// Returns the commitment transaction id once the batch is finalized.
pub async fn recover_via_batch<A, W>(
    ark: &A,
    wallet: &W,
    server_info: &server::Info,
    vhtlc: &VhtlcScript,
    swept: VirtualTxOutPoint,
    to_address: &ArkAddress,
) -> Result<Txid, Error>
where
    A: ArkProvider + ?Sized,
    W: SwapWallet + ?Sized,
{
    let cosigner_kp = wallet.signer_session().session();
    let cosigner_pk = cosigner_kp.public_key();
    let server_pk = server_info.signer_pk.x_only_public_key().0;

    let intent = {
        let message = serde_json::json!({
            "type": "recover",
            "inputs": [swept.outpoint.to_string()],
            "outputs": [{
                "address": to_address.encode(),
                "amount": swept.amount.to_sat(),
            }],
            "cosigner_public_key": cosigner_pk.serialize().to_lower_hex_string(),
        })
        .to_string();

        let digest = sha256::Hash::hash(message.as_bytes());
        let msg = secp256k1::Message::from_digest(digest.to_byte_array());
        let signature = wallet.sign_schnorr(&msg)?;

        RecoveryIntent {
            message,
            signature,
            vtxo_outpoints: vec![swept.outpoint],
        }
    };

    let intent_id = ark
        .register_intent(&intent)
        .await
        .context("failed to register recovery intent")?;

    tracing::debug!(intent_id, outpoint = %swept.outpoint, "Registered recovery intent");

    let topics = vec![
        swept.outpoint.to_string(),
        cosigner_pk.serialize().to_lower_hex_string(),
    ];

    let mut stream = ark.event_stream(topics).await?;

    let mut step = Step::Start;
    let mut batch_id: Option<String> = None;
    let mut batch_expiry = None;
    let mut commitment_tx: Option<Psbt> = None;

    let mut vtxo_tree: Vec<Psbt> = Vec::new();
    let mut connector_tree: Vec<Psbt> = Vec::new();

    // Per tree transaction: the key aggregation, sighash, and our secret
    // nonce. Secret nonces can only be used once and are consumed on signing.
    let mut signing_state: HashMap<Txid, (SwapKeyAgg, [u8; 32])> = HashMap::new();
    let mut secret_nonces: HashMap<Txid, SecretNonce> = HashMap::new();

    loop {
        let event = match stream.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                return Err(Error::ark_server(format!("batch event stream error: {e}")))
            }
            None => return Err(Error::ark_server("batch event stream dropped")),
        };

        match event {
            StreamEvent::BatchStarted(e) => {
                if step != Step::Start {
                    continue;
                }

                let hash = sha256::Hash::hash(intent_id.as_bytes());
                let hash = hash.as_byte_array().to_lower_hex_string();

                if e.intent_id_hashes.iter().any(|h| h == &hash) {
                    ark.confirm_registration(&intent_id)
                        .await
                        .context("failed to confirm intent registration")?;

                    tracing::info!(batch_id = e.id, intent_id, "Joined batch");

                    batch_id = Some(e.id);
                    batch_expiry = Some(e.batch_expiry);
                    step = Step::BatchStarted;
                } else {
                    tracing::debug!(batch_id = e.id, intent_id, "Intent not in this batch");
                }
            }
            StreamEvent::TreeTx(e) => {
                if step != Step::BatchStarted && step != Step::TreeSigningStarted {
                    continue;
                }

                match e.tree_type {
                    BatchTreeType::Vtxo => vtxo_tree.push(e.tx),
                    BatchTreeType::Connector => connector_tree.push(e.tx),
                }
            }
            StreamEvent::TreeSigningStarted(e) => {
                if step != Step::BatchStarted {
                    continue;
                }

                if !e.cosigners_pubkeys.contains(&cosigner_pk) {
                    return Err(Error::ark_server(
                        "own cosigner key is missing from batch cosigners",
                    ));
                }

                let batch_expiry =
                    batch_expiry.ok_or_else(|| Error::ark_server("missing batch expiry"))?;

                let mut cosigners = e.cosigners_pubkeys.clone();
                cosigners.sort_by_key(|pk| pk.serialize());

                // Each tree output can be swept by the server after the batch
                // expires; that sweep leaf is the tweak on the aggregate key.
                let sweep_script = csv_sig_script(batch_expiry, server_pk);
                let sweep_leaf = bitcoin::taproot::TapNodeHash::from(TapLeafHash::from_script(
                    &sweep_script,
                    LeafVersion::TapScript,
                ));

                let tx_map: HashMap<Txid, &Psbt> = vtxo_tree
                    .iter()
                    .map(|tx| (tx.unsigned_tx.compute_txid(), tx))
                    .collect();

                for tx in vtxo_tree.iter() {
                    let txid = tx.unsigned_tx.compute_txid();

                    let agg = SwapKeyAgg::new(&cosigners, Some(sweep_leaf))
                        .context("failed to aggregate batch cosigner keys")?;

                    let msg = tree_tx_sighash(tx, &tx_map, &e.unsigned_commitment_tx)?;

                    let (secret_nonce, pub_nonce) = agg.generate_nonce_pair(cosigner_pk, &msg);

                    let batch = batch_id
                        .as_deref()
                        .ok_or_else(|| Error::ark_server("missing batch id"))?;

                    ark.submit_tree_nonces(batch, cosigner_pk, txid, pub_nonce)
                        .await
                        .context("failed to submit tree nonces")?;

                    signing_state.insert(txid, (agg, msg));
                    secret_nonces.insert(txid, secret_nonce);
                }

                commitment_tx = Some(e.unsigned_commitment_tx);
                step = Step::TreeSigningStarted;
            }
            StreamEvent::TreeNonces(e) => {
                if step != Step::TreeSigningStarted {
                    continue;
                }

                let Some((agg, msg)) = signing_state.get(&e.txid) else {
                    tracing::debug!(txid = %e.txid, "Nonces for a transaction we are not signing");
                    continue;
                };

                let Some(secret_nonce) = secret_nonces.remove(&e.txid) else {
                    // Nonce already consumed; duplicate event.
                    continue;
                };

                let nonce_refs = e.nonces.iter().map(|(_, nonce)| nonce).collect::<Vec<_>>();
                let agg_nonce = musig2::aggregate_nonces(&nonce_refs);

                let partial_sig = agg.partial_sign(msg, agg_nonce, secret_nonce, &cosigner_kp)?;

                let batch = batch_id
                    .as_deref()
                    .ok_or_else(|| Error::ark_server("missing batch id"))?;

                ark.submit_tree_signatures(batch, cosigner_pk, e.txid, partial_sig)
                    .await
                    .context("failed to submit tree signatures")?;
            }
            StreamEvent::BatchFinalization(e) => {
                if step != Step::TreeSigningStarted {
                    continue;
                }

                tracing::debug!(
                    commitment_txid = %e.commitment_tx.unsigned_tx.compute_txid(),
                    "Batch finalization started"
                );

                if connector_tree.is_empty() {
                    // Recoverable outputs need no forfeit transaction.
                    tracing::debug!(batch_id = e.id, "No forfeit transactions required");
                } else {
                    let forfeit_txs = connector_tree
                        .iter()
                        .map(|connector| {
                            build_and_sign_forfeit_tx(
                                wallet,
                                server_info,
                                vhtlc,
                                &swept,
                                connector,
                            )
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    ark.submit_signed_forfeit_txs(forfeit_txs)
                        .await
                        .context("failed to submit forfeit transactions")?;
                }

                step = Step::Finalized;
            }
            StreamEvent::BatchFinalized(e) => {
                if step != Step::Finalized {
                    continue;
                }

                tracing::info!(batch_id = e.id, commitment_txid = %e.commitment_txid, "Batch finalized");

                return Ok(e.commitment_txid);
            }
            StreamEvent::BatchFailed(e) => {
                if Some(&e.id) == batch_id.as_ref() {
                    return Err(Error::ark_server(format!(
                        "batch {} failed: {}",
                        e.id, e.reason
                    )));
                }

                tracing::debug!(batch_id = e.id, "Unrelated batch failed");
            }
            StreamEvent::Heartbeat => {}
        }
    }
}

/// The key-spend sighash of a batch tree transaction. The previous output is
/// found either in another tree transaction or in the commitment transaction
/// itself.
fn tree_tx_sighash(
    psbt: &Psbt,
    tx_map: &HashMap<Txid, &Psbt>,
    commitment_tx: &Psbt,
) -> Result<[u8; 32], Error> {
    let tx = &psbt.unsigned_tx;

    let previous_output = tx.input[arkswap_core::VTXO_INPUT_INDEX].previous_output;

    let parent = tx_map
        .get(&previous_output.txid)
        .copied()
        .or_else(|| {
            (previous_output.txid == commitment_tx.unsigned_tx.compute_txid())
                .then_some(commitment_tx)
        })
        .ok_or_else(|| {
            Error::ark_server(format!(
                "parent transaction {} not found for tree transaction {}",
                previous_output.txid,
                tx.compute_txid()
            ))
        })?;

    let prevout = parent
        .unsigned_tx
        .output
        .get(previous_output.vout as usize)
        .ok_or_else(|| {
            Error::ark_server(format!(
                "previous output {previous_output} not found for tree transaction {}",
                tx.compute_txid()
            ))
        })?;

    let prevouts = [prevout];
    let prevouts = Prevouts::All(&prevouts);

    let tap_sighash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(
            arkswap_core::VTXO_INPUT_INDEX,
            &prevouts,
            TapSighashType::Default,
        )
        .map_err(|e| Error::ad_hoc(format!("failed to compute tree sighash: {e}")))?;

    Ok(tap_sighash.to_raw_hash().to_byte_array())
}

/// Build a forfeit transaction handing the swept VHTLC to the server against
/// a batch connector, signed on the sender+server leaf with our key. The
/// server completes it with its own signature.
fn build_and_sign_forfeit_tx<W: SwapWallet + ?Sized>(
    wallet: &W,
    server_info: &server::Info,
    vhtlc: &VhtlcScript,
    swept: &VirtualTxOutPoint,
    connector: &Psbt,
) -> Result<Psbt, Error> {
    // Input 0 is the connector, input 1 the forfeited VTXO.
    const FORFEIT_TX_VTXO_INDEX: usize = 1;

    let forfeit_address = server_info
        .forfeit_address
        .as_ref()
        .ok_or_else(|| Error::ark_server("server did not advertise a forfeit address"))?;

    let connector_txid = connector.unsigned_tx.compute_txid();
    let connector_output = connector
        .unsigned_tx
        .output
        .first()
        .ok_or_else(|| Error::ark_server("connector transaction has no outputs"))?;

    let forfeit_amount = swept.amount + connector_output.value;

    let unsigned_tx = Transaction {
        version: transaction::Version::non_standard(3),
        lock_time: LockTime::ZERO,
        input: vec![
            TxIn {
                previous_output: bitcoin::OutPoint {
                    txid: connector_txid,
                    vout: 0,
                },
                script_sig: Default::default(),
                sequence: bitcoin::Sequence::MAX,
                witness: Default::default(),
            },
            TxIn {
                previous_output: swept.outpoint,
                script_sig: Default::default(),
                sequence: bitcoin::Sequence::MAX,
                witness: Default::default(),
            },
        ],
        output: vec![TxOut {
            value: forfeit_amount,
            script_pubkey: forfeit_address.script_pubkey(),
        }],
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
        .map_err(|e| Error::ad_hoc(format!("failed to build forfeit psbt: {e}")))?;

    // Our spend path on the VHTLC without the counterparty.
    let spend_script = vhtlc.unilateral_refund_without_receiver_script();
    let control_block = vhtlc
        .control_block(&spend_script)
        .map_err(|e| Error::ad_hoc(format!("missing forfeit control block: {e}")))?;

    let prevouts = [
        connector_output.clone(),
        TxOut {
            value: swept.amount,
            script_pubkey: swept.script.clone(),
        },
    ];

    let leaf_hash = TapLeafHash::from_script(&spend_script, LeafVersion::TapScript);

    let tap_sighash = SighashCache::new(&psbt.unsigned_tx)
        .taproot_script_spend_signature_hash(
            FORFEIT_TX_VTXO_INDEX,
            &Prevouts::All(&prevouts),
            leaf_hash,
            TapSighashType::Default,
        )
        .map_err(|e| Error::ad_hoc(format!("failed to compute forfeit sighash: {e}")))?;

    let msg = secp256k1::Message::from_digest(tap_sighash.to_raw_hash().to_byte_array());
    let sig = wallet.sign_schnorr(&msg)?;
    let pk = wallet.x_only_public_key()?;

    let input = &mut psbt.inputs[FORFEIT_TX_VTXO_INDEX];
    input.witness_utxo = Some(prevouts[FORFEIT_TX_VTXO_INDEX].clone());
    input.tap_scripts = std::collections::BTreeMap::from_iter([(
        control_block,
        (spend_script, LeafVersion::TapScript),
    )]);
    input.tap_script_sigs.insert(
        (pk, leaf_hash),
        bitcoin::taproot::Signature {
            signature: sig,
            sighash_type: TapSighashType::Default,
        },
    );

    Ok(psbt)
}
