//! Types exchanged with the Ark server.

use crate::Error;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::Txid;

/// Static information about the Ark server a client is connected to.
#[derive(Debug, Clone)]
pub struct Info {
    /// The server's signing key. Its x-only form is the `server` key in every
    /// VHTLC.
    pub signer_pk: PublicKey,
    pub network: bitcoin::Network,
    pub dust: Amount,
    /// CSV delay after which the server can sweep a checkpoint output
    /// unilaterally.
    pub unilateral_exit_delay: Sequence,
    /// Where forfeit transactions pay out during a batch ceremony.
    pub forfeit_address: Option<bitcoin::Address>,
}

/// A VTXO as reported by the Ark indexer.
#[derive(Debug, Clone)]
pub struct VirtualTxOutPoint {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub script: ScriptBuf,
    pub is_spent: bool,
    /// Set once the server has swept the VTXO into a batch.
    pub is_swept: bool,
}

/// The server's reply to an off-chain transaction submission: the ark
/// transaction and each checkpoint, co-signed by the server.
#[derive(Debug, Clone)]
pub struct SubmitOffchainTxResponse {
    pub signed_ark_tx: Psbt,
    pub signed_checkpoint_txs: Vec<Psbt>,
}

/// Events pushed by the Ark server during a batch ceremony.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    BatchStarted(BatchStartedEvent),
    /// A chunk of the new VTXO tree (or of the connectors tree).
    TreeTx(TreeTxEvent),
    TreeSigningStarted(TreeSigningStartedEvent),
    TreeNonces(TreeNoncesEvent),
    BatchFinalization(BatchFinalizationEvent),
    BatchFinalized(BatchFinalizedEvent),
    BatchFailed(BatchFailedEvent),
    Heartbeat,
}

#[derive(Debug, Clone)]
pub struct BatchStartedEvent {
    pub id: String,
    /// SHA256 hashes of the intent IDs admitted to this batch.
    pub intent_id_hashes: Vec<String>,
    pub batch_expiry: Sequence,
}

#[derive(Debug, Clone)]
pub struct TreeTxEvent {
    pub id: String,
    pub tree_type: BatchTreeType,
    pub tx: Psbt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTreeType {
    Vtxo,
    Connector,
}

#[derive(Debug, Clone)]
pub struct TreeSigningStartedEvent {
    pub id: String,
    pub cosigners_pubkeys: Vec<PublicKey>,
    pub unsigned_commitment_tx: Psbt,
}

#[derive(Debug, Clone)]
pub struct TreeNoncesEvent {
    pub id: String,
    pub txid: Txid,
    /// One public nonce per cosigner of `txid`.
    pub nonces: Vec<(PublicKey, musig::musig::PublicNonce)>,
}

#[derive(Debug, Clone)]
pub struct BatchFinalizationEvent {
    pub id: String,
    pub commitment_tx: Psbt,
}

#[derive(Debug, Clone)]
pub struct BatchFinalizedEvent {
    pub id: String,
    pub commitment_txid: Txid,
}

#[derive(Debug, Clone)]
pub struct BatchFailedEvent {
    pub id: String,
    pub reason: String,
}

/// Parse a raw timelock value into a [`Sequence`].
///
/// Values below 512 are block counts; everything else is interpreted as
/// seconds and must be a multiple of 512.
pub fn parse_sequence_number(value: i64) -> Result<Sequence, Error> {
    if value <= 0 {
        return Err(Error::transaction(format!(
            "sequence number must be positive, got {value}"
        )));
    }

    if value < 512 {
        Ok(Sequence::from_height(value as u16))
    } else {
        if value % 512 != 0 {
            return Err(Error::transaction(format!(
                "seconds timelock must be a multiple of 512, got {value}"
            )));
        }

        if value > u32::MAX as i64 {
            return Err(Error::transaction(format!(
                "seconds timelock out of range: {value}"
            )));
        }

        Sequence::from_seconds_ceil(value as u32)
            .map_err(|e| Error::transaction(format!("invalid seconds timelock {value}: {e}")))
    }
}
