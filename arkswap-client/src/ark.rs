//! The Ark server collaborator contract.
//!
//! Transport implementations (gRPC, REST) live outside this crate; the swap
//! engine only needs the calls below.

use crate::error::Error;
use arkswap_core::server::StreamEvent;
use arkswap_core::server::SubmitOffchainTxResponse;
use arkswap_core::server::VirtualTxOutPoint;
use async_trait::async_trait;
use bitcoin::secp256k1::schnorr;
use bitcoin::secp256k1::PublicKey;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::ScriptBuf;
use bitcoin::Txid;
use futures::Stream;
use musig::musig::PartialSignature;
use musig::musig::PublicNonce;
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// A registration for joining the next Ark batch, signed by the owner of the
/// VTXOs being recovered.
#[derive(Debug, Clone)]
pub struct RecoveryIntent {
    /// The canonical intent message: outpoints, destination and amount.
    pub message: String,
    pub signature: schnorr::Signature,
    pub vtxo_outpoints: Vec<OutPoint>,
}

/// Facade over the Ark server RPC and indexer.
#[async_trait]
pub trait ArkProvider: Send + Sync {
    /// List VTXOs locked to `script`.
    async fn list_vtxos(&self, script: &ScriptBuf) -> Result<Vec<VirtualTxOutPoint>, Error>;

    /// Submit an ark transaction and its checkpoints for server co-signing.
    async fn submit_offchain_tx(
        &self,
        ark_tx: Psbt,
        checkpoint_txs: Vec<Psbt>,
    ) -> Result<SubmitOffchainTxResponse, Error>;

    /// Hand the fully signed checkpoints back to the server.
    async fn finalize_offchain_tx(
        &self,
        ark_txid: Txid,
        checkpoint_txs: Vec<Psbt>,
    ) -> Result<(), Error>;

    /// Register an intent to join the next batch. Returns the intent id.
    async fn register_intent(&self, intent: &RecoveryIntent) -> Result<String, Error>;

    /// Confirm the registration once the intent shows up in a starting batch.
    async fn confirm_registration(&self, intent_id: &str) -> Result<(), Error>;

    /// Subscribe to batch ceremony events for the given topics (outpoints and
    /// cosigner keys).
    async fn event_stream(&self, topics: Vec<String>) -> Result<EventStream, Error>;

    async fn submit_tree_nonces(
        &self,
        batch_id: &str,
        cosigner_pk: PublicKey,
        txid: Txid,
        nonce: PublicNonce,
    ) -> Result<(), Error>;

    async fn submit_tree_signatures(
        &self,
        batch_id: &str,
        cosigner_pk: PublicKey,
        txid: Txid,
        signature: PartialSignature,
    ) -> Result<(), Error>;

    async fn submit_signed_forfeit_txs(&self, forfeit_txs: Vec<Psbt>) -> Result<(), Error>;
}
