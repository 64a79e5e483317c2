//! The counterparty ("Boltz") client: REST facade, WebSocket subscription
//! and polling fallback.

use crate::error::Error;
use crate::swap::SwapStatus;
use crate::swap::SwapTree;
use crate::swap::TimeoutBlockHeights;
use arkswap_core::ArkAddress;
use async_trait::async_trait;
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::Psbt;
use futures::Stream;
use lightning_invoice::Bolt11Invoice;
use serde::Deserialize;
use serde::Serialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use std::pin::Pin;
use std::time::Duration;

mod http;
mod ws;

pub use http::BoltzClient;

pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<SwapUpdate, Error>> + Send>>;

/// The two settlement domains a swap bridges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Ark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubmarineSwapRequest {
    pub from: Asset,
    pub to: Asset,
    pub invoice: Bolt11Invoice,
    #[serde(rename = "refundPublicKey")]
    pub refund_public_key: PublicKey,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmarineSwapResponse {
    pub id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub address: ArkAddress,
    pub expected_amount: Amount,
    pub claim_public_key: PublicKey,
    pub timeout_block_heights: TimeoutBlockHeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReverseSwapRequest {
    pub from: Asset,
    pub to: Asset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_amount: Option<Amount>,
    pub claim_public_key: PublicKey,
    pub preimage_hash: sha256::Hash,
    /// The generated invoice will expire this many seconds in the future. If
    /// not provided, the counterparty applies its default expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_expiry: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReverseSwapResponse {
    pub id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub lockup_address: ArkAddress,
    pub refund_public_key: PublicKey,
    pub timeout_block_heights: TimeoutBlockHeights,
    pub invoice: Bolt11Invoice,
    pub onchain_amount: Option<Amount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChainSwapRequest {
    pub from: Asset,
    pub to: Asset,
    pub preimage_hash: sha256::Hash,
    pub claim_public_key: PublicKey,
    pub refund_public_key: PublicKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_lock_amount: Option<Amount>,
}

/// One side of a chain swap. The Ark side carries the VHTLC timelocks; the
/// BTC side carries the serialised swap tree. Absent fields stay absent: a
/// missing value is never conflated with an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSwapSide {
    pub lockup_address: String,
    pub amount: Amount,
    pub server_public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_block_heights: Option<TimeoutBlockHeights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_block_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_tree: Option<SwapTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChainSwapResponse {
    pub id: String,
    /// The side we fund.
    pub lockup_details: ChainSwapSide,
    /// The side the counterparty funds and we claim.
    pub claim_details: ChainSwapSide,
}

/// Optional data accompanying a status transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_conf_rejected: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

/// A status transition for one swap, as delivered over the WebSocket or the
/// polling fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapUpdate {
    #[serde(default)]
    pub id: String,
    pub status: SwapStatus,
    #[serde(flatten)]
    pub payload: UpdatePayload,
}

/// The counterparty's record of a swap's settlement transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_block_height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSwapRequest {
    /// Our partially signed refund transaction, base64 PSBT.
    pub transaction: String,
    /// The unsigned checkpoint transaction, base64 PSBT.
    pub checkpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSwapResponse {
    /// The refund transaction with the counterparty's signatures added.
    pub transaction: String,
    /// The checkpoint transaction with the counterparty's signatures added.
    pub checkpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Details of the counterparty's own pending BTC claim, fetched when it asks
/// for a cooperative signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainClaimDetails {
    pub pub_nonce: String,
    pub public_key: PublicKey,
    /// Hex-encoded sighash of the counterparty's claim transaction.
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainClaimSignatureData {
    pub pub_nonce: String,
    pub partial_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainClaimToSign {
    pub pub_nonce: String,
    /// Hex-encoded claim transaction to be co-signed.
    pub transaction: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainClaimRequest {
    /// Hex-encoded preimage.
    pub preimage: String,
    /// Our partial signature over the counterparty's claim, when it asked
    /// for one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<ChainClaimSignatureData>,
    /// Our own claim transaction for the counterparty to co-sign.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_sign: Option<ChainClaimToSign>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairLimits {
    pub minimal: Amount,
    pub maximal: Amount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairFees {
    /// Service fee, percent.
    pub percentage: f64,
    pub miner_fees: Amount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapPairInfo {
    pub fees: PairFees,
    pub limits: PairLimits,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapFees {
    pub submarine: SwapPairInfo,
    pub reverse: SwapPairInfo,
    pub chain: SwapPairInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapLimits {
    pub submarine: PairLimits,
    pub reverse: PairLimits,
    pub chain: PairLimits,
}

/// Facade over the counterparty's REST and WebSocket API.
///
/// Transport errors are retried with exponential backoff by the
/// implementation; application-level rejections are not.
#[async_trait]
pub trait CounterpartyApi: Send + Sync {
    async fn create_submarine_swap(
        &self,
        request: CreateSubmarineSwapRequest,
    ) -> Result<CreateSubmarineSwapResponse, Error>;

    async fn create_reverse_swap(
        &self,
        request: CreateReverseSwapRequest,
    ) -> Result<CreateReverseSwapResponse, Error>;

    async fn create_chain_swap(
        &self,
        request: CreateChainSwapRequest,
    ) -> Result<CreateChainSwapResponse, Error>;

    async fn get_status(&self, swap_id: &str) -> Result<SwapUpdate, Error>;

    /// The preimage revealed by a settled submarine swap.
    async fn get_submarine_preimage(&self, swap_id: &str) -> Result<[u8; 32], Error>;

    /// The settlement transaction of a reverse swap.
    async fn get_reverse_swap_transaction(
        &self,
        swap_id: &str,
    ) -> Result<SwapTransactionResponse, Error>;

    /// A renegotiated quote after a failed lockup.
    async fn get_submarine_quote(&self, swap_id: &str) -> Result<Amount, Error>;

    /// Request the counterparty's partial signatures for a cooperative
    /// refund.
    async fn refund_submarine_swap(
        &self,
        swap_id: &str,
        refund_tx: &Psbt,
        checkpoint_tx: &Psbt,
    ) -> Result<RefundSwapResponse, Error>;

    async fn get_chain_claim_details(&self, swap_id: &str) -> Result<ChainClaimDetails, Error>;

    async fn post_chain_claim(
        &self,
        swap_id: &str,
        request: ChainClaimRequest,
    ) -> Result<ChainClaimSignatureData, Error>;

    /// Relay a raw transaction through the counterparty. Returns the txid.
    async fn broadcast_transaction(&self, currency: &str, tx_hex: &str) -> Result<String, Error>;

    async fn get_fees(&self) -> Result<SwapFees, Error>;

    async fn get_limits(&self) -> Result<SwapLimits, Error>;

    /// Subscribe over the push channel. The stream ends (or yields an error)
    /// when the transport drops; reconnection is the manager's job.
    async fn subscribe_push(&self, swap_id: &str) -> Result<UpdateStream, Error>;

    /// Close the push-channel subscription for a swap that is no longer
    /// monitored.
    async fn unsubscribe(&self, swap_id: &str) -> Result<(), Error>;

    /// Polling fallback: emits a status update whenever the polled status
    /// changes.
    fn subscribe_poll(&self, swap_id: &str, interval: Duration) -> UpdateStream;
}
