use crate::boltz::ws::BoltzWebSocket;
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
use crate::boltz::PairFees;
use crate::boltz::PairLimits;
use crate::boltz::RefundSwapRequest;
use crate::boltz::RefundSwapResponse;
use crate::boltz::SwapFees;
use crate::boltz::SwapLimits;
use crate::boltz::SwapPairInfo;
use crate::boltz::SwapTransactionResponse;
use crate::boltz::SwapUpdate;
use crate::boltz::UpdateStream;
use crate::error::Error;
use crate::swap::SwapStatus;
use async_trait::async_trait;
use backon::ExponentialBuilder;
use backon::Retryable;
use bitcoin::Amount;
use bitcoin::Psbt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const RETRY_MIN_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
const RETRY_MAX_TIMES: usize = 4;

/// HTTP + WebSocket implementation of [`CounterpartyApi`] against a Boltz
/// deployment.
#[derive(Clone)]
pub struct BoltzClient {
    base_url: String,
    http: reqwest::Client,
    ws: Arc<BoltzWebSocket>,
}

impl BoltzClient {
    /// # Arguments
    ///
    /// - `base_url`: e.g. `https://api.boltz.exchange`.
    /// - `ws_url`: e.g. `wss://api.boltz.exchange/v2/ws`.
    pub fn new(base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            ws: Arc::new(BoltzWebSocket::new(ws_url.into())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request, retrying transport failures with exponential backoff.
    /// Application-level rejections come back as errors without retry.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        let op = || async {
            build()
                .send()
                .await
                .map_err(|e| Error::transport(e.to_string()))
        };

        op.retry(
            ExponentialBuilder::default()
                .with_min_delay(RETRY_MIN_DELAY)
                .with_max_delay(RETRY_MAX_DELAY)
                .with_max_times(RETRY_MAX_TIMES),
        )
        .when(|e| matches!(e, Error::Transport(_)))
        .notify(|err: &Error, dur: Duration| {
            tracing::warn!("Retrying counterparty request after {dur:?}. Error: {err}");
        })
        .await
    }

    async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());

            return Err(Error::ad_hoc(format!(
                "counterparty rejected request: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ad_hoc(format!("failed to deserialize counterparty response: {e}")))
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, Error> {
        let url = self.url(path);
        let response = self
            .send_with_retry(|| self.http.post(&url).json(request))
            .await?;

        Self::into_json(response).await
    }

    async fn get_json<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, Error> {
        let url = self.url(path);
        let response = self.send_with_retry(|| self.http.get(&url)).await?;

        Self::into_json(response).await
    }

    /// Extract the BTC↔ARK pair entry from the counterparty's nested pair
    /// listing.
    fn parse_pair(value: &serde_json::Value) -> Result<SwapPairInfo, Error> {
        let pair = value
            .pointer("/BTC/ARK")
            .or_else(|| value.pointer("/ARK/BTC"))
            .ok_or_else(|| Error::ad_hoc("no BTC/ARK pair in counterparty response"))?;

        let limits = PairLimits {
            minimal: Amount::from_sat(
                pair.pointer("/limits/minimal").and_then(|v| v.as_u64()).unwrap_or(0),
            ),
            maximal: Amount::from_sat(
                pair.pointer("/limits/maximal").and_then(|v| v.as_u64()).unwrap_or(0),
            ),
        };

        let percentage = pair
            .pointer("/fees/percentage")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        // Miner fees are a flat number for submarine/reverse pairs and a
        // per-side object for chain pairs.
        let miner_fees = pair
            .pointer("/fees/minerFees")
            .map(|v| match v.as_u64() {
                Some(n) => n,
                None => {
                    let claim = v.pointer("/user/claim").and_then(|v| v.as_u64()).unwrap_or(0);
                    let lockup = v.pointer("/user/lockup").and_then(|v| v.as_u64()).unwrap_or(0);
                    claim + lockup
                }
            })
            .unwrap_or(0);

        Ok(SwapPairInfo {
            fees: PairFees {
                percentage,
                miner_fees: Amount::from_sat(miner_fees),
            },
            limits,
        })
    }

    async fn get_pair_info(&self, path: &str) -> Result<SwapPairInfo, Error> {
        let value: serde_json::Value = self.get_json(path).await?;

        Self::parse_pair(&value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GetSwapStatusResponse {
    status: SwapStatus,
    #[serde(flatten)]
    payload: crate::boltz::UpdatePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubmarinePreimageResponse {
    preimage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubmarineQuoteResponse {
    amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BroadcastTransactionRequest {
    hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BroadcastTransactionResponse {
    id: String,
}

#[async_trait]
impl CounterpartyApi for BoltzClient {
    async fn create_submarine_swap(
        &self,
        request: CreateSubmarineSwapRequest,
    ) -> Result<CreateSubmarineSwapResponse, Error> {
        self.post_json("/v2/swap/submarine", &request).await
    }

    async fn create_reverse_swap(
        &self,
        request: CreateReverseSwapRequest,
    ) -> Result<CreateReverseSwapResponse, Error> {
        self.post_json("/v2/swap/reverse", &request).await
    }

    async fn create_chain_swap(
        &self,
        request: CreateChainSwapRequest,
    ) -> Result<CreateChainSwapResponse, Error> {
        self.post_json("/v2/swap/chain", &request).await
    }

    async fn get_status(&self, swap_id: &str) -> Result<SwapUpdate, Error> {
        let response: GetSwapStatusResponse =
            self.get_json(&format!("/v2/swap/{swap_id}")).await?;

        Ok(SwapUpdate {
            id: swap_id.to_string(),
            status: response.status,
            payload: response.payload,
        })
    }

    async fn get_submarine_preimage(&self, swap_id: &str) -> Result<[u8; 32], Error> {
        let response: SubmarinePreimageResponse = self
            .get_json(&format!("/v2/swap/submarine/{swap_id}/preimage"))
            .await?;

        let bytes = hex::decode(&response.preimage)
            .map_err(|e| Error::ad_hoc(format!("invalid preimage hex: {e}")))?;

        bytes
            .try_into()
            .map_err(|_| Error::ad_hoc("preimage must be 32 bytes"))
    }

    async fn get_reverse_swap_transaction(
        &self,
        swap_id: &str,
    ) -> Result<SwapTransactionResponse, Error> {
        self.get_json(&format!("/v2/swap/reverse/{swap_id}/transaction"))
            .await
    }

    async fn get_submarine_quote(&self, swap_id: &str) -> Result<Amount, Error> {
        let response: SubmarineQuoteResponse = self
            .get_json(&format!("/v2/swap/submarine/{swap_id}/quote"))
            .await?;

        Ok(response.amount)
    }

    async fn refund_submarine_swap(
        &self,
        swap_id: &str,
        refund_tx: &Psbt,
        checkpoint_tx: &Psbt,
    ) -> Result<RefundSwapResponse, Error> {
        let request = RefundSwapRequest {
            transaction: refund_tx.to_string(),
            checkpoint: checkpoint_tx.to_string(),
        };

        let response: RefundSwapResponse = self
            .post_json(&format!("/v2/swap/submarine/{swap_id}/refund/ark"), &request)
            .await?;

        if let Some(error) = response.error.as_deref() {
            return Err(Error::ad_hoc(format!(
                "counterparty refund request failed: {error}"
            )));
        }

        Ok(response)
    }

    async fn get_chain_claim_details(&self, swap_id: &str) -> Result<ChainClaimDetails, Error> {
        self.get_json(&format!("/v2/swap/chain/{swap_id}/claim"))
            .await
    }

    async fn post_chain_claim(
        &self,
        swap_id: &str,
        request: ChainClaimRequest,
    ) -> Result<ChainClaimSignatureData, Error> {
        self.post_json(&format!("/v2/swap/chain/{swap_id}/claim"), &request)
            .await
    }

    async fn broadcast_transaction(&self, currency: &str, tx_hex: &str) -> Result<String, Error> {
        let request = BroadcastTransactionRequest {
            hex: tx_hex.to_string(),
        };

        let response: BroadcastTransactionResponse = self
            .post_json(&format!("/v2/chain/{currency}/transaction"), &request)
            .await?;

        Ok(response.id)
    }

    async fn get_fees(&self) -> Result<SwapFees, Error> {
        let submarine = self.get_pair_info("/v2/swap/submarine").await?;
        let reverse = self.get_pair_info("/v2/swap/reverse").await?;
        let chain = self.get_pair_info("/v2/swap/chain").await?;

        Ok(SwapFees {
            submarine,
            reverse,
            chain,
        })
    }

    async fn get_limits(&self) -> Result<SwapLimits, Error> {
        let fees = self.get_fees().await?;

        Ok(SwapLimits {
            submarine: fees.submarine.limits,
            reverse: fees.reverse.limits,
            chain: fees.chain.limits,
        })
    }

    async fn subscribe_push(&self, swap_id: &str) -> Result<UpdateStream, Error> {
        self.ws.ensure_connected().await?;
        self.ws.subscribe_swap(swap_id)?;

        let mut updates = self.ws.updates();
        let mut connected = self.ws.connected_watch();
        let swap_id = swap_id.to_string();

        let stream = async_stream::stream! {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Ok(update) => {
                            if update.id == swap_id {
                                yield Ok(update);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(swap_id, skipped, "Subscription lagging");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            yield Err(Error::transport("websocket update channel closed"));
                            break;
                        }
                    },
                    result = connected.changed() => {
                        if result.is_err() || !*connected.borrow() {
                            yield Err(Error::transport("websocket disconnected"));
                            break;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, swap_id: &str) -> Result<(), Error> {
        if !self.ws.is_connected() {
            // Nothing to tear down; the subscription died with the socket.
            return Ok(());
        }

        self.ws.unsubscribe_swap(swap_id)
    }

    fn subscribe_poll(&self, swap_id: &str, interval: Duration) -> UpdateStream {
        let client = self.clone();
        let swap_id = swap_id.to_string();

        Box::pin(async_stream::stream! {
            let mut last_status: Option<SwapStatus> = None;

            loop {
                match client.get_status(&swap_id).await {
                    Ok(update) => {
                        // Only yield transitions.
                        if last_status != Some(update.status) {
                            last_status = Some(update.status);
                            yield Ok(update);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }

                tokio::time::sleep(interval).await;
            }
        })
    }
}
