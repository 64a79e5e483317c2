//! Swap orchestration between the Ark second layer, the Lightning network
//! and on-chain Bitcoin, through a Boltz-style counterparty.
//!
//! The entry point is [`SwapClient`]. It is generic over its collaborators:
//! the counterparty API, the Ark server provider, the key-holding wallet and
//! the swap repository; each of these is a trait so deployments (and tests)
//! can bring their own transports.

use crate::claim::ArkSpendOutcome;
use crate::claim::ClaimEngine;
use crate::error::ErrorContext;
use arkswap_core::keys::KeyRole;
use arkswap_core::server;
use arkswap_core::ArkAddress;
use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::PublicKey;
use bitcoin::secp256k1::SecretKey;
use bitcoin::Amount;
use bitcoin::XOnlyPublicKey;
use lightning_invoice::Bolt11Invoice;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub mod ark;
pub mod boltz;
pub mod claim;
pub mod error;
pub mod events;
pub mod storage;
pub mod wallet;

mod chain;
mod config;
mod lifecycle;
mod manager;
mod recover;
mod swap;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SwapConfig;
pub use error::Error;
pub use events::SwapAction;
pub use events::SwapCompletion;
pub use events::SwapEvent;
pub use lightning_invoice;
pub use manager::SwapManager;
pub use manager::SwapStats;
pub use storage::InMemorySwapRepository;
pub use storage::SwapRepository;
#[cfg(feature = "sqlite")]
pub use storage::SqliteSwapRepository;
pub use swap::BtcSideDetails;
pub use swap::ChainSwapData;
pub use swap::ChainSwapDirection;
pub use swap::ReverseSwapData;
pub use swap::SubmarineSwapData;
pub use swap::Swap;
pub use swap::SwapFilter;
pub use swap::SwapKind;
pub use swap::SwapOrder;
pub use swap::SwapStatus;
pub use swap::SwapTree;
pub use swap::SwapTreeLeaf;
pub use swap::TimeoutBlockHeights;

use crate::ark::ArkProvider;
use crate::boltz::Asset;
use crate::boltz::CounterpartyApi;
use crate::boltz::CreateChainSwapRequest;
use crate::boltz::CreateReverseSwapRequest;
use crate::boltz::CreateSubmarineSwapRequest;
use crate::boltz::SwapFees;
use crate::boltz::SwapLimits;
use crate::boltz::SwapUpdate;
use crate::wallet::SwapWallet;

/// The result of [`SwapClient::create_lightning_invoice`].
#[derive(Debug, Clone)]
pub struct LightningInvoiceResult {
    pub invoice: Bolt11Invoice,
    pub payment_hash: sha256::Hash,
    pub preimage: [u8; 32],
    /// Amount we will receive on Ark.
    pub amount: Amount,
    /// Invoice expiry, seconds from creation.
    pub expiry_secs: u64,
    pub swap: Swap,
}

/// The result of [`SwapClient::send_lightning_payment`].
#[derive(Debug, Clone)]
pub struct LightningPaymentResult {
    pub amount: Amount,
    /// Preimage revealed by the counterparty when it claimed our VHTLC.
    pub preimage: [u8; 32],
    /// The Ark transaction that funded the lockup.
    pub funding_txid: String,
}

/// The swap orchestration engine.
pub struct SwapClient<C, A, W, R> {
    counterparty: Arc<C>,
    wallet: Arc<W>,
    repo: Arc<R>,
    engine: Arc<ClaimEngine<C, A, W>>,
    manager: Arc<SwapManager<C, A, W, R>>,
    server_info: server::Info,
}

impl<C, A, W, R> SwapClient<C, A, W, R>
where
    C: CounterpartyApi + 'static,
    A: ArkProvider + 'static,
    W: SwapWallet + 'static,
    R: SwapRepository + 'static,
{
    pub fn new(
        counterparty: Arc<C>,
        ark: Arc<A>,
        wallet: Arc<W>,
        repo: Arc<R>,
        server_info: server::Info,
        config: SwapConfig,
    ) -> Self {
        let engine = Arc::new(ClaimEngine::new(
            Arc::clone(&counterparty),
            ark,
            Arc::clone(&wallet),
            server_info.clone(),
            config,
        ));

        let manager = Arc::new(SwapManager::new(Arc::clone(&engine), Arc::clone(&repo)));

        Self {
            counterparty,
            wallet,
            repo,
            engine,
            manager,
            server_info,
        }
    }

    /// Load every swap from storage and register the non-final ones for
    /// monitoring. Call once at startup.
    pub async fn start(&self) -> Result<(), Error> {
        let swaps = self
            .repo
            .get_all(&SwapFilter::all())
            .await
            .context("failed to load swaps at startup")?;

        let pending = swaps.len();
        self.manager.start(swaps);

        tracing::info!(pending, "Swap engine started");

        Ok(())
    }

    /// Cancel all subscriptions and resolve all in-flight waiters with
    /// [`Error::Cancelled`].
    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Subscribe to fleet-wide swap events.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<SwapEvent> {
        self.manager.subscribe()
    }

    pub fn manager(&self) -> &Arc<SwapManager<C, A, W, R>> {
        &self.manager
    }

    fn now() -> Result<u64, Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::ad_hoc(format!("failed to compute created_at: {e}")))?;

        Ok(now.as_secs())
    }

    fn normalize(&self, role: KeyRole, pk: &PublicKey) -> Result<XOnlyPublicKey, Error> {
        arkswap_core::keys::to_x_only(role, &pk.serialize()).map_err(Error::from)
    }

    // Receive from Lightning.

    /// Create a Lightning invoice whose settlement delivers funds to the
    /// wallet's Ark address, via a reverse submarine swap.
    pub async fn create_lightning_invoice(
        &self,
        amount: Amount,
        description: Option<String>,
    ) -> Result<LightningInvoiceResult, Error> {
        if amount == Amount::ZERO {
            return Err(Error::ad_hoc("Amount must be greater than 0"));
        }

        let preimage: [u8; 32] = rand::random();
        let preimage_hash_sha256 = sha256::Hash::hash(&preimage);
        let preimage_hash = ripemd160::Hash::hash(preimage_hash_sha256.as_byte_array());

        let claim_public_key = self.wallet.compressed_public_key()?;

        let response = self
            .counterparty
            .create_reverse_swap(CreateReverseSwapRequest {
                from: Asset::Btc,
                to: Asset::Ark,
                invoice_amount: Some(amount),
                onchain_amount: None,
                claim_public_key,
                preimage_hash: preimage_hash_sha256,
                invoice_expiry: None,
                description,
            })
            .await
            .context("failed to create reverse swap")?;

        // The invoice must commit to our preimage, and the lockup address to
        // our VHTLC. Either failing aborts before anything is persisted.
        if *response.invoice.payment_hash() != preimage_hash_sha256 {
            return Err(Error::ad_hoc(
                "counterparty invoice does not commit to our preimage",
            ));
        }

        let vhtlc = self.engine.build_vhtlc(
            self.normalize(KeyRole::Sender, &response.refund_public_key)?,
            self.normalize(KeyRole::Receiver, &claim_public_key)?,
            preimage_hash,
            &response.timeout_block_heights,
        )?;

        ClaimEngine::<C, A, W>::ensure_lockup_address(&vhtlc, &response.lockup_address)?;

        let swap_amount = response.onchain_amount.unwrap_or(amount);
        let expiry_secs = response.invoice.expiry_time().as_secs();

        let swap = Swap::Reverse(ReverseSwapData {
            id: response.id.clone(),
            status: SwapKind::Reverse.initial_status(),
            created_at: Self::now()?,
            preimage,
            preimage_hash,
            claim_public_key,
            refund_public_key: response.refund_public_key,
            amount: swap_amount,
            timeout_block_heights: response.timeout_block_heights,
            lockup_address: response.lockup_address,
            invoice: response.invoice.clone(),
        });

        self.repo
            .save(&swap)
            .await
            .context("failed to persist reverse swap")?;

        self.manager.add_swap(swap.clone())?;

        tracing::info!(
            swap_id = response.id,
            %swap_amount,
            "Created Lightning invoice"
        );

        Ok(LightningInvoiceResult {
            invoice: response.invoice,
            payment_hash: preimage_hash_sha256,
            preimage,
            amount: swap_amount,
            expiry_secs,
            swap,
        })
    }

    // Send to Lightning.

    /// Pay a BOLT11 invoice by funding a submarine swap with VTXOs, then
    /// waiting for the counterparty to settle it.
    pub async fn send_lightning_payment(
        &self,
        invoice: Bolt11Invoice,
        _max_fee: Option<Amount>,
    ) -> Result<LightningPaymentResult, Error> {
        let refund_public_key = self.wallet.compressed_public_key()?;

        let payment_hash = *invoice.payment_hash();
        let preimage_hash = ripemd160::Hash::hash(payment_hash.as_byte_array());

        let response = self
            .counterparty
            .create_submarine_swap(CreateSubmarineSwapRequest {
                from: Asset::Ark,
                to: Asset::Btc,
                invoice: invoice.clone(),
                refund_public_key,
            })
            .await
            .context("failed to create submarine swap")?;

        let vhtlc = self.engine.build_vhtlc(
            self.normalize(KeyRole::Sender, &refund_public_key)?,
            self.normalize(KeyRole::Receiver, &response.claim_public_key)?,
            preimage_hash,
            &response.timeout_block_heights,
        )?;

        ClaimEngine::<C, A, W>::ensure_lockup_address(&vhtlc, &response.address)?;

        let swap = Swap::Submarine(SubmarineSwapData {
            id: response.id.clone(),
            status: SwapKind::Submarine.initial_status(),
            created_at: Self::now()?,
            preimage_hash,
            refund_public_key,
            claim_public_key: response.claim_public_key,
            amount: response.expected_amount,
            timeout_block_heights: response.timeout_block_heights,
            lockup_address: response.address,
            invoice,
            refunded: false,
            refundable: false,
        });

        self.repo
            .save(&swap)
            .await
            .context("failed to persist submarine swap")?;

        self.manager.add_swap(swap)?;

        let funding_txid = self
            .wallet
            .send_bitcoin(&response.address, response.expected_amount)
            .await
            .context("failed to fund VHTLC")?;

        tracing::info!(
            swap_id = response.id,
            %funding_txid,
            amount = %response.expected_amount,
            "Funded VHTLC"
        );

        let completion = self.manager.wait_for_completion(&response.id).await?;

        let preimage = completion.preimage.ok_or_else(|| Error::ad_hoc(
            "submarine swap completed without revealing a preimage",
        ))?;

        if sha256::Hash::hash(&preimage) != payment_hash {
            return Err(Error::ad_hoc(format!(
                "revealed preimage {} does not match the invoice payment hash",
                preimage.to_lower_hex_string()
            )));
        }

        Ok(LightningPaymentResult {
            amount: response.expected_amount,
            preimage,
            funding_txid: funding_txid.to_string(),
        })
    }

    // Chain swaps.

    /// Move VTXOs to an on-chain BTC address via a chain swap.
    pub async fn ark_to_btc(
        &self,
        to_address: &str,
        amount: Amount,
        fee_sats_per_vb: Option<u64>,
    ) -> Result<Swap, Error> {
        if amount == Amount::ZERO {
            return Err(Error::ad_hoc("Amount must be greater than 0"));
        }

        let btc_address = bitcoin::Address::from_str(to_address)
            .ok()
            .and_then(|a| a.require_network(self.server_info.network).ok())
            .ok_or_else(|| Error::ad_hoc("Invalid BTC address"))?;

        let ephemeral_key = SecretKey::new(&mut rand::thread_rng());
        let secp = bitcoin::key::Secp256k1::new();
        let ephemeral_pk = ephemeral_key.public_key(&secp);

        let preimage: [u8; 32] = rand::random();
        let preimage_hash_sha256 = sha256::Hash::hash(&preimage);
        let preimage_hash = ripemd160::Hash::hash(preimage_hash_sha256.as_byte_array());

        let ark_public_key = self.wallet.compressed_public_key()?;

        let response = self
            .counterparty
            .create_chain_swap(CreateChainSwapRequest {
                from: Asset::Ark,
                to: Asset::Btc,
                preimage_hash: preimage_hash_sha256,
                claim_public_key: ephemeral_pk,
                refund_public_key: ark_public_key,
                user_lock_amount: Some(amount),
            })
            .await
            .context("failed to create chain swap")?;

        let ark_side = &response.lockup_details;
        let btc_side = &response.claim_details;

        let timeouts = ark_side.timeout_block_heights.ok_or_else(|| {
            Error::ad_hoc("chain swap response is missing Ark-side timelocks")
        })?;
        let swap_tree = btc_side
            .swap_tree
            .clone()
            .ok_or_else(|| Error::ad_hoc("chain swap response is missing the BTC swap tree"))?;
        let btc_timeout = btc_side.timeout_block_height.ok_or_else(|| {
            Error::ad_hoc("chain swap response is missing the BTC timeout height")
        })?;

        let ark_lockup_address = ArkAddress::decode(&ark_side.lockup_address)
            .map_err(|e| Error::ad_hoc(format!("invalid Ark lockup address: {e}")))?;

        // We are the sender on the Ark side; the counterparty claims it with
        // the preimage once we have claimed the BTC side.
        let vhtlc = self.engine.build_vhtlc(
            self.normalize(KeyRole::Sender, &ark_public_key)?,
            self.normalize(KeyRole::Receiver, &ark_side.server_public_key)?,
            preimage_hash,
            &timeouts,
        )?;

        ClaimEngine::<C, A, W>::ensure_lockup_address(&vhtlc, &ark_lockup_address)?;

        let swap = Swap::Chain(ChainSwapData {
            id: response.id.clone(),
            status: SwapKind::Chain.initial_status(),
            created_at: Self::now()?,
            direction: ChainSwapDirection::ArkToBtc,
            preimage,
            preimage_hash,
            ephemeral_key,
            to_address: btc_address.to_string(),
            amount: btc_side.amount,
            ark_public_key,
            ark_counterparty_public_key: ark_side.server_public_key,
            ark_lockup_address,
            ark_amount: ark_side.amount,
            timeout_block_heights: timeouts,
            btc: BtcSideDetails {
                counterparty_public_key: btc_side.server_public_key,
                swap_tree,
                lockup_address: btc_side.lockup_address.clone(),
                timeout_block_height: btc_timeout,
                amount: btc_side.amount,
            },
            fee_rate_sat_per_vb: fee_sats_per_vb,
            refunded: false,
            refundable: false,
        });

        self.repo
            .save(&swap)
            .await
            .context("failed to persist chain swap")?;

        self.manager.add_swap(swap)?;

        let funding_txid = self
            .wallet
            .send_bitcoin(&ark_lockup_address, ark_side.amount)
            .await
            .context("failed to fund Ark-side lockup")?;

        tracing::info!(
            swap_id = response.id,
            %funding_txid,
            amount = %ark_side.amount,
            "Funded Ark-side lockup"
        );

        self.manager.wait_for_completion(&response.id).await?;

        self.reload(&response.id).await
    }

    /// Receive on-chain BTC into an Ark address via a chain swap.
    ///
    /// `on_address_generated` is invoked with the BTC lockup address the
    /// caller must fund.
    pub async fn btc_to_ark(
        &self,
        to_address: &str,
        amount: Amount,
        fee_sats_per_vb: Option<u64>,
        on_address_generated: impl FnOnce(&str),
    ) -> Result<Swap, Error> {
        if amount == Amount::ZERO {
            return Err(Error::ad_hoc("Amount must be greater than 0"));
        }

        let ark_destination =
            ArkAddress::decode(to_address).map_err(|_| Error::ad_hoc("Invalid Ark address"))?;

        let ephemeral_key = SecretKey::new(&mut rand::thread_rng());
        let secp = bitcoin::key::Secp256k1::new();
        let ephemeral_pk = ephemeral_key.public_key(&secp);

        let preimage: [u8; 32] = rand::random();
        let preimage_hash_sha256 = sha256::Hash::hash(&preimage);
        let preimage_hash = ripemd160::Hash::hash(preimage_hash_sha256.as_byte_array());

        let ark_public_key = self.wallet.compressed_public_key()?;

        let response = self
            .counterparty
            .create_chain_swap(CreateChainSwapRequest {
                from: Asset::Btc,
                to: Asset::Ark,
                preimage_hash: preimage_hash_sha256,
                claim_public_key: ark_public_key,
                refund_public_key: ephemeral_pk,
                user_lock_amount: Some(amount),
            })
            .await
            .context("failed to create chain swap")?;

        let btc_side = &response.lockup_details;
        let ark_side = &response.claim_details;

        let timeouts = ark_side.timeout_block_heights.ok_or_else(|| {
            Error::ad_hoc("chain swap response is missing Ark-side timelocks")
        })?;
        let swap_tree = btc_side
            .swap_tree
            .clone()
            .ok_or_else(|| Error::ad_hoc("chain swap response is missing the BTC swap tree"))?;
        let btc_timeout = btc_side.timeout_block_height.ok_or_else(|| {
            Error::ad_hoc("chain swap response is missing the BTC timeout height")
        })?;

        let ark_lockup_address = ArkAddress::decode(&ark_side.lockup_address)
            .map_err(|e| Error::ad_hoc(format!("invalid Ark lockup address: {e}")))?;

        // The counterparty is the sender on the Ark side; we claim it with
        // the preimage once the BTC side is locked.
        let vhtlc = self.engine.build_vhtlc(
            self.normalize(KeyRole::Sender, &ark_side.server_public_key)?,
            self.normalize(KeyRole::Receiver, &ark_public_key)?,
            preimage_hash,
            &timeouts,
        )?;

        ClaimEngine::<C, A, W>::ensure_lockup_address(&vhtlc, &ark_lockup_address)?;

        let swap = Swap::Chain(ChainSwapData {
            id: response.id.clone(),
            status: SwapKind::Chain.initial_status(),
            created_at: Self::now()?,
            direction: ChainSwapDirection::BtcToArk,
            preimage,
            preimage_hash,
            ephemeral_key,
            to_address: ark_destination.encode(),
            amount: ark_side.amount,
            ark_public_key,
            ark_counterparty_public_key: ark_side.server_public_key,
            ark_lockup_address,
            ark_amount: ark_side.amount,
            timeout_block_heights: timeouts,
            btc: BtcSideDetails {
                counterparty_public_key: btc_side.server_public_key,
                swap_tree,
                lockup_address: btc_side.lockup_address.clone(),
                timeout_block_height: btc_timeout,
                amount: btc_side.amount,
            },
            fee_rate_sat_per_vb: fee_sats_per_vb,
            refunded: false,
            refundable: false,
        });

        self.repo
            .save(&swap)
            .await
            .context("failed to persist chain swap")?;

        self.manager.add_swap(swap)?;

        on_address_generated(&btc_side.lockup_address);

        self.manager.wait_for_completion(&response.id).await?;

        self.reload(&response.id).await
    }

    // Refunds.

    /// Run the refund path for a failed submarine or chain swap.
    pub async fn refund_swap(&self, swap_id: &str) -> Result<ArkSpendOutcome, Error> {
        let swap = self
            .repo
            .get(swap_id)
            .await?
            .ok_or_else(|| Error::ad_hoc(format!("swap not found: {swap_id}")))?;

        let outcome = match &swap {
            Swap::Submarine(data) => {
                if data.refunded {
                    return Err(Error::ad_hoc(format!("swap already refunded: {swap_id}")));
                }

                let vhtlc = self.engine.vhtlc_for_submarine(data)?;
                let counterparty_key =
                    self.normalize(KeyRole::Counterparty, &data.claim_public_key)?;

                self.engine
                    .refund_ark(swap_id, &vhtlc, &data.lockup_address, counterparty_key)
                    .await?
            }
            Swap::Chain(data) => {
                if data.refunded {
                    return Err(Error::ad_hoc(format!("swap already refunded: {swap_id}")));
                }

                if data.direction != ChainSwapDirection::ArkToBtc {
                    return Err(Error::ad_hoc(
                        "only the Ark side of a chain swap can be refunded here",
                    ));
                }

                let vhtlc = self.engine.vhtlc_for_chain(data)?;
                let counterparty_key =
                    self.normalize(KeyRole::Counterparty, &data.ark_counterparty_public_key)?;

                self.engine
                    .refund_ark(swap_id, &vhtlc, &data.ark_lockup_address, counterparty_key)
                    .await?
            }
            Swap::Reverse(_) => {
                return Err(Error::ad_hoc(
                    "reverse swaps lock no funds of ours; nothing to refund",
                ));
            }
        };

        let mut swap = swap;
        swap.set_status(SwapStatus::TransactionRefunded);
        swap.set_refunded(true);
        swap.set_refundable(false);

        self.repo
            .save(&swap)
            .await
            .context("failed to persist refund")?;

        Ok(outcome)
    }

    // Queries.

    pub async fn get_fees(&self) -> Result<SwapFees, Error> {
        self.counterparty.get_fees().await
    }

    pub async fn get_limits(&self) -> Result<SwapLimits, Error> {
        self.counterparty.get_limits().await
    }

    pub async fn get_swap_status(&self, swap_id: &str) -> Result<SwapUpdate, Error> {
        self.counterparty.get_status(swap_id).await
    }

    pub async fn get_pending_reverse_swaps(&self) -> Result<Vec<Swap>, Error> {
        self.pending_of_kind(SwapKind::Reverse).await
    }

    pub async fn get_pending_submarine_swaps(&self) -> Result<Vec<Swap>, Error> {
        self.pending_of_kind(SwapKind::Submarine).await
    }

    pub async fn get_pending_chain_swaps(&self) -> Result<Vec<Swap>, Error> {
        self.pending_of_kind(SwapKind::Chain).await
    }

    async fn pending_of_kind(&self, kind: SwapKind) -> Result<Vec<Swap>, Error> {
        self.repo
            .get_all(&SwapFilter::by_kind_and_status(kind, kind.initial_status()))
            .await
    }

    /// All swaps, newest first.
    pub async fn get_swap_history(&self) -> Result<Vec<Swap>, Error> {
        self.repo
            .get_all(&SwapFilter::all().ordered(SwapOrder::CreatedAtDesc))
            .await
    }

    /// Best-effort re-sync of every non-final swap from the counterparty.
    pub async fn refresh_swaps_status(&self) -> Result<(), Error> {
        let swaps = self.repo.get_all(&SwapFilter::all()).await?;

        for mut swap in swaps {
            if swap.is_final() {
                continue;
            }

            match self.counterparty.get_status(swap.id()).await {
                Ok(update) => {
                    if update.status != swap.status() {
                        tracing::debug!(
                            swap_id = swap.id(),
                            old = %swap.status(),
                            new = %update.status,
                            "Refreshed swap status"
                        );

                        swap.set_status(update.status);
                        self.repo.save(&swap).await?;
                    }
                }
                Err(e) => {
                    tracing::warn!(swap_id = swap.id(), "Status refresh failed: {e}");
                }
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> SwapStats {
        self.manager.stats()
    }

    async fn reload(&self, swap_id: &str) -> Result<Swap, Error> {
        self.repo
            .get(swap_id)
            .await?
            .ok_or_else(|| Error::ad_hoc(format!("swap disappeared from storage: {swap_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::test_fixtures;
    use crate::test_support::build_invoice;
    use crate::test_support::keypair;
    use crate::test_support::MockArk;
    use crate::test_support::MockCounterparty;
    use crate::test_support::MockWallet;
    use crate::test_support::NETWORK;
    use bitcoin::Sequence;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    type TestClient = SwapClient<MockCounterparty, MockArk, MockWallet, InMemorySwapRepository>;

    struct Harness {
        client: TestClient,
        counterparty: Arc<MockCounterparty>,
        ark: Arc<MockArk>,
        wallet: Arc<MockWallet>,
        repo: Arc<InMemorySwapRepository>,
    }

    fn harness_with(corrupt_lockup_address: bool) -> Harness {
        let server_kp = keypair(0x03);
        let boltz_kp = keypair(0x02);
        let wallet_kp = keypair(0x01);

        let server_pk = server_kp.x_only_public_key().0;

        let mut counterparty = MockCounterparty::new(boltz_kp, server_pk);
        counterparty.corrupt_lockup_address = corrupt_lockup_address;
        let counterparty = Arc::new(counterparty);

        let ark = Arc::new(MockArk::new(server_kp, Amount::from_sat(100_000)));
        let wallet = Arc::new(MockWallet::new(wallet_kp, server_pk));
        let repo = Arc::new(InMemorySwapRepository::new());

        let server_info = server::Info {
            signer_pk: server_kp.public_key(),
            network: NETWORK,
            dust: Amount::from_sat(546),
            unilateral_exit_delay: Sequence::from_height(144),
            forfeit_address: None,
        };

        let client = SwapClient::new(
            Arc::clone(&counterparty),
            Arc::clone(&ark),
            Arc::clone(&wallet),
            Arc::clone(&repo),
            server_info,
            SwapConfig::default(),
        );

        Harness {
            client,
            counterparty,
            ark,
            wallet,
            repo,
        }
    }

    fn harness() -> Harness {
        harness_with(false)
    }

    #[tokio::test]
    async fn create_lightning_invoice_rejects_zero_amount() {
        let h = harness();

        let err = h
            .client
            .create_lightning_invoice(Amount::ZERO, None)
            .await
            .expect_err("must reject");

        assert!(err.to_string().contains("Amount must be greater than 0"));
    }

    #[tokio::test]
    async fn ark_to_btc_rejects_invalid_btc_address() {
        let h = harness();

        for address in ["", "not-an-address", "tark1qqellv77"] {
            let err = h
                .client
                .ark_to_btc(address, Amount::from_sat(10_000), None)
                .await
                .expect_err("must reject");

            assert!(err.to_string().contains("Invalid BTC address"));
        }
    }

    #[tokio::test]
    async fn btc_to_ark_rejects_invalid_ark_address() {
        let h = harness();

        let err = h
            .client
            .btc_to_ark(
                "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080",
                Amount::from_sat(10_000),
                None,
                |_| {},
            )
            .await
            .expect_err("must reject");

        assert!(err.to_string().contains("Invalid Ark address"));
    }

    #[tokio::test]
    async fn lockup_address_mismatch_aborts_before_anything_is_persisted() {
        let h = harness_with(true);

        let err = h
            .client
            .create_lightning_invoice(Amount::from_sat(2_100), None)
            .await
            .expect_err("must reject");

        assert!(matches!(err, Error::LockupAddressMismatch { .. }));
        assert!(err.is_integrity());

        // No pending-swap record, no monitoring, no wallet involvement.
        assert!(h.repo.get_all(&SwapFilter::all()).await.unwrap().is_empty());
        assert_eq!(h.client.stats().tracked, 0);
        assert!(h.wallet.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_lightning_invoice_persists_a_pending_swap() {
        let h = harness();

        let result = h
            .client
            .create_lightning_invoice(Amount::from_sat(2_100), None)
            .await
            .expect("invoice created");

        assert_eq!(result.payment_hash, sha256::Hash::hash(&result.preimage));
        assert_eq!(*result.invoice.payment_hash(), result.payment_hash);

        let swaps = h.repo.get_all(&SwapFilter::all()).await.unwrap();
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].status(), SwapStatus::Created);

        match &swaps[0] {
            Swap::Reverse(data) => {
                let expected =
                    ripemd160::Hash::hash(sha256::Hash::hash(&data.preimage).as_byte_array());
                assert_eq!(data.preimage_hash, expected);
            }
            Swap::Submarine(_) | Swap::Chain(_) => panic!("wrong swap kind"),
        }

        assert!(h.client.manager().has_swap(swaps[0].id()));
    }

    #[tokio::test]
    async fn reverse_swap_happy_path_claims_exactly_once() {
        let h = harness();

        h.counterparty.script([
            SwapStatus::TransactionMempool,
            SwapStatus::TransactionConfirmed,
            // The counterparty may repeat a status; only one claim may come
            // out of it.
            SwapStatus::TransactionConfirmed,
            SwapStatus::InvoiceSettled,
        ]);
        *h.counterparty.settlement.lock().unwrap() = Some(crate::boltz::SwapTransactionResponse {
            id: Some("settlement-txid".to_string()),
            hex: None,
            timeout_block_height: None,
        });

        let result = h
            .client
            .create_lightning_invoice(Amount::from_sat(2_100), None)
            .await
            .expect("invoice created");

        let completion = h
            .client
            .manager()
            .wait_for_completion(result.swap.id())
            .await
            .expect("swap completes");

        assert_eq!(completion.status, SwapStatus::InvoiceSettled);
        assert_eq!(completion.txid.as_deref(), Some("settlement-txid"));
        assert_eq!(completion.preimage, Some(result.preimage));

        // Exactly one claim submission and one finalization.
        assert_eq!(h.ark.submitted.load(Ordering::SeqCst), 1);
        assert_eq!(h.ark.finalized.lock().unwrap().len(), 1);

        let swap = h.repo.get(result.swap.id()).await.unwrap().unwrap();
        assert_eq!(swap.status(), SwapStatus::InvoiceSettled);
        assert!(swap.is_final());
    }

    #[tokio::test]
    async fn reverse_swap_settlement_with_empty_txid_fails() {
        let h = harness();

        h.counterparty.script([SwapStatus::InvoiceSettled]);
        *h.counterparty.settlement.lock().unwrap() = Some(crate::boltz::SwapTransactionResponse {
            id: Some(String::new()),
            hex: None,
            timeout_block_height: None,
        });

        let result = h
            .client
            .create_lightning_invoice(Amount::from_sat(2_100), None)
            .await
            .expect("invoice created");

        let err = h
            .client
            .manager()
            .wait_for_completion(result.swap.id())
            .await
            .expect_err("must fail");

        assert!(matches!(err, Error::SwapSettlementMissingTxid { .. }));
    }

    #[tokio::test]
    async fn send_lightning_payment_resolves_with_the_revealed_preimage() {
        let h = harness();

        let preimage = [0x5au8; 32];
        let payment_hash = sha256::Hash::hash(&preimage);
        let invoice = build_invoice(payment_hash, Amount::from_sat(100_000));

        *h.counterparty.initial_status.lock().unwrap() = SwapStatus::InvoiceSet;
        *h.counterparty.revealed_preimage.lock().unwrap() = Some(preimage);
        h.counterparty.script([
            SwapStatus::TransactionMempool,
            SwapStatus::TransactionClaimed,
        ]);

        let result = h
            .client
            .send_lightning_payment(invoice, None)
            .await
            .expect("payment settles");

        assert_eq!(result.preimage, preimage);
        assert_eq!(sha256::Hash::hash(&result.preimage), payment_hash);

        // The wallet funded the VHTLC with the expected amount.
        let sent = h.wallet.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, result.amount);
    }

    #[tokio::test]
    async fn failed_payment_is_refundable_and_the_refund_completes() {
        let h = harness();

        let preimage = [0x77u8; 32];
        let invoice = build_invoice(sha256::Hash::hash(&preimage), Amount::from_sat(100_000));

        *h.counterparty.initial_status.lock().unwrap() = SwapStatus::InvoiceSet;
        h.counterparty.script([SwapStatus::InvoiceFailedToPay]);

        let err = h
            .client
            .send_lightning_payment(invoice, None)
            .await
            .expect_err("payment fails");

        assert!(matches!(
            err,
            Error::InvoiceFailedToPay {
                refundable: true,
                ..
            }
        ));
        assert!(err.refundable());

        let swaps = h.repo.get_all(&SwapFilter::all()).await.unwrap();
        assert_eq!(swaps.len(), 1);
        let swap_id = swaps[0].id().to_string();

        match &swaps[0] {
            Swap::Submarine(data) => assert!(data.refundable),
            Swap::Reverse(_) | Swap::Chain(_) => panic!("wrong swap kind"),
        }

        // The caller invokes the refund path; it runs the cooperative
        // three-party refund against the mock counterparty and Ark server.
        let outcome = h.client.refund_swap(&swap_id).await.expect("refund works");
        assert_eq!(outcome.amount, Amount::from_sat(100_000));

        let swap = h.repo.get(&swap_id).await.unwrap().unwrap();
        assert_eq!(swap.status(), SwapStatus::TransactionRefunded);
        match &swap {
            Swap::Submarine(data) => {
                assert!(data.refunded);
                assert!(!data.refundable);
            }
            Swap::Reverse(_) | Swap::Chain(_) => panic!("wrong swap kind"),
        }

        // The refund transaction went through the Ark server once.
        assert_eq!(h.ark.submitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_monitors_pending_swaps_but_not_final_ones() {
        let h = harness();

        // One in-flight reverse swap and one already-settled one.
        let pending = test_fixtures::reverse_swap("pending-1", 100);
        let mut done = test_fixtures::reverse_swap("done-1", 50);
        done.status = SwapStatus::InvoiceSettled;

        h.repo.save(&Swap::Reverse(pending)).await.unwrap();
        h.repo.save(&Swap::Reverse(done)).await.unwrap();

        h.counterparty.script([SwapStatus::InvoiceSettled]);
        *h.counterparty.settlement.lock().unwrap() = Some(crate::boltz::SwapTransactionResponse {
            id: Some("late-settlement".to_string()),
            hex: None,
            timeout_block_height: None,
        });

        h.client.start().await.unwrap();

        assert!(h.client.manager().has_swap("pending-1"));
        assert!(!h.client.manager().has_swap("done-1"));

        let completion = h
            .client
            .manager()
            .wait_for_completion("pending-1")
            .await
            .expect("pending swap completes after restart");

        assert_eq!(completion.txid.as_deref(), Some("late-settlement"));
    }

    #[tokio::test]
    async fn remove_swap_cancels_waiters() {
        let h = harness();

        // No scripted updates: the subscription stays open forever.
        let pending = test_fixtures::reverse_swap("pending-1", 100);
        h.repo.save(&Swap::Reverse(pending)).await.unwrap();
        h.client.start().await.unwrap();

        let manager = Arc::clone(h.client.manager());
        let waiter =
            tokio::spawn(async move { manager.wait_for_completion("pending-1").await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.client.manager().remove_swap("pending-1");

        let result = waiter.await.expect("waiter task finishes");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!h.client.manager().has_swap("pending-1"));

        // The counterparty-side subscription is closed as well.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h
            .counterparty
            .unsubscribed
            .lock()
            .unwrap()
            .contains(&"pending-1".to_string()));
    }

    #[tokio::test]
    async fn stop_cancels_everything() {
        let h = harness();

        let pending = test_fixtures::reverse_swap("pending-1", 100);
        h.repo.save(&Swap::Reverse(pending)).await.unwrap();
        h.client.start().await.unwrap();

        let manager = Arc::clone(h.client.manager());
        let waiter =
            tokio::spawn(async move { manager.wait_for_completion("pending-1").await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.client.stop();

        let result = waiter.await.expect("waiter task finishes");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!h.client.manager().is_processing());

        // The counterparty-side subscription is closed as well.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h
            .counterparty
            .unsubscribed
            .lock()
            .unwrap()
            .contains(&"pending-1".to_string()));

        // New swaps are rejected after stop.
        let swap = Swap::Reverse(test_fixtures::reverse_swap("late", 1));
        assert!(matches!(
            h.client.manager().add_swap(swap),
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn swap_history_is_newest_first() {
        let h = harness();

        h.repo
            .save(&Swap::Reverse(test_fixtures::reverse_swap("old", 100)))
            .await
            .unwrap();
        h.repo
            .save(&Swap::Submarine(test_fixtures::submarine_swap("new", 300)))
            .await
            .unwrap();

        let history = h.client.get_swap_history().await.unwrap();
        let ids = history.iter().map(|s| s.id()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn pending_getters_filter_by_kind_and_initial_status() {
        let h = harness();

        h.repo
            .save(&Swap::Reverse(test_fixtures::reverse_swap("r-1", 100)))
            .await
            .unwrap();
        h.repo
            .save(&Swap::Submarine(test_fixtures::submarine_swap("s-1", 200)))
            .await
            .unwrap();

        let mut settled = test_fixtures::reverse_swap("r-2", 300);
        settled.status = SwapStatus::InvoiceSettled;
        h.repo.save(&Swap::Reverse(settled)).await.unwrap();

        let reverse = h.client.get_pending_reverse_swaps().await.unwrap();
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].id(), "r-1");

        let submarine = h.client.get_pending_submarine_swaps().await.unwrap();
        assert_eq!(submarine.len(), 1);
        assert_eq!(submarine[0].id(), "s-1");

        assert!(h.client.get_pending_chain_swaps().await.unwrap().is_empty());
    }
}
