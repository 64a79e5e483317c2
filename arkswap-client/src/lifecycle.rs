//! The per-swap lifecycle state machine.
//!
//! One instance runs per swap, consuming the counterparty's status stream in
//! arrival order. Each transition is persisted before any action runs, and
//! claim dispatch is guarded by a started flag so that a duplicated status
//! can never produce a second claim submission.

use crate::ark::ArkProvider;
use crate::boltz::CounterpartyApi;
use crate::boltz::SwapUpdate;
use crate::claim::ClaimEngine;
use crate::error::Error;
use crate::error::ErrorContext;
use crate::events::SwapAction;
use crate::events::SwapCompletion;
use crate::events::SwapEvent;
use crate::storage::SwapRepository;
use crate::swap::ChainSwapDirection;
use crate::swap::Swap;
use crate::swap::SwapStatus;
use crate::wallet::SwapWallet;
use bitcoin::hex::DisplayHex;
use futures::Stream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) struct Lifecycle<C, A, W, R> {
    pub engine: Arc<ClaimEngine<C, A, W>>,
    pub repo: Arc<R>,
    pub events: broadcast::Sender<SwapEvent>,
}

impl<C, A, W, R> Lifecycle<C, A, W, R>
where
    C: CounterpartyApi,
    A: ArkProvider,
    W: SwapWallet,
    R: SwapRepository,
{
    fn emit(&self, event: SwapEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    async fn persist(&self, swap: &mut Swap, status: SwapStatus) -> Result<(), Error> {
        swap.set_status(status);
        self.repo
            .save(swap)
            .await
            .context("failed to persist status transition")?;

        self.emit(SwapEvent::Update {
            swap_id: swap.id().to_string(),
            status,
        });

        Ok(())
    }

    /// Fetch the settlement transaction of a reverse swap, retrying
    /// transport failures a bounded number of times.
    async fn reverse_settlement_txid(&self, swap_id: &str) -> Result<String, Error> {
        let config = self.engine.config();

        let mut attempt = 0;
        let response = loop {
            match self
                .engine
                .counterparty()
                .get_reverse_swap_transaction(swap_id)
                .await
            {
                Ok(response) => break response,
                Err(e @ Error::Transport(_)) if attempt + 1 < config.settlement_max_attempts => {
                    attempt += 1;
                    tracing::debug!(swap_id, attempt, "Retrying settlement lookup: {e}");
                    tokio::time::sleep(config.settlement_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        // An absent id and an empty string both mean the counterparty has no
        // transaction for us; neither is success.
        match response.id {
            Some(txid) if !txid.is_empty() => Ok(txid),
            Some(_) | None => Err(Error::SwapSettlementMissingTxid {
                swap_id: swap_id.to_string(),
            }),
        }
    }

    /// Drive `swap` until it completes or fails terminally.
    ///
    /// `updates` must deliver status transitions in arrival order; transport
    /// recovery happens upstream in the manager.
    pub(crate) async fn drive(
        &self,
        mut swap: Swap,
        updates: &mut (dyn Stream<Item = Result<SwapUpdate, Error>> + Send + Unpin),
    ) -> Result<SwapCompletion, Error> {
        let swap_id = swap.id().to_string();

        // At most one claim submission per swap, no matter how often the
        // counterparty repeats a status.
        let mut claim_started = false;
        let mut claim_txid: Option<String> = None;

        while let Some(update) = updates.next().await {
            let update = match update {
                Ok(update) => update,
                Err(e) => {
                    tracing::warn!(swap_id, "Status stream failed: {e}");
                    return Err(e);
                }
            };

            let status = update.status;
            tracing::debug!(swap_id, %status, "Swap status update");

            self.persist(&mut swap, status).await?;

            match &mut swap {
                Swap::Reverse(data) => match status {
                    SwapStatus::TransactionMempool => {}
                    SwapStatus::TransactionConfirmed => {
                        if !claim_started {
                            claim_started = true;

                            let vhtlc = self.engine.vhtlc_for_reverse(data)?;
                            let outcome = self
                                .engine
                                .claim_ark(&data.id, &vhtlc, &data.lockup_address, data.preimage)
                                .await?;

                            claim_txid = Some(outcome.txid.to_string());

                            self.emit(SwapEvent::ActionExecuted {
                                swap_id: swap_id.clone(),
                                action: SwapAction::ArkClaim,
                            });
                        }
                    }
                    SwapStatus::InvoiceSettled => {
                        let txid = self.reverse_settlement_txid(&swap_id).await?;

                        return Ok(SwapCompletion {
                            swap_id,
                            status,
                            txid: Some(txid),
                            preimage: Some(data.preimage),
                        });
                    }
                    SwapStatus::InvoiceExpired => {
                        return Err(Error::InvoiceExpired {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::SwapExpired => {
                        return Err(Error::SwapExpired {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::TransactionFailed => {
                        return Err(Error::TransactionFailed { swap_id });
                    }
                    SwapStatus::TransactionRefunded => {
                        return Err(Error::TransactionRefunded { swap_id });
                    }
                    SwapStatus::Created
                    | SwapStatus::InvoiceSet
                    | SwapStatus::InvoicePending
                    | SwapStatus::InvoiceFailedToPay
                    | SwapStatus::TransactionServerMempool
                    | SwapStatus::TransactionServerConfirmed
                    | SwapStatus::TransactionClaimPending
                    | SwapStatus::TransactionClaimed
                    | SwapStatus::TransactionLockupFailed => {}
                },
                Swap::Submarine(data) => match status {
                    SwapStatus::TransactionClaimed => {
                        let preimage = self
                            .engine
                            .counterparty()
                            .get_submarine_preimage(&swap_id)
                            .await
                            .context("failed to fetch revealed preimage")?;

                        tracing::info!(
                            swap_id,
                            preimage = %preimage.to_lower_hex_string(),
                            "Counterparty claimed and revealed the preimage"
                        );

                        return Ok(SwapCompletion {
                            swap_id,
                            status,
                            txid: None,
                            preimage: Some(preimage),
                        });
                    }
                    SwapStatus::TransactionLockupFailed => {
                        // Renegotiate the quote so a refund (or retry) works
                        // against the amount the counterparty actually saw.
                        match self.engine.counterparty().get_submarine_quote(&swap_id).await {
                            Ok(amount) => {
                                data.amount = amount;
                                data.refundable = true;
                                self.repo
                                    .save(&swap)
                                    .await
                                    .context("failed to persist renegotiated quote")?;

                                self.emit(SwapEvent::ActionExecuted {
                                    swap_id: swap_id.clone(),
                                    action: SwapAction::QuoteRenegotiated,
                                });
                            }
                            Err(e) => {
                                tracing::warn!(swap_id, "Quote renegotiation failed: {e}");
                            }
                        }

                        return Err(Error::TransactionLockupFailed {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::InvoiceFailedToPay => {
                        data.refundable = true;
                        self.repo
                            .save(&swap)
                            .await
                            .context("failed to persist refundable flag")?;

                        return Err(Error::InvoiceFailedToPay {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::InvoiceExpired => {
                        return Err(Error::InvoiceExpired {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::SwapExpired => {
                        data.refundable = true;
                        self.repo
                            .save(&swap)
                            .await
                            .context("failed to persist refundable flag")?;

                        return Err(Error::SwapExpired {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::TransactionRefunded => {
                        data.refunded = true;
                        self.repo
                            .save(&swap)
                            .await
                            .context("failed to persist refunded flag")?;

                        return Err(Error::TransactionRefunded { swap_id });
                    }
                    SwapStatus::Created
                    | SwapStatus::InvoiceSet
                    | SwapStatus::InvoicePending
                    | SwapStatus::InvoiceSettled
                    | SwapStatus::TransactionMempool
                    | SwapStatus::TransactionConfirmed
                    | SwapStatus::TransactionServerMempool
                    | SwapStatus::TransactionServerConfirmed
                    | SwapStatus::TransactionClaimPending
                    | SwapStatus::TransactionFailed => {}
                },
                Swap::Chain(data) => match status {
                    SwapStatus::TransactionServerMempool
                    | SwapStatus::TransactionServerConfirmed => {
                        if !claim_started {
                            claim_started = true;

                            match data.direction {
                                ChainSwapDirection::ArkToBtc => {
                                    let lockup_hex = update
                                        .payload
                                        .transaction
                                        .as_ref()
                                        .and_then(|t| t.hex.clone())
                                        .ok_or_else(|| {
                                            Error::ad_hoc(
                                                "server lockup update carries no transaction hex",
                                            )
                                        })?;

                                    let txid = self.engine.claim_btc(data, &lockup_hex).await?;
                                    claim_txid = Some(txid.to_string());

                                    self.emit(SwapEvent::ActionExecuted {
                                        swap_id: swap_id.clone(),
                                        action: SwapAction::BtcClaim,
                                    });
                                }
                                ChainSwapDirection::BtcToArk => {
                                    let vhtlc = self.engine.vhtlc_for_chain(data)?;
                                    let outcome = self
                                        .engine
                                        .claim_ark(
                                            &data.id,
                                            &vhtlc,
                                            &data.ark_lockup_address,
                                            data.preimage,
                                        )
                                        .await?;

                                    claim_txid = Some(outcome.txid.to_string());

                                    self.emit(SwapEvent::ActionExecuted {
                                        swap_id: swap_id.clone(),
                                        action: SwapAction::ArkClaim,
                                    });
                                }
                            }
                        }
                    }
                    SwapStatus::TransactionClaimPending => {
                        if data.direction == ChainSwapDirection::BtcToArk {
                            // Best effort: the counterparty can batch-sweep
                            // the lockup if this fails.
                            if let Err(e) = self.engine.cooperative_sign_btc_claim(data).await {
                                tracing::warn!(swap_id, "Cooperative claim signature failed: {e}");
                            } else {
                                self.emit(SwapEvent::ActionExecuted {
                                    swap_id: swap_id.clone(),
                                    action: SwapAction::CooperativeSign,
                                });
                            }

                            return Ok(SwapCompletion {
                                swap_id,
                                status,
                                txid: claim_txid,
                                preimage: Some(data.preimage),
                            });
                        }
                    }
                    SwapStatus::TransactionClaimed => {
                        let txid = update
                            .payload
                            .transaction
                            .as_ref()
                            .and_then(|t| t.id.clone())
                            .or(claim_txid);

                        return Ok(SwapCompletion {
                            swap_id,
                            status,
                            txid,
                            preimage: Some(data.preimage),
                        });
                    }
                    SwapStatus::SwapExpired => {
                        data.refundable = true;
                        self.repo
                            .save(&swap)
                            .await
                            .context("failed to persist refundable flag")?;

                        return Err(Error::SwapExpired {
                            swap_id,
                            refundable: true,
                        });
                    }
                    SwapStatus::TransactionFailed => {
                        return Err(Error::TransactionFailed { swap_id });
                    }
                    SwapStatus::TransactionRefunded => {
                        data.refunded = true;
                        self.repo
                            .save(&swap)
                            .await
                            .context("failed to persist refunded flag")?;

                        return Err(Error::TransactionRefunded { swap_id });
                    }
                    SwapStatus::Created
                    | SwapStatus::InvoiceSet
                    | SwapStatus::InvoicePending
                    | SwapStatus::InvoiceSettled
                    | SwapStatus::InvoiceExpired
                    | SwapStatus::InvoiceFailedToPay
                    | SwapStatus::TransactionMempool
                    | SwapStatus::TransactionConfirmed
                    | SwapStatus::TransactionLockupFailed => {}
                },
            }
        }

        Err(Error::ad_hoc("status stream ended unexpectedly"))
    }
}
