//! Ark-side claim and refund construction.
//!
//! Everything here treats the counterparty as adversarial: lockup addresses
//! are rebuilt locally, and every signature the counterparty or the server
//! hands back is verified against the declared signer set before we add our
//! own or move on.

use crate::ark::ArkProvider;
use crate::boltz::CounterpartyApi;
use crate::config::SwapConfig;
use crate::error::Error;
use crate::error::ErrorContext;
use crate::recover;
use crate::swap::ChainSwapData;
use crate::swap::ChainSwapDirection;
use crate::swap::ReverseSwapData;
use crate::swap::SubmarineSwapData;
use crate::swap::TimeoutBlockHeights;
use crate::wallet::SwapWallet;
use arkswap_core::keys::KeyRole;
use arkswap_core::send;
use arkswap_core::send::OffchainTransactions;
use arkswap_core::send::VtxoInput;
use arkswap_core::server;
use arkswap_core::server::parse_sequence_number;
use arkswap_core::server::VirtualTxOutPoint;
use arkswap_core::vhtlc::VhtlcOptions;
use arkswap_core::vhtlc::VhtlcScript;
use arkswap_core::extract_checksig_pubkeys;
use arkswap_core::ArkAddress;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::ripemd160;
use bitcoin::psbt;
use bitcoin::secp256k1;
use bitcoin::secp256k1::schnorr;
use bitcoin::Amount;
use bitcoin::Txid;
use bitcoin::XOnlyPublicKey;
use std::sync::Arc;

/// The outcome of a successful ark-side claim or refund.
#[derive(Debug, Clone)]
pub struct ArkSpendOutcome {
    pub txid: Txid,
    pub amount: Amount,
}

/// Builds and submits the transactions that move funds out of a VHTLC.
pub struct ClaimEngine<C, A, W> {
    counterparty: Arc<C>,
    ark: Arc<A>,
    wallet: Arc<W>,
    server_info: server::Info,
    config: SwapConfig,
}

impl<C, A, W> ClaimEngine<C, A, W>
where
    C: CounterpartyApi,
    A: ArkProvider,
    W: SwapWallet,
{
    pub fn new(
        counterparty: Arc<C>,
        ark: Arc<A>,
        wallet: Arc<W>,
        server_info: server::Info,
        config: SwapConfig,
    ) -> Self {
        Self {
            counterparty,
            ark,
            wallet,
            server_info,
            config,
        }
    }

    pub fn server_info(&self) -> &server::Info {
        &self.server_info
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn counterparty(&self) -> &Arc<C> {
        &self.counterparty
    }

    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    fn server_x_only(&self) -> XOnlyPublicKey {
        self.server_info.signer_pk.x_only_public_key().0
    }

    /// Reconstruct a VHTLC from swap parameters.
    pub fn build_vhtlc(
        &self,
        sender: XOnlyPublicKey,
        receiver: XOnlyPublicKey,
        preimage_hash: ripemd160::Hash,
        timeouts: &TimeoutBlockHeights,
    ) -> Result<VhtlcScript, Error> {
        let options = VhtlcOptions {
            sender,
            receiver,
            server: self.server_x_only(),
            preimage_hash,
            refund_locktime: timeouts.refund,
            unilateral_claim_delay: parse_sequence_number(timeouts.unilateral_claim as i64)
                .context("invalid unilateral claim timeout")?,
            unilateral_refund_delay: parse_sequence_number(timeouts.unilateral_refund as i64)
                .context("invalid unilateral refund timeout")?,
            unilateral_refund_without_receiver_delay: parse_sequence_number(
                timeouts.unilateral_refund_without_receiver as i64,
            )
            .context("invalid refund without receiver timeout")?,
        };

        VhtlcScript::new(options, self.server_info.network)
            .map_err(|e| Error::ad_hoc(format!("failed to build VHTLC script: {e}")))
    }

    pub fn vhtlc_for_reverse(&self, swap: &ReverseSwapData) -> Result<VhtlcScript, Error> {
        self.build_vhtlc(
            normalize(KeyRole::Sender, &swap.refund_public_key)?,
            normalize(KeyRole::Receiver, &swap.claim_public_key)?,
            swap.preimage_hash,
            &swap.timeout_block_heights,
        )
    }

    pub fn vhtlc_for_submarine(&self, swap: &SubmarineSwapData) -> Result<VhtlcScript, Error> {
        self.build_vhtlc(
            normalize(KeyRole::Sender, &swap.refund_public_key)?,
            normalize(KeyRole::Receiver, &swap.claim_public_key)?,
            swap.preimage_hash,
            &swap.timeout_block_heights,
        )
    }

    pub fn vhtlc_for_chain(&self, swap: &ChainSwapData) -> Result<VhtlcScript, Error> {
        let (sender, receiver) = match swap.direction {
            ChainSwapDirection::ArkToBtc => (swap.ark_public_key, swap.ark_counterparty_public_key),
            ChainSwapDirection::BtcToArk => (swap.ark_counterparty_public_key, swap.ark_public_key),
        };

        self.build_vhtlc(
            normalize(KeyRole::Sender, &sender)?,
            normalize(KeyRole::Receiver, &receiver)?,
            swap.preimage_hash,
            &swap.timeout_block_heights,
        )
    }

    /// The locally reconstructed address must equal the counterparty's
    /// lockup address byte for byte; otherwise the swap dies here, before
    /// any signature is produced.
    pub fn ensure_lockup_address(
        vhtlc: &VhtlcScript,
        expected: &ArkAddress,
    ) -> Result<(), Error> {
        let actual = vhtlc.address();

        if actual != *expected {
            return Err(Error::LockupAddressMismatch {
                expected: expected.encode(),
                actual: actual.encode(),
            });
        }

        Ok(())
    }

    async fn spendable_vhtlc_outpoint(
        &self,
        swap_id: &str,
        vhtlc: &VhtlcScript,
    ) -> Result<VhtlcCoin, Error> {
        let script_pubkey = vhtlc.script_pubkey();

        let vtxos = self
            .ark
            .list_vtxos(&script_pubkey)
            .await
            .context("failed to fetch VHTLC outpoints")?;

        let spendable = vtxos.iter().find(|v| !v.is_spent && !v.is_swept);

        if let Some(vtxo) = spendable {
            return Ok(VhtlcCoin::Spendable(vtxo.clone()));
        }

        if let Some(swept) = vtxos.into_iter().find(|v| v.is_swept) {
            return Ok(VhtlcCoin::Swept(swept));
        }

        Err(Error::NoSpendableVirtualCoins {
            swap_id: swap_id.to_string(),
        })
    }

    /// Claim a funded VHTLC along the claim leaf, revealing `preimage`.
    ///
    /// Used for reverse swaps and for the Ark side of BTC→ARK chain swaps.
    pub async fn claim_ark(
        &self,
        swap_id: &str,
        vhtlc: &VhtlcScript,
        lockup_address: &ArkAddress,
        preimage: [u8; 32],
    ) -> Result<ArkSpendOutcome, Error> {
        Self::ensure_lockup_address(vhtlc, lockup_address)?;

        let coin = match self.spendable_vhtlc_outpoint(swap_id, vhtlc).await? {
            VhtlcCoin::Spendable(vtxo) => vtxo,
            VhtlcCoin::Swept(_) => {
                return Err(Error::NoSpendableVirtualCoins {
                    swap_id: swap_id.to_string(),
                })
            }
        };

        let claim_address = self.wallet.address()?;
        let claim_amount = coin.amount;

        let claim_script = vhtlc.claim_script();
        let control_block = vhtlc
            .control_block(&claim_script)
            .map_err(|e| Error::ad_hoc(format!("missing claim control block: {e}")))?;

        let vhtlc_input = VtxoInput::new(
            claim_script,
            None,
            control_block,
            vhtlc.tapscripts(),
            vhtlc.script_pubkey(),
            claim_amount,
            coin.outpoint,
        );

        let OffchainTransactions {
            mut ark_tx,
            checkpoint_txs,
        } = send::build_offchain_transactions(
            &[(&claim_address, claim_amount)],
            None,
            std::slice::from_ref(&vhtlc_input),
            &self.server_info,
        )
        .context("failed to build offchain transactions")?;

        let offchain = OffchainTransactions {
            ark_tx: ark_tx.clone(),
            checkpoint_txs: checkpoint_txs.clone(),
        };
        let checkpoint_inputs = offchain.checkpoint_inputs();

        let wallet = &self.wallet;
        let sign_fn = |input: &mut psbt::Input,
                       msg: secp256k1::Message|
         -> Result<Vec<(schnorr::Signature, XOnlyPublicKey)>, arkswap_core::Error> {
            send::set_condition_witness(input, &preimage);

            let sig = wallet
                .sign_schnorr(&msg)
                .map_err(|e| arkswap_core::Error::crypto(e.to_string()))?;
            let pk = wallet
                .x_only_public_key()
                .map_err(|e| arkswap_core::Error::crypto(e.to_string()))?;

            Ok(vec![(sig, pk)])
        };

        send::sign_ark_transaction(sign_fn, &mut ark_tx, &checkpoint_inputs, 0)
            .context("failed to sign ark transaction")?;

        let ark_txid = ark_tx.unsigned_tx.compute_txid();

        let response = self
            .ark
            .submit_offchain_tx(ark_tx, offchain.checkpoint_psbts())
            .await
            .context("failed to submit offchain transactions")?;

        // The server's co-signature on the claim leaf is what makes the ark
        // transaction final; verify it rather than trusting the response.
        send::verify_ark_transaction_signatures(
            &response.signed_ark_tx,
            &checkpoint_inputs,
            0,
            &[self.server_x_only()],
        )
        .map_err(|e| Error::InvalidFinalArkTx {
            swap_id: swap_id.to_string(),
            reason: e.to_string(),
        })?;

        let mut signed_checkpoints = Vec::with_capacity(response.signed_checkpoint_txs.len());
        for mut checkpoint_psbt in response.signed_checkpoint_txs {
            send::sign_checkpoint_transaction(sign_fn, &mut checkpoint_psbt, &vhtlc_input)
                .context("failed to sign checkpoint transaction")?;

            signed_checkpoints.push(checkpoint_psbt);
        }

        self.ark
            .finalize_offchain_tx(ark_txid, signed_checkpoints)
            .await
            .context("failed to finalize offchain transaction")?;

        tracing::info!(swap_id, txid = %ark_txid, %claim_amount, "Claimed VHTLC");

        Ok(ArkSpendOutcome {
            txid: ark_txid,
            amount: claim_amount,
        })
    }

    /// Refund a VHTLC cooperatively along the three-party refund leaf.
    ///
    /// If the VTXO has already been swept by the server, falls back to
    /// recovering the value through an Ark batch ceremony.
    pub async fn refund_ark(
        &self,
        swap_id: &str,
        vhtlc: &VhtlcScript,
        lockup_address: &ArkAddress,
        counterparty_key: XOnlyPublicKey,
    ) -> Result<ArkSpendOutcome, Error> {
        Self::ensure_lockup_address(vhtlc, lockup_address)?;

        let coin = match self.spendable_vhtlc_outpoint(swap_id, vhtlc).await? {
            VhtlcCoin::Spendable(vtxo) => vtxo,
            VhtlcCoin::Swept(swept) => {
                tracing::info!(
                    swap_id,
                    outpoint = %swept.outpoint,
                    "VHTLC swept by server, recovering through batch"
                );

                return self.refund_via_batch(swap_id, vhtlc, swept).await;
            }
        };

        let refund_address = self.wallet.address()?;
        let refund_amount = coin.amount;

        let refund_script = vhtlc.refund_script();
        let control_block = vhtlc
            .control_block(&refund_script)
            .map_err(|e| Error::ad_hoc(format!("missing refund control block: {e}")))?;

        // Everyone named in the refund leaf must end up signing the final
        // transaction: sender, receiver and server.
        let refund_signers = extract_checksig_pubkeys(&refund_script);

        let refund_locktime = vhtlc.options().refund_locktime;

        let vhtlc_input = VtxoInput::new(
            refund_script,
            Some(LockTime::from_consensus(refund_locktime)),
            control_block,
            vhtlc.tapscripts(),
            vhtlc.script_pubkey(),
            refund_amount,
            coin.outpoint,
        );

        let OffchainTransactions {
            mut ark_tx,
            checkpoint_txs,
        } = send::build_offchain_transactions(
            &[(&refund_address, refund_amount)],
            None,
            std::slice::from_ref(&vhtlc_input),
            &self.server_info,
        )
        .context("failed to build offchain transactions")?;

        let offchain = OffchainTransactions {
            ark_tx: ark_tx.clone(),
            checkpoint_txs: checkpoint_txs.clone(),
        };
        let checkpoint_inputs = offchain.checkpoint_inputs();

        // No condition witness on the refund path.
        let wallet = &self.wallet;
        let sign_fn = |_: &mut psbt::Input,
                       msg: secp256k1::Message|
         -> Result<Vec<(schnorr::Signature, XOnlyPublicKey)>, arkswap_core::Error> {
            let sig = wallet
                .sign_schnorr(&msg)
                .map_err(|e| arkswap_core::Error::crypto(e.to_string()))?;
            let pk = wallet
                .x_only_public_key()
                .map_err(|e| arkswap_core::Error::crypto(e.to_string()))?;

            Ok(vec![(sig, pk)])
        };

        let checkpoint_psbt = offchain
            .checkpoint_psbts()
            .into_iter()
            .next()
            .ok_or_else(|| Error::ad_hoc("no checkpoint transaction built"))?;

        // The counterparty co-signs the unsigned transactions first.
        let refund_response = self
            .counterparty
            .refund_submarine_swap(swap_id, &ark_tx, &checkpoint_psbt)
            .await
            .context("counterparty refund request failed")?;

        let their_ark_tx: bitcoin::Psbt = refund_response
            .transaction
            .parse()
            .map_err(|e| Error::ad_hoc(format!("could not parse counterparty refund tx: {e}")))?;
        let their_checkpoint: bitcoin::Psbt = refund_response
            .checkpoint
            .parse()
            .map_err(|e| {
                Error::ad_hoc(format!("could not parse counterparty checkpoint tx: {e}"))
            })?;

        send::merge_tap_script_sigs(&mut ark_tx, &their_ark_tx)
            .context("failed to merge counterparty refund signatures")?;

        send::verify_ark_transaction_signatures(&ark_tx, &checkpoint_inputs, 0, &[counterparty_key])
            .map_err(|e| Error::InvalidCounterpartySignature {
                swap_id: swap_id.to_string(),
                reason: e.to_string(),
            })?;

        // Now our signature on top.
        send::sign_ark_transaction(sign_fn, &mut ark_tx, &checkpoint_inputs, 0)
            .context("failed to sign refund transaction")?;

        let ark_txid = ark_tx.unsigned_tx.compute_txid();

        let response = self
            .ark
            .submit_offchain_tx(ark_tx, offchain.checkpoint_psbts())
            .await
            .context("failed to submit refund transactions")?;

        // All three parties must have signed the final refund transaction.
        send::verify_ark_transaction_signatures(
            &response.signed_ark_tx,
            &checkpoint_inputs,
            0,
            &refund_signers,
        )
        .map_err(|e| Error::InvalidFinalArkTx {
            swap_id: swap_id.to_string(),
            reason: e.to_string(),
        })?;

        let mut signed_checkpoints = Vec::with_capacity(response.signed_checkpoint_txs.len());
        for mut checkpoint_psbt in response.signed_checkpoint_txs {
            send::merge_tap_script_sigs(&mut checkpoint_psbt, &their_checkpoint)
                .context("failed to merge counterparty checkpoint signatures")?;

            send::sign_checkpoint_transaction(sign_fn, &mut checkpoint_psbt, &vhtlc_input)
                .context("failed to sign checkpoint transaction")?;

            signed_checkpoints.push(checkpoint_psbt);
        }

        self.ark
            .finalize_offchain_tx(ark_txid, signed_checkpoints)
            .await
            .context("failed to finalize refund transaction")?;

        tracing::info!(swap_id, txid = %ark_txid, %refund_amount, "Refunded VHTLC");

        Ok(ArkSpendOutcome {
            txid: ark_txid,
            amount: refund_amount,
        })
    }

    async fn refund_via_batch(
        &self,
        swap_id: &str,
        vhtlc: &VhtlcScript,
        swept: VirtualTxOutPoint,
    ) -> Result<ArkSpendOutcome, Error> {
        let to_address = self.wallet.address()?;
        let amount = swept.amount;

        let commitment_txid = recover::recover_via_batch(
            self.ark.as_ref(),
            self.wallet.as_ref(),
            &self.server_info,
            vhtlc,
            swept,
            &to_address,
        )
        .await
        .context("batch recovery failed")?;

        tracing::info!(swap_id, %commitment_txid, %amount, "Recovered VHTLC through batch");

        Ok(ArkSpendOutcome {
            txid: commitment_txid,
            amount,
        })
    }
}

enum VhtlcCoin {
    Spendable(VirtualTxOutPoint),
    Swept(VirtualTxOutPoint),
}

fn normalize(role: KeyRole, pk: &secp256k1::PublicKey) -> Result<XOnlyPublicKey, Error> {
    arkswap_core::keys::to_x_only(role, &pk.serialize()).map_err(Error::from)
}
