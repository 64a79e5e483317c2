//! Construction, signing and verification of off-chain transactions.
//!
//! Spending a VTXO off-chain produces two artifacts: a *checkpoint*
//! transaction per input, which parks the coins in an output the server can
//! unroll unilaterally, and the *ark* transaction, which spends the
//! checkpoint outputs to the final recipients. Both are PSBTs that travel to
//! the Ark server for co-signing.

use crate::anchor_output;
use crate::csv_sig_script;
use crate::server;
use crate::tr_script_pubkey;
use crate::ArkAddress;
use crate::Error;
use crate::ErrorContext;
use crate::UNSPENDABLE_KEY;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::key::PublicKey;
use bitcoin::key::Secp256k1;
use bitcoin::psbt;
use bitcoin::secp256k1;
use bitcoin::secp256k1::schnorr;
use bitcoin::sighash::Prevouts;
use bitcoin::sighash::SighashCache;
use bitcoin::taproot;
use bitcoin::taproot::ControlBlock;
use bitcoin::taproot::LeafVersion;
use bitcoin::taproot::TaprootBuilder;
use bitcoin::taproot::TaprootSpendInfo;
use bitcoin::transaction;
use bitcoin::Amount;
use bitcoin::OutPoint;
use bitcoin::Psbt;
use bitcoin::ScriptBuf;
use bitcoin::TapLeafHash;
use bitcoin::TapSighashType;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::VarInt;
use bitcoin::XOnlyPublicKey;
use std::collections::BTreeMap;
use std::io;
use std::io::Write;

/// The byte value corresponds to the string "taptree".
const VTXO_TAPROOT_KEY: [u8; 7] = [116, 97, 112, 116, 114, 101, 101];

/// The byte value corresponds to the string "condition".
pub const VTXO_CONDITION_KEY: [u8; 9] = [99, 111, 110, 100, 105, 116, 105, 111, 110];

/// A VTXO to be spent into an unconfirmed VTXO.
#[derive(Debug, Clone)]
pub struct VtxoInput {
    /// The script path that will be used to spend the VTXO. The very same
    /// spend path is also used when building the corresponding checkpoint
    /// output.
    spend_script: ScriptBuf,
    /// An optional locktime, only set if the `spend_script` uses `OP_CLTV`.
    locktime: Option<LockTime>,
    control_block: ControlBlock,
    /// All the scripts in the Taproot tree.
    tapscripts: Vec<ScriptBuf>,
    script_pubkey: ScriptBuf,
    amount: Amount,
    outpoint: OutPoint,
}

impl VtxoInput {
    pub fn new(
        spend_script: ScriptBuf,
        locktime: Option<LockTime>,
        control_block: ControlBlock,
        tapscripts: Vec<ScriptBuf>,
        script_pubkey: ScriptBuf,
        amount: Amount,
        outpoint: OutPoint,
    ) -> Self {
        Self {
            spend_script,
            locktime,
            control_block,
            tapscripts,
            script_pubkey,
            amount,
            outpoint,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        self.outpoint
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn spend_script(&self) -> &ScriptBuf {
        &self.spend_script
    }

    pub fn spend_info(&self) -> (&ScriptBuf, &ControlBlock) {
        (&self.spend_script, &self.control_block)
    }
}

/// The checkpoint output that an ark transaction input spends.
#[derive(Debug, Clone)]
pub struct CheckpointOutput {
    vtxo_spend_script: ScriptBuf,
    spend_info: TaprootSpendInfo,
}

impl CheckpointOutput {
    fn new(vtxo_input: &VtxoInput, checkpoint_exit_script: ScriptBuf) -> Self {
        let secp = Secp256k1::new();

        let unspendable_key: PublicKey = UNSPENDABLE_KEY.parse().expect("valid key");
        let (unspendable_key, _) = unspendable_key.inner.x_only_public_key();

        let vtxo_spend_script = &vtxo_input.spend_script;

        let spend_info = TaprootBuilder::new()
            .add_leaf(1, vtxo_spend_script.clone())
            .expect("valid spend leaf")
            .add_leaf(1, checkpoint_exit_script)
            .expect("valid exit leaf")
            .finalize(&secp, unspendable_key)
            .expect("can be finalized");

        Self {
            vtxo_spend_script: vtxo_spend_script.clone(),
            spend_info,
        }
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        tr_script_pubkey(&self.spend_info)
    }

    pub fn spend_script(&self) -> &ScriptBuf {
        &self.vtxo_spend_script
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CheckpointOutPoint {
    pub outpoint: OutPoint,
    pub amount: Amount,
}

/// One checkpoint transaction plus everything needed to sign and verify the
/// ark transaction input that spends it.
#[derive(Debug, Clone)]
pub struct CheckpointTransaction {
    pub psbt: Psbt,
    pub output: CheckpointOutput,
    pub outpoint: CheckpointOutPoint,
    pub vtxo_input: VtxoInput,
}

#[derive(Debug, Clone)]
pub struct OffchainTransactions {
    pub ark_tx: Psbt,
    pub checkpoint_txs: Vec<CheckpointTransaction>,
}

impl OffchainTransactions {
    /// The checkpoint outputs the ark transaction spends, in input order.
    pub fn checkpoint_inputs(&self) -> Vec<(CheckpointOutput, CheckpointOutPoint)> {
        self.checkpoint_txs
            .iter()
            .map(|c| (c.output.clone(), c.outpoint))
            .collect()
    }

    pub fn checkpoint_psbts(&self) -> Vec<Psbt> {
        self.checkpoint_txs.iter().map(|c| c.psbt.clone()).collect()
    }
}

/// Build the transactions that spend `vtxo_inputs` to `outputs`.
pub fn build_offchain_transactions(
    outputs: &[(&ArkAddress, Amount)],
    change_address: Option<&ArkAddress>,
    vtxo_inputs: &[VtxoInput],
    server_info: &server::Info,
) -> Result<OffchainTransactions, Error> {
    if vtxo_inputs.is_empty() {
        return Err(Error::transaction(
            "cannot build Ark transaction without inputs",
        ));
    }

    let checkpoint_exit_script = csv_sig_script(
        server_info.unilateral_exit_delay,
        server_info.signer_pk.x_only_public_key().0,
    );

    let mut checkpoint_txs = Vec::new();
    for vtxo_input in vtxo_inputs.iter() {
        let checkpoint_tx = build_checkpoint_psbt(vtxo_input, checkpoint_exit_script.clone())
            .with_context(|| {
                format!(
                    "failed to build checkpoint psbt for input {:?}",
                    vtxo_input.outpoint
                )
            })?;

        checkpoint_txs.push(checkpoint_tx);
    }

    let mut outputs = outputs
        .iter()
        .map(|(address, amount)| TxOut {
            value: *amount,
            script_pubkey: address.to_p2tr_script_pubkey(),
        })
        .collect::<Vec<_>>();

    let total_input_amount: Amount = vtxo_inputs.iter().map(|v| v.amount).sum();
    let total_output_amount: Amount = outputs.iter().map(|v| v.value).sum();

    let change_amount = total_input_amount.checked_sub(total_output_amount).ok_or_else(|| {
        Error::transaction(format!(
            "cannot cover total output amount ({total_output_amount}) with total input amount ({total_input_amount})"
        ))
    })?;

    if change_amount > Amount::ZERO {
        if let Some(change_address) = change_address {
            outputs.push(TxOut {
                value: change_amount,
                script_pubkey: change_address.to_p2tr_script_pubkey(),
            });
        }
    }

    outputs.push(anchor_output());

    let timelocked_inputs = vtxo_inputs
        .iter()
        .filter_map(|x| x.locktime)
        .collect::<Vec<_>>();

    let highest_timelock = timelocked_inputs
        .iter()
        .try_fold(None, |acc, a| match (acc, a) {
            (None, locktime) => Ok(Some(*locktime)),
            (Some(a @ LockTime::Blocks(h1)), LockTime::Blocks(h2)) if h1 > *h2 => Ok(Some(a)),
            (Some(LockTime::Blocks(_)), b @ LockTime::Blocks(_)) => Ok(Some(*b)),
            (Some(a @ LockTime::Seconds(t1)), LockTime::Seconds(t2)) if t1 > *t2 => Ok(Some(a)),
            (Some(LockTime::Seconds(_)), b @ LockTime::Seconds(_)) => Ok(Some(*b)),
            _ => Err(Error::transaction("incompatible locktimes")),
        })?;

    let (lock_time, sequence) = match highest_timelock {
        Some(timelock) => (timelock, bitcoin::Sequence::ENABLE_LOCKTIME_NO_RBF),
        None => (LockTime::ZERO, bitcoin::Sequence::MAX),
    };

    let unsigned_ark_tx = Transaction {
        version: transaction::Version::non_standard(3),
        lock_time,
        input: checkpoint_txs
            .iter()
            .map(|c| TxIn {
                previous_output: c.outpoint.outpoint,
                script_sig: Default::default(),
                sequence,
                witness: Default::default(),
            })
            .collect(),
        output: outputs,
    };

    let mut unsigned_ark_psbt =
        Psbt::from_unsigned_tx(unsigned_ark_tx).map_err(Error::transaction)?;

    for (i, checkpoint_tx) in checkpoint_txs.iter().enumerate() {
        let mut bytes = Vec::new();

        let script = checkpoint_tx.output.spend_script();
        write_compact_size_uint(&mut bytes, script.len() as u64).map_err(Error::transaction)?;

        // Depth is always 1 in a checkpoint output tree.
        bytes.push(1);
        bytes.push(LeafVersion::TapScript.to_consensus());

        let mut script_bytes = script.to_bytes();

        write_compact_size_uint(&mut bytes, script_bytes.len() as u64)
            .map_err(Error::transaction)?;

        bytes.append(&mut script_bytes);

        unsigned_ark_psbt.inputs[i].unknown.insert(
            psbt::raw::Key {
                type_value: u8::MAX,
                key: VTXO_TAPROOT_KEY.to_vec(),
            },
            bytes,
        );
    }

    Ok(OffchainTransactions {
        ark_tx: unsigned_ark_psbt,
        checkpoint_txs,
    })
}

fn build_checkpoint_psbt(
    vtxo_input: &VtxoInput,
    // An alternative way for the _server_ to unilaterally spend the checkpoint
    // output, in case the owner does not spend it. Must be a CSV-Sig script
    // with the server PK.
    checkpoint_exit_script: ScriptBuf,
) -> Result<CheckpointTransaction, Error> {
    let (lock_time, sequence) = match vtxo_input.locktime {
        Some(timelock) => (timelock, bitcoin::Sequence::ENABLE_LOCKTIME_NO_RBF),
        None => (LockTime::ZERO, bitcoin::Sequence::MAX),
    };

    let inputs = vec![TxIn {
        previous_output: vtxo_input.outpoint,
        script_sig: Default::default(),
        sequence,
        witness: Default::default(),
    }];

    let checkpoint_output = CheckpointOutput::new(vtxo_input, checkpoint_exit_script);

    let outputs = vec![
        TxOut {
            value: vtxo_input.amount,
            script_pubkey: checkpoint_output.script_pubkey(),
        },
        anchor_output(),
    ];

    let unsigned_tx = Transaction {
        version: transaction::Version::non_standard(3),
        lock_time,
        input: inputs,
        output: outputs,
    };

    let mut unsigned_checkpoint_psbt =
        Psbt::from_unsigned_tx(unsigned_tx).map_err(Error::transaction)?;

    let mut bytes = Vec::new();

    write_compact_size_uint(&mut bytes, vtxo_input.tapscripts.len() as u64)
        .map_err(Error::transaction)?;

    for script in vtxo_input.tapscripts.iter() {
        // Depth is always 1 as far as the server is concerned.
        bytes.push(1);
        bytes.push(LeafVersion::TapScript.to_consensus());

        let mut script_bytes = script.to_bytes();

        write_compact_size_uint(&mut bytes, script_bytes.len() as u64)
            .map_err(Error::transaction)?;

        bytes.append(&mut script_bytes);
    }

    unsigned_checkpoint_psbt.inputs[0].witness_utxo = Some(TxOut {
        value: vtxo_input.amount,
        script_pubkey: vtxo_input.script_pubkey.clone(),
    });

    // In the case of input VTXOs, we are actually using a script spend path.
    let (vtxo_spend_script, vtxo_spend_control_block) = vtxo_input.spend_info();

    let leaf_version = vtxo_spend_control_block.leaf_version;
    unsigned_checkpoint_psbt.inputs[0].tap_scripts = BTreeMap::from_iter([(
        vtxo_spend_control_block.clone(),
        (vtxo_spend_script.clone(), leaf_version),
    )]);

    unsigned_checkpoint_psbt.inputs[0].unknown.insert(
        psbt::raw::Key {
            type_value: u8::MAX,
            key: VTXO_TAPROOT_KEY.to_vec(),
        },
        bytes,
    );

    let checkpoint_outpoint = CheckpointOutPoint {
        outpoint: OutPoint {
            txid: unsigned_checkpoint_psbt.unsigned_tx.compute_txid(),
            vout: 0,
        },
        amount: vtxo_input.amount,
    };

    Ok(CheckpointTransaction {
        psbt: unsigned_checkpoint_psbt,
        output: checkpoint_output,
        outpoint: checkpoint_outpoint,
        vtxo_input: vtxo_input.clone(),
    })
}

fn write_compact_size_uint<W: Write>(w: &mut W, val: u64) -> io::Result<()> {
    if val < 253 {
        w.write_all(&[val as u8])?;
    } else if val < 0x10000 {
        w.write_all(&[253])?;
        w.write_all(&(val as u16).to_le_bytes())?;
    } else if val < 0x100000000 {
        w.write_all(&[254])?;
        w.write_all(&(val as u32).to_le_bytes())?;
    } else {
        w.write_all(&[255])?;
        w.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

/// Attach a spend condition witness to a PSBT input. For a claim along the
/// hashlock leaf, the condition is the 32-byte preimage.
pub fn set_condition_witness(input: &mut psbt::Input, witness_element: &[u8]) {
    // Initialized with a 1, because the condition witness has one element.
    let mut bytes = vec![1];

    let length = VarInt::from(witness_element.len() as u64);

    length
        .consensus_encode(&mut bytes)
        .expect("valid length encoding");

    bytes
        .write_all(witness_element)
        .expect("valid condition encoding");

    input.unknown.insert(
        psbt::raw::Key {
            type_value: 222,
            key: VTXO_CONDITION_KEY.to_vec(),
        },
        bytes,
    );
}

fn ark_tx_leaf_sighash(
    psbt: &Psbt,
    checkpoint_inputs: &[(CheckpointOutput, CheckpointOutPoint)],
    input_index: usize,
) -> Result<(secp256k1::Message, TapLeafHash), Error> {
    let (checkpoint_output, _) = checkpoint_inputs
        .get(input_index)
        .ok_or_else(|| Error::transaction(format!("no input at index {input_index}")))?;

    let prevouts = checkpoint_inputs
        .iter()
        .map(|(output, outpoint)| TxOut {
            value: outpoint.amount,
            script_pubkey: output.script_pubkey(),
        })
        .collect::<Vec<_>>();
    let prevouts = Prevouts::All(&prevouts);

    let leaf_hash =
        TapLeafHash::from_script(checkpoint_output.spend_script(), LeafVersion::TapScript);

    let tap_sighash = SighashCache::new(&psbt.unsigned_tx)
        .taproot_script_spend_signature_hash(
            input_index,
            &prevouts,
            leaf_hash,
            TapSighashType::Default,
        )
        .map_err(Error::crypto)
        .context("failed to generate ark tx sighash")?;

    let msg = secp256k1::Message::from_digest(tap_sighash.to_raw_hash().to_byte_array());

    Ok((msg, leaf_hash))
}

/// Sign input `input_index` of an ark transaction.
///
/// `sign_fn` receives the PSBT input (so it can attach condition witnesses)
/// and the sighash message, and returns one or more `(signature, pubkey)`
/// pairs to record as tap script signatures. Existing signatures on the input
/// are kept, so co-signatures from other parties can be merged in separate
/// passes.
pub fn sign_ark_transaction<S>(
    sign_fn: S,
    psbt: &mut Psbt,
    checkpoint_inputs: &[(CheckpointOutput, CheckpointOutPoint)],
    input_index: usize,
) -> Result<(), Error>
where
    S: FnOnce(
        &mut psbt::Input,
        secp256k1::Message,
    ) -> Result<Vec<(schnorr::Signature, XOnlyPublicKey)>, Error>,
{
    let (msg, leaf_hash) = ark_tx_leaf_sighash(psbt, checkpoint_inputs, input_index)?;

    let (checkpoint_output, CheckpointOutPoint { outpoint, amount }) =
        &checkpoint_inputs[input_index];

    tracing::debug!(
        ?outpoint,
        %amount,
        index = input_index,
        "Signing checkpoint output for Ark transaction"
    );

    psbt.unsigned_tx
        .input
        .iter()
        .find(|input| input.previous_output == *outpoint)
        .ok_or_else(|| Error::transaction(format!("missing input for outpoint {outpoint}")))?;

    let psbt_input = psbt
        .inputs
        .get_mut(input_index)
        .ok_or_else(|| Error::transaction(format!("no PSBT input at index {input_index}")))?;

    psbt_input.witness_utxo = Some(TxOut {
        value: *amount,
        script_pubkey: checkpoint_output.script_pubkey(),
    });

    let vtxo_spend_script = checkpoint_output.spend_script();
    let leaf_version = LeafVersion::TapScript;

    let control_block = checkpoint_output
        .spend_info
        .control_block(&(vtxo_spend_script.clone(), leaf_version))
        .ok_or_else(|| {
            Error::transaction(format!(
                "failed to construct control block for input {outpoint:?}"
            ))
        })?;

    psbt_input.tap_scripts =
        BTreeMap::from_iter([(control_block, (vtxo_spend_script.clone(), leaf_version))]);

    let sigs = sign_fn(psbt_input, msg)?;

    for (sig, pk) in sigs {
        let sig = taproot::Signature {
            signature: sig,
            sighash_type: TapSighashType::Default,
        };

        psbt_input.tap_script_sigs.insert((pk, leaf_hash), sig);
    }

    Ok(())
}

fn checkpoint_tx_leaf_sighash(
    psbt: &Psbt,
    vtxo_input: &VtxoInput,
) -> Result<(secp256k1::Message, TapLeafHash, usize), Error> {
    let VtxoInput {
        amount,
        outpoint,
        script_pubkey,
        ..
    } = vtxo_input;

    let (input_index, _) = psbt
        .unsigned_tx
        .input
        .iter()
        .enumerate()
        .find(|(_, input)| input.previous_output == *outpoint)
        .ok_or_else(|| Error::transaction(format!("missing input for outpoint {outpoint}")))?;

    let (vtxo_spend_script, vtxo_spend_control_block) = vtxo_input.spend_info();

    let prevouts = [TxOut {
        value: *amount,
        script_pubkey: script_pubkey.clone(),
    }];
    let prevouts = Prevouts::All(&prevouts);

    let leaf_hash =
        TapLeafHash::from_script(vtxo_spend_script, vtxo_spend_control_block.leaf_version);

    let tap_sighash = SighashCache::new(&psbt.unsigned_tx)
        .taproot_script_spend_signature_hash(
            input_index,
            &prevouts,
            leaf_hash,
            TapSighashType::Default,
        )
        .map_err(Error::crypto)
        .context("failed to generate checkpoint sighash")?;

    let msg = secp256k1::Message::from_digest(tap_sighash.to_raw_hash().to_byte_array());

    Ok((msg, leaf_hash, input_index))
}

/// Sign the input of a checkpoint transaction spending `vtxo_input`.
pub fn sign_checkpoint_transaction<S>(
    sign_fn: S,
    psbt: &mut Psbt,
    vtxo_input: &VtxoInput,
) -> Result<(), Error>
where
    S: FnOnce(
        &mut psbt::Input,
        secp256k1::Message,
    ) -> Result<Vec<(schnorr::Signature, XOnlyPublicKey)>, Error>,
{
    let (msg, leaf_hash, input_index) = checkpoint_tx_leaf_sighash(psbt, vtxo_input)?;

    tracing::debug!(
        outpoint = ?vtxo_input.outpoint,
        amount = %vtxo_input.amount,
        "Signing VTXO input for checkpoint transaction"
    );

    let psbt_input = psbt
        .inputs
        .get_mut(input_index)
        .ok_or_else(|| Error::transaction(format!("no PSBT input at index {input_index}")))?;

    let sigs = sign_fn(psbt_input, msg)?;

    for (sig, pk) in sigs {
        let sig = taproot::Signature {
            signature: sig,
            sighash_type: TapSighashType::Default,
        };

        psbt_input.tap_script_sigs.insert((pk, leaf_hash), sig);
    }

    Ok(())
}

/// Verify that input `input_index` of an ark transaction carries a valid tap
/// script signature from every key in `required_signers`.
///
/// This recomputes the leaf sighash locally, so a counterparty cannot satisfy
/// the check with a signature over different transaction data.
pub fn verify_ark_transaction_signatures(
    psbt: &Psbt,
    checkpoint_inputs: &[(CheckpointOutput, CheckpointOutPoint)],
    input_index: usize,
    required_signers: &[XOnlyPublicKey],
) -> Result<(), Error> {
    let (msg, leaf_hash) = ark_tx_leaf_sighash(psbt, checkpoint_inputs, input_index)?;

    let psbt_input = psbt
        .inputs
        .get(input_index)
        .ok_or_else(|| Error::transaction(format!("no PSBT input at index {input_index}")))?;

    verify_required_signatures(psbt_input, msg, leaf_hash, required_signers)
}

/// Verify that the checkpoint transaction input spending `vtxo_input` carries
/// a valid tap script signature from every key in `required_signers`.
pub fn verify_checkpoint_transaction_signatures(
    psbt: &Psbt,
    vtxo_input: &VtxoInput,
    required_signers: &[XOnlyPublicKey],
) -> Result<(), Error> {
    let (msg, leaf_hash, input_index) = checkpoint_tx_leaf_sighash(psbt, vtxo_input)?;

    let psbt_input = psbt
        .inputs
        .get(input_index)
        .ok_or_else(|| Error::transaction(format!("no PSBT input at index {input_index}")))?;

    verify_required_signatures(psbt_input, msg, leaf_hash, required_signers)
}

fn verify_required_signatures(
    psbt_input: &psbt::Input,
    msg: secp256k1::Message,
    leaf_hash: TapLeafHash,
    required_signers: &[XOnlyPublicKey],
) -> Result<(), Error> {
    let secp = Secp256k1::verification_only();

    for pk in required_signers {
        let sig = psbt_input
            .tap_script_sigs
            .get(&(*pk, leaf_hash))
            .ok_or_else(|| Error::crypto(format!("missing tap script signature for key {pk}")))?;

        if sig.sighash_type != TapSighashType::Default {
            return Err(Error::crypto(format!(
                "unexpected sighash type for key {pk}: {}",
                sig.sighash_type
            )));
        }

        secp.verify_schnorr(&sig.signature, &msg, pk)
            .map_err(|e| Error::crypto(format!("invalid tap script signature for key {pk}: {e}")))?;
    }

    Ok(())
}

/// Extract a verifiable `(signature, leaf_hash)` map for an input, merging a
/// co-signed PSBT produced by another party into ours.
///
/// Only signatures that are not already present are copied over.
pub fn merge_tap_script_sigs(ours: &mut Psbt, theirs: &Psbt) -> Result<(), Error> {
    if ours.unsigned_tx.compute_txid() != theirs.unsigned_tx.compute_txid() {
        return Err(Error::transaction(
            "cannot merge signatures from a different transaction",
        ));
    }

    for (our_input, their_input) in ours.inputs.iter_mut().zip(theirs.inputs.iter()) {
        for (key, sig) in their_input.tap_script_sigs.iter() {
            our_input.tap_script_sigs.entry(*key).or_insert(*sig);
        }
    }

    Ok(())
}
