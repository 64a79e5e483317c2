use bitcoin::opcodes::all::*;
use bitcoin::script::Instruction;
use bitcoin::taproot::TaprootSpendInfo;
use bitcoin::ScriptBuf;
use bitcoin::XOnlyPublicKey;

/// A [`ScriptBuf`] allowing the owner of `pk` to spend after the relative
/// `locktime` has passed from the time the corresponding output was included
/// in a block.
pub fn csv_sig_script(locktime: bitcoin::Sequence, pk: XOnlyPublicKey) -> ScriptBuf {
    ScriptBuf::builder()
        .push_int(locktime.to_consensus_u32() as i64)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_x_only_key(&pk)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// The script pubkey for the Taproot output corresponding to the given
/// [`TaprootSpendInfo`].
pub fn tr_script_pubkey(spend_info: &TaprootSpendInfo) -> ScriptBuf {
    let output_key = spend_info.output_key();
    let builder = bitcoin::blockdata::script::Builder::new();
    builder
        .push_opcode(OP_PUSHNUM_1)
        .push_slice(output_key.serialize())
        .into_script()
}

/// The signer set of a tap leaf: every 32-byte key pushed immediately before
/// an [`OP_CHECKSIG`] or [`OP_CHECKSIGVERIFY`], in script order.
///
/// A script-path spend of the leaf needs a valid signature for each returned
/// key, which is what the final-transaction verification checks against.
pub fn extract_checksig_pubkeys(script: &ScriptBuf) -> Vec<XOnlyPublicKey> {
    let instructions: Vec<_> = script.instructions().filter_map(|inst| inst.ok()).collect();

    let mut pubkeys = Vec::new();

    for window in instructions.windows(2) {
        let (push, checksig) = (&window[0], &window[1]);

        if let Instruction::PushBytes(bytes) = push {
            if bytes.len() != 32 {
                continue;
            }

            let is_checksig = matches!(
                checksig,
                Instruction::Op(op) if *op == OP_CHECKSIG || *op == OP_CHECKSIGVERIFY
            );

            if let Ok(pk) = XOnlyPublicKey::from_slice(bytes.as_bytes()) {
                if is_checksig {
                    pubkeys.push(pk);
                }
            }
        }
    }

    pubkeys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn extract_checksig_pubkeys_in_script_order() {
        let pk_0 = XOnlyPublicKey::from_str(
            "18845781f631c48f1c9709e23092067d06837f30aa0cd0544ac887fe91ddd166",
        )
        .unwrap();
        let pk_1 = XOnlyPublicKey::from_str(
            "28845781f631c48f1c9709e23092067d06837f30aa0cd0544ac887fe91ddd166",
        )
        .unwrap();

        let script = ScriptBuf::builder()
            .push_x_only_key(&pk_0)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&pk_1)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let pubkeys = extract_checksig_pubkeys(&script);

        assert_eq!(pubkeys, vec![pk_0, pk_1]);
    }

    #[test]
    fn extract_checksig_pubkeys_from_csv_sig() {
        let pk = XOnlyPublicKey::from_str(
            "18845781f631c48f1c9709e23092067d06837f30aa0cd0544ac887fe91ddd166",
        )
        .unwrap();
        let sequence = bitcoin::Sequence::from_seconds_ceil(1024).unwrap();

        let script = csv_sig_script(sequence, pk);
        let pubkeys = extract_checksig_pubkeys(&script);

        assert_eq!(pubkeys, vec![pk]);
    }

    #[test]
    fn extract_checksig_pubkeys_empty_script() {
        let script = ScriptBuf::new();

        assert!(extract_checksig_pubkeys(&script).is_empty());
    }
}
