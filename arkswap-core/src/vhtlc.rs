//! Virtual Hash Time Lock Contract (VHTLC) construction.
//!
//! A VHTLC is the Taproot output a swap locks its VTXOs into. Its script tree
//! has four leaves:
//!
//! 1. **claim**: receiver reveals the preimage, co-signed by the server.
//! 2. **refund**: cooperative three-party refund after the refund locktime.
//! 3. **unilateral claim**: receiver alone, with the preimage, after a CSV
//!    delay.
//! 4. **unilateral refund without receiver**: sender and server after a CSV
//!    delay.
//!
//! The internal key is the BIP-341 NUMS point, so the output can only ever be
//! spent through one of the leaves.

use crate::ArkAddress;
use crate::UNSPENDABLE_KEY;
use bitcoin::hashes::ripemd160;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::taproot::ControlBlock;
use bitcoin::taproot::LeafVersion;
use bitcoin::taproot::TaprootBuilder;
use bitcoin::taproot::TaprootSpendInfo;
use bitcoin::Network;
use bitcoin::PublicKey;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::XOnlyPublicKey;
use serde::Deserialize;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VhtlcError {
    #[error("invalid locktime: {0}")]
    InvalidLocktime(String),
    #[error("invalid delay: {0}")]
    InvalidDelay(String),
    #[error("script construction failed: {0}")]
    ScriptConstructionFailed(String),
}

/// All the parameters needed to reconstruct a VHTLC.
///
/// Two parties that agree on these options derive byte-identical scripts and
/// the same address, which is what lets us check a counterparty-provided
/// lockup address before moving any funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VhtlcOptions {
    pub sender: XOnlyPublicKey,
    pub receiver: XOnlyPublicKey,
    pub server: XOnlyPublicKey,
    pub preimage_hash: ripemd160::Hash,
    pub refund_locktime: u32,
    pub unilateral_claim_delay: Sequence,
    pub unilateral_refund_delay: Sequence,
    pub unilateral_refund_without_receiver_delay: Sequence,
}

impl VhtlcOptions {
    pub fn validate(&self) -> Result<(), VhtlcError> {
        if self.refund_locktime == 0 {
            return Err(VhtlcError::InvalidLocktime(
                "refund locktime must be greater than 0".to_string(),
            ));
        }

        for (name, delay) in [
            ("unilateral claim", self.unilateral_claim_delay),
            ("unilateral refund", self.unilateral_refund_delay),
            (
                "unilateral refund without receiver",
                self.unilateral_refund_without_receiver_delay,
            ),
        ] {
            if !delay.is_relative_lock_time() || delay.to_consensus_u32() == 0 {
                return Err(VhtlcError::InvalidDelay(format!(
                    "{name} delay must be a valid non-zero CSV relative lock time"
                )));
            }
        }

        Ok(())
    }

    /// Creates the claim script where the receiver reveals the preimage.
    ///
    /// Requires: preimage hash verification + receiver signature + server
    /// signature.
    pub fn claim_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(self.preimage_hash.as_byte_array())
            .push_opcode(OP_EQUALVERIFY)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// Creates the cooperative refund script.
    ///
    /// Requires: CLTV refund locktime + sender + receiver + server signatures.
    pub fn refund_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(self.refund_locktime as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// Creates the unilateral claim script (no server cooperation needed).
    ///
    /// Requires: preimage hash verification + CSV delay + receiver signature.
    pub fn unilateral_claim_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(self.preimage_hash.as_byte_array())
            .push_opcode(OP_EQUALVERIFY)
            .push_int(self.unilateral_claim_delay.to_consensus_u32() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.receiver)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// Creates the refund script for an unresponsive receiver.
    ///
    /// Requires: CSV delay + sender + server signatures.
    pub fn unilateral_refund_without_receiver_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(
                self.unilateral_refund_without_receiver_delay
                    .to_consensus_u32() as i64,
            )
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&self.sender)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&self.server)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    fn build_taproot(&self) -> Result<TaprootSpendInfo, VhtlcError> {
        let internal_pubkey = PublicKey::from_str(UNSPENDABLE_KEY).map_err(|e| {
            VhtlcError::ScriptConstructionFailed(format!("failed to parse internal key: {e}"))
        })?;
        let internal_key = XOnlyPublicKey::from(internal_pubkey);

        // Four leaves in a balanced tree of depth 2. The order is fixed so
        // that reconstruction is byte-exact.
        let leaves = [
            self.claim_script(),
            self.refund_script(),
            self.unilateral_claim_script(),
            self.unilateral_refund_without_receiver_script(),
        ];

        let mut builder = TaprootBuilder::new();
        for leaf in leaves {
            builder = builder.add_leaf(2, leaf).map_err(|e| {
                VhtlcError::ScriptConstructionFailed(format!("failed to add leaf: {e}"))
            })?;
        }

        let secp = bitcoin::secp256k1::Secp256k1::new();
        builder.finalize(&secp, internal_key).map_err(|e| {
            VhtlcError::ScriptConstructionFailed(format!("failed to finalize taproot: {e:?}"))
        })
    }
}

/// A fully constructed VHTLC: the validated options together with the
/// finalized Taproot tree.
pub struct VhtlcScript {
    options: VhtlcOptions,
    taproot_spend_info: TaprootSpendInfo,
    network: Network,
}

impl VhtlcScript {
    pub fn new(options: VhtlcOptions, network: Network) -> Result<Self, VhtlcError> {
        options.validate()?;

        let taproot_spend_info = options.build_taproot()?;

        Ok(Self {
            options,
            taproot_spend_info,
            network,
        })
    }

    pub fn options(&self) -> &VhtlcOptions {
        &self.options
    }

    pub fn taproot_spend_info(&self) -> &TaprootSpendInfo {
        &self.taproot_spend_info
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        crate::tr_script_pubkey(&self.taproot_spend_info)
    }

    pub fn address(&self) -> ArkAddress {
        ArkAddress::new(
            self.network,
            self.options.server,
            self.taproot_spend_info.output_key(),
        )
    }

    pub fn claim_script(&self) -> ScriptBuf {
        self.options.claim_script()
    }

    pub fn refund_script(&self) -> ScriptBuf {
        self.options.refund_script()
    }

    pub fn unilateral_claim_script(&self) -> ScriptBuf {
        self.options.unilateral_claim_script()
    }

    pub fn unilateral_refund_without_receiver_script(&self) -> ScriptBuf {
        self.options.unilateral_refund_without_receiver_script()
    }

    /// The control block proving inclusion of `script` in the tree.
    pub fn control_block(&self, script: &ScriptBuf) -> Result<ControlBlock, VhtlcError> {
        self.taproot_spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| {
                VhtlcError::ScriptConstructionFailed(
                    "control block not found for script".to_string(),
                )
            })
    }

    /// All four leaves, in tree order.
    pub fn tapscripts(&self) -> Vec<ScriptBuf> {
        vec![
            self.claim_script(),
            self.refund_script(),
            self.unilateral_claim_script(),
            self.unilateral_refund_without_receiver_script(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hex::DisplayHex;
    use bitcoin::key::Secp256k1;
    use bitcoin::secp256k1::SecretKey;

    fn x_only(byte: u8) -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).expect("valid secret key");
        sk.x_only_public_key(&secp).0
    }

    fn test_options() -> VhtlcOptions {
        VhtlcOptions {
            sender: x_only(0x01),
            receiver: x_only(0x02),
            server: x_only(0x03),
            preimage_hash: ripemd160::Hash::from_str("4d487dd3753a89bc9fe98401d1196523058251fc")
                .unwrap(),
            refund_locktime: 265,
            unilateral_claim_delay: Sequence::from_height(17),
            unilateral_refund_delay: Sequence::from_height(144),
            unilateral_refund_without_receiver_delay: Sequence::from_height(144),
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let a = VhtlcScript::new(test_options(), Network::Regtest).expect("valid VHTLC");
        let b = VhtlcScript::new(test_options(), Network::Regtest).expect("valid VHTLC");

        assert_eq!(a.tapscripts(), b.tapscripts());
        assert_eq!(a.script_pubkey(), b.script_pubkey());
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn all_leaves_have_control_blocks() {
        let vhtlc = VhtlcScript::new(test_options(), Network::Regtest).expect("valid VHTLC");

        for script in vhtlc.tapscripts() {
            vhtlc.control_block(&script).expect("control block");
        }
    }

    #[test]
    fn claim_script_encodes_hashlock_and_both_signers() {
        let options = test_options();
        let hex = options.claim_script().as_bytes().to_lower_hex_string();

        // OP_HASH160 <20 bytes> OP_EQUALVERIFY ...
        assert!(hex.starts_with("a9144d487dd3753a89bc9fe98401d1196523058251fc88"));
        assert!(hex.contains(&options.receiver.serialize().to_lower_hex_string()));
        assert!(hex.contains(&options.server.serialize().to_lower_hex_string()));
    }

    #[test]
    fn refund_script_contains_all_three_keys() {
        let options = test_options();
        let pubkeys = crate::extract_checksig_pubkeys(&options.refund_script());

        assert_eq!(
            pubkeys,
            vec![options.sender, options.receiver, options.server]
        );
    }

    #[test]
    fn zero_locktime_is_rejected() {
        let options = VhtlcOptions {
            refund_locktime: 0,
            ..test_options()
        };

        assert!(matches!(
            VhtlcScript::new(options, Network::Regtest),
            Err(VhtlcError::InvalidLocktime(_))
        ));
    }

    #[test]
    fn zero_delay_is_rejected() {
        let options = VhtlcOptions {
            unilateral_claim_delay: Sequence::ZERO,
            ..test_options()
        };

        assert!(matches!(
            VhtlcScript::new(options, Network::Regtest),
            Err(VhtlcError::InvalidDelay(_))
        ));
    }

    #[test]
    fn address_round_trips() {
        let vhtlc = VhtlcScript::new(test_options(), Network::Regtest).expect("valid VHTLC");
        let address = vhtlc.address();

        let decoded = ArkAddress::decode(&address.encode()).expect("valid address");

        assert_eq!(decoded, address);
        assert_eq!(decoded.to_p2tr_script_pubkey(), vhtlc.script_pubkey());
    }
}
