use bitcoin::Amount;
use bitcoin::ScriptBuf;
use bitcoin::TxOut;

pub mod conversions;
pub mod keys;
pub mod musig2;
pub mod send;
pub mod server;
pub mod vhtlc;

mod ark_address;
mod error;
mod script;

pub use ark_address::ArkAddress;
pub use error::Error;
pub use error::ErrorContext;
pub use script::csv_sig_script;
pub use script::extract_checksig_pubkeys;
pub use script::tr_script_pubkey;

/// The BIP-341 "nothing up my sleeve" point. Used as the internal key of every
/// Taproot output controlled exclusively through its script tree.
pub const UNSPENDABLE_KEY: &str =
    "0250929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0";

/// Ark transactions always spend the VTXO on input 0.
pub const VTXO_INPUT_INDEX: usize = 0;

const ANCHOR_SCRIPT_PUBKEY: [u8; 4] = [0x51, 0x02, 0x4e, 0x73];

/// The zero-value P2A output attached to every off-chain transaction so that
/// it can be fee-bumped if it ever hits the chain.
pub fn anchor_output() -> TxOut {
    let script_pubkey = ScriptBuf::from_bytes(ANCHOR_SCRIPT_PUBKEY.to_vec());

    TxOut {
        value: Amount::ZERO,
        script_pubkey,
    }
}
