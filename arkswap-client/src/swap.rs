//! The persisted swap data model.
//!
//! A [`Swap`] is created by one of the caller-facing operations, mutated only
//! by the lifecycle state machine, and never deleted: terminal swaps remain
//! in the repository for history.

use crate::error::Error;
use arkswap_core::ArkAddress;
use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::hex::FromHex;
use bitcoin::secp256k1::PublicKey;
use bitcoin::secp256k1::SecretKey;
use bitcoin::taproot::LeafVersion;
use bitcoin::taproot::TapNodeHash;
use bitcoin::Amount;
use bitcoin::ScriptBuf;
use bitcoin::TapLeafHash;
use lightning_invoice::Bolt11Invoice;
use serde::Deserialize;
use serde::Serialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use std::fmt;
use std::str::FromStr;

/// All possible states of a counterparty swap.
///
/// Swaps progress through these states during their lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    /// Initial state when the swap is created.
    #[serde(rename = "swap.created")]
    Created,
    /// Lightning invoice has been set.
    #[serde(rename = "invoice.set")]
    InvoiceSet,
    /// Waiting for the Lightning invoice payment.
    #[serde(rename = "invoice.pending")]
    InvoicePending,
    /// Lightning invoice settled by the counterparty.
    #[serde(rename = "invoice.settled")]
    InvoiceSettled,
    /// Invoice expired before payment.
    #[serde(rename = "invoice.expired")]
    InvoiceExpired,
    /// The counterparty failed to pay the invoice.
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    /// Lockup transaction detected in the mempool.
    #[serde(rename = "transaction.mempool")]
    TransactionMempool,
    /// Lockup transaction confirmed.
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed,
    /// Counterparty's server lockup detected in the mempool.
    #[serde(rename = "transaction.server.mempool")]
    TransactionServerMempool,
    /// Counterparty's server lockup confirmed.
    #[serde(rename = "transaction.server.confirmed")]
    TransactionServerConfirmed,
    /// The counterparty requests a cooperative claim signature.
    #[serde(rename = "transaction.claim.pending")]
    TransactionClaimPending,
    /// Transaction claimed.
    #[serde(rename = "transaction.claimed")]
    TransactionClaimed,
    /// The lockup transaction did not match what the counterparty expected.
    #[serde(rename = "transaction.lockupFailed")]
    TransactionLockupFailed,
    /// Transaction failed.
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    /// Transaction refunded.
    #[serde(rename = "transaction.refunded")]
    TransactionRefunded,
    /// Swap expired; a refund may be available.
    #[serde(rename = "swap.expired")]
    SwapExpired,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Created => "swap.created",
            SwapStatus::InvoiceSet => "invoice.set",
            SwapStatus::InvoicePending => "invoice.pending",
            SwapStatus::InvoiceSettled => "invoice.settled",
            SwapStatus::InvoiceExpired => "invoice.expired",
            SwapStatus::InvoiceFailedToPay => "invoice.failedToPay",
            SwapStatus::TransactionMempool => "transaction.mempool",
            SwapStatus::TransactionConfirmed => "transaction.confirmed",
            SwapStatus::TransactionServerMempool => "transaction.server.mempool",
            SwapStatus::TransactionServerConfirmed => "transaction.server.confirmed",
            SwapStatus::TransactionClaimPending => "transaction.claim.pending",
            SwapStatus::TransactionClaimed => "transaction.claimed",
            SwapStatus::TransactionLockupFailed => "transaction.lockupFailed",
            SwapStatus::TransactionFailed => "transaction.failed",
            SwapStatus::TransactionRefunded => "transaction.refunded",
            SwapStatus::SwapExpired => "swap.expired",
        }
    }

    /// Whether this status ends the lifecycle of a swap of the given kind.
    /// Terminal swaps are never reopened or re-claimed.
    pub fn is_terminal_for(&self, kind: SwapKind) -> bool {
        match kind {
            SwapKind::Reverse => matches!(
                self,
                SwapStatus::InvoiceSettled
                    | SwapStatus::InvoiceExpired
                    | SwapStatus::SwapExpired
                    | SwapStatus::TransactionFailed
                    | SwapStatus::TransactionRefunded
            ),
            SwapKind::Submarine => matches!(
                self,
                SwapStatus::TransactionClaimed
                    | SwapStatus::SwapExpired
                    | SwapStatus::InvoiceFailedToPay
                    | SwapStatus::TransactionLockupFailed
                    | SwapStatus::TransactionRefunded
            ),
            SwapKind::Chain => matches!(
                self,
                SwapStatus::TransactionClaimed
                    | SwapStatus::SwapExpired
                    | SwapStatus::TransactionFailed
                    | SwapStatus::TransactionRefunded
            ),
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapKind {
    Reverse,
    Submarine,
    Chain,
}

impl SwapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapKind::Reverse => "reverse",
            SwapKind::Submarine => "submarine",
            SwapKind::Chain => "chain",
        }
    }

    /// The status a freshly created swap of this kind starts in.
    pub fn initial_status(&self) -> SwapStatus {
        match self {
            SwapKind::Reverse | SwapKind::Chain => SwapStatus::Created,
            SwapKind::Submarine => SwapStatus::InvoiceSet,
        }
    }
}

impl fmt::Display for SwapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reverse" => Ok(SwapKind::Reverse),
            "submarine" => Ok(SwapKind::Submarine),
            "chain" => Ok(SwapKind::Chain),
            other => Err(Error::ad_hoc(format!("unknown swap kind: {other}"))),
        }
    }
}

/// All the timelocks of a VHTLC, as reported by the counterparty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutBlockHeights {
    pub refund: u32,
    pub unilateral_claim: u32,
    pub unilateral_refund: u32,
    pub unilateral_refund_without_receiver: u32,
}

/// One leaf of a counterparty-serialised Taproot swap tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTreeLeaf {
    pub version: u8,
    /// Leaf script, hex-encoded.
    pub output: String,
}

/// The BTC-side contract of a chain swap, as serialised by the counterparty.
///
/// No local HTLC reconstruction happens for the BTC side: the lockup output
/// is verified against the MuSig2-tweaked aggregate key using this tree's
/// merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTree {
    pub claim_leaf: SwapTreeLeaf,
    pub refund_leaf: SwapTreeLeaf,
}

impl SwapTree {
    /// The merkle root of the two-leaf tree.
    pub fn merkle_root(&self) -> Result<TapNodeHash, Error> {
        let leaf_hash = |leaf: &SwapTreeLeaf| -> Result<TapNodeHash, Error> {
            let script = Vec::from_hex(&leaf.output)
                .map_err(|e| Error::ad_hoc(format!("invalid swap tree leaf hex: {e}")))?;
            let script = ScriptBuf::from_bytes(script);

            let version = LeafVersion::from_consensus(leaf.version)
                .map_err(|e| Error::ad_hoc(format!("invalid swap tree leaf version: {e}")))?;

            Ok(TapNodeHash::from(TapLeafHash::from_script(&script, version)))
        };

        let claim = leaf_hash(&self.claim_leaf)?;
        let refund = leaf_hash(&self.refund_leaf)?;

        Ok(TapNodeHash::from_node_hashes(claim, refund))
    }
}

/// Data related to a reverse submarine swap (receive from Lightning).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseSwapData {
    /// Unique swap identifier, assigned by the counterparty.
    pub id: String,
    /// Current swap status.
    pub status: SwapStatus,
    /// UNIX timestamp when the swap was created.
    pub created_at: u64,
    /// Preimage for the swap.
    pub preimage: [u8; 32],
    /// `ripemd160(sha256(preimage))`, the hash in the VHTLC claim leaf.
    pub preimage_hash: ripemd160::Hash,
    /// Our key; spends the claim path.
    pub claim_public_key: PublicKey,
    /// The counterparty's key; co-signs the refund paths.
    pub refund_public_key: PublicKey,
    /// Amount locked up in the VHTLC.
    pub amount: Amount,
    pub timeout_block_heights: TimeoutBlockHeights,
    /// Address where the counterparty locks funds.
    #[serde_as(as = "DisplayFromStr")]
    pub lockup_address: ArkAddress,
    /// BOLT11 invoice the payer settles.
    pub invoice: Bolt11Invoice,
}

/// Data related to a submarine swap (pay to Lightning).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmarineSwapData {
    pub id: String,
    pub status: SwapStatus,
    pub created_at: u64,
    /// The invoice's payment hash, folded through ripemd160.
    pub preimage_hash: ripemd160::Hash,
    /// Our key; spends the refund paths.
    pub refund_public_key: PublicKey,
    /// The counterparty's key; spends the claim path.
    pub claim_public_key: PublicKey,
    /// Amount we lock up in the VHTLC.
    pub amount: Amount,
    pub timeout_block_heights: TimeoutBlockHeights,
    #[serde_as(as = "DisplayFromStr")]
    pub lockup_address: ArkAddress,
    /// BOLT11 invoice being paid.
    pub invoice: Bolt11Invoice,
    /// Set once a refund transaction has been finalized.
    pub refunded: bool,
    /// Set when the swap failed in a way that left our funds locked.
    pub refundable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainSwapDirection {
    ArkToBtc,
    BtcToArk,
}

/// The BTC side of a chain swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtcSideDetails {
    /// The counterparty's key in the MuSig2 aggregate.
    pub counterparty_public_key: PublicKey,
    /// Taproot tree of the BTC lockup output.
    pub swap_tree: SwapTree,
    /// BTC lockup address.
    pub lockup_address: String,
    pub timeout_block_height: u32,
    pub amount: Amount,
}

/// Data related to a chain swap (Ark ↔ on-chain BTC).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSwapData {
    pub id: String,
    pub status: SwapStatus,
    pub created_at: u64,
    pub direction: ChainSwapDirection,
    /// Preimage for the swap.
    pub preimage: [u8; 32],
    /// `ripemd160(sha256(preimage))`, the hash in the VHTLC claim leaf.
    pub preimage_hash: ripemd160::Hash,
    /// Secret key used exclusively for the BTC-side contract. Never the
    /// wallet's long-term identity.
    pub ephemeral_key: SecretKey,
    /// Destination address on the opposite chain.
    pub to_address: String,
    pub amount: Amount,
    /// Our key on the Ark side.
    pub ark_public_key: PublicKey,
    /// The counterparty's key on the Ark side.
    pub ark_counterparty_public_key: PublicKey,
    #[serde_as(as = "DisplayFromStr")]
    pub ark_lockup_address: ArkAddress,
    pub ark_amount: Amount,
    pub timeout_block_heights: TimeoutBlockHeights,
    pub btc: BtcSideDetails,
    /// Per-swap fee rate override for the BTC claim transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate_sat_per_vb: Option<u64>,
    pub refunded: bool,
    pub refundable: bool,
}

impl ChainSwapData {
    /// The SHA256 preimage hash shared with the counterparty at creation.
    pub fn preimage_hash_sha256(&self) -> sha256::Hash {
        sha256::Hash::hash(&self.preimage)
    }
}

/// A pending or historical swap, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Swap {
    Reverse(ReverseSwapData),
    Submarine(SubmarineSwapData),
    Chain(ChainSwapData),
}

impl Swap {
    pub fn id(&self) -> &str {
        match self {
            Swap::Reverse(s) => &s.id,
            Swap::Submarine(s) => &s.id,
            Swap::Chain(s) => &s.id,
        }
    }

    pub fn kind(&self) -> SwapKind {
        match self {
            Swap::Reverse(_) => SwapKind::Reverse,
            Swap::Submarine(_) => SwapKind::Submarine,
            Swap::Chain(_) => SwapKind::Chain,
        }
    }

    pub fn status(&self) -> SwapStatus {
        match self {
            Swap::Reverse(s) => s.status,
            Swap::Submarine(s) => s.status,
            Swap::Chain(s) => s.status,
        }
    }

    pub fn set_status(&mut self, status: SwapStatus) {
        match self {
            Swap::Reverse(s) => s.status = status,
            Swap::Submarine(s) => s.status = status,
            Swap::Chain(s) => s.status = status,
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            Swap::Reverse(s) => s.created_at,
            Swap::Submarine(s) => s.created_at,
            Swap::Chain(s) => s.created_at,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status().is_terminal_for(self.kind())
    }

    pub fn set_refundable(&mut self, refundable: bool) {
        match self {
            Swap::Submarine(s) => s.refundable = refundable,
            Swap::Chain(s) => s.refundable = refundable,
            Swap::Reverse(_) => {}
        }
    }

    pub fn set_refunded(&mut self, refunded: bool) {
        match self {
            Swap::Submarine(s) => s.refunded = refunded,
            Swap::Chain(s) => s.refunded = refunded,
            Swap::Reverse(_) => {}
        }
    }
}

/// Ordering for repository queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOrder {
    CreatedAtAsc,
    CreatedAtDesc,
}

/// Repository filter. Within a field the values are disjunctive (`IN`
/// semantics); across fields they are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct SwapFilter {
    pub ids: Option<Vec<String>>,
    pub statuses: Option<Vec<SwapStatus>>,
    pub kinds: Option<Vec<SwapKind>>,
    pub order: Option<SwapOrder>,
}

impl SwapFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            ids: Some(vec![id.into()]),
            ..Self::default()
        }
    }

    pub fn by_kind_and_status(kind: SwapKind, status: SwapStatus) -> Self {
        Self {
            kinds: Some(vec![kind]),
            statuses: Some(vec![status]),
            ..Self::default()
        }
    }

    pub fn ordered(mut self, order: SwapOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// An explicitly empty value set can never match anything; such filters
    /// short-circuit without a storage round-trip.
    pub fn is_vacuous(&self) -> bool {
        self.ids.as_ref().is_some_and(|v| v.is_empty())
            || self.statuses.as_ref().is_some_and(|v| v.is_empty())
            || self.kinds.as_ref().is_some_and(|v| v.is_empty())
    }

    pub fn matches(&self, swap: &Swap) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == swap.id()) {
                return false;
            }
        }

        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&swap.status()) {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&swap.kind()) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use bitcoin::key::Secp256k1;
    use bitcoin::key::TweakedPublicKey;
    use bitcoin::Network;

    pub const TEST_INVOICE: &str = "lnbcrt10u1p5d55pjpp56ms94rkev7tdrwqyus5a63lny2mqzq9vh2rq3u4ym3v4lxv6xl4qdql2djkuepqw3hjqs2jfvsxzerywfjhxuccqz95xqztfsp57x0nwf7nzsndjdrvsre570ehg0szw34l284hswdz6zpqvktq9mrs9qxpqysgqllgxhxeny0tvtnxuqgn4s0t2qamc6yqc4t3pe6p2x5lgs8v8r3vxzxp3a3ax9j7d2ta5cduddln8n9se7q0jgg7s0h8t2vhljlu3wkcps9k8xs";

    pub fn test_public_key(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).expect("valid secret key");
        PublicKey::from_secret_key(&secp, &sk)
    }

    pub fn test_ark_address(byte: u8) -> ArkAddress {
        let server = test_public_key(0x03).x_only_public_key().0;
        let owner = test_public_key(byte).x_only_public_key().0;

        ArkAddress::new(
            Network::Regtest,
            server,
            TweakedPublicKey::dangerous_assume_tweaked(owner),
        )
    }

    pub fn test_timeouts() -> TimeoutBlockHeights {
        TimeoutBlockHeights {
            refund: 600_000,
            unilateral_claim: 144,
            unilateral_refund: 288,
            unilateral_refund_without_receiver: 288,
        }
    }

    pub fn reverse_swap(id: &str, created_at: u64) -> ReverseSwapData {
        let preimage = [7u8; 32];
        let preimage_hash_sha256 = sha256::Hash::hash(&preimage);
        let preimage_hash = ripemd160::Hash::hash(preimage_hash_sha256.as_byte_array());

        ReverseSwapData {
            id: id.to_string(),
            status: SwapKind::Reverse.initial_status(),
            created_at,
            preimage,
            preimage_hash,
            claim_public_key: test_public_key(0x02),
            refund_public_key: test_public_key(0x01),
            amount: Amount::from_sat(100_000),
            timeout_block_heights: test_timeouts(),
            lockup_address: test_ark_address(0x20),
            invoice: TEST_INVOICE.parse().expect("valid invoice"),
        }
    }

    pub fn submarine_swap(id: &str, created_at: u64) -> SubmarineSwapData {
        let invoice: Bolt11Invoice = TEST_INVOICE.parse().expect("valid invoice");
        let preimage_hash = ripemd160::Hash::hash(invoice.payment_hash().as_byte_array());

        SubmarineSwapData {
            id: id.to_string(),
            status: SwapKind::Submarine.initial_status(),
            created_at,
            preimage_hash,
            refund_public_key: test_public_key(0x01),
            claim_public_key: test_public_key(0x02),
            amount: Amount::from_sat(100_000),
            timeout_block_heights: test_timeouts(),
            lockup_address: test_ark_address(0x21),
            invoice,
            refunded: false,
            refundable: false,
        }
    }

    pub fn chain_swap(id: &str, created_at: u64) -> ChainSwapData {
        let preimage = [9u8; 32];
        let preimage_hash_sha256 = sha256::Hash::hash(&preimage);
        let preimage_hash = ripemd160::Hash::hash(preimage_hash_sha256.as_byte_array());

        ChainSwapData {
            id: id.to_string(),
            status: SwapKind::Chain.initial_status(),
            created_at,
            direction: ChainSwapDirection::ArkToBtc,
            preimage,
            preimage_hash,
            ephemeral_key: SecretKey::from_slice(&[0x42; 32]).expect("valid secret key"),
            to_address: "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080".to_string(),
            amount: Amount::from_sat(50_000),
            ark_public_key: test_public_key(0x01),
            ark_counterparty_public_key: test_public_key(0x02),
            ark_lockup_address: test_ark_address(0x22),
            ark_amount: Amount::from_sat(50_500),
            timeout_block_heights: test_timeouts(),
            btc: BtcSideDetails {
                counterparty_public_key: test_public_key(0x05),
                swap_tree: SwapTree {
                    claim_leaf: SwapTreeLeaf {
                        version: 192,
                        output: "51".to_string(),
                    },
                    refund_leaf: SwapTreeLeaf {
                        version: 192,
                        output: "52".to_string(),
                    },
                },
                lockup_address: "bcrt1qvhtlc".to_string(),
                timeout_block_height: 800_000,
                amount: Amount::from_sat(50_000),
            },
            fee_rate_sat_per_vb: None,
            refunded: false,
            refundable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_fixtures::chain_swap;
    use test_fixtures::reverse_swap;

    #[test]
    fn swap_round_trips_through_json() {
        let swap = Swap::Reverse(reverse_swap("swap-1", 123));
        let json = serde_json::to_string(&swap).unwrap();
        let loaded: Swap = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.id(), "swap-1");
        assert_eq!(loaded.kind(), SwapKind::Reverse);
        assert_eq!(loaded.created_at(), 123);

        let swap = Swap::Chain(chain_swap("swap-2", 456));
        let json = serde_json::to_string(&swap).unwrap();
        let loaded: Swap = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.kind(), SwapKind::Chain);
        match loaded {
            Swap::Chain(data) => {
                assert_eq!(data.direction, ChainSwapDirection::ArkToBtc);
                assert_eq!(data.preimage, [9u8; 32]);
            }
            Swap::Reverse(_) | Swap::Submarine(_) => panic!("wrong variant"),
        }
    }

    #[test]
    fn status_serde_uses_wire_names() {
        let status: SwapStatus = serde_json::from_str("\"invoice.failedToPay\"").unwrap();
        assert_eq!(status, SwapStatus::InvoiceFailedToPay);

        let json = serde_json::to_string(&SwapStatus::TransactionServerConfirmed).unwrap();
        assert_eq!(json, "\"transaction.server.confirmed\"");

        for status in [
            SwapStatus::Created,
            SwapStatus::InvoiceSettled,
            SwapStatus::TransactionClaimPending,
            SwapStatus::SwapExpired,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn initial_statuses_per_kind() {
        assert_eq!(SwapKind::Reverse.initial_status(), SwapStatus::Created);
        assert_eq!(SwapKind::Submarine.initial_status(), SwapStatus::InvoiceSet);
        assert_eq!(SwapKind::Chain.initial_status(), SwapStatus::Created);
    }

    #[test]
    fn terminal_statuses_per_kind() {
        assert!(SwapStatus::InvoiceSettled.is_terminal_for(SwapKind::Reverse));
        assert!(!SwapStatus::InvoiceSettled.is_terminal_for(SwapKind::Submarine));

        assert!(SwapStatus::TransactionClaimed.is_terminal_for(SwapKind::Submarine));
        assert!(SwapStatus::TransactionLockupFailed.is_terminal_for(SwapKind::Submarine));
        assert!(!SwapStatus::TransactionLockupFailed.is_terminal_for(SwapKind::Chain));

        assert!(SwapStatus::TransactionClaimed.is_terminal_for(SwapKind::Chain));
        assert!(!SwapStatus::TransactionMempool.is_terminal_for(SwapKind::Chain));
    }

    #[test]
    fn vacuous_filters() {
        let filter = SwapFilter {
            ids: Some(vec![]),
            ..SwapFilter::default()
        };
        assert!(filter.is_vacuous());

        let filter = SwapFilter {
            statuses: Some(vec![]),
            ..SwapFilter::default()
        };
        assert!(filter.is_vacuous());

        assert!(!SwapFilter::all().is_vacuous());
        assert!(!SwapFilter::by_id("x").is_vacuous());
    }
}
