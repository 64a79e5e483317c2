//! Events fanned out by the swap manager.

use crate::error::Error;
use crate::swap::SwapStatus;

/// What a completed swap resolved with.
#[derive(Debug, Clone)]
pub struct SwapCompletion {
    pub swap_id: String,
    /// The terminal status the swap settled in.
    pub status: SwapStatus,
    /// Settlement transaction id, where the flow produces one.
    pub txid: Option<String>,
    /// The preimage, once revealed.
    pub preimage: Option<[u8; 32]>,
}

/// A claim or refund action dispatched by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapAction {
    ArkClaim,
    ArkRefund,
    BtcClaim,
    CooperativeSign,
    QuoteRenegotiated,
    BatchRecovery,
}

/// Fleet-wide event stream payload.
#[derive(Debug, Clone)]
pub enum SwapEvent {
    /// A status transition was observed and persisted.
    Update { swap_id: String, status: SwapStatus },
    /// A swap reached a successful terminal state.
    Completed(SwapCompletion),
    /// A swap failed terminally.
    Failed { swap_id: String, error: Error },
    /// The state machine executed a claim/refund action.
    ActionExecuted { swap_id: String, action: SwapAction },
    /// The push transport (re)connected.
    TransportConnected { swap_id: String },
    /// The push transport dropped; reconnection or fallback follows.
    TransportDisconnected { swap_id: String },
}
