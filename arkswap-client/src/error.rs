use arkswap_core::keys::KeyError;
use std::fmt;

/// Error for all swap operations.
///
/// Variants fall into four families with different handling:
///
/// - *Integrity* errors are fatal. They fire before any funds move and are
///   never retried.
/// - *Lifecycle* errors come out of the counterparty's status stream and
///   carry a `refundable` flag; the caller may run the refund path.
/// - *Transaction* errors are terminal counterparty outcomes that need no
///   further action.
/// - Transport and storage errors are surfaced as-is; transport errors are
///   retried by the manager before they ever reach a caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // Integrity.
    #[error("lockup address mismatch: expected {expected}, got {actual}")]
    LockupAddressMismatch { expected: String, actual: String },
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
    #[error("final ark transaction failed verification for swap {swap_id}: {reason}")]
    InvalidFinalArkTx { swap_id: String, reason: String },
    #[error("counterparty signature failed verification for swap {swap_id}: {reason}")]
    InvalidCounterpartySignature { swap_id: String, reason: String },

    // Counterparty lifecycle.
    #[error("invoice expired for swap {swap_id}")]
    InvoiceExpired { swap_id: String, refundable: bool },
    #[error("invoice could not be paid for swap {swap_id}")]
    InvoiceFailedToPay { swap_id: String, refundable: bool },
    #[error("swap {swap_id} expired")]
    SwapExpired { swap_id: String, refundable: bool },
    #[error("lockup failed for swap {swap_id}")]
    TransactionLockupFailed { swap_id: String, refundable: bool },

    // Counterparty transaction.
    #[error("transaction failed for swap {swap_id}")]
    TransactionFailed { swap_id: String },
    #[error("transaction refunded for swap {swap_id}")]
    TransactionRefunded { swap_id: String },

    #[error("no spendable virtual coins for swap {swap_id}")]
    NoSpendableVirtualCoins { swap_id: String },
    #[error("counterparty reported settlement without a transaction id for swap {swap_id}")]
    SwapSettlementMissingTxid { swap_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("wallet error: {0}")]
    Wallet(String),
    #[error("ark server error: {0}")]
    ArkServer(String),
    #[error(transparent)]
    Core(#[from] arkswap_core::Error),
    #[error("{0}")]
    AdHoc(String),
}

impl Error {
    pub fn ad_hoc(message: impl fmt::Display) -> Self {
        Self::AdHoc(message.to_string())
    }

    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    pub fn wallet(message: impl fmt::Display) -> Self {
        Self::Wallet(message.to_string())
    }

    pub fn ark_server(message: impl fmt::Display) -> Self {
        Self::ArkServer(message.to_string())
    }

    /// Whether the caller may run the refund path after this error.
    pub fn refundable(&self) -> bool {
        match self {
            Error::InvoiceExpired { refundable, .. }
            | Error::InvoiceFailedToPay { refundable, .. }
            | Error::SwapExpired { refundable, .. }
            | Error::TransactionLockupFailed { refundable, .. } => *refundable,
            Error::LockupAddressMismatch { .. }
            | Error::InvalidKey(_)
            | Error::InvalidFinalArkTx { .. }
            | Error::InvalidCounterpartySignature { .. }
            | Error::TransactionFailed { .. }
            | Error::TransactionRefunded { .. }
            | Error::NoSpendableVirtualCoins { .. }
            | Error::SwapSettlementMissingTxid { .. }
            | Error::Cancelled
            | Error::Transport(_)
            | Error::Storage(_)
            | Error::Wallet(_)
            | Error::ArkServer(_)
            | Error::Core(_)
            | Error::AdHoc(_) => false,
        }
    }

    /// Integrity violations abort before any funds move and must never be
    /// retried.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::LockupAddressMismatch { .. }
                | Error::InvalidKey(_)
                | Error::InvalidFinalArkTx { .. }
                | Error::InvalidCounterpartySignature { .. }
        )
    }

    fn prepend(self, context: &str) -> Self {
        match self {
            Error::Transport(m) => Error::Transport(format!("{context}: {m}")),
            Error::Storage(m) => Error::Storage(format!("{context}: {m}")),
            Error::Wallet(m) => Error::Wallet(format!("{context}: {m}")),
            Error::ArkServer(m) => Error::ArkServer(format!("{context}: {m}")),
            Error::AdHoc(m) => Error::AdHoc(format!("{context}: {m}")),
            Error::Core(e) => Error::AdHoc(format!("{context}: {e}")),
            // Typed errors keep their identity; context would only obscure
            // the handling they demand.
            other => other,
        }
    }
}

/// Extension trait to attach context to errors as they bubble up.
pub trait ErrorContext<T> {
    fn context(self, context: impl fmt::Display) -> Result<T, Error>;

    fn with_context(self, f: impl FnOnce() -> String) -> Result<T, Error>;
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn context(self, context: impl fmt::Display) -> Result<T, Error> {
        self.map_err(|e| e.prepend(&context.to_string()))
    }

    fn with_context(self, f: impl FnOnce() -> String) -> Result<T, Error> {
        self.map_err(|e| e.prepend(&f()))
    }
}

impl<T> ErrorContext<T> for Result<T, arkswap_core::Error> {
    fn context(self, context: impl fmt::Display) -> Result<T, Error> {
        self.map_err(Error::from).context(context)
    }

    fn with_context(self, f: impl FnOnce() -> String) -> Result<T, Error> {
        self.map_err(Error::from).with_context(f)
    }
}
