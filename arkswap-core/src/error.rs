use std::fmt;

/// Error for all core operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to build or sign a transaction.
    Transaction,
    /// A cryptographic operation failed, including signature verification.
    Crypto,
    /// An address could not be encoded or decoded.
    Address,
    AdHoc,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transaction => write!(f, "transaction error"),
            ErrorKind::Crypto => write!(f, "crypto error"),
            ErrorKind::Address => write!(f, "address error"),
            ErrorKind::AdHoc => write!(f, "error"),
        }
    }
}

impl Error {
    pub fn transaction(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Transaction,
            message: message.to_string(),
        }
    }

    pub fn crypto(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Crypto,
            message: message.to_string(),
        }
    }

    pub fn address(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Address,
            message: message.to_string(),
        }
    }

    pub fn ad_hoc(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::AdHoc,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn prepend(mut self, context: &str) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

/// Extension trait to attach context to core errors as they bubble up.
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
