use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;
use tracing::error;

/// Default JSON-RPC error code for bridge failures.
const RPC_ERROR_CODE: i32 = -32000;

/// Errors surfaced by the translation and relay layer.
///
/// Everything that reaches a client is mapped onto a JSON-RPC error with
/// code -32000 and the display message; `Internal` hides its cause behind
/// a generic message after logging it.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The raw transaction could not be decoded or its signature could not
    /// be recovered. Rejected before any chain interaction.
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Too many relays already queued on the relay lock.
    #[error("system busy")]
    Busy,

    /// The sender's on-chain nonce never converged within the deadline.
    #[error("timed out waiting for account nonce; send transactions in nonce order")]
    NonceOrderTimeout,

    /// Simulation reported the underlying execution would fail; nothing
    /// was submitted.
    #[error("{0}")]
    SimulationRevert(String),

    /// The actual submission to the ledger failed.
    #[error("{0}")]
    RelaySubmissionFailure(String),

    /// Unknown address, hash, or resource.
    #[error("{0} not found")]
    NotFound(String),

    /// Unexpected backend error. Logged, generic message returned.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn code(&self) -> i32 {
        RPC_ERROR_CODE
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        BridgeError::MalformedTransaction(message.into())
    }
}

impl From<BridgeError> for ErrorObjectOwned {
    fn from(err: BridgeError) -> Self {
        if let BridgeError::Internal(cause) = &err {
            error!("internal bridge error: {cause:#}");
        }
        ErrorObjectOwned::owned(err.code(), err.to_string(), None::<()>)
    }
}
