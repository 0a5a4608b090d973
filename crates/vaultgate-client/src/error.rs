//! Error types for the client state machines and orchestrator.

use thiserror::Error;
use vaultgate_core::{KeyHierarchyError, StoreError, TransportError};
use vaultgate_crypto::CryptoError;

/// Errors from the auth request flow state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthRequestError {
    /// An event arrived that the current state cannot accept.
    #[error("unexpected event {event} in state {state}")]
    UnexpectedEvent {
        /// State the flow was in
        state: &'static str,
        /// Event that could not be handled
        event: &'static str,
    },

    /// The fingerprint re-derived from the local private key does not
    /// match the phrase shown to the user. Approval material is rejected
    /// without touching the session.
    #[error("fingerprint phrase mismatch, possible tampering")]
    FingerprintMismatch,

    /// An approved status arrived without its key payload.
    #[error("approved status missing key material: {what}")]
    MissingKeyMaterial {
        /// Which payload was absent
        what: &'static str,
    },

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A key hierarchy operation failed.
    #[error(transparent)]
    KeyHierarchy(#[from] KeyHierarchyError),
}

/// Errors from the login orchestrator and the auth request driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The auth request flow itself failed.
    #[error(transparent)]
    AuthRequest(#[from] AuthRequestError),

    /// A transport call failed and was not retryable.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Admin request persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A key hierarchy operation failed.
    #[error(transparent)]
    KeyHierarchy(#[from] KeyHierarchyError),

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The auth request was denied (after the one automatic restart).
    #[error("auth request denied")]
    RequestDenied,

    /// The user abandoned the auth request flow.
    #[error("auth request abandoned")]
    Abandoned,

    /// The flow's approval channel closed before the flow completed.
    #[error("approval channel closed before flow completion")]
    ChannelClosed,
}
