//! Error types for the Vaultgate core.
//!
//! Strongly-typed errors per layer: key-hierarchy failures, device trust
//! failures, transport failures and persistence failures. Cryptographic
//! failures always fail closed; transport failures carry enough context
//! for the caller's own retry policy.

use thiserror::Error;

/// Errors from key hierarchy operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyHierarchyError {
    /// An unwrap failed: wrong key, tampered ciphertext, or wrong unwrap
    /// direction. Session state is left untouched.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Underlying cause, safe to log
        reason: String,
    },

    /// An operation needed key material the session does not hold.
    #[error("missing key material: {what}")]
    MissingKeyMaterial {
        /// Which key was absent
        what: &'static str,
    },
}

impl From<vaultgate_crypto::CryptoError> for KeyHierarchyError {
    fn from(err: vaultgate_crypto::CryptoError) -> Self {
        Self::InvalidKey { reason: err.to_string() }
    }
}

/// Errors from device trust establishment or trusted-device unlock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceTrustError {
    /// Trust establishment failed. Non-fatal: the caller logs and
    /// continues the login.
    #[error("trust establishment failed: {reason}")]
    TrustEstablishmentFailed {
        /// Underlying cause
        reason: String,
    },

    /// Trusted-device unlock failed (bad device key or tampered blobs).
    #[error("device unlock failed: {reason}")]
    DeviceUnlockFailed {
        /// Underlying cause
        reason: String,
    },
}

/// Errors from the auth request transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request no longer exists server-side (404-equivalent).
    ///
    /// The protocol treats this identically to an explicit denial.
    #[error("auth request not found")]
    RequestNotFound,

    /// Network-level failure. Retried by caller policy, never by the
    /// protocol itself.
    #[error("transport failure: {reason}")]
    Network {
        /// Underlying cause
        reason: String,
    },
}

impl TransportError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// `RequestNotFound` is never transient - it is a terminal protocol
    /// signal, not a network fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Errors from the admin auth request store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage access failed.
    #[error("store access failed: {reason}")]
    Io {
        /// Underlying cause
        reason: String,
    },

    /// Stored data could not be decoded.
    #[error("stored auth request corrupt: {reason}")]
    Corrupt {
        /// Underlying cause
        reason: String,
    },
}
