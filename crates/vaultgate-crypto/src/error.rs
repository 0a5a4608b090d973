//! Error types for cryptographic operations.
//!
//! Every failure mode is explicit; no operation returns partially-decrypted
//! or unauthenticated data. Callers must treat `MacMismatch` and
//! `UnwrapFailure` as potential tampering, not transient faults.

use thiserror::Error;

/// Errors that can occur in cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// KDF parameters below the safety floor
    #[error("weak KDF configuration: {reason}")]
    WeakKdfConfig {
        /// Which parameter violated the floor
        reason: String,
    },

    /// Authentication tag did not verify; ciphertext was not decrypted
    #[error("MAC mismatch: ciphertext authentication failed")]
    MacMismatch,

    /// Authenticated ciphertext failed to decrypt (bad padding or key)
    #[error("decryption failed: {reason}")]
    DecryptFailure {
        /// What went wrong after authentication passed
        reason: String,
    },

    /// RSA unwrap of a symmetric key failed
    #[error("key unwrap failed: {reason}")]
    UnwrapFailure {
        /// Underlying RSA failure
        reason: String,
    },

    /// Key material had an unexpected length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Provided length in bytes
        actual: usize,
    },

    /// Key derivation itself failed (e.g. invalid Argon2 parameters)
    #[error("key derivation failed: {reason}")]
    DerivationFailed {
        /// Underlying KDF failure
        reason: String,
    },

    /// RSA key generation or encoding failed
    #[error("key pair operation failed: {reason}")]
    KeyPairFailure {
        /// Underlying RSA failure
        reason: String,
    },
}
