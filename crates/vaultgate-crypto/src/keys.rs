//! Nominal key types for the vault key hierarchy.
//!
//! Each key class is a distinct type so the compiler rejects passing a
//! [`MasterKey`] where a [`UserKey`] is expected. Raw byte buffers never
//! cross module boundaries as "some key"; they are converted into a typed
//! key at the edge and zeroized on drop.
//!
//! ```text
//! password + email + KDF config
//!        │
//!        ▼
//!   MasterKey ──(one-way)──▶ MasterKeyHash
//!        │
//!        ▼ HKDF stretch
//!   StretchedMasterKey ──wraps──▶ UserKey ──wraps──▶ cipher/org keys
//!
//!   RsaKeyPair (identity / ephemeral auth-request / device)
//!        │
//!        └──wraps──▶ UserKey, MasterKey (auth-request approval payloads)
//!
//!   DeviceKey ──wraps──▶ device private key (trusted-device unlock)
//! ```

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of each half (encryption, MAC) of a symmetric crypto key.
pub const SYM_KEY_HALF_LEN: usize = 32;

/// Total length of a symmetric crypto key.
pub const SYM_KEY_LEN: usize = 2 * SYM_KEY_HALF_LEN;

/// Length of a master key and master key hash.
pub const MASTER_KEY_LEN: usize = 32;

/// A symmetric key split into an encryption half and a MAC half.
///
/// Used for encrypt-then-MAC: AES-256-CBC with the first half, HMAC-SHA256
/// with the second. The halves are never used for each other's purpose.
#[derive(Clone, Zeroize)]
pub struct SymmetricCryptoKey {
    enc: [u8; SYM_KEY_HALF_LEN],
    mac: [u8; SYM_KEY_HALF_LEN],
}

impl SymmetricCryptoKey {
    /// Build a key from a 64-byte buffer (encryption half first).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SYM_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SYM_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut enc = [0u8; SYM_KEY_HALF_LEN];
        let mut mac = [0u8; SYM_KEY_HALF_LEN];
        enc.copy_from_slice(&bytes[..SYM_KEY_HALF_LEN]);
        mac.copy_from_slice(&bytes[SYM_KEY_HALF_LEN..]);
        Ok(Self { enc, mac })
    }

    /// Build a key from already-split halves.
    pub fn from_halves(enc: [u8; SYM_KEY_HALF_LEN], mac: [u8; SYM_KEY_HALF_LEN]) -> Self {
        Self { enc, mac }
    }

    /// Encryption half (AES-256 key).
    pub fn enc_half(&self) -> &[u8; SYM_KEY_HALF_LEN] {
        &self.enc
    }

    /// MAC half (HMAC-SHA256 key).
    pub fn mac_half(&self) -> &[u8; SYM_KEY_HALF_LEN] {
        &self.mac
    }

    /// Full key material, encryption half first.
    ///
    /// Used when the whole key is itself wrapped by another key.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SYM_KEY_LEN);
        out.extend_from_slice(&self.enc);
        out.extend_from_slice(&self.mac);
        out
    }
}

impl PartialEq for SymmetricCryptoKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.enc.ct_eq(&other.enc) & self.mac.ct_eq(&other.mac))
    }
}

impl Eq for SymmetricCryptoKey {}

impl std::fmt::Debug for SymmetricCryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricCryptoKey(..)")
    }
}

macro_rules! symmetric_key_class {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name(SymmetricCryptoKey);

        impl $name {
            /// Wrap an existing symmetric key as this key class.
            pub fn new(key: SymmetricCryptoKey) -> Self {
                Self(key)
            }

            /// Build this key class from a 64-byte buffer.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
                SymmetricCryptoKey::from_bytes(bytes).map(Self)
            }

            /// The underlying symmetric key.
            pub fn key(&self) -> &SymmetricCryptoKey {
                &self.0
            }

            /// Full key material, for wrapping under another key.
            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

symmetric_key_class! {
    /// The symmetric key that directly encrypts vault data.
    ///
    /// Generated once per account from secure randomness and rotated only by
    /// explicit migration. Possession of a decrypted `UserKey` is what
    /// "unlocked" means.
    UserKey
}

symmetric_key_class! {
    /// A symmetric key held only on a specific trusted device.
    ///
    /// Unwraps the device's copy of the user key without the master
    /// password after an initial trust decision.
    DeviceKey
}

symmetric_key_class! {
    /// The master key after HKDF stretching into enc + MAC halves.
    ///
    /// This is the key that actually wraps the [`UserKey`]; the unstretched
    /// [`MasterKey`] is never used for encryption directly.
    StretchedMasterKey
}

symmetric_key_class! {
    /// A per-organization symmetric key, wrapped under the account identity
    /// key pair and shared across the organization's members.
    OrgKey
}

/// The key derived from the master password.
///
/// Only [`crate::kdf::derive_master_key`] constructs one; it exists in memory
/// for the duration of an unlock and is never transmitted or persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    /// Build a master key from exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; MASTER_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: MASTER_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for MasterKey {}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// One-way hash of the master key, usable as an authentication secret.
///
/// Derived on a separate KDF path from the master key so neither is
/// convertible into the other. Never used to decrypt anything.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKeyHash([u8; MASTER_KEY_LEN]);

impl MasterKeyHash {
    /// Build a hash from exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; MASTER_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: MASTER_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for MasterKeyHash {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for MasterKeyHash {}

impl std::fmt::Debug for MasterKeyHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKeyHash(..)")
    }
}

/// An RSA key pair.
///
/// Instances: the account's long-lived identity pair, ephemeral
/// per-auth-request pairs, and per-device trust pairs.
#[derive(Clone)]
pub struct RsaKeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Pair a private key with its public half.
    pub fn new(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { public, private }
    }

    /// Public key.
    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Private key.
    pub fn private(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// DER (SPKI) encoding of the public key.
    ///
    /// This is the canonical form used for transport and fingerprinting.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyPairFailure { reason: e.to_string() })?
            .into_vec())
    }

    /// DER (PKCS#8) encoding of the private key, for encrypted persistence.
    pub fn private_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self
            .private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyPairFailure { reason: e.to_string() })?
            .as_bytes()
            .to_vec())
    }

    /// Rebuild a pair from a PKCS#8 DER private key.
    pub fn from_private_key_der(der: &[u8]) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::KeyPairFailure { reason: e.to_string() })?;
        Ok(Self::new(private))
    }
}

/// Parse a DER (SPKI) public key, as received from another party.
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::KeyPairFailure { reason: e.to_string() })
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RsaKeyPair(..)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_key_rejects_wrong_length() {
        let result = SymmetricCryptoKey::from_bytes(&[0u8; 32]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength { expected: 64, actual: 32 })
        ));
    }

    #[test]
    fn symmetric_key_splits_halves() {
        let mut bytes = [0u8; 64];
        bytes[..32].fill(0xAA);
        bytes[32..].fill(0xBB);

        let key = SymmetricCryptoKey::from_bytes(&bytes).unwrap();
        assert_eq!(key.enc_half(), &[0xAA; 32]);
        assert_eq!(key.mac_half(), &[0xBB; 32]);
        assert_eq!(key.to_vec(), bytes.to_vec());
    }

    #[test]
    fn master_key_rejects_wrong_length() {
        assert!(MasterKey::from_bytes(&[0u8; 16]).is_err());
        assert!(MasterKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn master_key_equality_compares_values() {
        let a = MasterKey::from_bytes(&[0x11u8; 32]).unwrap();
        let b = MasterKey::from_bytes(&[0x11u8; 32]).unwrap();
        let c = MasterKey::from_bytes(&[0x22u8; 32]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_classes_are_distinct_types() {
        // UserKey and DeviceKey wrap the same bytes but remain different
        // types; equality is only defined within a class.
        let bytes = [0x42u8; 64];
        let user = UserKey::from_bytes(&bytes).unwrap();
        let user_again = UserKey::from_bytes(&bytes).unwrap();
        assert_eq!(user, user_again);
    }

    #[test]
    fn debug_redacts_key_material() {
        let key = UserKey::from_bytes(&[0x42u8; 64]).unwrap();
        let rendered = format!("{key:?}");
        assert_eq!(rendered, "UserKey(..)");
        assert!(!rendered.contains("42"));
    }
}
