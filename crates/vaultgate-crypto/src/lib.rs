//! Vaultgate Cryptographic Primitives
//!
//! Cryptographic building blocks for the Vaultgate key hierarchy. Pure
//! functions with deterministic outputs; callers provide random bytes so
//! tests can be deterministic.
//!
//! # Key Hierarchy
//!
//! ```text
//! password + email + KDF config
//!        │
//!        ▼
//! PBKDF2 / Argon2id → MasterKey ──(one-way PBKDF2)──▶ MasterKeyHash
//!        │
//!        ▼
//! HKDF stretch → StretchedMasterKey
//!        │
//!        ▼
//! AES-CBC + HMAC wrap → EncryptedUserKey ◀──(RSA-OAEP wrap)── device /
//!        │                                   auth-request public keys
//!        ▼
//! UserKey → vault data, cipher keys, org keys
//! ```
//!
//! # Security
//!
//! Fail closed:
//! - HMAC tag verified in constant time before any CBC decryption
//! - RSA unwrap failures surface as errors, never as garbage key bytes
//! - KDF parameters below the safety floors are rejected outright
//!
//! Key class separation:
//! - Each key class is a distinct nominal type; the compiler rejects a
//!   `MasterKey` where a `UserKey` is expected
//! - Master key hash derivation reverses password/key roles so hash and
//!   key are not convertible into one another
//!
//! Fingerprints:
//! - Phrase is a pure function of (email, public key); derived only from
//!   locally held key material, never a server echo

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod kdf;
pub mod keys;
mod wordlist;

pub use engine::{
    Ciphertext, IV_LEN, MAC_LEN, RSA_KEY_BITS, generate_rsa_key_pair, rsa_unwrap, rsa_wrap,
    symmetric_decrypt, symmetric_encrypt,
};
pub use error::CryptoError;
pub use fingerprint::{FingerprintPhrase, PHRASE_WORDS, fingerprint_phrase};
pub use kdf::{HashPurpose, KdfConfig, derive_master_key, derive_master_key_hash, stretch_master_key};
pub use keys::{
    DeviceKey, MASTER_KEY_LEN, MasterKey, MasterKeyHash, OrgKey, RsaKeyPair, SYM_KEY_LEN,
    StretchedMasterKey, SymmetricCryptoKey, UserKey, public_key_from_der,
};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
