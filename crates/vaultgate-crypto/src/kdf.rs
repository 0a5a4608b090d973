//! Master key derivation.
//!
//! Derives the [`MasterKey`] from the master password and the account email,
//! and the one-way [`MasterKeyHash`] used as an authentication secret.
//! Both derivations are deterministic: login must reproduce the exact key
//! the account's encrypted blobs were created against.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    keys::{MASTER_KEY_LEN, MasterKey, MasterKeyHash, StretchedMasterKey, SymmetricCryptoKey},
};

/// Minimum PBKDF2 iteration count accepted for key derivation.
pub const PBKDF2_MIN_ITERATIONS: u32 = 5000;

/// Minimum Argon2id iteration (time cost) accepted.
pub const ARGON2_MIN_ITERATIONS: u32 = 2;

/// Minimum Argon2id memory in MiB accepted.
pub const ARGON2_MIN_MEMORY_MIB: u32 = 16;

/// KDF algorithm and cost parameters for master key derivation.
///
/// These travel with the account (the server stores them per user) so a
/// client can reproduce the same master key on any device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KdfConfig {
    /// PBKDF2-HMAC-SHA256.
    Pbkdf2 {
        /// Iteration count.
        iterations: u32,
    },
    /// Argon2id.
    Argon2id {
        /// Time cost (passes over memory).
        iterations: u32,
        /// Memory cost in MiB.
        memory_mib: u32,
        /// Lanes.
        parallelism: u32,
    },
}

impl KdfConfig {
    /// Reject parameters below the safety floors.
    fn validate(&self) -> Result<(), CryptoError> {
        match *self {
            Self::Pbkdf2 { iterations } => {
                if iterations < PBKDF2_MIN_ITERATIONS {
                    return Err(CryptoError::WeakKdfConfig {
                        reason: format!(
                            "PBKDF2 iterations {iterations} below floor {PBKDF2_MIN_ITERATIONS}"
                        ),
                    });
                }
            },
            Self::Argon2id { iterations, memory_mib, parallelism } => {
                if iterations < ARGON2_MIN_ITERATIONS {
                    return Err(CryptoError::WeakKdfConfig {
                        reason: format!(
                            "Argon2id iterations {iterations} below floor {ARGON2_MIN_ITERATIONS}"
                        ),
                    });
                }
                if memory_mib < ARGON2_MIN_MEMORY_MIB {
                    return Err(CryptoError::WeakKdfConfig {
                        reason: format!(
                            "Argon2id memory {memory_mib} MiB below floor {ARGON2_MIN_MEMORY_MIB} MiB"
                        ),
                    });
                }
                if parallelism == 0 {
                    return Err(CryptoError::WeakKdfConfig {
                        reason: "Argon2id parallelism must be at least 1".to_string(),
                    });
                }
            },
        }
        Ok(())
    }
}

/// Which authorization context a master key hash is derived for.
///
/// The iteration counts differ so a hash captured in one context is not
/// valid in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashPurpose {
    /// Sent to the server as the verifiable authentication secret.
    ServerAuthorization,
    /// Compared locally to gate unlock without a server round trip.
    LocalAuthorization,
}

impl HashPurpose {
    fn iterations(self) -> u32 {
        match self {
            Self::ServerAuthorization => 1,
            Self::LocalAuthorization => 2,
        }
    }
}

/// Derive the master key from the password, the email (as salt) and the
/// account's KDF configuration.
///
/// The email is trimmed and lowercased before use so the derivation is
/// stable across how the user typed their address. Argon2id hashes the
/// email first because it requires a fixed-size salt.
///
/// # Errors
///
/// - `WeakKdfConfig` if the parameters are below the safety floors
/// - `DerivationFailed` if the underlying KDF rejects the parameters
pub fn derive_master_key(
    password: &str,
    email: &str,
    kdf: &KdfConfig,
) -> Result<MasterKey, CryptoError> {
    kdf.validate()?;

    let salt = email.trim().to_lowercase();
    let mut out = [0u8; MASTER_KEY_LEN];

    match *kdf {
        KdfConfig::Pbkdf2 { iterations } => {
            pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
        },
        KdfConfig::Argon2id { iterations, memory_mib, parallelism } => {
            let params = Params::new(memory_mib * 1024, iterations, parallelism, Some(MASTER_KEY_LEN))
                .map_err(|e| CryptoError::DerivationFailed { reason: e.to_string() })?;
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

            let salt_hash = Sha256::digest(salt.as_bytes());
            argon2
                .hash_password_into(password.as_bytes(), &salt_hash, &mut out)
                .map_err(|e| CryptoError::DerivationFailed { reason: e.to_string() })?;
        },
    }

    let key = MasterKey::from_bytes(&out)?;
    out.zeroize();
    Ok(key)
}

/// Derive the one-way master key hash from the password and master key.
///
/// Uses PBKDF2 with the password as salt, the reverse of the key
/// derivation, so the hash and the key are not convertible into one
/// another.
pub fn derive_master_key_hash(
    password: &str,
    master_key: &MasterKey,
    purpose: HashPurpose,
) -> Result<MasterKeyHash, CryptoError> {
    let mut out = [0u8; MASTER_KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        master_key.as_bytes(),
        password.as_bytes(),
        purpose.iterations(),
        &mut out,
    );

    let hash = MasterKeyHash::from_bytes(&out)?;
    out.zeroize();
    Ok(hash)
}

/// Stretch the 32-byte master key into a 64-byte enc + MAC key.
///
/// HKDF-SHA256 expansion with `"enc"` / `"mac"` labels; the stretched key
/// is what actually wraps the user key.
pub fn stretch_master_key(master_key: &MasterKey) -> StretchedMasterKey {
    let Ok(hk) = Hkdf::<Sha256>::from_prk(master_key.as_bytes()) else {
        unreachable!("a 32-byte PRK is always valid for HKDF-SHA256");
    };

    let mut enc = [0u8; 32];
    let mut mac = [0u8; 32];
    let Ok(()) = hk.expand(b"enc", &mut enc) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    let Ok(()) = hk.expand(b"mac", &mut mac) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    StretchedMasterKey::new(SymmetricCryptoKey::from_halves(enc, mac))
}
