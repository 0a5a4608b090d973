//! Key hierarchy: the ledger of who wraps whom.
//!
//! Every wrap relationship in the hierarchy has a named forward and
//! reverse operation here; decrypting along the wrong edge fails closed
//! with [`KeyHierarchyError::InvalidKey`], never a garbage key. Setting a
//! decrypted user key into session state goes through
//! [`establish_user_key`] and nothing else.

use rand::{CryptoRng, RngCore};
use vaultgate_crypto::{
    Ciphertext, IV_LEN, MasterKey, OrgKey, RsaPrivateKey, RsaPublicKey, SYM_KEY_LEN,
    SymmetricCryptoKey, UserKey, rsa_unwrap, rsa_wrap, stretch_master_key, symmetric_decrypt,
    symmetric_encrypt,
};

use crate::{env::Environment, error::KeyHierarchyError, session::SessionContext};

/// Generate a fresh user key from environment entropy.
///
/// Done once per account at creation; afterwards the key only ever moves
/// between wraps.
pub fn make_user_key<E: Environment>(env: &E) -> Result<UserKey, KeyHierarchyError> {
    let mut bytes = [0u8; SYM_KEY_LEN];
    env.random_bytes(&mut bytes);
    Ok(UserKey::from_bytes(&bytes)?)
}

/// Wrap the user key with the (stretched) master key.
pub fn wrap_user_key_with_master_key<E: Environment>(
    env: &E,
    user_key: &UserKey,
    master_key: &MasterKey,
) -> Ciphertext {
    let stretched = stretch_master_key(master_key);
    let mut iv = [0u8; IV_LEN];
    env.random_bytes(&mut iv);
    symmetric_encrypt(&user_key.to_vec(), stretched.key(), iv)
}

/// Unwrap the user key with the master key.
///
/// # Errors
///
/// `InvalidKey` on any MAC, padding or length failure; nothing partial is
/// returned.
pub fn unwrap_user_key_with_master_key(
    wrapped: &Ciphertext,
    master_key: &MasterKey,
) -> Result<UserKey, KeyHierarchyError> {
    let stretched = stretch_master_key(master_key);
    let bytes = symmetric_decrypt(wrapped, stretched.key())?;
    Ok(UserKey::from_bytes(&bytes)?)
}

/// Wrap the user key with a device's (or auth request's) RSA public key.
pub fn wrap_user_key_with_public_key(
    user_key: &UserKey,
    public_key: &RsaPublicKey,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<u8>, KeyHierarchyError> {
    Ok(rsa_wrap(&user_key.to_vec(), public_key, rng)?)
}

/// Unwrap the user key with the matching RSA private key.
pub fn unwrap_user_key_with_private_key(
    wrapped: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<UserKey, KeyHierarchyError> {
    let bytes = rsa_unwrap(wrapped, private_key)?;
    Ok(UserKey::from_bytes(&bytes)?)
}

/// Unwrap a per-cipher symmetric key carried under the user key.
pub fn unwrap_cipher_key(
    wrapped: &Ciphertext,
    user_key: &UserKey,
) -> Result<SymmetricCryptoKey, KeyHierarchyError> {
    let bytes = symmetric_decrypt(wrapped, user_key.key())?;
    Ok(SymmetricCryptoKey::from_bytes(&bytes)?)
}

/// Unwrap an organization key shared under the account identity key pair.
pub fn unwrap_org_key(
    wrapped: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<OrgKey, KeyHierarchyError> {
    let bytes = rsa_unwrap(wrapped, private_key)?;
    Ok(OrgKey::from_bytes(&bytes)?)
}

/// Assign a decrypted user key into session state.
///
/// The ONLY path by which vault decryption becomes possible. Assignment
/// is all-or-nothing: re-establishing the same key is a no-op, and a
/// failed unwrap never reaches this point with partial material.
pub fn establish_user_key(session: &mut SessionContext, user_key: UserKey) {
    if session.user_key() == Some(&user_key) {
        // Idempotent overwrite: push/poll races may both deliver the key.
        return;
    }
    session.set_user_key(user_key);
}
