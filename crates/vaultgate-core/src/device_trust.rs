//! Device trust: passwordless unlock on a previously-approved device.
//!
//! Trusting a device mints a device key plus an RSA pair and records
//! three blobs server-side: the user key wrapped with the device public
//! key, the device public key encrypted under the user key, and the
//! device private key encrypted under the device key. A later login on
//! the same device unlocks by reversing the chain: device key decrypts
//! the private key, the private key unwraps the user key.

use vaultgate_crypto::{
    Ciphertext, DeviceKey, IV_LEN, RsaKeyPair, SYM_KEY_LEN, UserKey, symmetric_decrypt,
    symmetric_encrypt,
};

use crate::{
    env::{EnvRng, Environment},
    error::DeviceTrustError,
    hierarchy,
    model::DeviceRegistration,
    session::SessionContext,
};

fn establishment_failed(err: impl std::fmt::Display) -> DeviceTrustError {
    DeviceTrustError::TrustEstablishmentFailed { reason: err.to_string() }
}

fn unlock_failed(err: impl std::fmt::Display) -> DeviceTrustError {
    DeviceTrustError::DeviceUnlockFailed { reason: err.to_string() }
}

/// Establish trust for this device if the policy asks for it.
///
/// Returns `Ok(None)` when `should_trust` is false. The returned
/// [`DeviceKey`] goes to platform-protected storage; the
/// [`DeviceRegistration`] goes to the server. Requires an established
/// user key in the session.
///
/// # Errors
///
/// `TrustEstablishmentFailed` when the session holds no user key or key
/// generation fails. Callers treat this as non-fatal: the login already
/// succeeded, only the trust upgrade is lost.
pub fn trust_device_if_required<E: Environment>(
    env: &E,
    session: &SessionContext,
    device_identifier: &str,
    should_trust: bool,
) -> Result<Option<(DeviceKey, DeviceRegistration)>, DeviceTrustError> {
    if !should_trust {
        return Ok(None);
    }
    let user_key = session
        .user_key()
        .ok_or(DeviceTrustError::TrustEstablishmentFailed {
            reason: "no user key established".to_owned(),
        })?;

    let mut device_key_bytes = [0u8; SYM_KEY_LEN];
    env.random_bytes(&mut device_key_bytes);
    let device_key = DeviceKey::from_bytes(&device_key_bytes).map_err(establishment_failed)?;

    let mut rng = EnvRng(env);
    let pair = vaultgate_crypto::generate_rsa_key_pair(&mut rng).map_err(establishment_failed)?;

    let public_key_der = pair.public_key_der().map_err(establishment_failed)?;
    let private_key_der = pair.private_key_der().map_err(establishment_failed)?;

    let wrapped_user_key = hierarchy::wrap_user_key_with_public_key(user_key, pair.public(), &mut rng)
        .map_err(establishment_failed)?;

    let mut iv = [0u8; IV_LEN];
    env.random_bytes(&mut iv);
    let encrypted_public_key = symmetric_encrypt(&public_key_der, user_key.key(), iv);

    env.random_bytes(&mut iv);
    let encrypted_private_key = symmetric_encrypt(&private_key_der, device_key.key(), iv);

    let registration = DeviceRegistration {
        device_identifier: device_identifier.to_owned(),
        public_key_der,
        wrapped_user_key,
        encrypted_public_key,
        encrypted_private_key,
    };
    Ok(Some((device_key, registration)))
}

/// Unlock the user key on a trusted device.
///
/// # Errors
///
/// `DeviceUnlockFailed` if any blob fails to decrypt or parse; a stale
/// or revoked device key cannot produce a partial key.
pub fn decrypt_user_key_with_device_key(
    device_key: &DeviceKey,
    encrypted_private_key: &Ciphertext,
    wrapped_user_key: &[u8],
) -> Result<UserKey, DeviceTrustError> {
    let private_key_der =
        symmetric_decrypt(encrypted_private_key, device_key.key()).map_err(unlock_failed)?;
    let pair = RsaKeyPair::from_private_key_der(&private_key_der).map_err(unlock_failed)?;
    hierarchy::unwrap_user_key_with_private_key(wrapped_user_key, pair.private())
        .map_err(unlock_failed)
}
