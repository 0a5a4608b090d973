//! Login orchestrator.
//!
//! One entry point for the three login shapes: master password, SSO
//! (with trusted-device or pending-admin-request unlock), and
//! auth-request login. Each strategy ends with the session holding as
//! much key material as the credentials allow; `user_key_established`
//! tells the caller whether the vault is unlockable or the account came
//! up locked.

use vaultgate_core::{
    AdminRequestStore, AuthRequestTransport, RequestId, SessionContext, TransportError,
    device_trust,
    env::Environment,
};
use vaultgate_crypto::{
    Ciphertext, HashPurpose, KdfConfig, MasterKey, MasterKeyHash, RsaKeyPair, UserKey,
    derive_master_key, derive_master_key_hash, fingerprint_phrase,
};

use crate::{auth_request::set_keys_from_approved_request, error::LoginError};

/// Server-held unlock data for the account being logged in.
#[derive(Debug, Clone)]
pub struct AccountData {
    /// Account email, the KDF salt and store key.
    pub email: String,
    /// KDF parameters registered for the account.
    pub kdf: KdfConfig,
    /// User key wrapped with the stretched master key, when the account
    /// has one.
    pub master_key_encrypted_user_key: Option<Ciphertext>,
    /// The account identity private key, encrypted under the user key.
    pub private_key_der: Option<Vec<u8>>,
    /// Whether the server demands a second factor before issuing tokens.
    pub requires_two_factor: bool,
    /// Whether the server demands a password reset, and why.
    pub force_password_reset: Option<ForcePasswordResetReason>,
}

/// Trusted-device material available on this device, if any.
#[derive(Debug, Clone)]
pub struct TrustedDeviceUnlockData {
    /// The locally stored device key.
    pub device_key: vaultgate_crypto::DeviceKey,
    /// Device private key encrypted under the device key.
    pub encrypted_private_key: Ciphertext,
    /// User key wrapped with the device public key.
    pub wrapped_user_key: Vec<u8>,
}

/// Credentials handed over by a completed auth request flow.
#[derive(Debug, Clone)]
pub struct AuthRequestCredentials {
    /// Id of the consumed request.
    pub request_id: RequestId,
    /// User key, when the approval carried one directly.
    pub user_key: Option<UserKey>,
    /// Master key, when the approval came from a password-holding device.
    pub master_key: Option<MasterKey>,
    /// Authentication hash accompanying the master key.
    pub master_key_hash: Option<MasterKeyHash>,
}

/// How to log in.
pub enum LoginStrategy {
    /// Master password login.
    Password {
        /// The master password.
        password: String,
    },
    /// SSO login; vault unlock comes from a trusted device or a pending
    /// admin approval, or not at all.
    Sso {
        /// Trusted-device material, if this device was trusted before.
        device: Option<TrustedDeviceUnlockData>,
    },
    /// Login with credentials already produced by an auth request flow.
    AuthRequest(AuthRequestCredentials),
}

/// Why the server demands a password reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcePasswordResetReason {
    /// An administrator reset the account's password.
    AdminForcePasswordReset,
    /// The password no longer satisfies organization policy.
    WeakMasterPasswordOnLogin,
}

/// Mutually exclusive login outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Logged in.
    Success,
    /// The server wants a second factor before anything else happens.
    RequiresTwoFactor,
    /// Logged in, but the user must set a new password before using the
    /// vault.
    ForcePasswordReset(ForcePasswordResetReason),
}

/// Result of a login run.
#[derive(Debug)]
pub struct LoginResult {
    /// What the server decided.
    pub outcome: LoginOutcome,
    /// Whether the session now holds a user key. False means the account
    /// is logged in but locked.
    pub user_key_established: bool,
    /// Device trust material minted during this login, for the caller to
    /// store and register.
    pub trusted_device: Option<(vaultgate_crypto::DeviceKey, vaultgate_core::DeviceRegistration)>,
}

/// Collaborators a login run needs.
pub struct LoginServices<'a, E, T, S> {
    /// Clock and entropy source.
    pub env: &'a E,
    /// Auth request transport, for checking stored admin requests.
    pub transport: &'a T,
    /// Admin request persistence.
    pub store: &'a S,
    /// Identifier of this device, when it should be trusted after a
    /// successful unlock.
    pub trust_device: Option<&'a str>,
}

/// Run one login to completion.
///
/// Trust establishment is attempted only on success with an established
/// user key, and its failure is logged through `log` rather than
/// propagated.
///
/// # Errors
///
/// Credential and key failures abort the login with the session torn
/// down; a `RequestNotFound` while checking a stored admin request is
/// not an error (the request simply expired).
pub async fn run<E, T, S>(
    services: &LoginServices<'_, E, T, S>,
    strategy: LoginStrategy,
    session: &mut SessionContext,
    account: &AccountData,
    log: &mut dyn FnMut(&str),
) -> Result<LoginResult, LoginError>
where
    E: Environment,
    T: AuthRequestTransport,
    S: AdminRequestStore,
{
    if account.requires_two_factor {
        return Ok(LoginResult {
            outcome: LoginOutcome::RequiresTwoFactor,
            user_key_established: false,
            trusted_device: None,
        });
    }

    if let Some(wrapped) = &account.master_key_encrypted_user_key {
        session.set_master_key_encrypted_user_key(wrapped.clone());
    }
    if let Some(der) = &account.private_key_der {
        session.set_private_key_der(der.clone());
    }

    let unlock = match strategy {
        LoginStrategy::Password { password } => {
            unlock_with_password(session, account, &password)
        },
        LoginStrategy::Sso { device } => {
            unlock_with_sso(session, account, device, services.transport, services.store, log)
                .await
        },
        LoginStrategy::AuthRequest(credentials) => {
            unlock_with_auth_request(session, account, credentials)
        },
    };

    let user_key_established = match unlock {
        Ok(established) => established,
        Err(err) => {
            session.teardown();
            return Err(err);
        },
    };

    let mut trusted_device = None;
    if user_key_established {
        if let Some(device_identifier) = services.trust_device {
            match device_trust::trust_device_if_required(
                services.env,
                session,
                device_identifier,
                true,
            ) {
                Ok(minted) => trusted_device = minted,
                // Non-fatal: the login already succeeded.
                Err(err) => log(&format!("device trust failed: {err}")),
            }
        }
    }

    let outcome = match account.force_password_reset {
        Some(reason) => LoginOutcome::ForcePasswordReset(reason),
        None => LoginOutcome::Success,
    };
    Ok(LoginResult { outcome, user_key_established, trusted_device })
}

fn unlock_with_password(
    session: &mut SessionContext,
    account: &AccountData,
    password: &str,
) -> Result<bool, LoginError> {
    let master_key = derive_master_key(password, &account.email, &account.kdf)?;
    let server_hash =
        derive_master_key_hash(password, &master_key, HashPurpose::ServerAuthorization)?;
    session.set_master_key(master_key.clone());
    session.set_master_key_hash(server_hash);

    match session.master_key_encrypted_user_key().cloned() {
        Some(wrapped) => {
            let user_key =
                vaultgate_core::hierarchy::unwrap_user_key_with_master_key(&wrapped, &master_key)?;
            vaultgate_core::hierarchy::establish_user_key(session, user_key);
            Ok(true)
        },
        None => Ok(false),
    }
}

async fn unlock_with_sso<T, S>(
    session: &mut SessionContext,
    account: &AccountData,
    device: Option<TrustedDeviceUnlockData>,
    transport: &T,
    store: &S,
    log: &mut dyn FnMut(&str),
) -> Result<bool, LoginError>
where
    T: AuthRequestTransport,
    S: AdminRequestStore,
{
    // A pending admin approval takes precedence over anything local: the
    // user explicitly asked for it and an admin may have answered since.
    if let Some(storable) = store.load(&account.email)? {
        let pair = RsaKeyPair::from_private_key_der(&storable.private_key_der)
            .map_err(crate::error::AuthRequestError::from)?;
        let public_key_der =
            pair.public_key_der().map_err(crate::error::AuthRequestError::from)?;
        // The record must still be self-consistent: the phrase the user
        // confirmed has to re-derive from the key it carries.
        if fingerprint_phrase(&account.email, &public_key_der).as_str() != storable.fingerprint {
            return Err(crate::error::AuthRequestError::FingerprintMismatch.into());
        }

        match transport.get_auth_request(&storable.request_id).await {
            Ok(status) if status.request_approved == Some(true) => {
                let established =
                    set_keys_from_approved_request(session, &status, pair.private())?;
                store.clear(&account.email)?;
                return Ok(established);
            },
            Ok(_) => {
                // Still pending or denied; the auth request driver owns
                // that flow, not the login path.
                log("stored admin auth request not yet approved");
            },
            Err(TransportError::RequestNotFound) => {
                log("stored admin auth request expired, clearing");
                store.clear(&account.email)?;
            },
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(device) = device {
        let user_key = device_trust::decrypt_user_key_with_device_key(
            &device.device_key,
            &device.encrypted_private_key,
            &device.wrapped_user_key,
        )
        .map_err(|err| {
            LoginError::KeyHierarchy(vaultgate_core::KeyHierarchyError::InvalidKey {
                reason: err.to_string(),
            })
        })?;
        vaultgate_core::hierarchy::establish_user_key(session, user_key);
        return Ok(true);
    }

    // Logged in but locked; unlock comes later, via master password or a
    // fresh auth request.
    Ok(false)
}

fn unlock_with_auth_request(
    session: &mut SessionContext,
    account: &AccountData,
    credentials: AuthRequestCredentials,
) -> Result<bool, LoginError> {
    if let Some(user_key) = credentials.user_key {
        vaultgate_core::hierarchy::establish_user_key(session, user_key);
        return Ok(true);
    }

    let master_key = credentials.master_key.ok_or(LoginError::AuthRequest(
        crate::error::AuthRequestError::MissingKeyMaterial { what: "master key or user key" },
    ))?;
    session.set_master_key(master_key.clone());
    if let Some(hash) = credentials.master_key_hash {
        session.set_master_key_hash(hash);
    }

    match account.master_key_encrypted_user_key.clone() {
        Some(wrapped) => {
            let user_key =
                vaultgate_core::hierarchy::unwrap_user_key_with_master_key(&wrapped, &master_key)?;
            vaultgate_core::hierarchy::establish_user_key(session, user_key);
            Ok(true)
        },
        None => Ok(false),
    }
}
