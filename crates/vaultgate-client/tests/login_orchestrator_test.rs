//! Login orchestrator tests: the three strategies against in-memory
//! collaborators.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use rand::{SeedableRng, rngs::StdRng};
use vaultgate_client::{
    AccountData, AuthRequestCredentials, AuthRequestError, ForcePasswordResetReason, LoginError,
    LoginOutcome, LoginServices, LoginStrategy, TrustedDeviceUnlockData, login,
};
use vaultgate_core::{
    AdminAuthRequestStorable, AdminRequestStore, AuthRequestStatus, AuthRequestTransport,
    CreateAuthRequest, KeyHierarchyError, MemoryAdminRequestStore, RequestId, SessionContext,
    TransportError, device_trust,
    env::test_utils::MockEnv,
    hierarchy,
};
use vaultgate_crypto::{
    HashPurpose, KdfConfig, UserKey, derive_master_key, derive_master_key_hash,
    fingerprint_phrase, rsa_wrap,
};

const EMAIL: &str = "login@example.com";
const PASSWORD: &str = "correct horse battery staple";
const KDF: KdfConfig = KdfConfig::Pbkdf2 { iterations: 600_000 };

/// Transport that serves a single fixed status, or nothing at all.
struct StaticTransport {
    status: Option<AuthRequestStatus>,
}

#[async_trait]
impl AuthRequestTransport for StaticTransport {
    async fn create_auth_request(
        &self,
        _request: CreateAuthRequest,
    ) -> Result<RequestId, TransportError> {
        Err(TransportError::Network { reason: "not under test".to_owned() })
    }

    async fn get_auth_request(&self, _id: &RequestId) -> Result<AuthRequestStatus, TransportError> {
        self.status.clone().ok_or(TransportError::RequestNotFound)
    }

    async fn get_auth_request_with_access_code(
        &self,
        id: &RequestId,
        _access_code: &str,
    ) -> Result<AuthRequestStatus, TransportError> {
        self.get_auth_request(id).await
    }
}

fn no_transport() -> StaticTransport {
    StaticTransport { status: None }
}

/// Account with a user key wrapped under the password's master key.
fn password_account(env: &MockEnv) -> (AccountData, UserKey) {
    let master_key = derive_master_key(PASSWORD, EMAIL, &KDF).unwrap();
    let user_key = hierarchy::make_user_key(env).unwrap();
    let wrapped = hierarchy::wrap_user_key_with_master_key(env, &user_key, &master_key);
    (
        AccountData {
            email: EMAIL.to_owned(),
            kdf: KDF,
            master_key_encrypted_user_key: Some(wrapped),
            private_key_der: None,
            requires_two_factor: false,
            force_password_reset: None,
        },
        user_key,
    )
}

fn services<'a>(
    env: &'a MockEnv,
    transport: &'a StaticTransport,
    store: &'a MemoryAdminRequestStore,
) -> LoginServices<'a, MockEnv, StaticTransport, MemoryAdminRequestStore> {
    LoginServices { env, transport, store, trust_device: None }
}

#[tokio::test]
async fn password_login_unlocks_the_vault() {
    let env = MockEnv::new();
    let (account, user_key) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Password { password: PASSWORD.to_owned() },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert_eq!(result.outcome, LoginOutcome::Success);
    assert!(result.user_key_established);
    assert_eq!(session.user_key(), Some(&user_key));
    // The server hash in the session is the one-iteration authorization
    // hash, not the local variant.
    let master_key = derive_master_key(PASSWORD, EMAIL, &KDF).unwrap();
    let server_hash =
        derive_master_key_hash(PASSWORD, &master_key, HashPurpose::ServerAuthorization).unwrap();
    assert_eq!(session.master_key_hash(), Some(&server_hash));
}

#[tokio::test]
async fn wrong_password_fails_closed_and_tears_down() {
    let env = MockEnv::new();
    let (account, _) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let err = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Password { password: "not the password".to_owned() },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LoginError::KeyHierarchy(KeyHierarchyError::InvalidKey { .. })));
    assert!(!session.has_user_key());
    assert!(session.master_key().is_none());
}

#[tokio::test]
async fn two_factor_gate_precedes_any_unlock() {
    let env = MockEnv::new();
    let (mut account, _) = password_account(&env);
    account.requires_two_factor = true;
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Password { password: PASSWORD.to_owned() },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert_eq!(result.outcome, LoginOutcome::RequiresTwoFactor);
    assert!(!result.user_key_established);
    assert!(!session.has_user_key());
}

#[tokio::test]
async fn force_password_reset_still_establishes_keys() {
    let env = MockEnv::new();
    let (mut account, user_key) = password_account(&env);
    account.force_password_reset = Some(ForcePasswordResetReason::WeakMasterPasswordOnLogin);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Password { password: PASSWORD.to_owned() },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert_eq!(
        result.outcome,
        LoginOutcome::ForcePasswordReset(ForcePasswordResetReason::WeakMasterPasswordOnLogin)
    );
    assert_eq!(session.user_key(), Some(&user_key));
}

#[tokio::test]
async fn sso_without_unlock_material_comes_up_locked() {
    let env = MockEnv::new();
    let (account, _) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Sso { device: None },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert_eq!(result.outcome, LoginOutcome::Success);
    assert!(!result.user_key_established);
    assert!(!session.has_user_key());
}

#[tokio::test]
async fn sso_trusted_device_unlocks() {
    let env = MockEnv::new();
    let (account, user_key) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();

    // Trust material minted in an earlier session.
    let mut trusted_session = SessionContext::new();
    {
        let master_key = derive_master_key(PASSWORD, EMAIL, &KDF).unwrap();
        let unwrapped = hierarchy::unwrap_user_key_with_master_key(
            account.master_key_encrypted_user_key.as_ref().unwrap(),
            &master_key,
        )
        .unwrap();
        hierarchy::establish_user_key(&mut trusted_session, unwrapped);
    }
    let (device_key, registration) =
        device_trust::trust_device_if_required(&env, &trusted_session, "device-1", true)
            .unwrap()
            .unwrap();

    let mut session = SessionContext::new();
    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Sso {
            device: Some(TrustedDeviceUnlockData {
                device_key,
                encrypted_private_key: registration.encrypted_private_key,
                wrapped_user_key: registration.wrapped_user_key,
            }),
        },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert!(result.user_key_established);
    assert_eq!(session.user_key(), Some(&user_key));
}

#[tokio::test]
async fn sso_resumes_approved_admin_request_and_clears_it() {
    let env = MockEnv::new();
    let (account, user_key) = password_account(&env);
    let store = MemoryAdminRequestStore::new();

    let mut rng = StdRng::seed_from_u64(31);
    let pair = vaultgate_crypto::generate_rsa_key_pair(&mut rng).unwrap();
    store
        .save(
            EMAIL,
            &AdminAuthRequestStorable {
                request_id: RequestId("req-admin".to_owned()),
                private_key_der: pair.private_key_der().unwrap(),
                fingerprint: fingerprint_phrase(EMAIL, &pair.public_key_der().unwrap())
                    .to_string(),
            },
        )
        .unwrap();

    let transport = StaticTransport {
        status: Some(AuthRequestStatus {
            id: RequestId("req-admin".to_owned()),
            request_approved: Some(true),
            encrypted_key: Some(rsa_wrap(&user_key.to_vec(), pair.public(), &mut rng).unwrap()),
            encrypted_master_password_hash: None,
        }),
    };

    let mut session = SessionContext::new();
    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Sso { device: None },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert!(result.user_key_established);
    assert_eq!(session.user_key(), Some(&user_key));
    assert!(store.load(EMAIL).unwrap().is_none());
}

#[tokio::test]
async fn sso_clears_expired_admin_request_and_falls_through() {
    let env = MockEnv::new();
    let (account, _) = password_account(&env);
    let store = MemoryAdminRequestStore::new();

    let mut rng = StdRng::seed_from_u64(32);
    let pair = vaultgate_crypto::generate_rsa_key_pair(&mut rng).unwrap();
    store
        .save(
            EMAIL,
            &AdminAuthRequestStorable {
                request_id: RequestId("req-gone".to_owned()),
                private_key_der: pair.private_key_der().unwrap(),
                fingerprint: fingerprint_phrase(EMAIL, &pair.public_key_der().unwrap())
                    .to_string(),
            },
        )
        .unwrap();

    // Server answers 404 for the stored request.
    let transport = no_transport();

    let mut session = SessionContext::new();
    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Sso { device: None },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert!(!result.user_key_established);
    assert!(store.load(EMAIL).unwrap().is_none());
}

#[tokio::test]
async fn sso_rejects_admin_request_with_stale_fingerprint() {
    let env = MockEnv::new();
    let (account, _) = password_account(&env);
    let store = MemoryAdminRequestStore::new();

    // The persisted phrase does not re-derive from the persisted key.
    let mut rng = StdRng::seed_from_u64(33);
    let pair = vaultgate_crypto::generate_rsa_key_pair(&mut rng).unwrap();
    store
        .save(
            EMAIL,
            &AdminAuthRequestStorable {
                request_id: RequestId("req-stale".to_owned()),
                private_key_der: pair.private_key_der().unwrap(),
                fingerprint: "not-the-phrase-shown".to_owned(),
            },
        )
        .unwrap();

    let transport = no_transport();
    let mut session = SessionContext::new();
    let err = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::Sso { device: None },
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap_err();

    assert_eq!(err, LoginError::AuthRequest(AuthRequestError::FingerprintMismatch));
    assert!(!session.has_user_key());
}

#[tokio::test]
async fn auth_request_credentials_user_key_branch() {
    let env = MockEnv::new();
    let (account, user_key) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::AuthRequest(AuthRequestCredentials {
            request_id: RequestId("req-1".to_owned()),
            user_key: Some(user_key.clone()),
            master_key: None,
            master_key_hash: None,
        }),
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert!(result.user_key_established);
    assert_eq!(session.user_key(), Some(&user_key));
}

#[tokio::test]
async fn auth_request_credentials_master_key_branch() {
    let env = MockEnv::new();
    let (account, user_key) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();

    let master_key = derive_master_key(PASSWORD, EMAIL, &KDF).unwrap();
    let hash =
        derive_master_key_hash(PASSWORD, &master_key, HashPurpose::ServerAuthorization).unwrap();

    let result = login::run(
        &services(&env, &transport, &store),
        LoginStrategy::AuthRequest(AuthRequestCredentials {
            request_id: RequestId("req-1".to_owned()),
            user_key: None,
            master_key: Some(master_key.clone()),
            master_key_hash: Some(hash),
        }),
        &mut session,
        &account,
        &mut |_| {},
    )
    .await
    .unwrap();

    assert!(result.user_key_established);
    assert_eq!(session.master_key(), Some(&master_key));
    assert_eq!(session.user_key(), Some(&user_key));
}

#[tokio::test]
async fn trust_device_failure_never_fails_the_login() {
    let env = MockEnv::new();
    let (account, _) = password_account(&env);
    let transport = no_transport();
    let store = MemoryAdminRequestStore::new();
    let mut session = SessionContext::new();
    let mut logs = Vec::new();

    // SSO without unlock material: no user key, so trust establishment
    // is skipped entirely and the login still succeeds.
    let result = login::run(
        &LoginServices { env: &env, transport: &transport, store: &store, trust_device: Some("device-1") },
        LoginStrategy::Sso { device: None },
        &mut session,
        &account,
        &mut |m| logs.push(m.to_owned()),
    )
    .await
    .unwrap();

    assert_eq!(result.outcome, LoginOutcome::Success);
    assert!(result.trusted_device.is_none());
}
