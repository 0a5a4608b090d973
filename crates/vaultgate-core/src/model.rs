//! Protocol data model for auth requests and device trust.
//!
//! These types are the abstract shapes exchanged with collaborators; the
//! wire encodings behind them are transport concerns. The one exception
//! is [`AdminAuthRequestStorable`], which owns its persistence codec so
//! every store implementation writes the same bytes.

use vaultgate_crypto::Ciphertext;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::env::Environment;
use crate::error::StoreError;

/// Length of the access code attached to unauthenticated auth requests.
pub const ACCESS_CODE_LEN: usize = 25;

/// Server-assigned identifier of an auth request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which flavor of auth request is being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuthRequestType {
    /// Unauthenticated login-with-device: approved by another device
    /// belonging to the same account.
    AuthenticateAndUnlock,
    /// Authenticated-but-locked request approved by an organization admin.
    AdminApproval,
}

/// Payload submitted to create an auth request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAuthRequest {
    /// Account email.
    pub email: String,
    /// Stable identifier of the requesting device.
    pub device_identifier: String,
    /// DER (SPKI) encoding of the ephemeral public key.
    pub public_key_der: Vec<u8>,
    /// Request flavor.
    pub request_type: AuthRequestType,
    /// Bearer secret for unauthenticated requests; `None` for admin
    /// requests, which ride an existing authenticated session.
    pub access_code: Option<String>,
}

/// Server-side status of an auth request, as re-fetched by the requester.
///
/// `encrypted_key` is EITHER pubkey(MasterKey) with
/// `encrypted_master_password_hash` = pubkey(MasterKeyHash), OR
/// pubkey(UserKey) with the hash field null - never both. The presence of
/// the hash field is the sole discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequestStatus {
    /// Request identifier.
    pub id: RequestId,
    /// `None` while pending; `Some(true)` approved; `Some(false)` denied.
    pub request_approved: Option<bool>,
    /// RSA-wrapped key material, filled on approval.
    pub encrypted_key: Option<Vec<u8>>,
    /// RSA-wrapped master key hash; presence selects the master-key branch.
    pub encrypted_master_password_hash: Option<Vec<u8>>,
}

impl AuthRequestStatus {
    /// A still-pending status for `id`.
    pub fn pending(id: RequestId) -> Self {
        Self { id, request_approved: None, encrypted_key: None, encrypted_master_password_hash: None }
    }

    /// A denied status for `id`.
    pub fn denied(id: RequestId) -> Self {
        Self {
            id,
            request_approved: Some(false),
            encrypted_key: None,
            encrypted_master_password_hash: None,
        }
    }
}

/// Persisted state of a pending admin approval request.
///
/// Survives a page reload while awaiting the admin; deleted once consumed
/// or denied. Standard requests never persist - a reload restarts them.
#[derive(Clone, serde::Serialize, serde::Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AdminAuthRequestStorable {
    /// Request identifier.
    #[zeroize(skip)]
    pub request_id: RequestId,
    /// PKCS#8 DER encoding of the ephemeral private key.
    pub private_key_der: Vec<u8>,
    /// The fingerprint phrase shown to the user when the request was
    /// created. Consumption after a reload re-derives the phrase from
    /// `private_key_der` and aborts if the record no longer matches it.
    #[zeroize(skip)]
    pub fingerprint: String,
}

impl AdminAuthRequestStorable {
    /// Encode for persistence (CBOR).
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(self, &mut encoded)
            .map_err(|e| StoreError::Io { reason: e.to_string() })?;
        Ok(encoded)
    }

    /// Decode a persisted record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        ciborium::de::from_reader(bytes).map_err(|e| StoreError::Corrupt { reason: e.to_string() })
    }
}

impl std::fmt::Debug for AdminAuthRequestStorable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthRequestStorable")
            .field("request_id", &self.request_id)
            .field("private_key_der", &"..")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Key material registered for a newly-trusted device.
///
/// The device key itself never leaves the device; everything here is safe
/// to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistration {
    /// Stable identifier of the device being trusted.
    pub device_identifier: String,
    /// DER (SPKI) encoding of the device public key.
    pub public_key_der: Vec<u8>,
    /// User key wrapped with the device public key.
    pub wrapped_user_key: Vec<u8>,
    /// Device public key encrypted under the user key (integrity anchor).
    pub encrypted_public_key: Ciphertext,
    /// Device private key encrypted under the device key.
    pub encrypted_private_key: Ciphertext,
}

/// Generate an access code from environment entropy.
///
/// 25 alphanumeric characters, matching the bearer secret the original
/// protocol attaches to unauthenticated requests.
pub fn generate_access_code<E: Environment>(env: &E) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    // Largest multiple of the alphabet size that fits a byte; bytes at or
    // above it are rejected so every character stays equally likely.
    const REJECT_FROM: u8 = ((256 / ALPHABET.len()) * ALPHABET.len()) as u8;

    let mut code = String::with_capacity(ACCESS_CODE_LEN);
    let mut bytes = [0u8; 2 * ACCESS_CODE_LEN];
    while code.len() < ACCESS_CODE_LEN {
        env.random_bytes(&mut bytes);
        for &b in &bytes {
            if code.len() == ACCESS_CODE_LEN {
                break;
            }
            if b < REJECT_FROM {
                code.push(char::from(ALPHABET[b as usize % ALPHABET.len()]));
            }
        }
    }
    code
}
