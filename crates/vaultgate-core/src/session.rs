//! Explicit session state for the active account.
//!
//! Replaces ambient/global crypto state with one struct threaded through
//! calls. The user key field is deliberately write-protected: only the
//! key hierarchy module (same crate) can assign it, so every decrypted
//! user key in a session has passed through exactly one verified path.

use vaultgate_crypto::{Ciphertext, MasterKey, MasterKeyHash, UserKey};
use zeroize::Zeroize;

/// In-memory key material for one logged-in (or unlocking) account.
///
/// Created at the start of a login attempt and torn down on logout.
#[derive(Default)]
pub struct SessionContext {
    master_key: Option<MasterKey>,
    master_key_hash: Option<MasterKeyHash>,
    user_key: Option<UserKey>,
    master_key_encrypted_user_key: Option<Ciphertext>,
    private_key_der: Option<Vec<u8>>,
}

impl SessionContext {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active master key, if one has been derived or decrypted.
    pub fn master_key(&self) -> Option<&MasterKey> {
        self.master_key.as_ref()
    }

    /// Master key hash for authentication, if set.
    pub fn master_key_hash(&self) -> Option<&MasterKeyHash> {
        self.master_key_hash.as_ref()
    }

    /// Decrypted user key, if the vault is unlocked.
    pub fn user_key(&self) -> Option<&UserKey> {
        self.user_key.as_ref()
    }

    /// Whether a decrypted user key is present.
    pub fn has_user_key(&self) -> bool {
        self.user_key.is_some()
    }

    /// The stored user key wrapped by the (stretched) master key.
    pub fn master_key_encrypted_user_key(&self) -> Option<&Ciphertext> {
        self.master_key_encrypted_user_key.as_ref()
    }

    /// The account identity private key (PKCS#8 DER), if known.
    pub fn private_key_der(&self) -> Option<&[u8]> {
        self.private_key_der.as_deref()
    }

    /// Set the active master key.
    pub fn set_master_key(&mut self, key: MasterKey) {
        self.master_key = Some(key);
    }

    /// Set the master key hash.
    pub fn set_master_key_hash(&mut self, hash: MasterKeyHash) {
        self.master_key_hash = Some(hash);
    }

    /// Record the account's master-key-wrapped user key from the server.
    pub fn set_master_key_encrypted_user_key(&mut self, wrapped: Ciphertext) {
        self.master_key_encrypted_user_key = Some(wrapped);
    }

    /// Record the account identity private key.
    pub fn set_private_key_der(&mut self, der: Vec<u8>) {
        self.private_key_der = Some(der);
    }

    /// Assign the decrypted user key.
    ///
    /// `pub(crate)` on purpose: [`crate::hierarchy::establish_user_key`]
    /// is the only sanctioned caller.
    pub(crate) fn set_user_key(&mut self, key: UserKey) {
        self.user_key = Some(key);
    }

    /// Clear all key material (logout).
    pub fn teardown(&mut self) {
        // Keyed types zeroize on drop; the DER buffer is wiped explicitly.
        self.master_key = None;
        self.master_key_hash = None;
        self.user_key = None;
        self.master_key_encrypted_user_key = None;
        if let Some(mut der) = self.private_key_der.take() {
            der.zeroize();
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("master_key", &self.master_key.is_some())
            .field("master_key_hash", &self.master_key_hash.is_some())
            .field("user_key", &self.user_key.is_some())
            .field("master_key_encrypted_user_key", &self.master_key_encrypted_user_key.is_some())
            .field("private_key_der", &self.private_key_der.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_session_holds_nothing() {
        let session = SessionContext::new();
        assert!(session.master_key().is_none());
        assert!(!session.has_user_key());
    }

    #[test]
    fn teardown_clears_everything() {
        let mut session = SessionContext::new();
        session.set_master_key(MasterKey::from_bytes(&[1u8; 32]).unwrap());
        session.set_master_key_hash(MasterKeyHash::from_bytes(&[2u8; 32]).unwrap());
        session.set_user_key(UserKey::from_bytes(&[3u8; 64]).unwrap());
        session.set_private_key_der(vec![4u8; 16]);

        session.teardown();

        assert!(session.master_key().is_none());
        assert!(session.master_key_hash().is_none());
        assert!(!session.has_user_key());
        assert!(session.private_key_der().is_none());
    }

    #[test]
    fn debug_shows_presence_not_material() {
        let mut session = SessionContext::new();
        session.set_master_key(MasterKey::from_bytes(&[0xAB; 32]).unwrap());
        let rendered = format!("{session:?}");
        assert!(rendered.contains("master_key: true"));
        assert!(!rendered.contains("AB"));
    }
}
