//! Collaborator traits for the login flows.
//!
//! The protocol state machines are transport-agnostic; drivers hand them
//! implementations of these traits. Test suites substitute in-memory
//! fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    error::{StoreError, TransportError},
    model::{AdminAuthRequestStorable, AuthRequestStatus, CreateAuthRequest, RequestId},
};

/// Server-side auth request operations.
#[async_trait]
pub trait AuthRequestTransport: Send + Sync {
    /// Submit a new auth request; returns its server-assigned id.
    async fn create_auth_request(
        &self,
        request: CreateAuthRequest,
    ) -> Result<RequestId, TransportError>;

    /// Fetch the current status of an authenticated user's auth request.
    async fn get_auth_request(&self, id: &RequestId)
    -> Result<AuthRequestStatus, TransportError>;

    /// Fetch status of an anonymous (pre-login) auth request, proving
    /// ownership with the access code minted at creation.
    async fn get_auth_request_with_access_code(
        &self,
        id: &RequestId,
        access_code: &str,
    ) -> Result<AuthRequestStatus, TransportError>;
}

/// Persistence for pending admin-approval requests.
///
/// Admin approval can take hours; the request (with its ephemeral private
/// key) must survive process restarts. Keyed by account email.
pub trait AdminRequestStore: Send + Sync {
    /// Persist a pending admin request for the given account.
    fn save(&self, email: &str, storable: &AdminAuthRequestStorable) -> Result<(), StoreError>;

    /// Load the pending admin request for the given account, if any.
    fn load(&self, email: &str) -> Result<Option<AdminAuthRequestStorable>, StoreError>;

    /// Remove the pending admin request for the given account.
    fn clear(&self, email: &str) -> Result<(), StoreError>;
}

/// In-memory [`AdminRequestStore`] for tests and ephemeral profiles.
///
/// Holds the encoded form, the same way a disk-backed store would, so
/// the persistence codec is exercised on every save/load.
#[derive(Clone, Default)]
pub struct MemoryAdminRequestStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryAdminRequestStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned lock still holds valid data; recover it.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AdminRequestStore for MemoryAdminRequestStore {
    fn save(&self, email: &str, storable: &AdminAuthRequestStorable) -> Result<(), StoreError> {
        let encoded = storable.to_bytes()?;
        self.lock().insert(email.to_owned(), encoded);
        Ok(())
    }

    fn load(&self, email: &str) -> Result<Option<AdminAuthRequestStorable>, StoreError> {
        self.lock().get(email).map(|bytes| AdminAuthRequestStorable::from_bytes(bytes)).transpose()
    }

    fn clear(&self, email: &str) -> Result<(), StoreError> {
        self.lock().remove(email);
        Ok(())
    }
}
