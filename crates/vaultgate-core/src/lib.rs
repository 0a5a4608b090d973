//! Core
//!
//! Session state, key hierarchy operations, device trust, and the
//! collaborator traits shared by the Vaultgate login flows.
//!
//! # Architecture
//!
//! The crate is deliberately transport-free. State machines and
//! orchestrators in `vaultgate-client` operate on these pieces and hand
//! I/O back to their drivers as actions:
//!
//! - [`SessionContext`]: per-account key material with a single guarded
//!   write path for the user key
//! - [`hierarchy`]: wrap/unwrap operations along the key hierarchy
//! - [`device_trust`]: trusted-device establishment and unlock
//! - [`env::Environment`]: clock, sleep and entropy abstraction so every
//!   flow runs deterministically under test
//! - [`AuthRequestTransport`] / [`AdminRequestStore`]: collaborator
//!   traits implemented by real transports and stores

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod device_trust;
pub mod env;
pub mod hierarchy;

mod error;
mod model;
mod session;
mod traits;

pub use error::{DeviceTrustError, KeyHierarchyError, StoreError, TransportError};
pub use model::{
    ACCESS_CODE_LEN, AdminAuthRequestStorable, AuthRequestStatus, AuthRequestType,
    CreateAuthRequest, DeviceRegistration, RequestId, generate_access_code,
};
pub use session::SessionContext;
pub use traits::{AdminRequestStore, AuthRequestTransport, MemoryAdminRequestStore};
