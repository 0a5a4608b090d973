//! Client
//!
//! Action-based login state machines for the Vaultgate key hierarchy.
//! Covers the three login shapes: master password, SSO with
//! trusted-device or admin-approval unlock, and login-with-device
//! (auth request).
//!
//! # Architecture
//!
//! Protocol logic is sans-IO. [`AuthRequestFlow`] receives events
//! ([`AuthEvent`]), processes them through pure state machine logic, and
//! returns actions ([`AuthAction`]) for the caller to execute.
//! [`AuthRequestDriver`] is the async bridge that executes those actions
//! against the `vaultgate-core` collaborator traits and feeds push and
//! poll results back in.
//!
//! # Components
//!
//! - [`AuthRequestFlow`]: auth request state machine
//! - [`AuthRequestDriver`]: async driver resolving a flow to a login
//! - [`login::run`]: the login orchestrator

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth_request;
mod driver;
mod error;
pub mod login;

pub use auth_request::{
    AuthAction, AuthEvent, AuthRequestFlow, AuthRequestOutcome, RESEND_TIMEOUT,
};
pub use driver::{
    ApprovalEvent, AuthRequestDriver, AuthRequestLogin, DEFAULT_POLL_INTERVAL,
};
pub use error::{AuthRequestError, LoginError};
pub use login::{
    AccountData, AuthRequestCredentials, ForcePasswordResetReason, LoginOutcome, LoginResult,
    LoginServices, LoginStrategy, TrustedDeviceUnlockData,
};
pub use vaultgate_core::{SessionContext, env::Environment};
