//! Auth request flow state machine.
//!
//! Login-with-device and admin-approval login share one flow: mint an
//! ephemeral RSA pair, submit a request carrying the public key, show the
//! user a fingerprint phrase, and wait for another party to approve. The
//! approving device wraps key material with the ephemeral public key;
//! consuming the approval unwraps it locally and establishes the session
//! keys.
//!
//! The machine is sans-IO: it receives [`AuthEvent`]s and returns
//! [`AuthAction`]s for a driver to execute. Push notifications are
//! treated as hints only; key material is always taken from a fetched
//! status, never from the push payload.

use std::time::Duration;

use vaultgate_core::{
    AdminAuthRequestStorable, AuthRequestStatus, AuthRequestType, CreateAuthRequest, RequestId,
    SessionContext,
    env::{EnvRng, Environment},
    generate_access_code,
    hierarchy,
};
use vaultgate_crypto::{
    MasterKey, MasterKeyHash, RsaKeyPair, RsaPrivateKey, fingerprint_phrase,
    generate_rsa_key_pair, rsa_unwrap,
};

use crate::error::AuthRequestError;

/// How long before the flow offers to resend the request.
pub const RESEND_TIMEOUT: Duration = Duration::from_secs(12);

/// Events fed into the auth request flow.
#[derive(Debug)]
pub enum AuthEvent<I> {
    /// Begin the flow: mint keys and submit a request.
    Start,
    /// The transport registered the request and assigned an id.
    RequestRegistered {
        /// Server-assigned request id.
        id: RequestId,
    },
    /// A push notification claims the request was answered.
    ApprovalPushed {
        /// Request id named by the push.
        id: RequestId,
    },
    /// A status fetch completed.
    StatusFetched {
        /// The fetched status.
        status: AuthRequestStatus,
    },
    /// A status fetch found no such request server-side.
    ///
    /// Answered requests are deleted after a grace period, so this is
    /// handled exactly like an explicit denial.
    RequestVanished {
        /// Request id that no longer exists.
        id: RequestId,
    },
    /// Resume a previously persisted admin approval request.
    ResumeStored {
        /// The persisted request record.
        storable: AdminAuthRequestStorable,
    },
    /// Periodic clock tick from the driver.
    Tick {
        /// Current time.
        now: I,
    },
    /// The user walked away from the flow.
    Abandon,
}

impl<I> AuthEvent<I> {
    #[allow(dead_code)]
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::RequestRegistered { .. } => "RequestRegistered",
            Self::ApprovalPushed { .. } => "ApprovalPushed",
            Self::StatusFetched { .. } => "StatusFetched",
            Self::RequestVanished { .. } => "RequestVanished",
            Self::ResumeStored { .. } => "ResumeStored",
            Self::Tick { .. } => "Tick",
            Self::Abandon => "Abandon",
        }
    }
}

/// Actions produced by the auth request flow.
#[derive(Debug)]
pub enum AuthAction {
    /// Submit a new auth request to the transport.
    SubmitRequest(CreateAuthRequest),
    /// Subscribe to push notifications for a request.
    Subscribe {
        /// Request to watch.
        id: RequestId,
    },
    /// Stop watching a request.
    Unsubscribe {
        /// Request to stop watching.
        id: RequestId,
    },
    /// Fetch the request's current status.
    FetchStatus {
        /// Request to fetch.
        id: RequestId,
        /// Access code proving ownership of an unauthenticated request.
        access_code: Option<String>,
    },
    /// Persist a pending admin approval request.
    PersistAdminRequest {
        /// Record to persist.
        storable: AdminAuthRequestStorable,
    },
    /// Remove the persisted admin approval request.
    ClearAdminRequest,
    /// Offer the user the option to resend the request.
    ShowResendAffordance,
    /// A denied request was automatically resubmitted.
    Restarted {
        /// Id of the denied request being replaced.
        previous: RequestId,
    },
    /// Establish device trust for this device if the user opted in.
    ///
    /// Emitted after a successful consumption; the driver treats trust
    /// failures as non-fatal.
    TrustDevice,
    /// The flow finished.
    Completed {
        /// How it finished.
        outcome: AuthRequestOutcome,
    },
    /// Log a message.
    Log {
        /// Message to log.
        message: String,
    },
}

/// Terminal outcome of an auth request flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequestOutcome {
    /// The request was approved and its key material consumed.
    Approved {
        /// Whether a user key was established in the session. False when
        /// the approval carried only a master key and no wrapped user
        /// key was on hand to unlock with it.
        user_key_established: bool,
    },
    /// The request was denied twice (the flow restarts once on a first
    /// denial) or vanished server-side.
    Denied,
    /// The user abandoned the flow.
    Abandoned,
}

enum FlowState<I> {
    Idle,
    AwaitingRegistration {
        key_pair: RsaKeyPair,
        access_code: Option<String>,
        // The phrase as displayed to the user. On a resumed request this
        // comes from the persisted record, so it can disagree with the
        // key pair in hand.
        fingerprint: String,
    },
    Pending {
        key_pair: RsaKeyPair,
        access_code: Option<String>,
        fingerprint: String,
        request_id: RequestId,
        created_at: I,
        resend_shown: bool,
    },
    Consumed {
        request_id: RequestId,
    },
}

impl<I> FlowState<I> {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitingRegistration { .. } => "AwaitingRegistration",
            Self::Pending { .. } => "Pending",
            Self::Consumed { .. } => "Consumed",
        }
    }
}

/// The auth request flow state machine.
pub struct AuthRequestFlow<E: Environment> {
    env: E,
    email: String,
    device_identifier: String,
    request_type: AuthRequestType,
    state: FlowState<E::Instant>,
    restarts: u8,
}

impl<E: Environment> AuthRequestFlow<E> {
    /// Creates an idle flow for the given account and device.
    pub fn new(
        env: E,
        email: impl Into<String>,
        device_identifier: impl Into<String>,
        request_type: AuthRequestType,
    ) -> Self {
        Self {
            env,
            email: email.into(),
            device_identifier: device_identifier.into(),
            request_type,
            state: FlowState::Idle,
            restarts: 0,
        }
    }

    /// Account email this flow authenticates.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The request currently awaiting an answer, with its access code,
    /// if the flow is pending. Drivers poll with this.
    pub fn pending_request(&self) -> Option<(&RequestId, Option<&str>)> {
        match &self.state {
            FlowState::Pending { request_id, access_code, .. } => {
                Some((request_id, access_code.as_deref()))
            },
            _ => None,
        }
    }

    /// The fingerprint phrase the user must compare out-of-band, once a
    /// request exists.
    pub fn fingerprint(&self) -> Option<&str> {
        match &self.state {
            FlowState::AwaitingRegistration { fingerprint, .. }
            | FlowState::Pending { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }

    /// Process one event, mutating session state only on a verified
    /// approval.
    ///
    /// # Errors
    ///
    /// `UnexpectedEvent` for events the current state cannot accept;
    /// `FingerprintMismatch` or key errors when consuming a bad approval,
    /// in which case the session is left untouched.
    pub fn handle(
        &mut self,
        session: &mut SessionContext,
        event: AuthEvent<E::Instant>,
    ) -> Result<Vec<AuthAction>, AuthRequestError> {
        match event {
            AuthEvent::Start => self.handle_start(),
            AuthEvent::RequestRegistered { id } => self.handle_registered(id),
            AuthEvent::ApprovalPushed { id } => self.handle_push(&id),
            AuthEvent::StatusFetched { status } => self.handle_status(session, status),
            AuthEvent::RequestVanished { id } => self.handle_vanished(&id),
            AuthEvent::ResumeStored { storable } => self.handle_resume(storable),
            AuthEvent::Tick { now } => self.handle_tick(now),
            AuthEvent::Abandon => self.handle_abandon(),
        }
    }

    fn unexpected(&self, event: &'static str) -> AuthRequestError {
        AuthRequestError::UnexpectedEvent { state: self.state.name(), event }
    }

    fn handle_start(&mut self) -> Result<Vec<AuthAction>, AuthRequestError> {
        if !matches!(self.state, FlowState::Idle) {
            return Err(self.unexpected("Start"));
        }
        self.restarts = 0;
        self.start_request()
    }

    /// Mint an ephemeral pair and submit a request. Shared by `Start` and
    /// the one automatic restart after a first denial.
    fn start_request(&mut self) -> Result<Vec<AuthAction>, AuthRequestError> {
        let mut rng = EnvRng(&self.env);
        let key_pair = generate_rsa_key_pair(&mut rng)?;
        let public_key_der = key_pair.public_key_der()?;
        let fingerprint = fingerprint_phrase(&self.email, &public_key_der).to_string();

        // Unauthenticated requests carry a bearer code so only this
        // device can read the answer. Admin requests go over an
        // authenticated channel and need none.
        let access_code = match self.request_type {
            AuthRequestType::AuthenticateAndUnlock => Some(generate_access_code(&self.env)),
            AuthRequestType::AdminApproval => None,
        };

        let request = CreateAuthRequest {
            email: self.email.clone(),
            device_identifier: self.device_identifier.clone(),
            public_key_der,
            request_type: self.request_type,
            access_code: access_code.clone(),
        };

        self.state = FlowState::AwaitingRegistration { key_pair, access_code, fingerprint };

        Ok(vec![
            AuthAction::Log {
                message: format!("Submitting {:?} auth request", self.request_type),
            },
            AuthAction::SubmitRequest(request),
        ])
    }

    fn handle_registered(&mut self, id: RequestId) -> Result<Vec<AuthAction>, AuthRequestError> {
        let (key_pair, access_code, fingerprint) =
            match std::mem::replace(&mut self.state, FlowState::Idle) {
                FlowState::AwaitingRegistration { key_pair, access_code, fingerprint } => {
                    (key_pair, access_code, fingerprint)
                },
                other => {
                    self.state = other;
                    return Err(self.unexpected("RequestRegistered"));
                },
            };

        let mut actions = vec![
            AuthAction::Log { message: format!("Auth request {} registered", id.0) },
            AuthAction::Subscribe { id: id.clone() },
        ];

        if self.request_type == AuthRequestType::AdminApproval {
            let private_key_der = key_pair.private_key_der()?;
            actions.push(AuthAction::PersistAdminRequest {
                storable: AdminAuthRequestStorable {
                    request_id: id.clone(),
                    private_key_der,
                    fingerprint: fingerprint.clone(),
                },
            });
        }

        self.state = FlowState::Pending {
            key_pair,
            access_code,
            fingerprint,
            request_id: id,
            created_at: self.env.now(),
            resend_shown: false,
        };
        Ok(actions)
    }

    fn handle_push(&mut self, id: &RequestId) -> Result<Vec<AuthAction>, AuthRequestError> {
        match &self.state {
            // The push payload is untrusted: only ever react by fetching
            // the status over the transport.
            FlowState::Pending { request_id, access_code, .. } if request_id == id => {
                Ok(vec![AuthAction::FetchStatus {
                    id: id.clone(),
                    access_code: access_code.clone(),
                }])
            },
            // Poll already consumed this approval.
            FlowState::Consumed { request_id } if request_id == id => Ok(vec![]),
            _ => Ok(vec![AuthAction::Log {
                message: format!("Ignoring push for unknown auth request {}", id.0),
            }]),
        }
    }

    fn handle_status(
        &mut self,
        session: &mut SessionContext,
        status: AuthRequestStatus,
    ) -> Result<Vec<AuthAction>, AuthRequestError> {
        match &self.state {
            FlowState::Pending { request_id, .. } if *request_id == status.id => {},
            // Push and poll can both deliver the answer; the second
            // delivery is a no-op.
            FlowState::Consumed { request_id } if *request_id == status.id => return Ok(vec![]),
            _ => return Err(self.unexpected("StatusFetched")),
        }

        match status.request_approved {
            Some(true) => self.consume_approval(session, &status),
            Some(false) => self.handle_denial(),
            None => Ok(vec![]),
        }
    }

    fn consume_approval(
        &mut self,
        session: &mut SessionContext,
        status: &AuthRequestStatus,
    ) -> Result<Vec<AuthAction>, AuthRequestError> {
        let FlowState::Pending { key_pair, fingerprint, request_id, .. } = &self.state else {
            return Err(self.unexpected("StatusFetched"));
        };

        // Re-derive the phrase from the private key in hand and require
        // it to match the one the user confirmed. Fresh requests hold the
        // pair that produced the phrase; a resumed request restored both
        // from persistence, where they can have diverged.
        let public_key_der = key_pair.public_key_der()?;
        let derived = fingerprint_phrase(&self.email, &public_key_der);
        if derived.as_str() != fingerprint.as_str() {
            return Err(AuthRequestError::FingerprintMismatch);
        }

        let user_key_established =
            set_keys_from_approved_request(session, status, key_pair.private())?;

        let request_id = request_id.clone();
        let mut actions = vec![
            AuthAction::Unsubscribe { id: request_id.clone() },
            AuthAction::Log {
                message: format!(
                    "Auth request {} approved (user key established: {user_key_established})",
                    request_id.0
                ),
            },
        ];
        if self.request_type == AuthRequestType::AdminApproval {
            actions.push(AuthAction::ClearAdminRequest);
        }
        actions.push(AuthAction::TrustDevice);
        actions.push(AuthAction::Completed {
            outcome: AuthRequestOutcome::Approved { user_key_established },
        });

        self.state = FlowState::Consumed { request_id };
        Ok(actions)
    }

    fn handle_denial(&mut self) -> Result<Vec<AuthAction>, AuthRequestError> {
        let FlowState::Pending { request_id, .. } = &self.state else {
            return Err(self.unexpected("StatusFetched"));
        };
        let old_id = request_id.clone();

        let mut actions = vec![AuthAction::Unsubscribe { id: old_id.clone() }];
        if self.request_type == AuthRequestType::AdminApproval {
            actions.push(AuthAction::ClearAdminRequest);
        }

        if self.restarts == 0 {
            // One automatic retry: denials are frequently accidental
            // dismissals on the approving device.
            self.restarts += 1;
            actions.push(AuthAction::Log {
                message: format!("Auth request {} denied, restarting once", old_id.0),
            });
            actions.push(AuthAction::Restarted { previous: old_id });
            actions.extend(self.start_request()?);
        } else {
            actions.push(AuthAction::Log {
                message: format!("Auth request {} denied", old_id.0),
            });
            actions.push(AuthAction::Completed { outcome: AuthRequestOutcome::Denied });
            self.state = FlowState::Idle;
        }
        Ok(actions)
    }

    fn handle_vanished(&mut self, id: &RequestId) -> Result<Vec<AuthAction>, AuthRequestError> {
        match &self.state {
            FlowState::Pending { request_id, .. } if request_id == id => self.handle_denial(),
            FlowState::Consumed { request_id } if request_id == id => Ok(vec![]),
            _ => Err(self.unexpected("RequestVanished")),
        }
    }

    fn handle_resume(
        &mut self,
        storable: AdminAuthRequestStorable,
    ) -> Result<Vec<AuthAction>, AuthRequestError> {
        if !matches!(self.state, FlowState::Idle) {
            return Err(self.unexpected("ResumeStored"));
        }

        let key_pair = RsaKeyPair::from_private_key_der(&storable.private_key_der)?;
        // Carry the phrase the user saw before the reload, not a
        // re-derivation; consumption checks the restored key against it.
        let fingerprint = storable.fingerprint.clone();
        let request_id = storable.request_id.clone();

        self.state = FlowState::Pending {
            key_pair,
            access_code: None,
            fingerprint,
            request_id: request_id.clone(),
            created_at: self.env.now(),
            // Resuming an hours-old admin request; the resend affordance
            // is for fresh submissions.
            resend_shown: true,
        };

        Ok(vec![
            AuthAction::Log {
                message: format!("Resuming pending admin auth request {}", request_id.0),
            },
            AuthAction::Subscribe { id: request_id.clone() },
            AuthAction::FetchStatus { id: request_id, access_code: None },
        ])
    }

    fn handle_tick(&mut self, now: E::Instant) -> Result<Vec<AuthAction>, AuthRequestError> {
        if let FlowState::Pending { created_at, resend_shown, .. } = &mut self.state {
            if !*resend_shown && now - *created_at >= RESEND_TIMEOUT {
                *resend_shown = true;
                return Ok(vec![AuthAction::ShowResendAffordance]);
            }
        }
        Ok(vec![])
    }

    fn handle_abandon(&mut self) -> Result<Vec<AuthAction>, AuthRequestError> {
        let mut actions = Vec::new();
        if let FlowState::Pending { request_id, .. } = &self.state {
            // The persisted admin record is deliberately kept: an admin
            // approval outlives this process and resumes later.
            actions.push(AuthAction::Unsubscribe { id: request_id.clone() });
        }
        actions.push(AuthAction::Completed { outcome: AuthRequestOutcome::Abandoned });
        // Ephemeral key material drops with the old state; the flow can
        // be started fresh.
        self.state = FlowState::Idle;
        Ok(actions)
    }
}

/// Decrypt an approved request's payload and install it in the session.
///
/// Two shapes exist. When the approver held a master password, the
/// payload is the master key plus its authentication hash; the user key
/// is then unlocked from the session's stored wrap if one is present.
/// Otherwise the payload is the user key itself. Returns whether a user
/// key was established.
pub(crate) fn set_keys_from_approved_request(
    session: &mut SessionContext,
    status: &AuthRequestStatus,
    private_key: &RsaPrivateKey,
) -> Result<bool, AuthRequestError> {
    let encrypted_key = status
        .encrypted_key
        .as_deref()
        .ok_or(AuthRequestError::MissingKeyMaterial { what: "encrypted key" })?;

    if let Some(encrypted_hash) = status.encrypted_master_password_hash.as_deref() {
        let master_key = MasterKey::from_bytes(&rsa_unwrap(encrypted_key, private_key)?)?;
        let hash = MasterKeyHash::from_bytes(&rsa_unwrap(encrypted_hash, private_key)?)?;

        // Unwrap the stored user key before writing anything: a failure
        // must leave the session exactly as it was.
        let user_key = match session.master_key_encrypted_user_key() {
            Some(wrapped) => {
                Some(hierarchy::unwrap_user_key_with_master_key(wrapped, &master_key)?)
            },
            None => None,
        };

        session.set_master_key(master_key);
        session.set_master_key_hash(hash);
        match user_key {
            Some(user_key) => {
                hierarchy::establish_user_key(session, user_key);
                Ok(true)
            },
            None => Ok(false),
        }
    } else {
        let user_key = hierarchy::unwrap_user_key_with_private_key(encrypted_key, private_key)?;
        hierarchy::establish_user_key(session, user_key);
        Ok(true)
    }
}
