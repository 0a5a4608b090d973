//! Async driver for the auth request flow.
//!
//! Bridges the sans-IO [`AuthRequestFlow`] to real collaborators: push
//! notifications arrive on an mpsc channel, a poll timer re-fetches
//! status, and every action the flow emits is executed against the
//! transport and store. The push/poll race collapses inside the flow's
//! idempotent consumption, so the driver never deduplicates.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use vaultgate_core::{
    AdminRequestStore, AuthRequestTransport, DeviceRegistration, RequestId, SessionContext,
    TransportError, device_trust,
    env::Environment,
};
use vaultgate_crypto::DeviceKey;

use crate::{
    auth_request::{AuthAction, AuthEvent, AuthRequestFlow, AuthRequestOutcome},
    error::LoginError,
};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// A push notification that a request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEvent {
    /// The request the push claims was answered.
    pub request_id: RequestId,
}

/// A completed auth request login.
#[derive(Debug)]
pub struct AuthRequestLogin {
    /// Terminal outcome; always `Approved` on the `Ok` path.
    pub outcome: AuthRequestOutcome,
    /// Device trust material minted after approval, for the caller to
    /// store and register.
    pub trusted_device: Option<(DeviceKey, DeviceRegistration)>,
}

/// Drives an [`AuthRequestFlow`] against real collaborators.
pub struct AuthRequestDriver<'a, E, T, S> {
    env: &'a E,
    transport: &'a T,
    store: &'a S,
    poll_interval: Duration,
    trust_device: Option<&'a str>,
}

impl<'a, E, T, S> AuthRequestDriver<'a, E, T, S>
where
    E: Environment,
    T: AuthRequestTransport,
    S: AdminRequestStore,
{
    /// Creates a driver with the default poll interval and no device
    /// trust.
    pub fn new(env: &'a E, transport: &'a T, store: &'a S) -> Self {
        Self {
            env,
            transport,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            trust_device: None,
        }
    }

    /// Overrides the status poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Trust this device after a successful consumption. Trust failures
    /// are logged, never propagated.
    #[must_use]
    pub fn trust_device(mut self, device_identifier: &'a str) -> Self {
        self.trust_device = Some(device_identifier);
        self
    }

    /// Drive one auth request flow to completion.
    ///
    /// Starts fresh, or resumes a stored admin request for the flow's
    /// account if one exists (the stored request takes precedence). Runs
    /// until the flow completes: approval resolves to
    /// [`AuthRequestLogin`], denial to [`LoginError::RequestDenied`].
    ///
    /// # Errors
    ///
    /// Transport failures during submission are fatal (there is no
    /// request to wait on); failures during polling are logged and
    /// retried on the next interval.
    pub async fn run(
        &self,
        flow: &mut AuthRequestFlow<E>,
        session: &mut SessionContext,
        approvals: &mut mpsc::Receiver<ApprovalEvent>,
        on_log: &mut dyn FnMut(&str),
    ) -> Result<AuthRequestLogin, LoginError> {
        let first_event = match self.store.load(flow.email())? {
            Some(storable) => AuthEvent::ResumeStored { storable },
            None => AuthEvent::Start,
        };

        let mut state = DriverState {
            subscribed: None,
            outcome: None,
            trusted_device: None,
        };

        self.dispatch(&mut state, flow, session, first_event, on_log).await?;

        let mut push_open = true;
        while state.outcome.is_none() {
            tokio::select! {
                maybe_push = approvals.recv(), if push_open => {
                    match maybe_push {
                        Some(push) if state.subscribed.as_ref() == Some(&push.request_id) => {
                            let event = AuthEvent::ApprovalPushed { id: push.request_id };
                            self.dispatch(&mut state, flow, session, event, on_log).await?;
                        },
                        Some(_) => {},
                        None => {
                            // Push is only a hint; polling carries the
                            // flow from here.
                            on_log("approval channel closed, falling back to polling");
                            push_open = false;
                        },
                    }
                },
                () = self.env.sleep(self.poll_interval) => {
                    let tick = AuthEvent::Tick { now: self.env.now() };
                    self.dispatch(&mut state, flow, session, tick, on_log).await?;
                    self.poll(&mut state, flow, session, on_log).await?;
                },
            }
        }

        match state.outcome {
            Some(outcome @ AuthRequestOutcome::Approved { .. }) => Ok(AuthRequestLogin {
                outcome,
                trusted_device: state.trusted_device,
            }),
            Some(AuthRequestOutcome::Denied) => Err(LoginError::RequestDenied),
            Some(AuthRequestOutcome::Abandoned) | None => Err(LoginError::Abandoned),
        }
    }

    /// Feed one event through the flow, then execute every action it
    /// emits, feeding follow-up events until the machine quiesces.
    async fn dispatch(
        &self,
        state: &mut DriverState,
        flow: &mut AuthRequestFlow<E>,
        session: &mut SessionContext,
        event: AuthEvent<E::Instant>,
        on_log: &mut dyn FnMut(&str),
    ) -> Result<(), LoginError> {
        let mut events = VecDeque::new();
        events.push_back(event);

        while let Some(event) = events.pop_front() {
            let actions = flow.handle(session, event)?;
            for action in actions {
                self.execute(state, flow, session, action, &mut events, on_log).await?;
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: &mut DriverState,
        flow: &AuthRequestFlow<E>,
        session: &mut SessionContext,
        action: AuthAction,
        events: &mut VecDeque<AuthEvent<E::Instant>>,
        on_log: &mut dyn FnMut(&str),
    ) -> Result<(), LoginError> {
        match action {
            AuthAction::SubmitRequest(request) => {
                let id = self.transport.create_auth_request(request).await?;
                events.push_back(AuthEvent::RequestRegistered { id });
            },
            AuthAction::Subscribe { id } => {
                state.subscribed = Some(id);
            },
            AuthAction::Unsubscribe { id } => {
                if state.subscribed.as_ref() == Some(&id) {
                    state.subscribed = None;
                }
            },
            AuthAction::FetchStatus { id, access_code } => {
                self.fetch(id, access_code.as_deref(), events, on_log).await;
            },
            AuthAction::PersistAdminRequest { storable } => {
                self.store.save(flow.email(), &storable)?;
            },
            AuthAction::ClearAdminRequest => {
                self.store.clear(flow.email())?;
            },
            AuthAction::ShowResendAffordance => {
                on_log("approval is taking a while; offer to resend the request");
            },
            AuthAction::Restarted { previous } => {
                on_log(&format!("request {} replaced after denial", previous.0));
            },
            AuthAction::TrustDevice => {
                if let Some(identifier) = self.trust_device {
                    match device_trust::trust_device_if_required(
                        self.env, session, identifier, true,
                    ) {
                        Ok(minted) => state.trusted_device = minted,
                        // Non-fatal: the login already succeeded.
                        Err(err) => on_log(&format!("device trust failed: {err}")),
                    }
                }
            },
            AuthAction::Completed { outcome } => {
                state.outcome = Some(outcome);
            },
            AuthAction::Log { message } => on_log(&message),
        }
        Ok(())
    }

    /// Timed re-poll of the pending request, if any.
    async fn poll(
        &self,
        state: &mut DriverState,
        flow: &mut AuthRequestFlow<E>,
        session: &mut SessionContext,
        on_log: &mut dyn FnMut(&str),
    ) -> Result<(), LoginError> {
        let Some((id, access_code)) = flow.pending_request() else {
            return Ok(());
        };
        let (id, access_code) = (id.clone(), access_code.map(str::to_owned));

        let mut events = VecDeque::new();
        self.fetch(id, access_code.as_deref(), &mut events, on_log).await;
        while let Some(event) = events.pop_front() {
            self.dispatch(state, flow, session, event, on_log).await?;
        }
        Ok(())
    }

    async fn fetch(
        &self,
        id: RequestId,
        access_code: Option<&str>,
        events: &mut VecDeque<AuthEvent<E::Instant>>,
        on_log: &mut dyn FnMut(&str),
    ) {
        let result = match access_code {
            Some(code) => self.transport.get_auth_request_with_access_code(&id, code).await,
            None => self.transport.get_auth_request(&id).await,
        };
        match result {
            Ok(status) => events.push_back(AuthEvent::StatusFetched { status }),
            Err(TransportError::RequestNotFound) => {
                events.push_back(AuthEvent::RequestVanished { id });
            },
            Err(err) => {
                // Transient; the next poll interval retries.
                on_log(&format!("status fetch failed: {err}"));
            },
        }
    }
}

struct DriverState {
    subscribed: Option<RequestId>,
    outcome: Option<AuthRequestOutcome>,
    trusted_device: Option<(DeviceKey, DeviceRegistration)>,
}
