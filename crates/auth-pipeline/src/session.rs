//! Session management: login, logout, restore and status.
//!
//! The session FSM tracks transient states (logging in, renewing, logging
//! out) that are never persisted. Token data lives in the
//! [`CredentialStore`]; renewals driven by the dispatcher reach the FSM
//! through a [`RefreshCoordinator`] observer.

use crate::api::ApiClient;
use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload};
use crate::coordinator::{RefreshCoordinator, RenewalEvent};
use crate::dispatcher::RequestDispatcher;
use crate::error::{AuthError, AuthResult, RenewalError};
use crate::gateway::{AuthGateway, LoginGrant};
use crate::lifecycle::{self, DEFAULT_RENEW_THRESHOLD};
use crate::oauth::OAuthResult;
use crate::transport::HttpTransport;
use chrono::{DateTime, Utc};
use credential_storage::{CredentialRecord, CredentialStore, RetentionScope};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default upper bound on the best-effort server logout call.
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Authentication status derived from the stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// Stored access token still valid.
    LoggedIn {
        subject: serde_json::Value,
        expires_at: DateTime<Utc>,
        scope: RetentionScope,
    },
    /// Stored access token expired; the refresh token may still work.
    Expired { scope: RetentionScope },
    NotLoggedIn,
}

/// Callback type for auth state change notifications.
///
/// Called synchronously; it must not call back into the session manager.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Tunables for a [`SessionManager`].
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub renew_threshold: chrono::Duration,
    pub logout_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            renew_threshold: DEFAULT_RENEW_THRESHOLD,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
        }
    }
}

/// FSM plus state-change callback, shared with the renewal observer.
struct SessionTracker {
    fsm: Mutex<AuthMachine>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl SessionTracker {
    fn new() -> Self {
        Self {
            fsm: Mutex::new(AuthMachine::new()),
            state_callback: Mutex::new(None),
        }
    }

    fn state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    /// Transition the FSM and notify the callback if the state changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        self.transition_with(input, None)
    }

    fn transition_with(
        &self,
        input: &AuthMachineInput,
        ended_by: Option<&RenewalError>,
    ) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        if fsm.consume(input).is_err() {
            return Err(AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            )));
        }

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            self.notify(AuthStateChangedPayload {
                state: new_state,
                session_ended: ended_by.is_some(),
                reason: ended_by.map(|err| err.to_string()),
            });
        }

        Ok(new_state)
    }

    fn notify(&self, payload: AuthStateChangedPayload) {
        if let Some(callback) = self.state_callback.lock().as_ref() {
            callback(payload);
        }
    }

    fn on_renewal(&self, event: &RenewalEvent) {
        // Renewal events outside a live session (e.g. mid-logout) are ignored
        let result = match event {
            RenewalEvent::Started => self.transition(&AuthMachineInput::RenewalStarted),
            RenewalEvent::Succeeded { .. } => {
                self.transition(&AuthMachineInput::RenewalSucceeded)
            }
            RenewalEvent::Failed { error } => {
                self.transition_with(&AuthMachineInput::RenewalFailed, Some(error))
            }
        };

        if let Err(err) = result {
            debug!(error = %err, "Renewal event ignored by session FSM");
        }
    }
}

/// Owns the request pipeline for one credential store.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    gateway: Arc<dyn AuthGateway>,
    coordinator: Arc<RefreshCoordinator>,
    dispatcher: Arc<RequestDispatcher>,
    tracker: Arc<SessionTracker>,
    logout_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<CredentialStore>,
        gateway: Arc<dyn AuthGateway>,
        transport: Arc<dyn HttpTransport>,
        settings: SessionSettings,
    ) -> Self {
        let tracker = Arc::new(SessionTracker::new());
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), gateway.clone()));
        coordinator.add_observer(Box::new({
            let tracker = tracker.clone();
            move |event| tracker.on_renewal(event)
        }));

        let dispatcher = Arc::new(RequestDispatcher::new(
            transport,
            store.clone(),
            coordinator.clone(),
            settings.renew_threshold,
        ));

        Self {
            store,
            gateway,
            coordinator,
            dispatcher,
            tracker,
            logout_timeout: settings.logout_timeout,
        }
    }

    /// Set a callback to be notified of auth state changes, including the
    /// session-ended signal after a failed renewal.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.tracker.state_callback.lock() = Some(callback);
    }

    pub fn auth_state(&self) -> AuthState {
        self.tracker.state()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> Arc<RequestDispatcher> {
        self.dispatcher.clone()
    }

    pub fn api_client(&self, base_url: Url) -> ApiClient {
        ApiClient::new(self.dispatcher.clone(), base_url)
    }

    /// Login with email and password.
    ///
    /// The record goes to the persistent scope when `remember_me` is set,
    /// otherwise to the ephemeral scope. On failure nothing is stored.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> AuthResult<CredentialRecord> {
        self.tracker.transition(&AuthMachineInput::LoginAttempt)?;
        debug!(email = %email, remember_me, "Attempting password login");

        let grant = match self.gateway.login(email, password).await {
            Ok(grant) => grant,
            Err(err) => {
                self.tracker.transition(&AuthMachineInput::LoginFailed)?;
                return Err(err);
            }
        };

        self.establish(grant, remember_me)
    }

    /// Finish a browser login from the loopback callback result.
    pub fn complete_oauth(
        &self,
        result: OAuthResult,
        remember_me: bool,
    ) -> AuthResult<CredentialRecord> {
        self.tracker.transition(&AuthMachineInput::LoginAttempt)?;

        let grant = match result.into_grant() {
            Ok(grant) => grant,
            Err(err) => {
                self.tracker.transition(&AuthMachineInput::LoginFailed)?;
                return Err(err);
            }
        };

        self.establish(grant, remember_me)
    }

    /// Store a freshly issued grant. Must be called in `LoggingIn`.
    fn establish(&self, grant: LoginGrant, remember_me: bool) -> AuthResult<CredentialRecord> {
        if grant.access_token.trim().is_empty() || grant.refresh_token.trim().is_empty() {
            self.tracker.transition(&AuthMachineInput::LoginFailed)?;
            return Err(AuthError::InvalidResponse(
                "login response carried an empty token".to_string(),
            ));
        }

        let record = CredentialRecord::issued(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            grant.user,
            Utc::now(),
        );
        self.store.put(&record, remember_me);
        self.tracker.transition(&AuthMachineInput::LoginSuccess)?;

        info!(
            scope = RetentionScope::from_remember_me(remember_me).as_str(),
            expires_at = %record.expires_at.to_rfc3339(),
            "Login successful"
        );
        Ok(record)
    }

    /// Logout.
    ///
    /// Tells the server to revoke the refresh token, bounded by the logout
    /// timeout. Local state is cleared from both scopes whatever the server
    /// says.
    pub async fn logout(&self) {
        // Not in a logged-in state: clear storage anyway
        let _ = self.tracker.transition(&AuthMachineInput::LogoutRequested);

        if let Some(record) = self.store.get() {
            match tokio::time::timeout(
                self.logout_timeout,
                self.gateway.logout(&record.refresh_token),
            )
            .await
            {
                Ok(Ok(())) => debug!("Server session revoked"),
                Ok(Err(err)) => {
                    warn!(error = %err, "Server logout failed, clearing local session anyway")
                }
                Err(_) => warn!(
                    timeout_ms = self.logout_timeout.as_millis() as u64,
                    "Server logout timed out, clearing local session anyway"
                ),
            }
        }

        self.store.clear();
        let _ = self.tracker.transition(&AuthMachineInput::LogoutComplete);

        info!("Logged out");
    }

    /// Adopt a record left in the store by an earlier run.
    ///
    /// An expired access token still counts: the refresh token may be valid
    /// and the first request will renew it. Returns false when nothing is
    /// stored or a session is already active.
    pub fn restore_session(&self) -> bool {
        let Some((scope, record)) = self.store.get_with_scope() else {
            debug!("No stored session to restore");
            return false;
        };

        if self
            .tracker
            .transition(&AuthMachineInput::SessionRestored)
            .is_err()
        {
            return false;
        }

        info!(
            scope = scope.as_str(),
            expired = lifecycle::is_expired(Some(&record), Utc::now()),
            "Restored stored session"
        );
        true
    }

    pub fn status(&self) -> AuthStatus {
        match self.store.get_with_scope() {
            None => AuthStatus::NotLoggedIn,
            Some((scope, record)) if lifecycle::is_expired(Some(&record), Utc::now()) => {
                AuthStatus::Expired { scope }
            }
            Some((scope, record)) => AuthStatus::LoggedIn {
                subject: record.subject,
                expires_at: record.expires_at,
                scope,
            },
        }
    }
}
