//! Session state machine using rust-fsm.
//!
//! Tracks the session as the user sees it. Renewals driven by the request
//! dispatcher feed in through the refresh coordinator's observer hook.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  SessionRestored
//! │    LoggedOut    │ ─────────────────────────┐
//! └────────┬────────┘                          │
//!          │ LoginAttempt                      │
//!          ▼                                   │
//! ┌─────────────────┐  LoginFailed             │
//! │    LoggingIn    │ ──────────► LoggedOut    │
//! └────────┬────────┘                          │
//!          │ LoginSuccess                      │
//!          ▼                                   ▼
//! ┌─────────────────┐  RenewalStarted  ┌─────────────────┐
//! │    LoggedIn     │ ───────────────► │    Renewing     │
//! └────────┬────────┘ ◄─────────────── └────────┬────────┘
//!          │        RenewalSucceeded            │ RenewalFailed
//!          │ LogoutRequested                    ▼
//!          ▼                                LoggedOut
//! ┌─────────────────┐
//! │   LoggingOut    │ ──LogoutComplete──► LoggedOut
//! └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(LoggedOut)

    LoggedOut => {
        LoginAttempt => LoggingIn,
        SessionRestored => LoggedIn,
        // A dispatch can renew a stored session nobody restored explicitly
        RenewalStarted => Renewing
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => LoggedOut
    },
    LoggedIn => {
        LoginAttempt => LoggingIn,
        RenewalStarted => Renewing,
        LogoutRequested => LoggingOut
    },
    Renewing => {
        LoginAttempt => LoggingIn,
        RenewalSucceeded => LoggedIn,
        RenewalFailed => LoggedOut,
        LogoutRequested => LoggingOut
    },
    LoggingOut => {
        LogoutComplete => LoggedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// User-facing session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
    /// Logged in, access token being renewed.
    Renewing,
    LoggingOut,
}

impl AuthState {
    /// Returns true if requests will carry a credential.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn | AuthState::Renewing)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::LoggingIn | AuthState::Renewing | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::LoggedOut => AuthState::LoggedOut,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Renewing => AuthState::Renewing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    /// Set when the session was torn down because renewal failed. The user
    /// has to log in again.
    #[serde(default)]
    pub session_ended: bool,
    /// Why the session ended, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
