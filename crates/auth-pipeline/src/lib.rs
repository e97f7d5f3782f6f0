//! Authenticated request pipeline for the Portal client runtime.
//!
//! This crate provides:
//! - Expiry arithmetic over credential records ([`lifecycle`])
//! - Single-flight access token renewal ([`RefreshCoordinator`])
//! - Bearer attachment with proactive and 401-driven renewal ([`RequestDispatcher`])
//! - Login, logout and session restore over the auth endpoints ([`SessionManager`])
//! - Browser login via a loopback callback server ([`OAuthCallbackServer`])
//!
//! # Example
//!
//! ```ignore
//! use auth_pipeline::{HttpAuthGateway, ReqwestTransport, SessionManager, SessionSettings};
//!
//! let session = SessionManager::new(store, gateway, transport, SessionSettings::default());
//! session.login("user@example.com", "password", true).await?;
//! let me: serde_json::Value = session.api_client(base_url).get("users/me").await?;
//! ```

mod api;
mod auth_fsm;
mod coordinator;
mod dispatch_fsm;
mod dispatcher;
mod error;
mod gateway;
pub mod lifecycle;
mod oauth;
mod session;
mod transport;

#[cfg(test)]
mod tests;

pub use api::ApiClient;
pub use auth_fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload,
};
pub use coordinator::{RefreshCoordinator, RenewalEvent, RenewalObserver, RenewalOutcome};
pub use dispatch_fsm::{DispatchMachine, DispatchMachineInput, DispatchMachineState};
pub use dispatcher::{DispatchOptions, RequestDispatcher};
pub use error::{AuthError, AuthResult, RenewalError};
pub use gateway::{AuthGateway, HttpAuthGateway, LoginGrant, RefreshGrant};
pub use oauth::{
    CallbackListener, OAuthCallbackServer, OAuthResult, DEFAULT_OAUTH_PORT, DEFAULT_OAUTH_TIMEOUT,
};
pub use session::{
    AuthStateCallback, AuthStatus, SessionManager, SessionSettings, DEFAULT_LOGOUT_TIMEOUT,
};
pub use transport::{join_url, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

pub use reqwest::{Method, StatusCode};
