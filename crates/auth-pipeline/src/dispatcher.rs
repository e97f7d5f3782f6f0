//! Authenticated request dispatch.
//!
//! Attaches the stored access token to outgoing requests, renews it ahead
//! of expiry when it is close, and on a 401 renews once and resends once.

use crate::coordinator::RefreshCoordinator;
use crate::dispatch_fsm::{DispatchMachine, DispatchMachineInput};
use crate::error::{AuthError, AuthResult};
use crate::lifecycle;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use chrono::{Duration, Utc};
use credential_storage::CredentialStore;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-call dispatch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Send as-is: no token, no renewal, no retry.
    pub skip_auth: bool,
}

impl DispatchOptions {
    pub fn unauthenticated() -> Self {
        Self { skip_auth: true }
    }
}

pub struct RequestDispatcher {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    renew_threshold: Duration,
}

impl RequestDispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        renew_threshold: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
            renew_threshold,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn renew_threshold(&self) -> Duration {
        self.renew_threshold
    }

    /// Send `request`, returning the final response.
    ///
    /// Any non-401 response is returned unchanged, whatever its status. A
    /// 401 to the resent request is returned unchanged too. Only a failed
    /// renewal turns into an error ([`AuthError::AuthFailure`]); transport
    /// errors propagate as they are.
    pub async fn dispatch(
        &self,
        request: ApiRequest,
        options: DispatchOptions,
    ) -> AuthResult<ApiResponse> {
        let span = info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.url.path(),
        );
        self.dispatch_inner(request, options).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        request: ApiRequest,
        options: DispatchOptions,
    ) -> AuthResult<ApiResponse> {
        if options.skip_auth {
            debug!("Sending without credentials");
            return self.transport.send(request).await;
        }

        let mut call = DispatchMachine::new();
        let token = self.token_for_first_send().await;

        advance(&mut call, DispatchMachineInput::Dispatch)?;
        let response = self.send(&mut call, &request, token.as_deref()).await?;
        if !response.is_unauthorized() {
            advance(&mut call, DispatchMachineInput::Responded)?;
            return Ok(response);
        }

        debug!("Received 401, renewing access token");
        advance(&mut call, DispatchMachineInput::Rejected)?;
        advance(&mut call, DispatchMachineInput::BeginRenewal)?;

        let token = match self.coordinator.renew().await {
            Ok(token) => token,
            Err(err) => {
                advance(&mut call, DispatchMachineInput::RenewalFailed)?;
                advance(&mut call, DispatchMachineInput::Abort)?;
                return Err(AuthError::AuthFailure(err));
            }
        };

        advance(&mut call, DispatchMachineInput::Renewed)?;
        let response = self.send(&mut call, &request, Some(&token)).await?;
        if response.is_unauthorized() {
            warn!("Resent request was rejected again");
        }
        advance(&mut call, DispatchMachineInput::Responded)?;
        Ok(response)
    }

    /// Stored access token, renewed first if it is about to expire. A failed
    /// proactive renewal is not fatal: the request goes out with the token
    /// we had and the 401 path decides.
    async fn token_for_first_send(&self) -> Option<String> {
        let record = self.store.get()?;

        if lifecycle::should_proactively_renew(&record, Utc::now(), self.renew_threshold) {
            debug!(
                remaining_secs = lifecycle::remaining_lifetime(&record, Utc::now()).num_seconds(),
                "Access token near expiry, renewing ahead of send"
            );
            match self.coordinator.renew().await {
                Ok(token) => return Some(token),
                Err(err) => warn!(error = %err, "Proactive renewal failed, sending current token"),
            }
        }

        Some(record.access_token)
    }

    async fn send(
        &self,
        call: &mut DispatchMachine,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> AuthResult<ApiResponse> {
        let outgoing = match token {
            Some(token) => request.with_bearer(token)?,
            None => request.clone(),
        };

        match self.transport.send(outgoing).await {
            Ok(response) => Ok(response),
            Err(err) => {
                advance(call, DispatchMachineInput::TransportFailed)?;
                Err(err)
            }
        }
    }
}

fn advance(call: &mut DispatchMachine, input: DispatchMachineInput) -> AuthResult<()> {
    if call.consume(&input).is_err() {
        return Err(AuthError::InvalidStateTransition(format!(
            "dispatch cannot apply {:?} in {:?}",
            input,
            call.state()
        )));
    }
    Ok(())
}
