//! Single-flight access token renewal.
//!
//! At most one refresh call is outstanding at any time. The first caller to
//! ask for a renewal becomes the leader and runs the refresh episode; every
//! caller arriving while it is outstanding parks on a oneshot channel and
//! receives the leader's outcome. The store is updated (or cleared) before
//! any waiter is woken, so a woken waiter always reads post-episode state.
//!
//! If the leader's future is dropped mid-episode the waiters' senders are
//! dropped with it; each waiter then re-enters [`RefreshCoordinator::renew`]
//! and one of them becomes the next leader.
//!
//! An episode only writes to the record it started from. If a login replaced
//! that record while the refresh was outstanding, the episode leaves the new
//! record alone and hands out its access token instead.

use crate::error::RenewalError;
use crate::gateway::AuthGateway;
use chrono::Utc;
use credential_storage::{expiry_from, CredentialStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// The new access token, or why the session could not be renewed.
pub type RenewalOutcome = Result<String, RenewalError>;

/// Renewal lifecycle notifications, one `Started` and one terminal event per
/// episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalEvent {
    Started,
    /// `waiters` callers besides the leader received the new token.
    Succeeded { waiters: usize },
    /// The store has been cleared; the user must log in again.
    Failed { error: RenewalError },
}

/// Callback invoked for every [`RenewalEvent`].
pub type RenewalObserver = Box<dyn Fn(&RenewalEvent) + Send + Sync>;

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RenewalOutcome>>,
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    gateway: Arc<dyn AuthGateway>,
    flight: Mutex<FlightState>,
    observers: Mutex<Vec<RenewalObserver>>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, gateway: Arc<dyn AuthGateway>) -> Self {
        Self {
            store,
            gateway,
            flight: Mutex::new(FlightState::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a renewal observer. Observers run synchronously while the
    /// episode is still marked in flight, so they must not call back into
    /// [`renew`](Self::renew).
    pub fn add_observer(&self, observer: RenewalObserver) {
        self.observers.lock().push(observer);
    }

    pub fn is_in_flight(&self) -> bool {
        self.flight.lock().in_flight
    }

    /// Callers currently parked behind the leader.
    pub fn pending_waiters(&self) -> usize {
        self.flight.lock().waiters.len()
    }

    /// Obtain a fresh access token, joining the outstanding renewal if there
    /// is one.
    pub async fn renew(&self) -> RenewalOutcome {
        loop {
            let receiver = {
                let mut flight = self.flight.lock();
                if flight.in_flight {
                    let (tx, rx) = oneshot::channel();
                    flight.waiters.push(tx);
                    debug!(waiters = flight.waiters.len(), "Joined in-flight renewal");
                    Some(rx)
                } else {
                    flight.in_flight = true;
                    None
                }
            };

            match receiver {
                Some(rx) => match rx.await {
                    Ok(outcome) => return outcome,
                    // Leader was cancelled; contend for leadership again
                    Err(_) => continue,
                },
                None => return self.lead().await,
            }
        }
    }

    async fn lead(&self) -> RenewalOutcome {
        let mut episode = Episode {
            coordinator: self,
            settled: false,
        };

        self.notify(&RenewalEvent::Started);
        let outcome = self.run_episode().await;

        match &outcome {
            Ok(_) => {
                let waiters = self.pending_waiters();
                info!(waiters, "Access token renewed");
                self.notify(&RenewalEvent::Succeeded { waiters });
            }
            Err(error) => {
                warn!(error = %error, "Token renewal failed, session ended");
                self.notify(&RenewalEvent::Failed {
                    error: error.clone(),
                });
            }
        }

        episode.settle(&outcome);
        outcome
    }

    async fn run_episode(&self) -> RenewalOutcome {
        let Some(record) = self.store.get() else {
            return Err(RenewalError::MissingRefreshToken);
        };

        match self.refresh(&record.refresh_token).await {
            Ok((access_token, expires_in)) => {
                let expires_at = expiry_from(Utc::now(), expires_in);
                if self
                    .store
                    .update_access_token(&record.refresh_token, &access_token, expires_at)
                {
                    return Ok(access_token);
                }
                self.superseded(RenewalError::MissingRefreshToken)
            }
            Err(error) => {
                if self.store.clear_if_current(&record.refresh_token) {
                    return Err(error);
                }
                self.superseded(error)
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<(String, i64), RenewalError> {
        debug!("Requesting new access token");
        let grant = self
            .gateway
            .refresh(refresh_token)
            .await
            .map_err(RenewalError::from_gateway)?;

        if grant.access_token.trim().is_empty() {
            return Err(RenewalError::MalformedResponse(
                "empty access token".to_string(),
            ));
        }
        Ok((grant.access_token, grant.expires_in))
    }

    /// The record the episode started from was replaced or removed while the
    /// refresh was outstanding.
    fn superseded(&self, error: RenewalError) -> RenewalOutcome {
        match self.store.get() {
            Some(current) => {
                debug!("Session replaced during renewal, using its access token");
                Ok(current.access_token)
            }
            // Logged out mid-episode
            None => Err(error),
        }
    }

    fn notify(&self, event: &RenewalEvent) {
        for observer in self.observers.lock().iter() {
            observer(event);
        }
    }
}

/// Owns the leader's in-flight flag until the episode settles.
struct Episode<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Episode<'_> {
    fn settle(&mut self, outcome: &RenewalOutcome) {
        self.settled = true;
        for waiter in self.release() {
            // Receiver gone means that caller was cancelled
            let _ = waiter.send(outcome.clone());
        }
    }

    fn release(&self) -> Vec<oneshot::Sender<RenewalOutcome>> {
        let mut flight = self.coordinator.flight.lock();
        flight.in_flight = false;
        std::mem::take(&mut flight.waiters)
    }
}

impl Drop for Episode<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.release();
            debug!(waiters = abandoned.len(), "Renewal leader cancelled");
        }
    }
}
