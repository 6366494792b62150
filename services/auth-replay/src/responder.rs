//! Answers login-required notifications
//!
//! Stands in for the interactive login flow: when a transport suspends a
//! request, the responder confirms with the configured bearer token attached
//! to every replayed request, or cancels with a reason when no token is
//! configured. A request that is suspended again while already carrying the
//! token is rejected instead of replayed, so a bad token cannot loop.

use auth_recovery::{AuthCoordinator, AuthEvent, Error as RecoveryError, TransportName};
use common::Secret;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use transport::{HttpFailure, HttpRequest, HttpTransport};

pub const NO_CREDENTIAL: &str = "no credential configured";
pub const CREDENTIAL_REJECTED: &str = "credential rejected after re-authentication";

pub struct Responder {
    coordinator: AuthCoordinator<HttpTransport>,
    token: Option<Secret<String>>,
}

impl Responder {
    pub fn new(coordinator: AuthCoordinator<HttpTransport>, token: Option<Secret<String>>) -> Self {
        Self { coordinator, token }
    }

    /// Handle events until the sink is dropped.
    pub fn spawn(
        self,
        mut events: broadcast::Receiver<AuthEvent<HttpFailure>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "responder lagged behind auth events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle(&self, event: AuthEvent<HttpFailure>) {
        match event {
            AuthEvent::LoginRequired {
                transport,
                episode,
                failure,
            } => {
                info!(transport = %transport, episode = %episode, failure = %failure, "login required");
                self.answer(transport).await;
            }
            AuthEvent::Forbidden { transport, failure } => {
                warn!(transport = %transport, failure = %failure, "request forbidden");
            }
            AuthEvent::LoginConfirmed {
                transport, episode, ..
            } => {
                debug!(transport = %transport, episode = %episode, "login confirmed");
            }
            AuthEvent::LoginCancelled {
                transport, episode, ..
            } => {
                debug!(transport = %transport, episode = %episode, "login cancelled");
            }
        }
    }

    async fn answer(&self, transport: TransportName) {
        let result = match &self.token {
            Some(token) => {
                let data = Some(json!({ "credential": "bearer" }));
                self.coordinator
                    .confirm_transport(transport.as_str(), data, |request: HttpRequest| {
                        if request.has_bearer(token) {
                            return Err(CREDENTIAL_REJECTED.to_string());
                        }
                        request.with_bearer(token).map_err(|e| e.to_string())
                    })
                    .await
                    .map(|handle| handle.replayed)
            }
            None => self.cancel(&transport, NO_CREDENTIAL).await,
        };

        match result {
            Ok(entries) => debug!(transport = %transport, entries, "episode drained"),
            // Later notifications of an episode that was already drained.
            Err(RecoveryError::NoPendingEpisode) => {
                debug!(transport = %transport, "episode already drained")
            }
            Err(e) => warn!(transport = %transport, error = %e, "failed to answer login request"),
        }
    }

    async fn cancel(
        &self,
        transport: &TransportName,
        reason: &str,
    ) -> auth_recovery::Result<usize> {
        self.coordinator
            .cancel_transport(transport.as_str(), None, Some(reason.to_string()))
            .await
            .map(|drained| drained.entries)
    }
}
