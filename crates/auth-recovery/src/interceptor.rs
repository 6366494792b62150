//! Response-path interception for one named transport
//!
//! Every request issued through a [`TransportInterceptor`] has its outcome
//! inspected:
//!
//! - opted-out requests pass through unchanged
//! - auth-required suspends the request into the transport's buffer and
//!   publishes `LoginRequired`; the caller keeps waiting
//! - forbidden publishes `Forbidden` and is returned to the caller
//! - everything else is returned unchanged

use std::sync::Arc;

use tracing::{debug, info, warn};
use transport::{Outcome, RequestConfig, Transport};

use crate::error::RequestError;
use crate::events::AuthEvent;
use crate::metrics;
use crate::pending::{self, PendingResult, Settlement};
use crate::registry::{Registry, Slot, TransportName};

/// Settlement of a request issued through transport `T`.
pub type SettlementFor<T> = Settlement<<T as Transport>::Response, <T as Transport>::Failure>;

/// Intercepted handle to one registered transport. Cheap to clone.
pub struct TransportInterceptor<T: Transport + ?Sized> {
    slot: Arc<Slot<T>>,
    registry: Arc<Registry<T>>,
}

impl<T: Transport + ?Sized> Clone for TransportInterceptor<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Transport + ?Sized> TransportInterceptor<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>, registry: Arc<Registry<T>>) -> Self {
        Self { slot, registry }
    }

    pub fn name(&self) -> &TransportName {
        &self.slot.name
    }

    /// Issue `request` and wait for its settlement.
    ///
    /// An auth-required outcome does not complete this future: it completes
    /// when the episode is confirmed (with the replay's settlement) or
    /// cancelled with a reason. A cancel without a reason leaves it pending
    /// forever, including when it is the replay of an earlier episode that
    /// gets abandoned.
    pub async fn issue(&self, request: T::Request) -> SettlementFor<T> {
        match self.dispatch(request).await {
            Some(settlement) => settlement,
            None => std::future::pending().await,
        }
    }

    /// Like `issue`, but resolves to `None` once the request is abandoned.
    /// Replays go through here so abandonment reaches the original caller.
    pub(crate) async fn dispatch(&self, request: T::Request) -> Option<SettlementFor<T>> {
        if request.ignore_auth_module() {
            let outcome = self.slot.transport.issue(request).await;
            debug!(
                transport = %self.slot.name,
                outcome = outcome.label(),
                "request opted out of auth interception"
            );
            return Some(match outcome {
                Outcome::Success(value) => Ok(value),
                Outcome::AuthRequired(failure) => Err(RequestError::AuthRequired(failure)),
                Outcome::Forbidden(failure) => Err(RequestError::Forbidden(failure)),
                Outcome::Failure(failure) => Err(RequestError::Transport(failure)),
            });
        }

        let retained = request.clone();
        let outcome = self.slot.transport.issue(request).await;
        debug!(transport = %self.slot.name, outcome = outcome.label(), "transport responded");
        match outcome {
            Outcome::Success(value) => Some(Ok(value)),
            Outcome::AuthRequired(failure) => self.suspend(retained, failure).await.settled().await,
            Outcome::Forbidden(failure) => {
                warn!(transport = %self.slot.name, failure = ?failure, "request forbidden");
                metrics::record_forbidden(&self.slot.name);
                self.registry.sink.publish(AuthEvent::Forbidden {
                    transport: self.slot.name.clone(),
                    failure: failure.clone(),
                });
                Some(Err(RequestError::Forbidden(failure)))
            }
            Outcome::Failure(failure) => Some(Err(RequestError::Transport(failure))),
        }
    }

    /// Buffer `request` and mark this transport as the active failing one.
    async fn suspend(
        &self,
        request: T::Request,
        failure: T::Failure,
    ) -> PendingResult<T::Response, T::Failure> {
        let (settler, pending) = pending::channel();

        let (episode, depth) = {
            let mut active = self.registry.active.lock().await;
            let appended = self.slot.buffer().append(request, settler).await;
            *active = Some(self.slot.name.clone());
            appended
        };

        info!(
            transport = %self.slot.name,
            episode = %episode,
            depth,
            "request suspended pending re-authentication"
        );
        metrics::record_suspended(&self.slot.name);
        self.registry.sink.publish(AuthEvent::LoginRequired {
            transport: self.slot.name.clone(),
            episode,
            failure,
        });

        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestRequest, harness};

    #[tokio::test]
    async fn success_passes_through() {
        let (coordinator, _events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let result = api.issue(TestRequest::public(1)).await;
        assert_eq!(result, Ok("ok:1".to_string()));
        assert_eq!(coordinator.pending("api").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn other_failure_passes_through_without_event() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let result = api.issue(TestRequest::broken(1)).await;
        assert_eq!(result, Err(RequestError::Transport("500:1".to_string())));
        assert!(events.try_recv().is_err());
        assert!(coordinator.active_transport().await.is_none());
    }

    #[tokio::test]
    async fn forbidden_is_surfaced_and_published() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let result = api.issue(TestRequest::admin(1)).await;
        assert_eq!(result, Err(RequestError::Forbidden("403:1".to_string())));

        match events.recv().await.unwrap() {
            AuthEvent::Forbidden { transport, failure } => {
                assert_eq!(transport.as_str(), "api");
                assert_eq!(failure, "403:1");
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
        assert_eq!(coordinator.pending("api").await.unwrap(), 0);
        assert!(coordinator.active_transport().await.is_none());
    }

    #[tokio::test]
    async fn auth_required_suspends_and_publishes() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let call = tokio::spawn(async move { api.issue(TestRequest::private(1)).await });

        match events.recv().await.unwrap() {
            AuthEvent::LoginRequired {
                transport, failure, ..
            } => {
                assert_eq!(transport.as_str(), "api");
                assert_eq!(failure, "401:1");
            }
            other => panic!("expected LoginRequired, got {other:?}"),
        }
        assert_eq!(coordinator.pending("api").await.unwrap(), 1);
        assert_eq!(
            coordinator.active_transport().await.map(|n| n.to_string()),
            Some("api".to_string())
        );
        assert!(!call.is_finished());
    }

    #[tokio::test]
    async fn opted_out_auth_failure_reaches_caller_unchanged() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let result = api.issue(TestRequest::private(1).bypass()).await;
        assert_eq!(result, Err(RequestError::AuthRequired("401:1".to_string())));
        assert_eq!(coordinator.pending("api").await.unwrap(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn opted_out_forbidden_is_not_published() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let result = api.issue(TestRequest::admin(1).bypass()).await;
        assert_eq!(result, Err(RequestError::Forbidden("403:1".to_string())));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn suspensions_on_same_transport_share_an_episode() {
        let (coordinator, mut events, _transports) = harness(&["api"]);
        let api = coordinator.transport("api").unwrap();

        let mut episodes = Vec::new();
        for id in 1..=2 {
            let api = api.clone();
            tokio::spawn(async move { api.issue(TestRequest::private(id)).await });
            // Wait for each suspension so buffer order matches issue order.
            match events.recv().await.unwrap() {
                AuthEvent::LoginRequired { episode, .. } => episodes.push(episode),
                other => panic!("expected LoginRequired, got {other:?}"),
            }
        }

        assert_eq!(episodes[0], episodes[1]);
        assert_eq!(coordinator.pending("api").await.unwrap(), 2);
    }
}
