//! Authentication notifications
//!
//! The core publishes through an injected [`EventSink`] and never waits on
//! subscribers. [`BroadcastSink`] fans events out over a tokio broadcast
//! channel; subscribers that lag lose the oldest events.

use std::fmt;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::buffer::EpisodeId;
use crate::registry::TransportName;

/// Notifications emitted by interceptors and the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent<F> {
    /// A request was suspended. Carries the failure that triggered it.
    LoginRequired {
        transport: TransportName,
        episode: EpisodeId,
        failure: F,
    },
    /// A request was refused; it was not suspended.
    Forbidden {
        transport: TransportName,
        failure: F,
    },
    LoginConfirmed {
        transport: TransportName,
        episode: EpisodeId,
        data: Option<Value>,
    },
    LoginCancelled {
        transport: TransportName,
        episode: EpisodeId,
        data: Option<Value>,
    },
}

impl<F> AuthEvent<F> {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthEvent::LoginRequired { .. } => "login_required",
            AuthEvent::Forbidden { .. } => "forbidden",
            AuthEvent::LoginConfirmed { .. } => "login_confirmed",
            AuthEvent::LoginCancelled { .. } => "login_cancelled",
        }
    }

    pub fn transport(&self) -> &TransportName {
        match self {
            AuthEvent::LoginRequired { transport, .. }
            | AuthEvent::Forbidden { transport, .. }
            | AuthEvent::LoginConfirmed { transport, .. }
            | AuthEvent::LoginCancelled { transport, .. } => transport,
        }
    }
}

/// Fire-and-forget publish capability.
pub trait EventSink<F>: Send + Sync {
    fn publish(&self, event: AuthEvent<F>);
}

/// Broadcast-channel event sink.
pub struct BroadcastSink<F> {
    tx: broadcast::Sender<AuthEvent<F>>,
}

impl<F: Clone> BroadcastSink<F> {
    /// `capacity` is the number of events retained for slow subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent<F>> {
        self.tx.subscribe()
    }
}

impl<F> EventSink<F> for BroadcastSink<F>
where
    F: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn publish(&self, event: AuthEvent<F>) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            debug!(
                event = event.kind(),
                transport = %event.transport(),
                "no subscribers for auth event"
            );
        }
    }
}
